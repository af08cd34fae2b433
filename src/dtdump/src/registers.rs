//! Reads the live descriptor-table registers, for dumping the tables the processor is
//! actually using.

use crate::{
    descriptor::Mode,
    dump::{DumpSummary, TableDescriptor, dump_gdt, dump_idt},
    params::Parameters,
    sink::Sink,
};

/// The mode this code runs in, and therefore the mode of the tables it can read.
const NATIVE_MODE: Mode = if cfg!(target_arch = "x86_64") {
    Mode::Long64
} else {
    Mode::Protected32
};

/// The in-memory image of IDTR/GDTR, as stored by `sidt`/`sgdt`.
#[repr(C, packed(2))]
#[derive(Clone, Copy)]
pub struct DescriptorTablePointer {
    /// Size of the DT in bytes, less 1.
    limit: u16,

    /// Memory offset (pointer) to the table.
    base: *const u8,
}

impl DescriptorTablePointer {
    const fn empty() -> Self {
        Self {
            limit: 0,
            base: core::ptr::null(),
        }
    }

    pub fn read_idtr() -> Self {
        let mut dtptr = Self::empty();

        // Safety: `sidt` only stores the register image into `dtptr`.
        unsafe {
            core::arch::asm!(
                "sidt [{}]",
                in(reg) &raw mut dtptr,
                options(nostack, preserves_flags)
            );
        }

        dtptr
    }

    pub fn read_gdtr() -> Self {
        let mut dtptr = Self::empty();

        // Safety: `sgdt` only stores the register image into `dtptr`.
        unsafe {
            core::arch::asm!(
                "sgdt [{}]",
                in(reg) &raw mut dtptr,
                options(nostack, preserves_flags)
            );
        }

        dtptr
    }

    pub fn limit(&self) -> u16 {
        self.limit
    }

    pub fn base(&self) -> *const u8 {
        self.base
    }

    #[allow(clippy::as_conversions)]
    pub fn table(&self) -> TableDescriptor {
        TableDescriptor {
            base: self.base().addr() as u64,
            limit: self.limit(),
            mode: NATIVE_MODE,
        }
    }

    /// # Safety
    ///
    /// - The whole table, `limit + 1` bytes from `base`, must be mapped and readable.
    unsafe fn region(&self) -> &'static [u8] {
        let base = self.base();

        if base.is_null() {
            &[]
        } else {
            // Safety: Caller is required to guarantee the table memory is readable.
            unsafe { core::slice::from_raw_parts(base, self.table().size()) }
        }
    }
}

impl core::fmt::Debug for DescriptorTablePointer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DescriptorTablePointer")
            .field("Limit", &self.limit())
            .field("Base", &self.base())
            .finish()
    }
}

/// Dumps the IDT currently loaded on this hardware thread.
///
/// # Safety
///
/// - The memory described by IDTR must be mapped and readable.
pub unsafe fn dump_current_idt(params: &Parameters, sink: &mut impl Sink) -> DumpSummary {
    let dtptr = DescriptorTablePointer::read_idtr();
    trace!("Read IDTR: {dtptr:#X?}");

    // Safety: Caller is required to guarantee the IDT memory is readable.
    let region = unsafe { dtptr.region() };

    dump_idt(&dtptr.table(), region, params, sink)
}

/// Dumps the GDT currently loaded on this hardware thread.
///
/// # Safety
///
/// - The memory described by GDTR must be mapped and readable.
pub unsafe fn dump_current_gdt(params: &Parameters, sink: &mut impl Sink) -> DumpSummary {
    let dtptr = DescriptorTablePointer::read_gdtr();
    trace!("Read GDTR: {dtptr:#X?}");

    // Safety: Caller is required to guarantee the GDT memory is readable.
    let region = unsafe { dtptr.region() };

    dump_gdt(&dtptr.table(), region, params, sink)
}
