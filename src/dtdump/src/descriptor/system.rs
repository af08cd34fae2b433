use super::{
    EXTENSION_BIT_RANGE, GRANULARITY_BIT_INDEX, Granularity, Mode, PRESENT_BIT_INDEX,
    PRIVILEGE_LEVEL_BIT_RANGE, PrivilegeLevel, RawEntry, TYPE_BIT_RANGE, field_u8, field_u16,
    field_u32, legacy_base, raw_limit, set_legacy_base, set_raw_limit,
};
use bit_field::BitField;
use core::ops::Range;

/// Raw encodings of the system descriptor type field.
///
/// See Intel 3a, Table 3-2 "System-Segment and Gate-Descriptor Types".
#[repr(u8)]
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq)]
enum TypeField {
    Tss16Available = 0x1,
    Ldt = 0x2,
    Tss16Busy = 0x3,
    CallGate16 = 0x4,
    TaskGate = 0x5,
    InterruptGate16 = 0x6,
    TrapGate16 = 0x7,
    TssAvailable = 0x9,
    TssBusy = 0xB,
    CallGate = 0xC,
    InterruptGate = 0xE,
    TrapGate = 0xF,
}

/// The sub-kind of a system (`S` = 0) descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemKind {
    Ldt,
    Tss16Available,
    Tss16Busy,
    Tss32Available,
    Tss32Busy,
    Tss64Available,
    Tss64Busy,
    TaskGate,
    CallGate16,
    CallGate32,
    CallGate64,
    InterruptGate16,
    InterruptGate32,
    InterruptGate64,
    TrapGate16,
    TrapGate32,
    TrapGate64,
}

impl SystemKind {
    /// Resolves a 4-bit type field. Long mode redefines the 32-bit encodings as their 64-bit
    /// counterparts and retires the 16-bit ones, which then decode as `None`.
    pub fn decode(type_bits: u8, mode: Mode) -> Option<Self> {
        let type_field = TypeField::try_from(type_bits).ok()?;

        let kind = match (type_field, mode) {
            (TypeField::Ldt, _) => SystemKind::Ldt,

            (TypeField::Tss16Available, Mode::Protected32) => SystemKind::Tss16Available,
            (TypeField::Tss16Busy, Mode::Protected32) => SystemKind::Tss16Busy,
            (TypeField::CallGate16, Mode::Protected32) => SystemKind::CallGate16,
            (TypeField::TaskGate, Mode::Protected32) => SystemKind::TaskGate,
            (TypeField::InterruptGate16, Mode::Protected32) => SystemKind::InterruptGate16,
            (TypeField::TrapGate16, Mode::Protected32) => SystemKind::TrapGate16,
            (TypeField::TssAvailable, Mode::Protected32) => SystemKind::Tss32Available,
            (TypeField::TssBusy, Mode::Protected32) => SystemKind::Tss32Busy,
            (TypeField::CallGate, Mode::Protected32) => SystemKind::CallGate32,
            (TypeField::InterruptGate, Mode::Protected32) => SystemKind::InterruptGate32,
            (TypeField::TrapGate, Mode::Protected32) => SystemKind::TrapGate32,

            (TypeField::TssAvailable, Mode::Long64) => SystemKind::Tss64Available,
            (TypeField::TssBusy, Mode::Long64) => SystemKind::Tss64Busy,
            (TypeField::CallGate, Mode::Long64) => SystemKind::CallGate64,
            (TypeField::InterruptGate, Mode::Long64) => SystemKind::InterruptGate64,
            (TypeField::TrapGate, Mode::Long64) => SystemKind::TrapGate64,

            (
                TypeField::Tss16Available
                | TypeField::Tss16Busy
                | TypeField::CallGate16
                | TypeField::TaskGate
                | TypeField::InterruptGate16
                | TypeField::TrapGate16,
                Mode::Long64,
            ) => return None,
        };

        Some(kind)
    }

    fn type_field(self) -> TypeField {
        match self {
            SystemKind::Ldt => TypeField::Ldt,
            SystemKind::Tss16Available => TypeField::Tss16Available,
            SystemKind::Tss16Busy => TypeField::Tss16Busy,
            SystemKind::Tss32Available | SystemKind::Tss64Available => TypeField::TssAvailable,
            SystemKind::Tss32Busy | SystemKind::Tss64Busy => TypeField::TssBusy,
            SystemKind::TaskGate => TypeField::TaskGate,
            SystemKind::CallGate16 => TypeField::CallGate16,
            SystemKind::CallGate32 | SystemKind::CallGate64 => TypeField::CallGate,
            SystemKind::InterruptGate16 => TypeField::InterruptGate16,
            SystemKind::InterruptGate32 | SystemKind::InterruptGate64 => TypeField::InterruptGate,
            SystemKind::TrapGate16 => TypeField::TrapGate16,
            SystemKind::TrapGate32 | SystemKind::TrapGate64 => TypeField::TrapGate,
        }
    }

    /// The 4-bit type field value encoding this kind.
    pub fn type_bits(self) -> u8 {
        u8::from(self.type_field())
    }

    pub fn label(self) -> &'static str {
        match self {
            SystemKind::Ldt => "ldt",
            SystemKind::Tss16Available => "tss-16-available",
            SystemKind::Tss16Busy => "tss-16-busy",
            SystemKind::Tss32Available => "tss-32-available",
            SystemKind::Tss32Busy => "tss-32-busy",
            SystemKind::Tss64Available => "tss-64-available",
            SystemKind::Tss64Busy => "tss-64-busy",
            SystemKind::TaskGate => "task-gate",
            SystemKind::CallGate16 => "call-gate-16",
            SystemKind::CallGate32 => "call-gate-32",
            SystemKind::CallGate64 => "call-gate-64",
            SystemKind::InterruptGate16 => "int-gate-16",
            SystemKind::InterruptGate32 => "int-gate-32",
            SystemKind::InterruptGate64 => "int-gate-64",
            SystemKind::TrapGate16 => "trap-gate-16",
            SystemKind::TrapGate32 => "trap-gate-32",
            SystemKind::TrapGate64 => "trap-gate-64",
        }
    }

    /// LDT and TSS descriptors describe a memory segment (base + limit) rather than a
    /// control-transfer target.
    pub fn is_segment(self) -> bool {
        matches!(
            self,
            SystemKind::Ldt
                | SystemKind::Tss16Available
                | SystemKind::Tss16Busy
                | SystemKind::Tss32Available
                | SystemKind::Tss32Busy
                | SystemKind::Tss64Available
                | SystemKind::Tss64Busy
        )
    }

    pub fn is_gate(self) -> bool {
        !self.is_segment()
    }

    /// Gates the processor accepts in the IDT: task, interrupt and trap gates.
    pub fn is_interrupt_table_gate(self) -> bool {
        self.is_gate() && !self.is_call_gate()
    }

    fn is_call_gate(self) -> bool {
        matches!(
            self,
            SystemKind::CallGate16 | SystemKind::CallGate32 | SystemKind::CallGate64
        )
    }

    /// Legacy call gates copy this many stack parameters on a privilege change.
    pub fn has_param_count(self) -> bool {
        matches!(self, SystemKind::CallGate16 | SystemKind::CallGate32)
    }

    pub fn has_stack_index(self) -> bool {
        matches!(self, SystemKind::InterruptGate64 | SystemKind::TrapGate64)
    }
}

/// A decoded system segment (LDT, TSS) or gate descriptor.
///
/// Fields that do not apply to [`Self::kind`] are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemDescriptor {
    pub kind: SystemKind,

    /// Segment base for LDT/TSS descriptors; target offset for call, interrupt and trap gates.
    pub base_or_offset: u64,

    /// Effective limit of an LDT/TSS segment.
    pub limit: u32,

    pub granularity: Granularity,
    pub dpl: PrivilegeLevel,
    pub present: bool,

    /// Target code segment for call, interrupt and trap gates; TSS selector for task gates.
    pub segment_selector: u16,

    pub param_count: u8,

    /// Interrupt stack table slot for 64-bit interrupt & trap gates. `0` means no stack switch.
    pub interrupt_stack_table_index: u8,
}

impl SystemDescriptor {
    const OFFSET_LOW_BIT_RANGE: Range<usize> = 0..16;
    const SELECTOR_BIT_RANGE: Range<usize> = 16..32;
    const PARAM_COUNT_BIT_RANGE: Range<usize> = 32..37;
    const STACK_INDEX_BIT_RANGE: Range<usize> = 32..35;
    const OFFSET_HIGH_BIT_RANGE: Range<usize> = 48..64;

    pub(crate) fn decode(kind: SystemKind, raw: RawEntry) -> Self {
        let low = raw.low;
        let extension = raw
            .high
            .map_or(0, |high| u64::from(field_u32(high, EXTENSION_BIT_RANGE)) << 32);

        let mut descriptor = Self {
            kind,
            base_or_offset: 0,
            limit: 0,
            granularity: Granularity::Byte,
            dpl: PrivilegeLevel::from_descriptor(low),
            present: low.get_bit(PRESENT_BIT_INDEX),
            segment_selector: 0,
            param_count: 0,
            interrupt_stack_table_index: 0,
        };

        if kind.is_segment() {
            descriptor.granularity = Granularity::from_descriptor(low);
            descriptor.limit = descriptor.granularity.scale(raw_limit(low));
            descriptor.base_or_offset = legacy_base(low) | extension;
        } else {
            descriptor.segment_selector = field_u16(low, Self::SELECTOR_BIT_RANGE);

            // Task gates carry no offset; the TSS supplies the entry point.
            if kind != SystemKind::TaskGate {
                descriptor.base_or_offset = low.get_bits(Self::OFFSET_LOW_BIT_RANGE)
                    | (low.get_bits(Self::OFFSET_HIGH_BIT_RANGE) << 16)
                    | extension;
            }
        }

        if kind.has_param_count() {
            descriptor.param_count = field_u8(low, Self::PARAM_COUNT_BIT_RANGE);
        }

        if kind.has_stack_index() {
            descriptor.interrupt_stack_table_index = field_u8(low, Self::STACK_INDEX_BIT_RANGE);
        }

        descriptor
    }

    pub(crate) fn encode(&self, mode: Mode) -> RawEntry {
        let mut low = 0;

        if self.kind.is_segment() {
            set_raw_limit(&mut low, self.granularity.unscale(self.limit));
            set_legacy_base(&mut low, self.base_or_offset);
            low.set_bit(
                GRANULARITY_BIT_INDEX,
                self.granularity == Granularity::Page4KiB,
            );
        } else {
            low.set_bits(
                Self::OFFSET_LOW_BIT_RANGE,
                self.base_or_offset.get_bits(0..16),
            );
            low.set_bits(
                Self::OFFSET_HIGH_BIT_RANGE,
                self.base_or_offset.get_bits(16..32),
            );
            low.set_bits(
                Self::SELECTOR_BIT_RANGE,
                u64::from(self.segment_selector),
            );
        }

        if self.kind.has_param_count() {
            low.set_bits(
                Self::PARAM_COUNT_BIT_RANGE,
                u64::from(self.param_count).get_bits(0..5),
            );
        }

        if self.kind.has_stack_index() {
            low.set_bits(
                Self::STACK_INDEX_BIT_RANGE,
                u64::from(self.interrupt_stack_table_index).get_bits(0..3),
            );
        }

        low.set_bits(TYPE_BIT_RANGE, u64::from(self.kind.type_bits()));
        low.set_bits(PRIVILEGE_LEVEL_BIT_RANGE, u64::from(u8::from(self.dpl)));
        low.set_bit(PRESENT_BIT_INDEX, self.present);

        match mode {
            Mode::Protected32 => RawEntry::narrow(low),
            Mode::Long64 => RawEntry::wide(low, self.base_or_offset.get_bits(32..64)),
        }
    }
}
