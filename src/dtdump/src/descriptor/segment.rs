use super::{
    Granularity, NON_SYSTEM_BIT_INDEX, PRESENT_BIT_INDEX, PRIVILEGE_LEVEL_BIT_RANGE,
    PrivilegeLevel, TYPE_BIT_RANGE, field_u8, legacy_base, raw_limit, set_legacy_base,
    set_raw_limit,
};
use bit_field::BitField;

bitflags! {
    /// The low three bits of a code or data segment's type field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentAccess: u8 {
        /// Set by the processor on first use of the segment.
        const ACCESSED = 1 << 0;

        /// Readable for code segments, writable for data segments.
        const READ_WRITE = 1 << 1;

        /// Conforming for code segments, expand-down for data segments.
        const DIRECTION_CONFORMING = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Code,
    Data,
}

/// Default operand (or stack pointer) size selected by the `D/B` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandSize {
    Bits16,
    Bits32,
}

impl OperandSize {
    pub fn bits(self) -> u8 {
        match self {
            OperandSize::Bits16 => 16,
            OperandSize::Bits32 => 32,
        }
    }
}

/// A decoded code or data segment descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentDescriptor {
    pub base: u64,

    /// Effective limit in bytes, already scaled by [`Self::granularity`].
    pub limit: u32,

    pub kind: SegmentKind,
    pub access: SegmentAccess,
    pub dpl: PrivilegeLevel,
    pub present: bool,

    /// The `AVL` bit, free for system software.
    pub available: bool,

    /// The `L` bit; marks a 64-bit code segment.
    pub long_mode: bool,

    pub default_operand_size: OperandSize,
    pub granularity: Granularity,
}

impl SegmentDescriptor {
    /// Set for code segments, clear for data segments.
    const EXECUTABLE_BIT_INDEX: usize = 43;

    const AVAILABLE_BIT_INDEX: usize = 52;

    const LONG_MODE_CODE_BIT_INDEX: usize = 53;

    /// The `D/B` flag.
    const EXTENDED_SIZE_BIT_INDEX: usize = 54;

    pub(crate) fn decode(low: u64) -> Self {
        let granularity = Granularity::from_descriptor(low);

        Self {
            base: legacy_base(low),
            limit: granularity.scale(raw_limit(low)),
            kind: if low.get_bit(Self::EXECUTABLE_BIT_INDEX) {
                SegmentKind::Code
            } else {
                SegmentKind::Data
            },
            access: SegmentAccess::from_bits_truncate(field_u8(low, TYPE_BIT_RANGE)),
            dpl: PrivilegeLevel::from_descriptor(low),
            present: low.get_bit(PRESENT_BIT_INDEX),
            available: low.get_bit(Self::AVAILABLE_BIT_INDEX),
            long_mode: low.get_bit(Self::LONG_MODE_CODE_BIT_INDEX),
            default_operand_size: if low.get_bit(Self::EXTENDED_SIZE_BIT_INDEX) {
                OperandSize::Bits32
            } else {
                OperandSize::Bits16
            },
            granularity,
        }
    }

    /// The 4-bit type field: the access bits plus the executable bit.
    pub fn type_bits(&self) -> u8 {
        self.access.bits() | (u8::from(self.kind == SegmentKind::Code) << 3)
    }

    pub(crate) fn encode(&self) -> u64 {
        let mut low = 0;

        set_raw_limit(&mut low, self.granularity.unscale(self.limit));
        set_legacy_base(&mut low, self.base);

        low.set_bits(TYPE_BIT_RANGE, u64::from(self.access.bits()));
        low.set_bit(Self::EXECUTABLE_BIT_INDEX, self.kind == SegmentKind::Code);
        low.set_bit(NON_SYSTEM_BIT_INDEX, true);
        low.set_bits(PRIVILEGE_LEVEL_BIT_RANGE, u64::from(u8::from(self.dpl)));
        low.set_bit(PRESENT_BIT_INDEX, self.present);
        low.set_bit(Self::AVAILABLE_BIT_INDEX, self.available);
        low.set_bit(Self::LONG_MODE_CODE_BIT_INDEX, self.long_mode);
        low.set_bit(
            Self::EXTENDED_SIZE_BIT_INDEX,
            self.default_operand_size == OperandSize::Bits32,
        );
        low.set_bit(
            super::GRANULARITY_BIT_INDEX,
            self.granularity == Granularity::Page4KiB,
        );

        low
    }
}
