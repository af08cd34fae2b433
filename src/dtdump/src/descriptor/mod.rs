//! Typed views of x86 descriptor table entries.
//!
//! All bit extraction for descriptors lives in this module and its children, operating on
//! the little-endian quadwords that make up a table slot. See Intel 3a, Section 3.4.5
//! "Segment Descriptors" and Section 6.11 "IDT Descriptors".

mod segment;
pub use segment::*;

mod system;
pub use system::*;

use bit_field::BitField;
use core::ops::Range;

/// Limit bits 0..16, the remaining 4 bits of which live in [`LIMIT_HIGH_BIT_RANGE`].
pub(crate) const LIMIT_LOW_BIT_RANGE: Range<usize> = 0..16;

/// Base bits 0..24.
pub(crate) const BASE_LOW_BIT_RANGE: Range<usize> = 16..40;

/// The 4-bit descriptor type field.
pub(crate) const TYPE_BIT_RANGE: Range<usize> = 40..44;

/// The `S` flag; set for code & data segments, clear for system descriptors.
pub(crate) const NON_SYSTEM_BIT_INDEX: usize = 44;

/// Descriptor privilege level.
pub(crate) const PRIVILEGE_LEVEL_BIT_RANGE: Range<usize> = 45..47;

pub(crate) const PRESENT_BIT_INDEX: usize = 47;

/// Limit bits 16..20.
pub(crate) const LIMIT_HIGH_BIT_RANGE: Range<usize> = 48..52;

/// Scales the limit by 4 KiB when set.
pub(crate) const GRANULARITY_BIT_INDEX: usize = 55;

/// Base bits 24..32.
pub(crate) const BASE_HIGH_BIT_RANGE: Range<usize> = 56..64;

/// Bits 32..64 of a base or offset, held in the second quadword of a 16-byte descriptor.
pub(crate) const EXTENSION_BIT_RANGE: Range<usize> = 0..32;

#[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
pub(crate) fn field_u8(value: u64, range: Range<usize>) -> u8 {
    debug_assert!(range.len() <= 8);
    value.get_bits(range) as u8
}

#[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
pub(crate) fn field_u16(value: u64, range: Range<usize>) -> u16 {
    debug_assert!(range.len() <= 16);
    value.get_bits(range) as u16
}

#[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
pub(crate) fn field_u32(value: u64, range: Range<usize>) -> u32 {
    debug_assert!(range.len() <= 32);
    value.get_bits(range) as u32
}

/// Reassembles the 32-bit base address that legacy descriptors split across two ranges.
pub(crate) fn legacy_base(low: u64) -> u64 {
    low.get_bits(BASE_LOW_BIT_RANGE) | (low.get_bits(BASE_HIGH_BIT_RANGE) << 24)
}

pub(crate) fn set_legacy_base(low: &mut u64, base: u64) {
    low.set_bits(BASE_LOW_BIT_RANGE, base.get_bits(0..24));
    low.set_bits(BASE_HIGH_BIT_RANGE, base.get_bits(24..32));
}

/// The unscaled 20-bit segment limit.
pub(crate) fn raw_limit(low: u64) -> u32 {
    u32::from(field_u16(low, LIMIT_LOW_BIT_RANGE))
        | (u32::from(field_u8(low, LIMIT_HIGH_BIT_RANGE)) << 16)
}

pub(crate) fn set_raw_limit(low: &mut u64, raw_limit: u32) {
    let raw_limit = u64::from(raw_limit);
    low.set_bits(LIMIT_LOW_BIT_RANGE, raw_limit.get_bits(0..16));
    low.set_bits(LIMIT_HIGH_BIT_RANGE, raw_limit.get_bits(16..20));
}

/// The processor mode a descriptor table was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Legacy protected mode. Every descriptor occupies 8 bytes.
    Protected32,

    /// IA-32e (long) mode. Gates and system segment descriptors are widened to 16 bytes.
    Long64,
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Mode::Protected32 => "protected32",
            Mode::Long64 => "long64",
        })
    }
}

/// Which descriptor table a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// The Interrupt Descriptor Table; holds only gates.
    Interrupt,

    /// The Global Descriptor Table; holds segments and system descriptors.
    Global,
}

impl TableKind {
    /// Size, in bytes, of a single slot of this table.
    ///
    /// 64-bit IDT gates always occupy 16 bytes. GDT slots stay 8 bytes wide in long mode, with
    /// system descriptors spilling into the following slot.
    pub fn slot_size(self, mode: Mode) -> usize {
        match (self, mode) {
            (TableKind::Interrupt, Mode::Long64) => 16,
            _ => 8,
        }
    }
}

impl core::fmt::Display for TableKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            TableKind::Interrupt => "IDT",
            TableKind::Global => "GDT",
        })
    }
}

/// Represents a protection ring level.
#[repr(u8)]
#[derive(Debug, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivilegeLevel {
    /// Most privileged; firmware, kernels and interrupt handlers.
    Ring0 = 0b00,
    Ring1 = 0b01,
    Ring2 = 0b10,
    /// Least privileged; application software.
    Ring3 = 0b11,
}

impl PrivilegeLevel {
    /// Reads the DPL field, which sits at the same offset in every descriptor kind.
    pub(crate) fn from_descriptor(low: u64) -> Self {
        match low.get_bits(PRIVILEGE_LEVEL_BIT_RANGE) {
            0b00 => PrivilegeLevel::Ring0,
            0b01 => PrivilegeLevel::Ring1,
            0b10 => PrivilegeLevel::Ring2,
            _ => PrivilegeLevel::Ring3,
        }
    }
}

/// Segment limit scaling, selected by the `G` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Byte,
    Page4KiB,
}

impl Granularity {
    pub(crate) fn from_descriptor(low: u64) -> Self {
        if low.get_bit(GRANULARITY_BIT_INDEX) {
            Granularity::Page4KiB
        } else {
            Granularity::Byte
        }
    }

    /// Converts a raw 20-bit limit into the effective byte limit.
    pub fn scale(self, raw_limit: u32) -> u32 {
        match self {
            Granularity::Byte => raw_limit,
            Granularity::Page4KiB => (raw_limit << 12) | 0xFFF,
        }
    }

    /// Converts an effective byte limit back into its raw 20-bit encoding.
    pub fn unscale(self, limit: u32) -> u32 {
        match self {
            Granularity::Byte => limit & 0xF_FFFF,
            Granularity::Page4KiB => limit >> 12,
        }
    }
}

/// The raw quadword(s) backing a single descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawEntry {
    pub low: u64,

    /// The second quadword of a 16-byte descriptor, if the descriptor has one.
    pub high: Option<u64>,
}

impl RawEntry {
    pub fn narrow(low: u64) -> Self {
        Self { low, high: None }
    }

    pub fn wide(low: u64, high: u64) -> Self {
        Self {
            low,
            high: Some(high),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.low == 0 && self.high.is_none_or(|high| high == 0)
    }

    /// Number of bytes the entry occupies in its table.
    pub fn size(&self) -> usize {
        if self.high.is_some() { 16 } else { 8 }
    }

    /// The entry's little-endian byte image. Only the first [`Self::size`] bytes are meaningful.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0; 16];
        bytes[..8].copy_from_slice(&self.low.to_le_bytes());
        bytes[8..].copy_from_slice(&self.high.unwrap_or(0).to_le_bytes());

        bytes
    }
}

impl core::fmt::Display for RawEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.high {
            Some(high) => write!(f, "{high:#018X}_{:016X}", self.low),
            None => write!(f, "{:#018X}", self.low),
        }
    }
}

/// A single table entry, demultiplexed by its type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedEntry {
    /// A code or data segment (`S` flag set).
    Segment(SegmentDescriptor),

    /// An LDT, TSS or gate descriptor (`S` flag clear, recognised type).
    System(SystemDescriptor),

    /// A slot whose discriminant matches no descriptor valid for its table and mode.
    ///
    /// `unrecognized` is clear for all-zero slots, which tables legitimately contain.
    Reserved { raw: RawEntry, unrecognized: bool },
}

impl DecodedEntry {
    pub fn reserved(raw: RawEntry) -> Self {
        DecodedEntry::Reserved {
            raw,
            unrecognized: !raw.is_zero(),
        }
    }

    /// Whether a slot starting with `low` is followed by a second quadword belonging to the
    /// same descriptor.
    pub fn needs_extension(low: u64, table: TableKind, mode: Mode) -> bool {
        match (table, mode) {
            (TableKind::Interrupt, Mode::Long64) => true,
            (TableKind::Global, Mode::Long64) => {
                !low.get_bit(NON_SYSTEM_BIT_INDEX)
                    && SystemKind::decode(field_u8(low, TYPE_BIT_RANGE), mode).is_some()
            }
            (_, Mode::Protected32) => false,
        }
    }

    /// Decodes `raw` as a slot of `table`. Total: unknown encodings become [`DecodedEntry::Reserved`].
    pub fn decode(raw: RawEntry, table: TableKind, mode: Mode) -> Self {
        let low = raw.low;

        if low.get_bit(NON_SYSTEM_BIT_INDEX) {
            return match table {
                TableKind::Global => DecodedEntry::Segment(SegmentDescriptor::decode(low)),
                TableKind::Interrupt => DecodedEntry::reserved(raw),
            };
        }

        match SystemKind::decode(field_u8(low, TYPE_BIT_RANGE), mode) {
            Some(kind) if table == TableKind::Global || kind.is_interrupt_table_gate() => {
                DecodedEntry::System(SystemDescriptor::decode(kind, raw))
            }
            _ => DecodedEntry::reserved(raw),
        }
    }

    /// Encodes the entry as it would appear in a table built for `mode`.
    pub fn encode(&self, mode: Mode) -> RawEntry {
        match self {
            DecodedEntry::Segment(segment) => RawEntry::narrow(segment.encode()),
            DecodedEntry::System(system) => system.encode(mode),
            DecodedEntry::Reserved { raw, .. } => *raw,
        }
    }

    /// Number of table slots the entry occupies.
    pub fn span(&self, table: TableKind, mode: Mode) -> usize {
        match (self, table, mode) {
            (DecodedEntry::System(_), TableKind::Global, Mode::Long64) => 2,
            _ => 1,
        }
    }

    pub fn privilege_level(&self) -> Option<PrivilegeLevel> {
        match self {
            DecodedEntry::Segment(segment) => Some(segment.dpl),
            DecodedEntry::System(system) => Some(system.dpl),
            DecodedEntry::Reserved { .. } => None,
        }
    }

    pub fn is_present(&self) -> bool {
        match self {
            DecodedEntry::Segment(segment) => segment.present,
            DecodedEntry::System(system) => system.present,
            DecodedEntry::Reserved { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_base_reassembles() {
        let low = 0x1255_F334_5678_ABCD;
        assert_eq!(legacy_base(low), 0x1234_5678);
        assert_eq!(raw_limit(low), 0x5_ABCD);
    }

    #[test]
    fn split_fields_round_trip_through_setters() {
        let mut low = 0;
        set_legacy_base(&mut low, 0xDEAD_BEEF);
        set_raw_limit(&mut low, 0xF_1234);

        assert_eq!(legacy_base(low), 0xDEAD_BEEF);
        assert_eq!(raw_limit(low), 0xF_1234);
        assert_eq!(low.get_bits(TYPE_BIT_RANGE), 0);
    }

    #[test]
    fn page_granularity_fills_low_bits() {
        assert_eq!(Granularity::Page4KiB.scale(0xF_FFFF), 0xFFFF_FFFF);
        assert_eq!(Granularity::Page4KiB.scale(0), 0xFFF);
        assert_eq!(Granularity::Byte.scale(0x6_7890), 0x6_7890);
        assert_eq!(Granularity::Page4KiB.unscale(0x0040_0FFF), 0x400);
    }

    #[test]
    fn slot_sizes() {
        assert_eq!(TableKind::Interrupt.slot_size(Mode::Protected32), 8);
        assert_eq!(TableKind::Interrupt.slot_size(Mode::Long64), 16);
        assert_eq!(TableKind::Global.slot_size(Mode::Protected32), 8);
        assert_eq!(TableKind::Global.slot_size(Mode::Long64), 8);
    }

    #[test]
    fn zero_slot_is_unused_not_unrecognized() {
        for (table, mode) in [
            (TableKind::Global, Mode::Protected32),
            (TableKind::Global, Mode::Long64),
            (TableKind::Interrupt, Mode::Protected32),
        ] {
            assert_eq!(
                DecodedEntry::decode(RawEntry::narrow(0), table, mode),
                DecodedEntry::Reserved {
                    raw: RawEntry::narrow(0),
                    unrecognized: false
                }
            );
        }
    }

    #[test]
    fn undefined_system_type_is_reserved() {
        // Present, type 0x8 (reserved in both modes).
        let raw = RawEntry::narrow(0x0000_8800_0000_0000);

        assert_eq!(
            DecodedEntry::decode(raw, TableKind::Global, Mode::Protected32),
            DecodedEntry::Reserved {
                raw,
                unrecognized: true
            }
        );
    }

    #[test]
    fn segments_are_not_valid_interrupt_gates() {
        let raw = RawEntry::narrow(0x00CF_9A00_0000_FFFF);

        assert!(matches!(
            DecodedEntry::decode(raw, TableKind::Interrupt, Mode::Protected32),
            DecodedEntry::Reserved {
                unrecognized: true,
                ..
            }
        ));
    }

    #[test]
    fn extension_detection() {
        let tss = 0x8000_8910_2000_0067;
        let code = 0x00AF_9B00_0000_FFFF;

        assert!(DecodedEntry::needs_extension(tss, TableKind::Global, Mode::Long64));
        assert!(!DecodedEntry::needs_extension(code, TableKind::Global, Mode::Long64));
        assert!(!DecodedEntry::needs_extension(0, TableKind::Global, Mode::Long64));
        assert!(!DecodedEntry::needs_extension(tss, TableKind::Global, Mode::Protected32));
        assert!(DecodedEntry::needs_extension(0, TableKind::Interrupt, Mode::Long64));
    }

    /// A descriptor of `kind` with every applicable field set and all others zero.
    fn canonical_system(
        kind: SystemKind,
        mode: Mode,
        dpl: PrivilegeLevel,
        present: bool,
    ) -> SystemDescriptor {
        let wide_address = match mode {
            Mode::Protected32 => 0x8765_4321,
            Mode::Long64 => 0xFFFF_8000_8765_4321,
        };
        let mut descriptor = SystemDescriptor {
            kind,
            base_or_offset: 0,
            limit: 0,
            granularity: Granularity::Byte,
            dpl,
            present,
            segment_selector: 0,
            param_count: 0,
            interrupt_stack_table_index: 0,
        };

        if kind.is_segment() {
            descriptor.base_or_offset = wide_address;
            if present {
                descriptor.limit = 0x67;
            } else {
                descriptor.granularity = Granularity::Page4KiB;
                descriptor.limit = 0x0040_0FFF;
            }
        } else {
            descriptor.segment_selector = 0x0010;
            if kind != SystemKind::TaskGate {
                descriptor.base_or_offset = wide_address;
            }
        }

        if kind.has_param_count() {
            descriptor.param_count = 0x1F;
        }

        if kind.has_stack_index() {
            descriptor.interrupt_stack_table_index = 5;
        }

        descriptor
    }

    #[test]
    fn every_system_kind_round_trips_in_its_modes() {
        let mut pairs = 0;

        for mode in [Mode::Protected32, Mode::Long64] {
            for kind in (0..16).filter_map(|type_bits| SystemKind::decode(type_bits, mode)) {
                pairs += 1;

                for (dpl, present) in [(PrivilegeLevel::Ring3, true), (PrivilegeLevel::Ring0, false)]
                {
                    let entry = DecodedEntry::System(canonical_system(kind, mode, dpl, present));
                    let raw = entry.encode(mode);

                    assert_eq!(
                        DecodedEntry::decode(raw, TableKind::Global, mode),
                        entry,
                        "{kind:?} in {mode}"
                    );

                    if kind.is_interrupt_table_gate() {
                        assert_eq!(
                            DecodedEntry::decode(raw, TableKind::Interrupt, mode),
                            entry,
                            "{kind:?} in {mode} IDT"
                        );
                    }
                }
            }
        }

        assert_eq!(pairs, 18);
    }

    #[test]
    fn segments_round_trip_through_decoded_entry() {
        let segments = [
            SegmentDescriptor {
                base: 0,
                limit: 0xFFFF_FFFF,
                kind: SegmentKind::Code,
                access: SegmentAccess::READ_WRITE | SegmentAccess::ACCESSED,
                dpl: PrivilegeLevel::Ring0,
                present: true,
                available: false,
                long_mode: true,
                default_operand_size: OperandSize::Bits16,
                granularity: Granularity::Page4KiB,
            },
            SegmentDescriptor {
                base: 0xDEAD_B000,
                limit: 0x000F_FFFF,
                kind: SegmentKind::Data,
                access: SegmentAccess::DIRECTION_CONFORMING | SegmentAccess::READ_WRITE,
                dpl: PrivilegeLevel::Ring3,
                present: false,
                available: true,
                long_mode: false,
                default_operand_size: OperandSize::Bits32,
                granularity: Granularity::Byte,
            },
        ];

        for mode in [Mode::Protected32, Mode::Long64] {
            for segment in segments {
                let entry = DecodedEntry::Segment(segment);
                let raw = entry.encode(mode);

                assert_eq!(raw.high, None);
                assert_eq!(DecodedEntry::decode(raw, TableKind::Global, mode), entry);
            }
        }
    }

    #[test]
    fn reserved_entries_encode_to_their_raw_bytes() {
        let cases = [
            (RawEntry::narrow(0), TableKind::Global, Mode::Protected32),
            (
                RawEntry::narrow(0x0000_8800_0000_0000),
                TableKind::Global,
                Mode::Long64,
            ),
            (
                RawEntry::narrow(0x00CF_9A00_0000_FFFF),
                TableKind::Interrupt,
                Mode::Protected32,
            ),
            (RawEntry::wide(0, 0), TableKind::Interrupt, Mode::Long64),
            (
                RawEntry::wide(0x0000_8500_0028_0000, 0xDEAD_BEEF),
                TableKind::Interrupt,
                Mode::Long64,
            ),
        ];

        for (raw, table, mode) in cases {
            let entry = DecodedEntry::reserved(raw);

            assert_eq!(entry.encode(mode), raw);
            assert_eq!(DecodedEntry::decode(raw, table, mode), entry, "{raw}");
        }
    }

    #[test]
    fn raw_entry_display() {
        assert_eq!(
            format!("{}", RawEntry::narrow(0xAB)),
            "0x00000000000000AB"
        );
        assert_eq!(
            format!("{}", RawEntry::wide(0x1, 0xFFFF_FFFF)),
            "0x00000000FFFFFFFF_0000000000000001"
        );
    }

    #[test]
    fn raw_entry_bytes_are_little_endian() {
        let bytes = RawEntry::wide(0x0807_0605_0403_0201, 0x0C0B_0A09).to_bytes();
        assert_eq!(&bytes[..12], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(RawEntry::narrow(0).size(), 8);
        assert_eq!(RawEntry::wide(0, 0).size(), 16);
    }
}
