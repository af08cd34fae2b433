//! Fixed-column rendering of decoded descriptors.
//!
//! Every record for a given table and mode lays out the same columns at the same widths, so
//! dumps from different builds can be compared with `diff`.

use crate::{
    descriptor::{
        DecodedEntry, Granularity, Mode, RawEntry, SegmentAccess, SegmentDescriptor,
        SegmentKind, SystemDescriptor, SystemKind, TableKind,
    },
    dump::TableDescriptor,
    error::Error,
};
use core::fmt::Write;

/// Upper bound of a rendered record, in bytes.
pub const RECORD_CAPACITY: usize = 160;

/// A single rendered line, without its terminator.
pub type Record = heapless::String<RECORD_CAPACITY>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formatter {
    table: TableKind,
    mode: Mode,
}

impl Formatter {
    pub fn new(table: TableKind, mode: Mode) -> Self {
        Self { table, mode }
    }

    /// `{keyword}=0x…` at the mode's address width, or dashes of the same width.
    fn write_address(&self, record: &mut Record, keyword: &str, address: Option<u64>) {
        match (address, self.mode) {
            (Some(address), Mode::Protected32) => write!(record, "{keyword}={address:#010X}"),
            (Some(address), Mode::Long64) => write!(record, "{keyword}={address:#018X}"),
            (None, Mode::Protected32) => write!(record, "{keyword}=----------"),
            (None, Mode::Long64) => write!(record, "{keyword}=------------------"),
        }
        .ok();
    }

    fn write_columns(
        &self,
        record: &mut Record,
        label: &str,
        address: (&str, Option<u64>),
        limit: Option<u32>,
        selector: Option<u16>,
        entry: &DecodedEntry,
    ) {
        write!(record, "{label:<16} ").ok();

        self.write_address(record, address.0, address.1);

        match limit {
            Some(limit) => write!(record, " limit={limit:#010X}"),
            None => write!(record, " limit=----------"),
        }
        .ok();

        match selector {
            Some(selector) => write!(record, " sel={selector:#06X}"),
            None => write!(record, " sel=------"),
        }
        .ok();

        let (type_bits, non_system) = match entry {
            DecodedEntry::Segment(segment) => (segment.type_bits(), 1),
            DecodedEntry::System(system) => (system.kind.type_bits(), 0),
            DecodedEntry::Reserved { .. } => (0, 0),
        };
        write!(record, " type={type_bits:#03X} s={non_system}").ok();

        let dpl = entry.privilege_level().map_or(0, u8::from);
        let present = if entry.is_present() {
            "present"
        } else {
            "not-present"
        };
        write!(record, " dpl={dpl} {present:<11} ").ok();
    }

    fn write_segment(
        &self,
        record: &mut Record,
        segment: &SegmentDescriptor,
        entry: &DecodedEntry,
    ) {
        let (label, read_write, direction) = match segment.kind {
            SegmentKind::Code => ("code-segment", 'R', 'C'),
            SegmentKind::Data => ("data-segment", 'W', 'E'),
        };

        self.write_columns(
            record,
            label,
            ("base", Some(segment.base)),
            Some(segment.limit),
            None,
            entry,
        );

        let flag = |bit: SegmentAccess, set: char| {
            if segment.access.contains(bit) {
                set
            } else {
                '-'
            }
        };

        write!(
            record,
            "gran={} op={} long={} avl={} attr={}{}{}",
            granularity_label(segment.granularity),
            segment.default_operand_size.bits(),
            u8::from(segment.long_mode),
            u8::from(segment.available),
            flag(SegmentAccess::READ_WRITE, read_write),
            flag(SegmentAccess::DIRECTION_CONFORMING, direction),
            flag(SegmentAccess::ACCESSED, 'A'),
        )
        .ok();
    }

    fn write_system(&self, record: &mut Record, system: &SystemDescriptor, entry: &DecodedEntry) {
        let kind = system.kind;

        if kind.is_segment() {
            self.write_columns(
                record,
                kind.label(),
                ("base", Some(system.base_or_offset)),
                Some(system.limit),
                None,
                entry,
            );
            write!(record, "gran={}", granularity_label(system.granularity)).ok();
        } else {
            let offset = (kind != SystemKind::TaskGate).then_some(system.base_or_offset);

            self.write_columns(
                record,
                kind.label(),
                ("offs", offset),
                None,
                Some(system.segment_selector),
                entry,
            );

            if kind.has_stack_index() {
                write!(record, "ist={}", system.interrupt_stack_table_index)
            } else if kind.has_param_count() {
                write!(record, "parm={:02}", system.param_count)
            } else {
                record.write_char('-')
            }
            .ok();
        }
    }

    /// Renders slot `index`. Never fails; unknown slots render their raw bytes.
    pub fn format(&self, index: usize, entry: &DecodedEntry) -> Record {
        let mut record = Record::new();
        write!(record, "[{index:04}] ").ok();

        match entry {
            DecodedEntry::Segment(segment) => self.write_segment(&mut record, segment, entry),
            DecodedEntry::System(system) => self.write_system(&mut record, system, entry),
            DecodedEntry::Reserved { raw, unrecognized } => {
                let label = if *unrecognized { "reserved" } else { "unused" };
                write!(record, "{label:<16} raw={raw}").ok();
            }
        }

        record
    }

    /// Renders the second slot of a 16-byte GDT system descriptor that began at `owner`.
    pub fn format_extension(&self, index: usize, owner: usize, high: u64) -> Record {
        let mut record = Record::new();
        write!(
            record,
            "[{index:04}] {:<16} raw={high:#018X} of=[{owner:04}]",
            "(upper half)"
        )
        .ok();

        record
    }

    /// Renders a slot that could not be read at all.
    pub fn format_error(&self, index: usize, error: &Error) -> Record {
        let mut record = Record::new();
        write!(record, "[{index:04}] {:<16} {error}", "<out-of-range>").ok();

        record
    }

    /// Renders the raw quadword(s) behind the preceding record, aligned under its label.
    pub fn format_raw(&self, raw: &RawEntry) -> Record {
        let mut record = Record::new();
        write!(record, "       raw={raw}").ok();

        record
    }

    pub fn format_header(&self, descriptor: &TableDescriptor, slots: usize) -> Record {
        let mut record = Record::new();
        write!(record, "{} ", self.table).ok();
        self.write_address(&mut record, "base", Some(descriptor.base));
        write!(
            record,
            " limit={:#06X} mode={} entry={} slots={slots:04}",
            descriptor.limit,
            self.mode,
            self.table.slot_size(self.mode),
        )
        .ok();

        record
    }

    pub fn format_warning(&self, error: &Error) -> Record {
        let mut record = Record::new();
        write!(record, "warning: {error}").ok();

        record
    }
}

fn granularity_label(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Byte => "byte",
        Granularity::Page4KiB => "4KiB",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(low: u64, high: Option<u64>, table: TableKind, mode: Mode) -> DecodedEntry {
        DecodedEntry::decode(RawEntry { low, high }, table, mode)
    }

    #[test]
    fn protected_mode_code_segment() {
        let formatter = Formatter::new(TableKind::Global, Mode::Protected32);
        let entry = decode(0x00CF_9A00_0000_FFFF, None, TableKind::Global, Mode::Protected32);

        assert_eq!(
            formatter.format(1, &entry).as_str(),
            "[0001] code-segment     base=0x00000000 limit=0xFFFFFFFF sel=------ type=0xA s=1 dpl=0 present     gran=4KiB op=32 long=0 avl=0 attr=R--"
        );
    }

    #[test]
    fn user_data_segment_flags() {
        let formatter = Formatter::new(TableKind::Global, Mode::Protected32);
        let entry = decode(0x1255_F334_5678_ABCD, None, TableKind::Global, Mode::Protected32);

        assert_eq!(
            formatter.format(4, &entry).as_str(),
            "[0004] data-segment     base=0x12345678 limit=0x0005ABCD sel=------ type=0x3 s=1 dpl=3 present     gran=byte op=32 long=0 avl=1 attr=W-A"
        );
    }

    #[test]
    fn not_present_interrupt_gate_64() {
        let formatter = Formatter::new(TableKind::Interrupt, Mode::Long64);
        let entry = decode(
            0x1234_0E00_0008_5678,
            Some(0xFFFF_8000),
            TableKind::Interrupt,
            Mode::Long64,
        );

        assert_eq!(
            formatter.format(3, &entry).as_str(),
            "[0003] int-gate-64      offs=0xFFFF800012345678 limit=---------- sel=0x0008 type=0xE s=0 dpl=0 not-present ist=0"
        );
    }

    #[test]
    fn call_gate_parameter_count() {
        let formatter = Formatter::new(TableKind::Global, Mode::Protected32);
        let entry = decode(0x0040_EC03_0010_1000, None, TableKind::Global, Mode::Protected32);

        assert_eq!(
            formatter.format(7, &entry).as_str(),
            "[0007] call-gate-32     offs=0x00401000 limit=---------- sel=0x0010 type=0xC s=0 dpl=3 present     parm=03"
        );
    }

    #[test]
    fn task_gate_has_no_offset() {
        let formatter = Formatter::new(TableKind::Interrupt, Mode::Protected32);
        let entry = decode(0x0000_8500_0028_0000, None, TableKind::Interrupt, Mode::Protected32);

        assert_eq!(
            formatter.format(8, &entry).as_str(),
            "[0008] task-gate        offs=---------- limit=---------- sel=0x0028 type=0x5 s=0 dpl=0 present     -"
        );
    }

    #[test]
    fn tss_64_and_its_upper_half() {
        let formatter = Formatter::new(TableKind::Global, Mode::Long64);
        let entry = decode(
            0x8000_8910_2000_0067,
            Some(0xFFFF_FFFF),
            TableKind::Global,
            Mode::Long64,
        );

        assert_eq!(
            formatter.format(5, &entry).as_str(),
            "[0005] tss-64-available base=0xFFFFFFFF80102000 limit=0x00000067 sel=------ type=0x9 s=0 dpl=0 present     gran=byte"
        );
        assert_eq!(
            formatter.format_extension(6, 5, 0xFFFF_FFFF).as_str(),
            "[0006] (upper half)     raw=0x00000000FFFFFFFF of=[0005]"
        );
    }

    #[test]
    fn reserved_and_unused_render_distinctly() {
        let formatter = Formatter::new(TableKind::Global, Mode::Protected32);

        assert_eq!(
            formatter
                .format(0, &DecodedEntry::reserved(RawEntry::narrow(0)))
                .as_str(),
            "[0000] unused           raw=0x0000000000000000"
        );
        assert_eq!(
            formatter
                .format(2, &DecodedEntry::reserved(RawEntry::narrow(0x0000_8800_0000_0000)))
                .as_str(),
            "[0002] reserved         raw=0x0000880000000000"
        );
    }

    #[test]
    fn out_of_range_marker() {
        let formatter = Formatter::new(TableKind::Global, Mode::Protected32);
        let error = Error::OutOfRange {
            index: 2,
            offset: 0x10,
            region_len: 0x10,
        };

        assert_eq!(
            formatter.format_error(2, &error).as_str(),
            "[0002] <out-of-range>   slot 2 at offset 0x10 lies beyond the 0x10-byte table region"
        );
    }

    #[test]
    fn header() {
        let formatter = Formatter::new(TableKind::Interrupt, Mode::Long64);
        let descriptor = TableDescriptor {
            base: 0xFFFF_8000_0010_0000,
            limit: 0x0FFF,
            mode: Mode::Long64,
        };

        assert_eq!(
            formatter.format_header(&descriptor, 256).as_str(),
            "IDT base=0xFFFF800000100000 limit=0x0FFF mode=long64 entry=16 slots=0256"
        );
    }

    #[test]
    fn longest_records_fit() {
        let formatter = Formatter::new(TableKind::Global, Mode::Long64);
        let segment = decode(u64::MAX, None, TableKind::Global, Mode::Long64);
        let reserved = DecodedEntry::reserved(RawEntry::wide(u64::MAX, u64::MAX));
        let error = Error::OutOfRange {
            index: usize::MAX,
            offset: usize::MAX,
            region_len: usize::MAX,
        };

        // A truncated record would lose its trailing column.
        assert!(formatter.format(9999, &segment).ends_with("attr=RCA"));
        assert!(formatter.format(9999, &reserved).ends_with("FFFF"));
        assert!(formatter
            .format_error(usize::MAX, &error)
            .ends_with("table region"));
    }
}
