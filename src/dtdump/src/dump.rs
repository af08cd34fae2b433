use crate::{
    descriptor::{DecodedEntry, Mode, TableKind},
    error::Error,
    format::Formatter,
    params::Parameters,
    reader,
    sink::Sink,
};

/// Location and shape of a descriptor table, as held in IDTR/GDTR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    /// Linear address of the table.
    pub base: u64,

    /// Size of the table in bytes, less 1.
    pub limit: u16,

    pub mode: Mode,
}

impl TableDescriptor {
    /// Size of the table in bytes.
    pub fn size(&self) -> usize {
        usize::from(self.limit) + 1
    }
}

/// Outcome counts of a single dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpSummary {
    /// Whole slots covered by the table limit.
    pub slots: usize,

    /// Segment and system descriptors decoded.
    pub decoded: usize,

    /// Unused or unrecognised slots, including any left out by [`Parameters::skip_unused`].
    pub reserved: usize,

    /// Slots that could not be read from the region.
    pub errors: usize,

    /// Whether the table size was not a multiple of its entry size.
    pub malformed: bool,
}

impl Default for DumpSummary {
    fn default() -> Self {
        DumpSummary {
            slots: 0,
            decoded: 0,
            reserved: 0,
            errors: 0,
            malformed: false,
        }
    }
}

/// Dumps the Interrupt Descriptor Table whose bytes are `region` to `sink`.
pub fn dump_idt(
    descriptor: &TableDescriptor,
    region: &[u8],
    params: &Parameters,
    sink: &mut impl Sink,
) -> DumpSummary {
    dump(TableKind::Interrupt, descriptor, region, params, sink)
}

/// Dumps the Global Descriptor Table whose bytes are `region` to `sink`.
pub fn dump_gdt(
    descriptor: &TableDescriptor,
    region: &[u8],
    params: &Parameters,
    sink: &mut impl Sink,
) -> DumpSummary {
    dump(TableKind::Global, descriptor, region, params, sink)
}

fn dump(
    table: TableKind,
    descriptor: &TableDescriptor,
    region: &[u8],
    params: &Parameters,
    sink: &mut impl Sink,
) -> DumpSummary {
    let mode = descriptor.mode;
    let formatter = Formatter::new(table, mode);
    let slot_size = table.slot_size(mode);
    let size = descriptor.size();
    let slots = size / slot_size;

    let mut summary = DumpSummary {
        slots,
        ..DumpSummary::default()
    };

    debug!(
        "Dumping {table} at {:#X}: {slots} slots of {slot_size} bytes ({mode})",
        descriptor.base
    );

    sink.emit(&formatter.format_header(descriptor, slots));

    if size % slot_size != 0 {
        let error = Error::MalformedTable {
            size,
            entry_size: slot_size,
        };

        warn!("{table} at {:#X}: {error}", descriptor.base);
        sink.emit(&formatter.format_warning(&error));
        summary.malformed = true;
    }

    // Bytes past the last whole slot do not belong to any descriptor.
    let region = &region[..region.len().min(slots * slot_size)];

    let mut index = 0;
    while index < slots {
        let raw = match reader::read_raw(region, index, table, mode) {
            Ok(raw) => raw,
            Err(error) => {
                trace!("{table}: {error}");
                sink.emit(&formatter.format_error(index, &error));
                summary.errors += 1;
                index += 1;
                continue;
            }
        };

        let entry = DecodedEntry::decode(raw, table, mode);

        match entry {
            DecodedEntry::Reserved { unrecognized, .. } => {
                summary.reserved += 1;

                if !unrecognized && params.skip_unused {
                    index += 1;
                    continue;
                }
            }
            DecodedEntry::Segment(_) | DecodedEntry::System(_) => summary.decoded += 1,
        }

        sink.emit(&formatter.format(index, &entry));

        if params.raw && !matches!(entry, DecodedEntry::Reserved { .. }) {
            sink.emit(&formatter.format_raw(&raw));
        }

        let span = entry.span(table, mode);
        if let (2, Some(high)) = (span, raw.high) {
            sink.emit(&formatter.format_extension(index + 1, index, high));
        }

        index += span;
    }

    summary
}
