use crate::{
    descriptor::{DecodedEntry, Mode, RawEntry, TableKind},
    error::Error,
};
use zerocopy::{FromBytes, byteorder::little_endian::U64};

fn read_quadword(region: &[u8], offset: usize) -> Option<u64> {
    let bytes = region.get(offset..offset.checked_add(size_of::<U64>())?)?;

    U64::read_from_bytes(bytes).ok().map(U64::get)
}

/// Reads the raw quadword(s) of slot `index`, widening to the following quadword when the
/// slot holds a 16-byte descriptor.
pub fn read_raw(
    region: &[u8],
    index: usize,
    table: TableKind,
    mode: Mode,
) -> Result<RawEntry, Error> {
    let out_of_range = |offset| Error::OutOfRange {
        index,
        offset,
        region_len: region.len(),
    };

    let offset = index
        .checked_mul(table.slot_size(mode))
        .ok_or_else(|| out_of_range(usize::MAX))?;
    let low = read_quadword(region, offset).ok_or_else(|| out_of_range(offset))?;

    if DecodedEntry::needs_extension(low, table, mode) {
        let extension_offset = offset + size_of::<U64>();
        let high = read_quadword(region, extension_offset)
            .ok_or_else(|| out_of_range(extension_offset))?;

        Ok(RawEntry::wide(low, high))
    } else {
        Ok(RawEntry::narrow(low))
    }
}

/// Decodes slot `index` of a table whose bytes are `region`.
///
/// Fails only when the slot (or the extension of a 16-byte descriptor) extends past the end
/// of `region`. Unknown encodings decode to [`DecodedEntry::Reserved`].
pub fn read(
    region: &[u8],
    index: usize,
    table: TableKind,
    mode: Mode,
) -> Result<DecodedEntry, Error> {
    read_raw(region, index, table, mode).map(|raw| DecodedEntry::decode(raw, table, mode))
}
