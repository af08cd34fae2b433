#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("table size {size:#X} is not a multiple of the {entry_size}-byte entry size")]
    MalformedTable { size: usize, entry_size: usize },

    #[error("slot {index} at offset {offset:#X} lies beyond the {region_len:#X}-byte table region")]
    OutOfRange {
        index: usize,
        offset: usize,
        region_len: usize,
    },
}
