//! `.pc_list` files: a raw stream of little-endian 8-byte program counters
//! (spec.md §6), used by `--pc-list` to restrict generation or a walk to a
//! known allow-list of addresses.

use std::io::Read;
use std::path::Path;

use crate::error::PcListError;

/// Reads every 8-byte little-endian PC from `path`. Fails with
/// [`PcListError::CannotReadFile`] if the file can't be opened, or
/// [`PcListError::BadFormat`] if the final entry is truncated.
pub fn read_pc_list(path: &Path) -> Result<Vec<u64>, PcListError> {
    let mut file = std::fs::File::open(path).map_err(PcListError::CannotReadFile)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).map_err(PcListError::CannotReadFile)?;
    parse_pc_list(&data)
}

fn parse_pc_list(data: &[u8]) -> Result<Vec<u64>, PcListError> {
    if data.len() % 8 != 0 {
        return Err(PcListError::BadFormat);
    }
    Ok(data
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}
