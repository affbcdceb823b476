//! Crate-wide error types. Each subsystem gets its own `thiserror`-derived
//! enum; [`Error`] wraps them for the binaries' `main() -> Result<(), Error>`.

use crate::reader::ReaderError;
use crate::runtime::WalkerError;

/// Input-structural failures: DWARF without a defined CFA in a required row,
/// a truncated `.pc_list`, or an unreadable ELF file. These abort generation
/// immediately (spec.md §7 category 1).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Walker(#[from] WalkerError),

    #[error("failed to read pc list: {0}")]
    PcList(#[from] PcListError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// `.pc_list` format errors (spec.md §6): raw stream of little-endian 8-byte
/// program counters.
#[derive(Debug, thiserror::Error)]
pub enum PcListError {
    #[error("cannot read pc list file: {0}")]
    CannotReadFile(#[source] std::io::Error),

    #[error("pc list file has a truncated entry")]
    BadFormat,
}
