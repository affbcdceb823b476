//! Component F: the stack walker runtime. Loads eh_elf shared objects per
//! loaded segment and chains handler calls across frames (spec.md §4.5).

pub(crate) mod memory_map;
mod walker;

#[cfg(feature = "libunwind")]
pub mod libunwind_backend;

pub use memory_map::MemoryMap;
pub use walker::{StackWalker, WalkState};

#[derive(Debug, thiserror::Error)]
pub enum WalkerError {
    #[error("dl_iterate_phdr failed to enumerate loaded segments")]
    EnumerationFailed,

    #[error("cannot load eh_elf shared object {0}: {1}")]
    DlOpen(String, String),

    #[error("eh_elf shared object {0} is missing an expected symbol ({1})")]
    MissingSymbol(String, String),
}
