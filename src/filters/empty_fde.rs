use super::SimpleDwarfFilter;
use crate::model::SimpleDwarf;

/// Removes FDEs whose `rows` is empty. An empty FDE would otherwise fabricate
/// an invalid dispatch range with no row content to emit.
#[derive(Debug, Clone, Copy)]
pub struct EmptyFdeDeleter {
    enabled: bool,
}

impl Default for EmptyFdeDeleter {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl EmptyFdeDeleter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl SimpleDwarfFilter for EmptyFdeDeleter {
    fn name(&self) -> &'static str {
        "EmptyFdeDeleter"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn apply_enabled(&self, mut dwarf: SimpleDwarf) -> SimpleDwarf {
        dwarf.fdes.retain(|fde| !fde.is_empty());
        dwarf
    }
}
