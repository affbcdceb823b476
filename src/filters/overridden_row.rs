use super::SimpleDwarfFilter;
use crate::model::SimpleDwarf;

/// Within each FDE, when multiple rows share the same `ip`, keeps only the
/// last one — DWARF semantics: later instructions override earlier ones at
/// the same address.
#[derive(Debug, Clone, Copy)]
pub struct OverriddenRowFilter {
    enabled: bool,
}

impl Default for OverriddenRowFilter {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl OverriddenRowFilter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl SimpleDwarfFilter for OverriddenRowFilter {
    fn name(&self) -> &'static str {
        "OverriddenRowFilter"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn apply_enabled(&self, mut dwarf: SimpleDwarf) -> SimpleDwarf {
        for fde in &mut dwarf.fdes {
            let mut kept: Vec<_> = Vec::with_capacity(fde.rows.len());
            for row in fde.rows.drain(..) {
                if kept.last().is_some_and(|prev: &crate::model::DwRow| prev.ip == row.ip) {
                    kept.pop();
                }
                kept.push(row);
            }
            fde.rows = kept.into();
        }
        dwarf
    }
}
