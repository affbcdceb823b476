use super::SimpleDwarfFilter;
use crate::model::SimpleDwarf;

/// Within each FDE, drops any row whose tracked register formulas
/// (`cfa`, `rbp`, `rbx`, `ra`) are pointwise equal to the previous kept row.
/// Operates strictly intra-FDE: two rows from different FDEs are never
/// compared, even if adjacent in address space (spec.md S2).
#[derive(Debug, Clone, Copy)]
pub struct ConseqEquivFilter {
    enabled: bool,
}

impl Default for ConseqEquivFilter {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ConseqEquivFilter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl SimpleDwarfFilter for ConseqEquivFilter {
    fn name(&self) -> &'static str {
        "ConseqEquivFilter"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn apply_enabled(&self, mut dwarf: SimpleDwarf) -> SimpleDwarf {
        for fde in &mut dwarf.fdes {
            let mut kept: Vec<_> = Vec::with_capacity(fde.rows.len());
            for row in fde.rows.drain(..) {
                match kept.last() {
                    Some(prev) if row_formulas(prev) == row_formulas(&row) => {}
                    _ => kept.push(row),
                }
            }
            fde.rows = kept.into();
        }
        dwarf
    }
}

fn row_formulas(row: &crate::model::DwRow) -> (
    crate::model::DwRegister,
    crate::model::DwRegister,
    crate::model::DwRegister,
    crate::model::DwRegister,
) {
    row.formulas()
}
