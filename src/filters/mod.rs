//! Component C: the canonicalizing filter pipeline.
//!
//! Each filter is a total function `SimpleDwarf -> SimpleDwarf` modeled as a
//! trait with an `apply` method (spec.md §9: no class hierarchy), carries an
//! `enabled` toggle as state on the concrete filter rather than a hierarchy
//! concern, and is idempotent on its fixed point.

mod anti_overlap;
mod conseq_equiv;
mod empty_fde;
mod overridden_row;
mod pc_hole_filler;

pub use anti_overlap::AntiOverlapFilter;
pub use conseq_equiv::ConseqEquivFilter;
pub use empty_fde::EmptyFdeDeleter;
pub use overridden_row::OverriddenRowFilter;
pub use pc_hole_filler::PcHoleFiller;

use crate::model::SimpleDwarf;

pub trait SimpleDwarfFilter {
    /// Human-readable name, used in pipeline logging.
    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool;

    /// The actual transformation. Only called when `enabled()` is true;
    /// [`apply`](SimpleDwarfFilter::apply) handles the pass-through.
    fn apply_enabled(&self, dwarf: SimpleDwarf) -> SimpleDwarf;

    fn apply(&self, dwarf: SimpleDwarf) -> SimpleDwarf {
        if self.enabled() {
            self.apply_enabled(dwarf)
        } else {
            dwarf
        }
    }
}

/// Settings controlling which filters run, independent of the crate's CLI
/// representation so library users can configure the pipeline directly.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// `--keep-holes` disables this.
    pub fill_holes: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { fill_holes: true }
    }
}

/// Runs the canonical pipeline order (spec.md §4.2): `ConseqEquiv ->
/// OverriddenRow -> EmptyFdeDeleter -> PcHoleFiller`, applied innermost
/// first. `AntiOverlapFilter` runs before all of these, since the others
/// assume FDEs don't overlap.
pub fn canonicalize(dwarf: SimpleDwarf, settings: PipelineSettings) -> SimpleDwarf {
    let dwarf = AntiOverlapFilter::default().apply(dwarf);
    let dwarf = ConseqEquivFilter::default().apply(dwarf);
    let dwarf = OverriddenRowFilter::default().apply(dwarf);
    let dwarf = EmptyFdeDeleter::default().apply(dwarf);
    PcHoleFiller::new(settings.fill_holes).apply(dwarf)
}
