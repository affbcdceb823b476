use tracing::warn;

use super::SimpleDwarfFilter;
use crate::model::SimpleDwarf;

/// Sorts FDEs by `beg_ip`; wherever `fde[i].end_ip > fde[i+1].beg_ip`,
/// truncates `fde[i].end_ip := fde[i+1].beg_ip` (the higher-start FDE wins
/// ties) and emits a warning.
///
/// Unlike the original implementation (spec.md §9), this only rewrites
/// `end_ip` on genuine overlap — the original unconditionally set
/// `end_ip := next.beg_ip` even when the two FDEs were already disjoint,
/// which duplicated `PcHoleFiller`'s job and is treated here as a bug.
#[derive(Debug, Clone, Copy)]
pub struct AntiOverlapFilter {
    enabled: bool,
}

impl Default for AntiOverlapFilter {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AntiOverlapFilter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl SimpleDwarfFilter for AntiOverlapFilter {
    fn name(&self) -> &'static str {
        "AntiOverlapFilter"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn apply_enabled(&self, mut dwarf: SimpleDwarf) -> SimpleDwarf {
        dwarf.fdes.sort_by_key(|fde| fde.beg_ip);
        for i in 0..dwarf.fdes.len().saturating_sub(1) {
            let next_beg_ip = dwarf.fdes[i + 1].beg_ip;
            let cur = &mut dwarf.fdes[i];
            if cur.end_ip > next_beg_ip {
                warn!(
                    fde_offset = cur.fde_offset,
                    old_end_ip = cur.end_ip,
                    new_end_ip = next_beg_ip,
                    "truncating overlapping fde"
                );
                cur.end_ip = next_beg_ip;
            }
        }
        dwarf
    }
}
