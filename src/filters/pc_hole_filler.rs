use super::SimpleDwarfFilter;
use crate::model::SimpleDwarf;

/// After sorting, sets every `fde[i].end_ip := fde[i+1].beg_ip`, eliminating
/// inter-FDE gaps so the dispatch table has no default cases between FDEs.
/// The final FDE's `end_ip` is left unchanged. Disabled by `--keep-holes`.
#[derive(Debug, Clone, Copy)]
pub struct PcHoleFiller {
    enabled: bool,
}

impl Default for PcHoleFiller {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl PcHoleFiller {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl SimpleDwarfFilter for PcHoleFiller {
    fn name(&self) -> &'static str {
        "PcHoleFiller"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn apply_enabled(&self, mut dwarf: SimpleDwarf) -> SimpleDwarf {
        dwarf.fdes.sort_by_key(|fde| fde.beg_ip);
        let next_begs: Vec<u64> = dwarf.fdes.iter().skip(1).map(|fde| fde.beg_ip).collect();
        for (fde, next_beg_ip) in dwarf.fdes.iter_mut().zip(next_begs) {
            fde.end_ip = next_beg_ip;
        }
        dwarf
    }
}
