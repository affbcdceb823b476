use std::collections::HashMap;

use super::{indent_str, SwitchCompiler};
use crate::switch_ir::{CaseContent, SwitchCase, SwitchStatement};

/// How many labels were referenced vs. how many were actually generated; the
/// difference quantifies factoring savings (spec.md §4.3's `STATS` counters,
/// modeled as an explicit return value per spec.md §9 rather than a hidden
/// global).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FactorStats {
    pub generated: usize,
    pub referenced: usize,
}

/// A binary-search dispatch tree with shared code labels for structurally
/// identical cases (byte-exact source equality via [`CaseContent`]).
#[derive(Debug, Default, Clone, Copy)]
pub struct FactoredSwitchCompiler;

struct Builder {
    jump_points: HashMap<CaseContent, String>,
    order: Vec<(CaseContent, String)>,
    next_label_id: usize,
    stats: FactorStats,
}

impl Builder {
    fn new() -> Self {
        Self {
            jump_points: HashMap::new(),
            order: Vec::new(),
            next_label_id: 0,
            stats: FactorStats::default(),
        }
    }

    fn jump_point_for(&mut self, content: &CaseContent) -> String {
        self.stats.referenced += 1;
        if let Some(label) = self.jump_points.get(content) {
            return label.clone();
        }
        let label = format!("_factor_{}", self.next_label_id);
        self.next_label_id += 1;
        self.stats.generated += 1;
        self.jump_points.insert(content.clone(), label.clone());
        self.order.push((content.clone(), label.clone()));
        label
    }
}

impl FactoredSwitchCompiler {
    /// Like [`SwitchCompiler::compile`] but also returns the factoring
    /// statistics.
    pub fn compile_with_stats(&self, sw: &SwitchStatement, indent: usize) -> (String, FactorStats) {
        let var = &sw.switch_var;
        let ind = indent_str(indent);
        let mut out = String::new();

        if sw.cases.is_empty() {
            out.push_str(&indent_block(&sw.default_case.0, indent));
            return (out, FactorStats::default());
        }

        let lo = sw.cases.first().unwrap().low;
        let hi = sw.cases.last().unwrap().high;
        let mut builder = Builder::new();

        out.push_str(&format!(
            "{ind}if ({var} < 0x{lo:x} || {var} > 0x{hi:x}) {{\n"
        ));
        out.push_str(&format!("{}goto _factor_default;\n", indent_str(indent + 1)));
        out.push_str(&format!("{ind}}} else {{\n"));
        gen_binsearch_tree(
            &sw.cases,
            lo,
            hi,
            var,
            indent + 1,
            &mut builder,
            &mut out,
        );
        out.push_str(&format!("{ind}}}\n"));

        out.push_str(&format!("{ind}_factor_default:\n"));
        out.push_str(&indent_block(&sw.default_case.0, indent + 1));
        out.push_str(&format!("{}goto _factor_end;\n", indent_str(indent + 1)));
        out.push('\n');

        for (content, label) in &builder.order {
            out.push_str(&format!("{ind}{label}:\n"));
            out.push_str(&indent_block(&content.0, indent + 1));
            out.push('\n');
        }
        out.push_str(&format!("{ind}_factor_end:\n"));
        out.push_str(&format!("{}assert(0);\n", indent_str(indent + 1)));

        (out, builder.stats)
    }
}

impl SwitchCompiler for FactoredSwitchCompiler {
    fn compile(&self, sw: &SwitchStatement, indent: usize) -> String {
        self.compile_with_stats(sw, indent).0
    }
}

fn gen_binsearch_tree(
    cases: &[SwitchCase],
    lo: u64,
    hi: u64,
    var: &str,
    indent: usize,
    builder: &mut Builder,
    out: &mut String,
) {
    let ind = indent_str(indent);
    match cases.len() {
        0 => {
            out.push_str(&format!("{ind}assert(0);\n"));
        }
        1 => {
            let case = &cases[0];
            if case.low > lo {
                out.push_str(&format!(
                    "{ind}if ({var} < 0x{:x}) goto _factor_default;\n",
                    case.low
                ));
            }
            if case.high < hi {
                out.push_str(&format!(
                    "{ind}if ({var} > 0x{:x}) goto _factor_default;\n",
                    case.high
                ));
            }
            let label = builder.jump_point_for(&case.content);
            out.push_str(&format!("{ind}goto {label};\n"));
        }
        n => {
            let mid = n / 2;
            let split = cases[mid].low;
            out.push_str(&format!("{ind}if ({var} < 0x{split:x}) {{\n"));
            gen_binsearch_tree(&cases[..mid], lo, split, var, indent + 1, builder, out);
            out.push_str(&format!("{ind}}} else {{\n"));
            gen_binsearch_tree(&cases[mid..], split, hi, var, indent + 1, builder, out);
            out.push_str(&format!("{ind}}}\n"));
        }
    }
}

fn indent_block(code: &str, indent: usize) -> String {
    let ind = indent_str(indent);
    code.lines().map(|line| format!("{ind}{line}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(low: u64, high: u64, content: &str) -> SwitchCase {
        SwitchCase {
            low,
            high,
            content: CaseContent::new(content),
        }
    }

    #[test]
    fn dedups_identical_case_content() {
        let sw = SwitchStatement::new(
            vec![
                case(0x10, 0x1f, "out_ctx.flags = 3u;"),
                case(0x30, 0x3f, "out_ctx.flags = 3u;"),
                case(0x50, 0x5f, "out_ctx.flags = 3u;"),
            ],
            CaseContent::new("out_ctx.flags = 0x80u;"),
        );
        let (c, stats) = FactoredSwitchCompiler.compile_with_stats(&sw, 0);
        assert_eq!(stats.generated, 1);
        assert_eq!(stats.referenced, 3);
        assert_eq!(c.matches("_factor_0:").count(), 1);
        assert_eq!(c.matches("goto _factor_0;").count(), 3);
    }

    #[test]
    fn gap_between_cases_falls_to_default() {
        let sw = SwitchStatement::new(
            vec![case(0x10, 0x1f, "a();"), case(0x30, 0x3f, "b();")],
            CaseContent::new("default();"),
        );
        let c = FactoredSwitchCompiler.compile(&sw, 0);
        // leaf for [0x10,0x1f] should guard against pc > 0x1f falling into the gap;
        // the complementary bound on the [0x30,0x3f] leaf is already implied by the
        // binary search split at 0x30, so no second guard is needed there.
        assert!(c.contains("if (pc > 0x1f) goto _factor_default;"));
        assert!(c.contains("if (pc < 0x30) {"));
    }

    #[test]
    fn distinct_content_generates_distinct_labels() {
        let sw = SwitchStatement::new(
            vec![case(0x10, 0x1f, "a();"), case(0x20, 0x2f, "b();")],
            CaseContent::new("default();"),
        );
        let (_, stats) = FactoredSwitchCompiler.compile_with_stats(&sw, 0);
        assert_eq!(stats.generated, 2);
        assert_eq!(stats.referenced, 2);
    }

    #[test]
    fn empty_cases_emits_only_default() {
        let sw = SwitchStatement::new(vec![], CaseContent::new("default();"));
        let c = FactoredSwitchCompiler.compile(&sw, 0);
        assert_eq!(c.trim(), "default();");
    }
}
