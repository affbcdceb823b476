use super::{indent_str, SwitchCompiler};
use crate::switch_ir::SwitchStatement;

/// Emits a C `switch(pc)` with GCC range-case syntax (`case LO ... HI:`),
/// each case's body inlined, terminated by `default:`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSwitchCompiler;

impl SwitchCompiler for NativeSwitchCompiler {
    fn compile(&self, sw: &SwitchStatement, indent: usize) -> String {
        let ind = indent_str(indent);
        let body_ind = indent_str(indent + 1);
        let mut out = String::new();
        out.push_str(&format!("{ind}switch ({}) {{\n", sw.switch_var));
        for case in &sw.cases {
            out.push_str(&format!(
                "{body_ind}case 0x{:x} ... 0x{:x}: {{\n",
                case.low, case.high
            ));
            out.push_str(&indent_block(&case.content.0, indent + 2));
            out.push_str(&format!("{body_ind}}}\n"));
        }
        out.push_str(&format!("{body_ind}default: {{\n"));
        out.push_str(&indent_block(&sw.default_case.0, indent + 2));
        out.push_str(&format!("{body_ind}}}\n"));
        out.push_str(&format!("{ind}}}\n"));
        out
    }
}

fn indent_block(code: &str, indent: usize) -> String {
    let ind = indent_str(indent);
    code.lines()
        .map(|line| format!("{ind}{line}\n"))
        .collect()
}
