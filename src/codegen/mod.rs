//! Component E: lowers a filtered [`SimpleDwarf`] to a self-contained C
//! source file (spec.md §4.4).
//!
//! [`row`] handles one row's register formulas; this module assembles rows
//! into per-FDE or whole-file switches and wraps them in the function and
//! file-level boilerplate (banner comment, includes, ABI typedefs).

pub mod row;

use crate::abi::{CONTEXT_STRUCT_C, DEREF_FUNC_TYPEDEF_C};
use crate::model::{Fde, SimpleDwarf};
use crate::switch_compiler::SwitchCompiler;
use crate::switch_ir::{CaseContent, SwitchCase, SwitchStatement};
use row::{gen_default_row, gen_of_row_content, gen_of_row_content_with_deref, DerefStyle};

/// Which dispatch shape the generator emits (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// One function per FDE plus a `_fde_lookup(pc)` function-pointer table.
    SwitchPerFunc,
    /// One function, `_eh_elf`, covering every row of every FDE.
    GlobalSwitch,
}

/// Per-FDE function name. Boxed closure per spec.md §9 ("naming schemes ...
/// are closures, not function pointers").
pub type NamingScheme = Box<dyn Fn(u64) -> String>;

/// `_fde_<beg_ip>` in lowercase hex, the default naming scheme (spec.md
/// §4.4).
pub fn default_naming_scheme() -> NamingScheme {
    Box::new(|beg_ip| format!("_fde_{beg_ip:x}"))
}

pub struct CodegenOptions {
    pub policy: Policy,
    pub deref: DerefStyle,
    pub compiler: Box<dyn SwitchCompiler>,
    pub naming: NamingScheme,
    /// Only used for the file banner comment; never affects semantics.
    pub source_path: String,
}

impl CodegenOptions {
    pub fn new(policy: Policy, compiler: Box<dyn SwitchCompiler>) -> Self {
        Self {
            policy,
            deref: DerefStyle::Raw,
            compiler,
            naming: default_naming_scheme(),
            source_path: String::new(),
        }
    }
}

fn policy_name(policy: Policy) -> &'static str {
    match policy {
        Policy::SwitchPerFunc => "SwitchPerFunc",
        Policy::GlobalSwitch => "GlobalSwitch",
    }
}

fn banner(opts: &CodegenOptions) -> String {
    format!(
        "/* generated by eh_elf_compile from {}, policy={} */\n",
        if opts.source_path.is_empty() {
            "<unknown>"
        } else {
            &opts.source_path
        },
        policy_name(opts.policy),
    )
}

fn prelude(opts: &CodegenOptions) -> String {
    let mut out = String::new();
    out.push_str("#include <stdint.h>\n");
    out.push_str("#include <assert.h>\n\n");
    out.push_str(CONTEXT_STRUCT_C);
    if opts.deref == DerefStyle::Callback {
        out.push_str(DEREF_FUNC_TYPEDEF_C);
    }
    out.push_str(&handler_typedef(opts.deref));
    out.push('\n');
    out
}

fn handler_typedef(deref: DerefStyle) -> String {
    match deref {
        DerefStyle::Raw => {
            "typedef unwind_context_t (*eh_elf_handler_t)(unwind_context_t, uintptr_t);\n".to_string()
        }
        DerefStyle::Callback => {
            "typedef unwind_context_t (*eh_elf_handler_t)(unwind_context_t, uintptr_t, deref_func_t);\n".to_string()
        }
    }
}

fn row_body(fde: &Fde, row_index: usize, deref: DerefStyle) -> String {
    let row = &fde.rows[row_index];
    match deref {
        DerefStyle::Raw => gen_of_row_content(&row.cfa, &row.rbp, &row.rbx, &row.ra),
        DerefStyle::Callback => gen_of_row_content_with_deref(&row.cfa, &row.rbp, &row.rbx, &row.ra),
    }
}

/// Builds the dispatch table over one FDE's rows: `[row.ip, row_end(i) - 1]`
/// maps to that row's lowered body.
fn row_switch(fde: &Fde, deref: DerefStyle) -> SwitchStatement {
    let mut cases = Vec::with_capacity(fde.rows.len());
    for i in 0..fde.rows.len() {
        let low = fde.rows[i].ip;
        let high = fde.row_end(i).saturating_sub(1);
        cases.push(SwitchCase {
            low,
            high,
            content: CaseContent::new(row_body(fde, i, deref)),
        });
    }
    SwitchStatement::new(cases, CaseContent::new(gen_default_row()))
}

fn function_signature(name: &str, deref: DerefStyle) -> String {
    match deref {
        DerefStyle::Raw => format!("unwind_context_t {name}(unwind_context_t ctx, uintptr_t pc)"),
        DerefStyle::Callback => {
            format!("unwind_context_t {name}(unwind_context_t ctx, uintptr_t pc, deref_func_t deref)")
        }
    }
}

fn emit_function(name: &str, sw: &SwitchStatement, compiler: &dyn SwitchCompiler, deref: DerefStyle) -> String {
    let mut out = String::new();
    out.push_str(&function_signature(name, deref));
    out.push_str(" {\n");
    out.push_str("    unwind_context_t out_ctx;\n");
    out.push_str(&compiler.compile(sw, 1));
    out.push_str("}\n\n");
    out
}

/// `_fde_lookup(pc)`: a switch over FDE ranges returning the handler
/// pointer for the FDE owning `pc` (SwitchPerFunc only).
fn emit_lookup(dwarf: &SimpleDwarf, names: &[String], compiler: &dyn SwitchCompiler) -> String {
    let cases = dwarf
        .fdes
        .iter()
        .zip(names)
        .map(|(fde, name)| SwitchCase {
            low: fde.beg_ip,
            high: fde.end_ip.saturating_sub(1),
            content: CaseContent::new(format!("return &{name};")),
        })
        .collect();
    let sw = SwitchStatement::new(cases, CaseContent::new("assert(0);\nreturn 0;".to_string()));

    let mut out = String::new();
    out.push_str("eh_elf_handler_t _fde_lookup(uintptr_t pc) {\n");
    out.push_str(&compiler.compile(&sw, 1));
    out.push_str("}\n\n");
    out
}

/// The single entry point: lowers `dwarf` to a complete C source file.
pub fn generate(dwarf: &SimpleDwarf, opts: &CodegenOptions) -> String {
    let mut out = String::new();
    out.push_str(&banner(opts));
    out.push_str(&prelude(opts));

    match opts.policy {
        Policy::GlobalSwitch => {
            let mut cases = Vec::new();
            for fde in &dwarf.fdes {
                for i in 0..fde.rows.len() {
                    cases.push(SwitchCase {
                        low: fde.rows[i].ip,
                        high: fde.row_end(i).saturating_sub(1),
                        content: CaseContent::new(row_body(fde, i, opts.deref)),
                    });
                }
            }
            let sw = SwitchStatement::new(cases, CaseContent::new(gen_default_row()));
            out.push_str(&emit_function("_eh_elf", &sw, opts.compiler.as_ref(), opts.deref));
        }
        Policy::SwitchPerFunc => {
            let mut names = Vec::with_capacity(dwarf.fdes.len());
            for fde in &dwarf.fdes {
                let name = (opts.naming)(fde.beg_ip);
                let sw = row_switch(fde, opts.deref);
                out.push_str(&emit_function(&name, &sw, opts.compiler.as_ref(), opts.deref));
                names.push(name);
            }
            out.push_str(&emit_lookup(dwarf, &names, opts.compiler.as_ref()));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DwRegister, DwRow, MachineRegister};
    use crate::switch_compiler::NativeSwitchCompiler;
    use smallvec::SmallVec;

    fn sample_fde(fde_offset: u64, beg_ip: u64, end_ip: u64) -> Fde {
        Fde {
            fde_offset,
            beg_ip,
            end_ip,
            rows: SmallVec::from_vec(vec![DwRow {
                ip: beg_ip,
                cfa: DwRegister::Register {
                    reg: MachineRegister::Rsp,
                    offset: 8,
                },
                rbp: DwRegister::Undefined,
                rbx: DwRegister::Undefined,
                ra: DwRegister::CfaOffset { offset: -8 },
            }]),
        }
    }

    #[test]
    fn global_switch_contains_single_function_and_all_rows() {
        let dwarf = SimpleDwarf::new(vec![sample_fde(0, 0x1000, 0x1010), sample_fde(1, 0x1010, 0x1020)]);
        let opts = CodegenOptions::new(Policy::GlobalSwitch, Box::new(NativeSwitchCompiler));
        let c = generate(&dwarf, &opts);
        assert!(c.contains("unwind_context_t _eh_elf(unwind_context_t ctx, uintptr_t pc)"));
        assert!(c.contains("case 0x1000 ... 0x100f"));
        assert!(c.contains("case 0x1010 ... 0x101f"));
        assert!(!c.contains("_fde_lookup"));
    }

    #[test]
    fn switch_per_func_emits_one_function_per_fde_and_a_lookup() {
        let dwarf = SimpleDwarf::new(vec![sample_fde(0, 0x1000, 0x1010), sample_fde(1, 0x1010, 0x1020)]);
        let opts = CodegenOptions::new(Policy::SwitchPerFunc, Box::new(NativeSwitchCompiler));
        let c = generate(&dwarf, &opts);
        assert!(c.contains("unwind_context_t _fde_1000(unwind_context_t ctx, uintptr_t pc)"));
        assert!(c.contains("unwind_context_t _fde_1010(unwind_context_t ctx, uintptr_t pc)"));
        assert!(c.contains("eh_elf_handler_t _fde_lookup(uintptr_t pc)"));
        assert!(c.contains("return &_fde_1000;"));
        assert!(c.contains("return &_fde_1010;"));
    }

    #[test]
    fn deref_callback_style_adds_typedef_and_param() {
        let dwarf = SimpleDwarf::new(vec![sample_fde(0, 0x1000, 0x1010)]);
        let mut opts = CodegenOptions::new(Policy::GlobalSwitch, Box::new(NativeSwitchCompiler));
        opts.deref = DerefStyle::Callback;
        let c = generate(&dwarf, &opts);
        assert!(c.contains("typedef uintptr_t (*deref_func_t)(uintptr_t);"));
        assert!(c.contains("uintptr_t pc, deref_func_t deref)"));
    }

    #[test]
    fn out_ctx_is_declared_exactly_once_per_function() {
        // Regression: row bodies must not redeclare out_ctx, since the
        // factored compiler inlines multiple case bodies into one scope.
        let dwarf = SimpleDwarf::new(vec![sample_fde(0, 0x1000, 0x1010)]);
        let opts = CodegenOptions::new(Policy::GlobalSwitch, Box::new(NativeSwitchCompiler));
        let c = generate(&dwarf, &opts);
        assert_eq!(c.matches("unwind_context_t out_ctx;").count(), 1);
    }

    #[test]
    fn s1_scenario_end_to_end() {
        let dwarf = SimpleDwarf::new(vec![sample_fde(0, 0x1000, 0x1010)]);
        let opts = CodegenOptions::new(Policy::GlobalSwitch, Box::new(NativeSwitchCompiler));
        let c = generate(&dwarf, &opts);
        assert!(c.contains("out_ctx.rsp = ctx.rsp + (8);"));
        assert!(c.contains("out_ctx.rip = *((uintptr_t*)(out_ctx.rsp + (-8)));"));
        assert!(c.contains("out_ctx.flags = 3u;"));
    }
}
