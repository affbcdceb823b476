//! Component D's two back ends: [`native`] emits a straightforward C
//! `switch`, [`factored`] emits a binary-search dispatch tree with shared
//! labels for structurally identical cases.

pub mod factored;
pub mod native;

pub use factored::{FactorStats, FactoredSwitchCompiler};
pub use native::NativeSwitchCompiler;

use crate::switch_ir::SwitchStatement;

/// A back end that lowers a [`SwitchStatement`] to C source, indented by
/// `indent` levels of four spaces (matching [`crate::codegen`]'s emission
/// style).
pub trait SwitchCompiler {
    fn compile(&self, sw: &SwitchStatement, indent: usize) -> String;
}

pub(crate) fn indent_str(level: usize) -> String {
    "    ".repeat(level)
}
