//! Component D's intermediate representation: a PC-range dispatch table,
//! independent of how it gets lowered to C. See [`crate::switch_compiler`]
//! for the two back ends.

/// An opaque code block. Equality and ordering are defined by byte-identical
/// source text, which is exactly what [`crate::switch_compiler::factored`]
/// needs to deduplicate structurally identical cases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaseContent(pub String);

impl CaseContent {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }
}

/// One case in the dispatch table: `[low, high]` (inclusive) maps to
/// `content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCase {
    pub low: u64,
    pub high: u64,
    pub content: CaseContent,
}

/// A case table over a single switch variable, always named `pc` in this
/// crate.
///
/// Invariant: `cases` is non-overlapping and sorted ascending by `low`, and
/// every case has `low <= high`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchStatement {
    pub switch_var: String,
    pub cases: Vec<SwitchCase>,
    pub default_case: CaseContent,
}

impl SwitchStatement {
    pub fn new(cases: Vec<SwitchCase>, default_case: CaseContent) -> Self {
        let sw = Self {
            switch_var: "pc".to_string(),
            cases,
            default_case,
        };
        debug_assert!(sw.invariants_hold(), "SwitchStatement invariants violated");
        sw
    }

    pub fn invariants_hold(&self) -> bool {
        self.cases.iter().all(|c| c.low <= c.high)
            && self
                .cases
                .windows(2)
                .all(|w| w[0].high < w[1].low)
    }
}
