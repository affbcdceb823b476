//! `gen_of_row_content`: lowers one [`DwRow`] to the body of a C switch case
//! (spec.md §4.4).

use crate::abi::{FLAG_BIT_RBP, FLAG_BIT_RBX, FLAG_BIT_RIP, FLAG_BIT_RSP, FLAG_ERROR};
use crate::model::DwRegister;

/// Whether generated expressions read `*(uintptr_t*)(addr)` directly or call
/// through a `deref` callback (`--enable-deref-arg`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefStyle {
    Raw,
    Callback,
}

/// `Register`/`CfaOffset` are the only variants with a concrete formula;
/// `Undefined` means "not yet set" (no error), while `NotImplemented` and
/// `PltExpr` mean "recognized but inexpressible" — for `cfa`/`ra` those two
/// collapse into the row's error case (spec.md §7 category 2), for `rbp`/
/// `rbx` they're treated like `Undefined` and simply skipped.
fn is_emittable(reg: &DwRegister) -> bool {
    matches!(reg, DwRegister::Register { .. } | DwRegister::CfaOffset { .. })
}

fn expr(reg: &DwRegister, deref: DerefStyle) -> String {
    match reg {
        DwRegister::Register { reg, offset } => format!("ctx.{} + ({offset})", reg.c_field_name()),
        DwRegister::CfaOffset { offset } => match deref {
            DerefStyle::Callback => format!("deref(out_ctx.rsp + ({offset}))"),
            DerefStyle::Raw => format!("*((uintptr_t*)(out_ctx.rsp + ({offset})))"),
        },
        DwRegister::Undefined | DwRegister::PltExpr | DwRegister::NotImplemented => {
            unreachable!("expr() called on a register with no formula, guarded by is_emittable")
        }
    }
}

fn error_row(out: &mut String) {
    out.push_str(&format!("out_ctx.flags = {FLAG_ERROR}u;\n"));
    out.push_str("return out_ctx;\n");
}

fn lower(cfa: &DwRegister, rbp: &DwRegister, rbx: &DwRegister, ra: &DwRegister, deref: DerefStyle) -> String {
    let mut out = String::new();

    if !is_emittable(ra) && !matches!(ra, DwRegister::Undefined) {
        error_row(&mut out);
        return out;
    }
    if !is_emittable(cfa) {
        error_row(&mut out);
        return out;
    }

    let mut flags: u8 = 0;
    out.push_str(&format!("out_ctx.rsp = {};\n", expr(cfa, deref)));
    flags |= 1 << FLAG_BIT_RSP;

    if is_emittable(rbp) {
        out.push_str(&format!("out_ctx.rbp = {};\n", expr(rbp, deref)));
        flags |= 1 << FLAG_BIT_RBP;
    }
    if is_emittable(ra) {
        out.push_str(&format!("out_ctx.rip = {};\n", expr(ra, deref)));
        flags |= 1 << FLAG_BIT_RIP;
    }
    if is_emittable(rbx) {
        out.push_str(&format!("out_ctx.rbx = {};\n", expr(rbx, deref)));
        flags |= 1 << FLAG_BIT_RBX;
    }

    out.push_str(&format!("out_ctx.flags = {flags}u;\n"));
    out.push_str("return out_ctx;\n");
    out
}

/// Produces the C statements for one row (raw-pointer dereference style).
pub fn gen_of_row_content(cfa: &DwRegister, rbp: &DwRegister, rbx: &DwRegister, ra: &DwRegister) -> String {
    lower(cfa, rbp, rbx, ra, DerefStyle::Raw)
}

/// Same lowering, but expressed with the `deref` callback instead of a raw
/// pointer dereference (`--enable-deref-arg`).
pub fn gen_of_row_content_with_deref(
    cfa: &DwRegister,
    rbp: &DwRegister,
    rbx: &DwRegister,
    ra: &DwRegister,
) -> String {
    lower(cfa, rbp, rbx, ra, DerefStyle::Callback)
}

/// The default case for any per-row switch: only the error bit is set.
///
/// Assumes `out_ctx` is already declared by the enclosing function (see
/// [`crate::codegen`]), matching every other case body's expectations.
pub fn gen_default_row() -> String {
    let mut out = String::new();
    error_row(&mut out);
    out
}
