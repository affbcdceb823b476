//! Component B: reads the raw CFI of an ELF file via `gimli` and `object`
//! (the external ELF/DWARF parser library, see spec.md §1) and projects it
//! into a [`SimpleDwarf`].
//!
//! `gimli::UnwindTable::next_row` already performs the CIE-then-FDE
//! instruction interpretation spec.md §4.1 describes; this module's job is
//! to drive that iterator per FDE and classify each cell into a [`DwRegister`].

use std::path::Path;

use gimli::{
    BaseAddresses, CfaRule, CieOrFde, EhFrame, LittleEndian, Reader, Register, RegisterRule,
    UnwindContext, UnwindSection,
};
use object::{Object, ObjectSection};
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::model::{DwRegister, DwRow, Fde, MachineRegister, SimpleDwarf};

/// Dwarf register ids for x86-64 (spec.md §4.1).
const REG_RBX: u16 = 3;
const REG_RBP: u16 = 6;
const REG_RSP: u16 = 7;
const REG_RIP: u16 = 16;

/// The fixed 9-opcode PLT stub DWARF expression (spec.md §6), reconstructed
/// from `examples/original_source/src/plt_std_expr.hpp`: `DW_OP_breg7 8;
/// DW_OP_breg16 0; DW_OP_lit15; DW_OP_div; DW_OP_lit11; DW_OP_plus;
/// DW_OP_lit3; DW_OP_dup; DW_OP_plus`.
pub const PLT_REFERENCE_EXPR: [u8; 11] =
    [0x77, 0x08, 0x80, 0x00, 0x3f, 0x1a, 0x3b, 0x2a, 0x33, 0x24, 0x22];

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("cannot open elf file: {0}")]
    Io(#[source] std::io::Error),

    #[error("cannot parse elf file: {0}")]
    Object(#[from] object::Error),

    #[error("elf file has no .eh_frame section")]
    NoEhFrame,

    #[error("gimli failed to process the CFI: {0}")]
    Gimli(#[from] gimli::Error),

    #[error("FDE at offset 0x{0:x} has a row with an undefined CFA")]
    InvalidDwarf(u64),
}

fn reg_to_machine(reg: Register) -> Option<MachineRegister> {
    match reg.0 {
        REG_RSP => Some(MachineRegister::Rsp),
        REG_RBP => Some(MachineRegister::Rbp),
        REG_RBX => Some(MachineRegister::Rbx),
        REG_RIP => Some(MachineRegister::Rip),
        _ => None,
    }
}

/// Classifies a raw DWARF expression's bytes: the PLT reference sequence, a
/// simple `DW_OP_breg<n> <imm>` (no trailing `DW_OP_deref`), or unsupported.
fn classify_expression(expr_bytes: &[u8]) -> DwRegister {
    if expr_bytes == PLT_REFERENCE_EXPR {
        return DwRegister::PltExpr;
    }
    // DW_OP_breg0..DW_OP_breg31 is 0x70..=0x8f, each followed by an SLEB128
    // immediate and nothing else. `DW_OP_deref` (0x06) trailing the operand
    // downgrades to NotImplemented rather than being dereferenced again.
    if let [opcode, rest @ ..] = expr_bytes {
        if (0x70..=0x8f).contains(opcode) {
            let dwarf_reg = Register((*opcode - 0x70) as u16);
            if let Some((imm, consumed)) = read_sleb128(rest) {
                if consumed == rest.len() {
                    return match reg_to_machine(dwarf_reg) {
                        Some(reg) => DwRegister::Register { reg, offset: imm },
                        None => DwRegister::NotImplemented,
                    };
                }
            }
        }
    }
    DwRegister::NotImplemented
}

fn read_sleb128(bytes: &[u8]) -> Option<(i64, usize)> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    let mut i = 0;
    loop {
        let byte = *bytes.get(i)?;
        i += 1;
        result |= ((byte & 0x7f) as i64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && (byte & 0x40) != 0 {
                result |= -1i64 << shift;
            }
            return Some((result, i));
        }
        if shift >= 64 {
            return None;
        }
    }
}

fn cfa_from_rule<R: Reader, S: UnwindSection<R, Offset = gimli::EhFrameOffset<R::Offset>>>(
    rule: &CfaRule<R::Offset>,
    section: &S,
) -> DwRegister {
    match rule {
        CfaRule::RegisterAndOffset { register, offset } => match reg_to_machine(*register) {
            Some(reg) => DwRegister::Register {
                reg,
                offset: *offset,
            },
            None => DwRegister::NotImplemented,
        },
        CfaRule::Expression(expr) => match expr.get(section).and_then(|e| e.0.to_slice().map(|c| c.into_owned())) {
            Ok(bytes) => classify_expression(&bytes),
            Err(_) => DwRegister::NotImplemented,
        },
    }
}

/// `own_reg` is the machine register this column recovers; it's needed to
/// resolve `RegisterRule::SameValue` and `RegisterRule::Register` without an
/// explicit offset.
fn register_from_rule<R: Reader, S: UnwindSection<R, Offset = gimli::EhFrameOffset<R::Offset>>>(
    rule: &RegisterRule<R::Offset>,
    own_reg: MachineRegister,
    section: &S,
) -> DwRegister {
    match rule {
        RegisterRule::Undefined => DwRegister::Undefined,
        RegisterRule::SameValue => DwRegister::Register {
            reg: own_reg,
            offset: 0,
        },
        RegisterRule::Offset(offset) => DwRegister::CfaOffset { offset: *offset },
        RegisterRule::Register(reg) => match reg_to_machine(*reg) {
            Some(reg) => DwRegister::Register { reg, offset: 0 },
            None => DwRegister::NotImplemented,
        },
        RegisterRule::Expression(expr) => match expr.get(section).and_then(|e| e.0.to_slice().map(|c| c.into_owned())) {
            Ok(bytes) => classify_expression(&bytes),
            Err(_) => DwRegister::NotImplemented,
        },
        RegisterRule::ValExpression(expr) => match expr.get(section).and_then(|e| e.0.to_slice().map(|c| c.into_owned())) {
            Ok(bytes) if bytes.as_ref() == PLT_REFERENCE_EXPR => DwRegister::PltExpr,
            _ => DwRegister::NotImplemented,
        },
        // ValOffset and Architectural rules fall outside the recognized subset.
        _ => DwRegister::NotImplemented,
    }
}

/// Reads the CFI of the ELF file at `path` into a [`SimpleDwarf`].
///
/// FDEs in the returned model correspond one-to-one with those in the ELF's
/// `.eh_frame` section; rows are in encounter order (not yet sorted or
/// canonicalized — that's the filter pipeline's job).
pub fn read_elf(path: &Path) -> Result<SimpleDwarf, ReaderError> {
    let data = std::fs::read(path).map_err(ReaderError::Io)?;
    read_elf_bytes(&data)
}

pub fn read_elf_bytes(data: &[u8]) -> Result<SimpleDwarf, ReaderError> {
    let obj = object::File::parse(data)?;
    let eh_frame_section = obj.section_by_name(".eh_frame").ok_or(ReaderError::NoEhFrame)?;
    let eh_frame_data = eh_frame_section.uncompressed_data()?;
    let eh_frame_addr = eh_frame_section.address();
    let text_addr = obj
        .section_by_name(".text")
        .map(|s| s.address())
        .unwrap_or(0);

    let mut bases = BaseAddresses::default()
        .set_eh_frame(eh_frame_addr)
        .set_text(text_addr);
    if let Some(got) = obj.section_by_name(".got") {
        bases = bases.set_got(got.address());
    }

    let mut eh_frame = EhFrame::new(&eh_frame_data, LittleEndian);
    eh_frame.set_address_size(8);

    let mut ctx: UnwindContext<usize> = UnwindContext::new();
    let mut fdes = Vec::new();
    let mut cur_cie = None;
    let mut entries = eh_frame.entries(&bases);
    while let Some(entry) = entries.next()? {
        let fde = match entry {
            CieOrFde::Cie(cie) => {
                cur_cie = Some(cie);
                continue;
            }
            CieOrFde::Fde(partial) => partial.parse(|section, bases, cie_offset| {
                if let Some(cie) = &cur_cie {
                    if cie.offset() == cie_offset.0 {
                        return Ok(cie.clone());
                    }
                }
                let cie = section.cie_from_offset(bases, cie_offset);
                if let Ok(cie) = &cie {
                    cur_cie = Some(cie.clone());
                }
                cie
            })?,
        };

        let fde_offset = fde.offset() as u64;
        let beg_ip = fde.initial_address();
        let end_ip = beg_ip + fde.len();
        let ra_register = fde.cie().return_address_register();

        let mut rows: SmallVec<[DwRow; 4]> = SmallVec::new();
        {
            let mut table = fde.rows(&eh_frame, &bases, &mut ctx)?;
            while let Some(row) = table.next_row()? {
                let cfa = cfa_from_rule(row.cfa(), &eh_frame);
                let rbp = register_from_rule(
                    &row.register(Register(REG_RBP)),
                    MachineRegister::Rbp,
                    &eh_frame,
                );
                let rbx = register_from_rule(
                    &row.register(Register(REG_RBX)),
                    MachineRegister::Rbx,
                    &eh_frame,
                );
                let ra = register_from_rule(&row.register(ra_register), MachineRegister::Ra, &eh_frame);
                trace!(ip = row.start_address(), ?cfa, ?rbp, ?rbx, ?ra, "read dwarf row");
                rows.push(DwRow {
                    ip: row.start_address(),
                    cfa,
                    rbp,
                    rbx,
                    ra,
                });
            }
        }

        // A row whose CFA is Undefined fails the read, except for the
        // trailing row (spec.md §4.1 point 4), which is silently dropped.
        if let Some(last) = rows.last() {
            if !last.cfa.is_defined() {
                rows.pop();
            }
        }
        if let Some(bad) = rows.iter().find(|r| !r.cfa.is_defined()) {
            return Err(ReaderError::InvalidDwarf(bad.ip));
        }

        if rows.iter().any(|r| matches!(r.cfa, DwRegister::NotImplemented)) {
            warn!(fde_offset, "fde has a row with an unsupported CFA expression");
        }

        fdes.push(Fde {
            fde_offset,
            beg_ip,
            end_ip,
            rows,
        });
    }

    Ok(SimpleDwarf::new(fdes))
}
