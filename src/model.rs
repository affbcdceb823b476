//! The normalized, architecture-specific view of DWARF Call Frame Information
//! that the rest of the crate operates on.
//!
//! [`SimpleDwarf`] is built once by [`crate::reader`], passed through the
//! filter pipeline in [`crate::filters`], and consumed by [`crate::codegen`].
//! Nothing downstream mutates it in place; every transformation returns a
//! fresh value.

use smallvec::SmallVec;

/// The x86-64 registers eh_elf tracks across an unwind step, plus the
/// synthetic return-address slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineRegister {
    Rip,
    Rsp,
    Rbp,
    Rbx,
    /// Not a real machine register: the return address recovered for the
    /// caller, which becomes the caller's `rip`.
    Ra,
}

impl MachineRegister {
    /// The identifier used in generated C (`ctx.<name>`).
    pub fn c_field_name(self) -> &'static str {
        match self {
            MachineRegister::Rip => "rip",
            MachineRegister::Rsp => "rsp",
            MachineRegister::Rbp => "rbp",
            MachineRegister::Rbx => "rbx",
            MachineRegister::Ra => "rip",
        }
    }
}

/// How to recover one saved register's value at a given program counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwRegister {
    /// Not yet set in this FDE.
    Undefined,
    /// `ctx[reg] + offset`.
    Register { reg: MachineRegister, offset: i64 },
    /// The machine word stored at `[cfa + offset]`.
    CfaOffset { offset: i64 },
    /// The canonical PLT stub expression (§6): a fixed 9-opcode DWARF
    /// expression recognized byte-for-byte, see [`crate::reader`].
    PltExpr,
    /// An expression or rule outside the recognized subset.
    NotImplemented,
}

impl DwRegister {
    pub fn is_defined(self) -> bool {
        !matches!(self, DwRegister::Undefined)
    }
}

/// One row of the unwinding table: the recovery formulas in effect for the
/// contiguous PC range starting at `ip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DwRow {
    /// Inclusive lower bound of the range this row applies to. The upper
    /// bound is implicit: the next row's `ip - 1`, or the owning FDE's
    /// `end_ip - 1` for the last row.
    pub ip: u64,
    /// Canonical Frame Address formula. Must be `Register` for the row to be
    /// usable at run time (I-1); other variants surface as `flags.error`.
    pub cfa: DwRegister,
    pub rbp: DwRegister,
    pub rbx: DwRegister,
    pub ra: DwRegister,
}

impl DwRow {
    /// The tuple of tracked register formulas, used for the dedup
    /// comparisons in [`crate::filters::ConseqEquivFilter`] and
    /// [`crate::filters::OverriddenRowFilter`] (everything but `ip`).
    pub fn formulas(&self) -> (DwRegister, DwRegister, DwRegister, DwRegister) {
        (self.cfa, self.rbp, self.rbx, self.ra)
    }
}

/// One function's unwinding table (Frame Descriptor Entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fde {
    pub fde_offset: u64,
    pub beg_ip: u64,
    /// Exclusive upper bound.
    pub end_ip: u64,
    /// Sorted by `ip`, strictly increasing after canonicalization.
    pub rows: SmallVec<[DwRow; 4]>,
}

impl Fde {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The exclusive upper bound covered by `row`, given its position in
    /// `rows` and this FDE's `end_ip`.
    pub fn row_end(&self, row_index: usize) -> u64 {
        self.rows
            .get(row_index + 1)
            .map(|next| next.ip)
            .unwrap_or(self.end_ip)
    }
}

/// The normalized CFI for an entire ELF object: an ordered sequence of FDEs.
///
/// After the filter pipeline has run: sorted by `beg_ip` (I-2 non-overlapping
/// follows from `AntiOverlapFilter`/`PcHoleFiller`), no empty FDEs (I-3), no
/// two consecutive equivalent rows within one FDE (I-4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleDwarf {
    pub fdes: Vec<Fde>,
}

impl SimpleDwarf {
    pub fn new(fdes: Vec<Fde>) -> Self {
        Self { fdes }
    }

    pub fn is_sorted_by_beg_ip(&self) -> bool {
        self.fdes.windows(2).all(|w| w[0].beg_ip <= w[1].beg_ip)
    }

    pub fn is_non_overlapping(&self) -> bool {
        self.fdes.windows(2).all(|w| w[0].end_ip <= w[1].beg_ip)
    }
}
