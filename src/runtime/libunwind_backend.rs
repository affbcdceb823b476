//! Component 4.6: a drop-in alternative to [`crate::runtime::StackWalker`]
//! backed by a stock libunwind, gated behind the `libunwind` feature for
//! head-to-head benchmarking (component H) against the eh_elf-backed walker.
//!
//! libunwind's cursor doesn't fit in [`UnwindContext`]'s four words, so —
//! per spec.md §4.6 — this backend smuggles a heap-allocated cursor's
//! address through the `rip` field; the real register values are read back
//! out through [`LibunwindWalker::get_register`] rather than `ctx.rip`
//! directly.

use crate::abi::UnwindContext;
use crate::model::MachineRegister;
use crate::runtime::WalkerError;

const UNW_CONTEXT_BYTES: usize = 4096;
const UNW_CURSOR_BYTES: usize = 4096;

// Generic libunwind register ids (same across architectures), see
// `libunwind.h`.
const UNW_REG_IP: i32 = -1;
const UNW_REG_SP: i32 = -2;

#[repr(C, align(16))]
struct UnwContext([u8; UNW_CONTEXT_BYTES]);

#[repr(C, align(16))]
struct UnwCursor([u8; UNW_CURSOR_BYTES]);

#[link(name = "unwind")]
extern "C" {
    fn unw_getcontext(ctx: *mut UnwContext) -> i32;
    fn unw_init_local(cursor: *mut UnwCursor, ctx: *mut UnwContext) -> i32;
    fn unw_step(cursor: *mut UnwCursor) -> i32;
    fn unw_get_reg(cursor: *mut UnwCursor, reg: i32, val: *mut u64) -> i32;
}

pub struct LibunwindWalker;

impl LibunwindWalker {
    pub fn init() -> Result<Self, WalkerError> {
        Ok(Self)
    }

    /// Captures the current context and leaks a cursor whose address is
    /// smuggled through `ctx.rip`; ownership transfers to the caller, who
    /// must eventually drive it to completion via [`Self::walk_stack`] (or
    /// call [`Self::unwind_context`] until it returns `false`, which
    /// releases the cursor).
    pub fn get_context(&self) -> UnwindContext {
        let mut raw = Box::new(UnwContext([0u8; UNW_CONTEXT_BYTES]));
        if unsafe { unw_getcontext(raw.as_mut()) } != 0 {
            return UnwindContext::default();
        }

        let mut cursor = Box::new(UnwCursor([0u8; UNW_CURSOR_BYTES]));
        if unsafe { unw_init_local(cursor.as_mut(), raw.as_mut()) } != 0 {
            return UnwindContext::default();
        }

        let mut ctx = UnwindContext {
            flags: 0,
            rip: Box::into_raw(cursor) as usize,
            rsp: 0,
            rbp: 0,
            rbx: 0,
        };
        if !self.unwind_context(&mut ctx) {
            return UnwindContext::default();
        }
        ctx
    }

    /// Advances the smuggled cursor one frame. Returns `false` (and frees
    /// the cursor) once libunwind reports end-of-stack or an error.
    pub fn unwind_context(&self, ctx: &mut UnwindContext) -> bool {
        if ctx.rip == 0 {
            return false;
        }
        let cursor = ctx.rip as *mut UnwCursor;
        let rc = unsafe { unw_step(cursor) };
        if rc <= 0 {
            Self::release(ctx.rip);
            ctx.rip = 0;
            return false;
        }
        true
    }

    /// Reads a register out of the cursor smuggled in `ctx.rip`. Only RIP
    /// and RSP are available through libunwind's architecture-generic
    /// register ids; other registers return 0.
    pub fn get_register(&self, ctx: &UnwindContext, reg: MachineRegister) -> u64 {
        if ctx.rip == 0 {
            return 0;
        }
        let unw_reg = match reg {
            MachineRegister::Rip | MachineRegister::Ra => UNW_REG_IP,
            MachineRegister::Rsp => UNW_REG_SP,
            MachineRegister::Rbp | MachineRegister::Rbx => return 0,
        };
        let cursor = ctx.rip as *mut UnwCursor;
        let mut val: u64 = 0;
        unsafe { unw_get_reg(cursor, unw_reg, &mut val) };
        val
    }

    pub fn walk_stack(&self, mut ctx: UnwindContext, mut observe: impl FnMut(u64)) {
        observe(self.get_register(&ctx, MachineRegister::Rip));
        while self.unwind_context(&mut ctx) {
            observe(self.get_register(&ctx, MachineRegister::Rip));
        }
    }

    fn release(cursor_ptr: usize) {
        if cursor_ptr != 0 {
            unsafe {
                drop(Box::from_raw(cursor_ptr as *mut UnwCursor));
            }
        }
    }
}
