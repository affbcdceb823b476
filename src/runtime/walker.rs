//! `get_context`/`unwind_context`/`walk_stack`: the per-frame dispatch loop
//! (spec.md §4.5), driving the [`MemoryMap`] built by [`crate::runtime::memory_map`].

use tracing::debug;

use crate::abi::UnwindContext;
use crate::runtime::memory_map::{Handler, MemoryMap};
use crate::runtime::WalkerError;

/// Coarse progress marker for diagnostics; the real control flow lives in
/// [`StackWalker::walk_stack`]'s loop, not in an explicit state value (spec.md
/// §4.5's `Initialized -> Capturing -> Frame(n) -> ... -> End | Error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Initialized,
    Capturing,
    Frame(usize),
    End,
    Error,
}

pub struct StackWalker {
    map: MemoryMap,
}

impl StackWalker {
    pub fn init() -> Result<Self, WalkerError> {
        Ok(Self { map: MemoryMap::init()? })
    }

    /// Captures the caller's current registers, then takes one unwind step
    /// to move past this function's own frame. Returns a zeroed context if
    /// that first step fails (spec.md §4.5).
    pub fn get_context(&self) -> UnwindContext {
        let mut uctx: libc::ucontext_t = unsafe { std::mem::zeroed() };
        if unsafe { libc::getcontext(&mut uctx) } < 0 {
            return UnwindContext::default();
        }

        let gregs = uctx.uc_mcontext.gregs;
        let mut ctx = UnwindContext {
            flags: 0,
            rip: gregs[libc::REG_RIP as usize] as usize,
            rsp: gregs[libc::REG_RSP as usize] as usize,
            rbp: gregs[libc::REG_RBP as usize] as usize,
            rbx: gregs[libc::REG_RBX as usize] as usize,
        };
        if !self.unwind_context(&mut ctx) {
            return UnwindContext::default();
        }
        ctx
    }

    /// One step of the per-frame dispatch (spec.md §4.5 points 1-5). Returns
    /// `false` when the walk should end: sentinel context, no owning
    /// segment, or no resolvable handler. `ctx` is overwritten in place with
    /// the callee's recovered caller state on success.
    pub fn unwind_context(&self, ctx: &mut UnwindContext) -> bool {
        if ctx.is_sentinel() {
            return false;
        }

        let Some(segment) = self.map.lookup(ctx.rip) else {
            debug!(rip = ctx.rip, "no owning segment for pc");
            return false;
        };
        let tr_pc = ctx.rip - segment.beg;

        let handler = match &segment.handler {
            Handler::Global(f) => *f,
            Handler::PerFunc(lookup) => match unsafe { lookup(tr_pc) } {
                Some(f) => f,
                None => {
                    debug!(tr_pc, "fde lookup returned no handler");
                    return false;
                }
            },
        };

        let next = unsafe { handler(*ctx, tr_pc) };
        *ctx = next;
        true
    }

    /// Invokes `observe` on the initial context and on every successfully
    /// produced subsequent context, stopping once a step fails or the last
    /// observed context carries the error flag (spec.md §7, §8 S6).
    pub fn walk_stack(&self, initial: UnwindContext, mut observe: impl FnMut(&UnwindContext)) {
        let mut ctx = initial;
        observe(&ctx);
        if ctx.is_error() {
            return;
        }
        while self.unwind_context(&mut ctx) {
            observe(&ctx);
            if ctx.is_error() {
                break;
            }
        }
    }
}
