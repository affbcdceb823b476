//! The process-wide map from loaded segment to its eh_elf shared object,
//! built once at `stack_walker_init` and read-only thereafter (spec.md §5).
//!
//! Grounded on `examples/mornyx-unwind/src/dyld/linux.rs`'s `dl_iterate_phdr`
//! callback shape and `examples/original_source/stack_walker/stack_walker.cpp`'s
//! segment bookkeeping and `.eh_elf.so` naming convention.

use std::ffi::{CStr, CString};
use std::os::raw::c_void;

use tracing::info;

use crate::abi::HandlerFn;
use crate::runtime::WalkerError;

/// `unwind_context_t (*)(unwind_context_t, uintptr_t)` or the
/// `_fde_lookup`-mediated SwitchPerFunc variant, resolved once per loaded
/// object by probing for either exported symbol (spec.md §4.4/§6). Only the
/// plain (non-deref) handler signature is used at run time; `--enable-deref-arg`
/// SOs are for head-to-head benchmarking via component H, not this walker.
pub(crate) enum Handler {
    Global(HandlerFn),
    PerFunc(LookupFn),
}

/// `eh_elf_handler_t (*)(uintptr_t)`; returns null when `pc` owns no FDE.
pub(crate) type LookupFn = unsafe extern "C" fn(usize) -> Option<HandlerFn>;

pub(crate) struct MemoryMapEntry {
    pub beg: usize,
    pub end: usize,
    pub offset: u64,
    pub obj_path: String,
    handle: *mut c_void,
    pub(crate) handler: Handler,
}

impl Drop for MemoryMapEntry {
    fn drop(&mut self) {
        // Null only for test-constructed entries (see `synthetic`), which
        // never went through `dlopen`.
        if !self.handle.is_null() {
            unsafe {
                libc::dlclose(self.handle);
            }
        }
    }
}

#[cfg(test)]
impl MemoryMapEntry {
    pub(crate) fn synthetic(beg: usize, end: usize, handler: Handler) -> Self {
        Self {
            beg,
            end,
            offset: 0,
            obj_path: String::new(),
            handle: std::ptr::null_mut(),
            handler,
        }
    }
}

/// Sorted descending by `beg`, so "greatest `beg` not exceeding pc" is a
/// linear scan from the front (spec.md §4.5).
pub struct MemoryMap {
    entries: Vec<MemoryMapEntry>,
}

impl MemoryMap {
    pub(crate) fn lookup(&self, pc: usize) -> Option<&MemoryMapEntry> {
        self.entries
            .iter()
            .find(|e| e.beg <= pc)
            .filter(|e| pc <= e.end)
    }

    /// Enumerates loaded executable segments via `dl_iterate_phdr`, then
    /// `dlopen`s `<basename(obj_path)>.eh_elf.so` for each. Any failure
    /// tears down everything opened so far (spec.md §4.5).
    pub fn init() -> Result<Self, WalkerError> {
        let segments = enumerate_segments()?;
        let mut entries = Vec::with_capacity(segments.len());
        for seg in segments {
            match open_segment(&seg) {
                Ok(entry) => entries.push(entry),
                Err(e) => return Err(e),
            }
        }
        entries.sort_by(|a, b| b.beg.cmp(&a.beg));
        for e in &entries {
            info!(beg = e.beg, end = e.end, obj = %e.obj_path, "mapped eh_elf segment");
        }
        Ok(Self { entries })
    }

    #[cfg(test)]
    pub(crate) fn synthetic(mut entries: Vec<MemoryMapEntry>) -> Self {
        entries.sort_by(|a, b| b.beg.cmp(&a.beg));
        Self { entries }
    }
}

struct RawSegment {
    beg: usize,
    end: usize,
    offset: u64,
    obj_path: String,
}

fn enumerate_segments() -> Result<Vec<RawSegment>, WalkerError> {
    let mut out: Vec<RawSegment> = Vec::new();
    let rc = unsafe {
        libc::dl_iterate_phdr(Some(phdr_callback), &mut out as *mut _ as *mut c_void)
    };
    if rc != 0 {
        return Err(WalkerError::EnumerationFailed);
    }
    Ok(out)
}

extern "C" fn phdr_callback(info: *mut libc::dl_phdr_info, _size: usize, data: *mut c_void) -> i32 {
    unsafe {
        let out = &mut *(data as *mut Vec<RawSegment>);
        if (*info).dlpi_phnum == 0 {
            return 0;
        }
        let name = CStr::from_ptr((*info).dlpi_name).to_string_lossy().into_owned();
        if name.contains("linux-vdso") {
            return 0;
        }

        let hdrs = std::slice::from_raw_parts((*info).dlpi_phdr, (*info).dlpi_phnum as usize);
        for hdr in hdrs {
            if hdr.p_type != libc::PT_LOAD || hdr.p_flags & libc::PF_X == 0 {
                continue;
            }
            let beg = ((*info).dlpi_addr + hdr.p_vaddr) as usize;
            let obj_path = if name.is_empty() {
                readlink_rec("/proc/self/exe")
            } else {
                name.clone()
            };
            out.push(RawSegment {
                beg,
                end: beg + hdr.p_memsz as usize,
                offset: hdr.p_offset,
                obj_path,
            });
        }
        0
    }
}

fn open_segment(seg: &RawSegment) -> Result<MemoryMapEntry, WalkerError> {
    let basename = seg
        .obj_path
        .rsplit('/')
        .next()
        .unwrap_or(&seg.obj_path);
    let so_name = format!("{basename}.eh_elf.so");
    let c_name = CString::new(so_name.clone()).map_err(|_| WalkerError::DlOpen(so_name.clone(), "invalid path".to_string()))?;

    let handle = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_LAZY) };
    if handle.is_null() {
        return Err(WalkerError::DlOpen(so_name, dlerror_message()));
    }

    let handler = match resolve_handler(handle) {
        Some(h) => h,
        None => {
            unsafe { libc::dlclose(handle) };
            return Err(WalkerError::MissingSymbol(so_name, "_eh_elf or _fde_lookup".to_string()));
        }
    };

    Ok(MemoryMapEntry {
        beg: seg.beg,
        end: seg.end,
        offset: seg.offset,
        obj_path: seg.obj_path.clone(),
        handle,
        handler,
    })
}

fn resolve_handler(handle: *mut c_void) -> Option<Handler> {
    let eh_elf_sym = CString::new("_eh_elf").unwrap();
    let lookup_sym = CString::new("_fde_lookup").unwrap();
    unsafe {
        let global = libc::dlsym(handle, eh_elf_sym.as_ptr());
        if !global.is_null() {
            return Some(Handler::Global(std::mem::transmute::<*mut c_void, HandlerFn>(global)));
        }
        let lookup = libc::dlsym(handle, lookup_sym.as_ptr());
        if !lookup.is_null() {
            return Some(Handler::PerFunc(std::mem::transmute::<*mut c_void, LookupFn>(lookup)));
        }
        None
    }
}

fn dlerror_message() -> String {
    unsafe {
        let msg = libc::dlerror();
        if msg.is_null() {
            "unknown dlerror".to_string()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

/// Follows a symlink chain, stopping at the first `EINVAL` (the path is no
/// longer a symlink) and returning the last successfully resolved name.
///
/// This corrects the original `readlink_rec`'s missing stopping condition on
/// success (spec.md §9): that version kept looping after a successful
/// resolution with no exit until the buffers happened to alias, whereas this
/// one terminates as soon as `readlink` itself reports "not a symlink".
pub(crate) fn readlink_rec(path: &str) -> String {
    let mut current = path.to_string();
    loop {
        let Ok(c_path) = CString::new(current.clone()) else {
            return current;
        };
        let mut buf = [0u8; 1024];
        let rc = unsafe { libc::readlink(c_path.as_ptr(), buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
        if rc < 0 {
            // Not a symlink (EINVAL) or some other failure: `current` is
            // already the furthest successfully resolved name.
            break;
        }
        current = String::from_utf8_lossy(&buf[..rc as usize]).into_owned();
    }
    current
}
