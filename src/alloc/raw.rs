//! The process's real allocation primitives, resolved once and called
//! directly. Nothing in here ever goes through the tracking façade.
//!
//! [`RawAlloc`] is also an [`Allocator`], and it is the only allocator the
//! registry's containers are parameterised with. That is what keeps the
//! registry's own bookkeeping out of the registry: a `Box<_, RawAlloc>` can
//! only ever be allocated and freed by the primitives stored here.

use std::{
    alloc::Layout,
    ffi::{c_void, CStr},
    fmt, mem,
    ptr::{self, NonNull},
};

use allocator_api2::alloc::{AllocError, Allocator};
use libc::size_t;
use log::debug;

use crate::{util::hint::cold, Error};

pub type MallocFn = unsafe extern "C" fn(size_t) -> *mut c_void;
pub type CallocFn = unsafe extern "C" fn(size_t, size_t) -> *mut c_void;
pub type ReallocFn = unsafe extern "C" fn(*mut c_void, size_t) -> *mut c_void;
pub type FreeFn = unsafe extern "C" fn(*mut c_void);

/// Largest alignment `malloc()` is guaranteed to honour.
pub const MALLOC_ALIGN: usize = mem::align_of::<libc::max_align_t>();

/// Where `dlsym()` should start looking for the primitives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Lookup {
    /// The next definition after the object doing the lookup (`RTLD_NEXT`).
    /// This skips an interposing library that defines the symbols itself.
    #[default]
    Next,
    /// The global search order (`RTLD_DEFAULT`).
    Default,
}

impl Lookup {
    fn handle(self) -> *mut c_void {
        match self {
            Lookup::Next => libc::RTLD_NEXT,
            Lookup::Default => libc::RTLD_DEFAULT,
        }
    }
}

/// Untracked handles to `malloc`, `calloc`, `realloc` and `free`.
#[derive(Clone, Copy)]
pub struct RawAlloc {
    malloc: MallocFn,
    calloc: CallocFn,
    realloc: ReallocFn,
    free: FreeFn,
}

impl fmt::Debug for RawAlloc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawAlloc")
            .field("malloc", &(self.malloc as *const ()))
            .field("calloc", &(self.calloc as *const ()))
            .field("realloc", &(self.realloc as *const ()))
            .field("free", &(self.free as *const ()))
            .finish()
    }
}

/// Look up a single symbol, reporting `dlerror()` if it is missing.
///
/// # Safety
///
/// `F` must be a function pointer type matching the symbol's real signature.
unsafe fn lookup<F: Copy>(lookup: Lookup, symbol: &'static CStr) -> Result<F, Error> {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*mut c_void>());

    // SAFETY: clears any stale error so the message below belongs to us
    unsafe { libc::dlerror() };
    // SAFETY: `symbol` is NUL-terminated and the handle is a pseudo-handle
    let sym = unsafe { libc::dlsym(lookup.handle(), symbol.as_ptr()) };
    if sym.is_null() {
        return cold(|| {
            // SAFETY: `dlerror()` returns null or a NUL-terminated string
            let reason = unsafe {
                let msg = libc::dlerror();
                if msg.is_null() {
                    "symbol not found".to_owned()
                } else {
                    CStr::from_ptr(msg).to_string_lossy().into_owned()
                }
            };
            Err(Error::Unresolved {
                symbol: symbol.to_str().unwrap_or("?"),
                reason,
            })
        });
    }
    // SAFETY: non-null, and the caller vouches for the signature
    Ok(unsafe { mem::transmute_copy::<*mut c_void, F>(&sym) })
}

impl RawAlloc {
    /// Resolve all four primitives with `dlsym()`. Either every primitive
    /// resolves, or nothing is returned.
    pub fn resolve(how: Lookup) -> Result<Self, Error> {
        // SAFETY: each symbol is looked up as its C signature
        let raw = unsafe {
            Self {
                malloc: lookup::<MallocFn>(how, c"malloc")?,
                calloc: lookup::<CallocFn>(how, c"calloc")?,
                realloc: lookup::<ReallocFn>(how, c"realloc")?,
                free: lookup::<FreeFn>(how, c"free")?,
            }
        };
        debug!("resolved raw allocator via {how:?}: {raw:?}");
        Ok(raw)
    }

    /// The primitives this crate was linked against, with no lookup. Only
    /// correct if the redirection never replaces the libc symbols themselves.
    pub fn libc() -> Self {
        Self {
            malloc: libc::malloc,
            calloc: libc::calloc,
            realloc: libc::realloc,
            free: libc::free,
        }
    }

    /// Build a handle out of arbitrary primitives.
    ///
    /// # Safety
    ///
    /// - The four functions must behave like their C namesakes and agree with
    ///   each other: anything one of them returns must be accepted by
    ///   `realloc` and `free`.
    /// - None of them may call back into a [`Tracker`](crate::Tracker) that
    ///   uses this handle.
    pub const unsafe fn from_fns(
        malloc: MallocFn,
        calloc: CallocFn,
        realloc: ReallocFn,
        free: FreeFn,
    ) -> Self {
        Self {
            malloc,
            calloc,
            realloc,
            free,
        }
    }

    pub fn malloc(&self, size: usize) -> *mut c_void {
        // SAFETY: `malloc()` has no preconditions
        unsafe { (self.malloc)(size) }
    }

    pub fn calloc(&self, count: usize, size: usize) -> *mut c_void {
        // SAFETY: `calloc()` checks `count * size` for overflow itself
        unsafe { (self.calloc)(count, size) }
    }

    /// # Safety
    ///
    /// `ptr` must be null or a live block returned by this handle.
    pub unsafe fn realloc(&self, ptr: *mut c_void, size: usize) -> *mut c_void {
        unsafe { (self.realloc)(ptr, size) }
    }

    /// # Safety
    ///
    /// `ptr` must be null or a live block returned by this handle. It is
    /// dangling afterwards.
    pub unsafe fn free(&self, ptr: *mut c_void) {
        unsafe { (self.free)(ptr) }
    }
}

unsafe impl Allocator for RawAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.align() > MALLOC_ALIGN {
            return cold(|| Err(AllocError));
        }
        if layout.size() == 0 {
            // `malloc(0)` may legally return null, so never ask
            let dangling = layout.align() as *mut u8;
            let slice = ptr::slice_from_raw_parts_mut(dangling, 0);
            return NonNull::new(slice).ok_or(AllocError);
        }
        let data = self.malloc(layout.size()) as *mut u8;
        if data.is_null() {
            return cold(|| Err(AllocError));
        }
        let slice = ptr::slice_from_raw_parts_mut(data, layout.size());
        NonNull::new(slice).ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            // SAFETY: non-empty blocks only ever come from `self.malloc`
            unsafe { self.free(ptr.as_ptr() as *mut c_void) }
        }
    }
}
