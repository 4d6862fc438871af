//! The C ABI, for programs that include `leaktrack.h`.
//!
//! `file` arguments must be null or point to a NUL-terminated string that
//! outlives the tracker, which `__FILE__` always does.

use std::ffi::{c_char, CStr};

use libc::{c_int, c_void, size_t};
use log::warn;

use crate::lifecycle;

const UNKNOWN_FILE: &str = "<unknown>";
const NON_UTF8_FILE: &str = "<non-utf8>";

/// Turn a C call site into the `(file, line)` the registry stores.
///
/// # Safety
///
/// `file` is null or a NUL-terminated string living for the rest of the
/// process.
unsafe fn call_site(file: *const c_char, line: c_int) -> (&'static str, u32) {
    let file = if file.is_null() {
        UNKNOWN_FILE
    } else {
        // SAFETY: passed on to the caller
        let file: &'static CStr = unsafe { CStr::from_ptr(file) };
        file.to_str().unwrap_or(NON_UTF8_FILE)
    };
    (file, u32::try_from(line).unwrap_or(0))
}

/// Resolve the real allocator and create the registry, configured from the
/// environment. Aborts on failure or if called twice.
#[no_mangle]
pub extern "C" fn leaktrack_init() {
    lifecycle::init();
}

/// Discard the registry. Nothing may be tracked afterwards.
///
/// # Safety
///
/// See [`lifecycle::teardown`].
#[no_mangle]
pub unsafe extern "C" fn leaktrack_destroy() {
    // SAFETY: passed on to the caller
    unsafe { lifecycle::teardown() }
}

/// Print every live allocation to stderr. Returns how many were printed.
#[no_mangle]
pub extern "C" fn leaktrack_debug() -> size_t {
    match lifecycle::report_leaks() {
        Ok(n) => n,
        Err(e) => {
            warn!("could not write leak report: {e}");
            0
        }
    }
}

/// # Safety
///
/// See [`call_site`].
#[no_mangle]
pub unsafe extern "C" fn leaktrack_malloc(
    size: size_t,
    file: *const c_char,
    line: c_int,
) -> *mut c_void {
    // SAFETY: passed on to the caller
    let (file, line) = unsafe { call_site(file, line) };
    lifecycle::global().malloc(size, file, line)
}

/// # Safety
///
/// See [`call_site`].
#[no_mangle]
pub unsafe extern "C" fn leaktrack_calloc(
    count: size_t,
    size: size_t,
    file: *const c_char,
    line: c_int,
) -> *mut c_void {
    // SAFETY: passed on to the caller
    let (file, line) = unsafe { call_site(file, line) };
    lifecycle::global().calloc(count, size, file, line)
}

/// # Safety
///
/// `ptr` must be null or live, and see [`call_site`].
#[no_mangle]
pub unsafe extern "C" fn leaktrack_realloc(
    ptr: *mut c_void,
    size: size_t,
    file: *const c_char,
    line: c_int,
) -> *mut c_void {
    // SAFETY: passed on to the caller
    unsafe {
        let (file, line) = call_site(file, line);
        lifecycle::global().realloc(ptr, size, file, line)
    }
}

/// # Safety
///
/// `ptr` must be null or live, and see [`call_site`].
#[no_mangle]
pub unsafe extern "C" fn leaktrack_free(ptr: *mut c_void, file: *const c_char, line: c_int) {
    // SAFETY: passed on to the caller
    unsafe {
        let (file, line) = call_site(file, line);
        lifecycle::global().free(ptr, file, line)
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    #[test]
    fn call_site_conversion() {
        unsafe {
            assert_eq!(call_site(c"main.c".as_ptr(), 12), ("main.c", 12));
            assert_eq!(call_site(ptr::null(), 3), (UNKNOWN_FILE, 3));
            assert_eq!(call_site(c"main.c".as_ptr(), -1), ("main.c", 0));

            static BAD: [u8; 4] = [b'a', 0xff, b'c', 0];
            assert_eq!(call_site(BAD.as_ptr().cast(), 1), (NON_UTF8_FILE, 1));
        }
    }
}
