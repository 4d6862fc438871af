//! Drives the tracker through the C ABI, the way a C program including
//! `leaktrack.h` with `LEAKTRACK_REDIRECT` would.

use std::{ffi::c_char, ptr};

use leaktrack::externc::*;

#[test]
fn c_program_lifecycle() {
    leaktrack_init();

    unsafe {
        let p = leaktrack_malloc(16, c"prog.c".as_ptr(), 10);
        let q = leaktrack_calloc(2, 32, c"prog.c".as_ptr(), 11);
        let r = leaktrack_malloc(8, ptr::null::<c_char>(), -5);
        assert!(!p.is_null() && !q.is_null() && !r.is_null());

        let tracker = leaktrack::global();
        let record = tracker.record(r).unwrap();
        assert_eq!((record.file, record.line), ("<unknown>", 0));
        assert_eq!(tracker.record(q).map(|r| r.size), Some(64));

        let p = leaktrack_realloc(p, 100, c"prog.c".as_ptr(), 12);
        assert_eq!(tracker.record(p).map(|r| (r.size, r.line)), Some((100, 12)));

        leaktrack_free(q, c"prog.c".as_ptr(), 13);
        assert_eq!(leaktrack_debug(), 2);

        leaktrack_free(p, c"prog.c".as_ptr(), 14);
        leaktrack_free(r, c"prog.c".as_ptr(), 15);
        assert_eq!(leaktrack_debug(), 0);

        leaktrack_destroy();
    }
    assert!(leaktrack::try_global().is_none());
}
