//! Façade macros. Each one captures `file!()` and `line!()` at the call site
//! and goes through [`global()`](crate::global), unless given a tracker with
//! `in`:
//!
//! ```ignore
//! let p = leaktrack::malloc!(64);
//! let q = leaktrack::malloc!(in tracker, 64);
//! ```
//!
//! `realloc!` and `free!` expand to unsafe calls and must be used inside an
//! `unsafe` block.

/// Tracked `malloc`. See [`Tracker::malloc`](crate::Tracker::malloc).
#[macro_export]
macro_rules! malloc {
    (in $tracker:expr, $size:expr $(,)?) => {
        ($tracker).malloc($size, ::core::file!(), ::core::line!())
    };
    ($size:expr $(,)?) => {
        $crate::global().malloc($size, ::core::file!(), ::core::line!())
    };
}

/// Tracked `calloc`. See [`Tracker::calloc`](crate::Tracker::calloc).
#[macro_export]
macro_rules! calloc {
    (in $tracker:expr, $count:expr, $size:expr $(,)?) => {
        ($tracker).calloc($count, $size, ::core::file!(), ::core::line!())
    };
    ($count:expr, $size:expr $(,)?) => {
        $crate::global().calloc($count, $size, ::core::file!(), ::core::line!())
    };
}

/// Tracked `realloc`. See [`Tracker::realloc`](crate::Tracker::realloc).
#[macro_export]
macro_rules! realloc {
    (in $tracker:expr, $ptr:expr, $size:expr $(,)?) => {
        ($tracker).realloc($ptr, $size, ::core::file!(), ::core::line!())
    };
    ($ptr:expr, $size:expr $(,)?) => {
        $crate::global().realloc($ptr, $size, ::core::file!(), ::core::line!())
    };
}

/// Tracked `free`. See [`Tracker::free`](crate::Tracker::free).
#[macro_export]
macro_rules! free {
    (in $tracker:expr, $ptr:expr $(,)?) => {
        ($tracker).free($ptr, ::core::file!(), ::core::line!())
    };
    ($ptr:expr $(,)?) => {
        $crate::global().free($ptr, ::core::file!(), ::core::line!())
    };
}

#[cfg(test)]
mod tests {
    use crate::{Config, RawAlloc, Tracker};

    #[test]
    fn macros_capture_call_site() {
        let tracker = Tracker::new(RawAlloc::libc(), &Config::default());

        let line = line!() + 1;
        let p = crate::malloc!(in tracker, 24);
        let record = tracker.record(p).unwrap();
        assert_eq!(record.file, file!());
        assert_eq!(record.line, line);
        assert_eq!(record.size, 24);

        let line = line!() + 1;
        let q = unsafe { crate::realloc!(in &tracker, p, 48) };
        assert_eq!(tracker.record(q).map(|r| (r.size, r.line)), Some((48, line)));

        let z = crate::calloc!(in tracker, 4, 8);
        assert_eq!(tracker.record(z).map(|r| r.size), Some(32));

        unsafe {
            crate::free!(in tracker, q);
            crate::free!(in tracker, z);
        }
        assert_eq!(tracker.live_count(), 0);
    }
}
