//! Call-site leak tracking for C-style heap allocation.
//!
//! Every allocation that goes through the façade is remembered with the
//! file and line that asked for it, and forgotten again when it's freed.
//! Whatever is still remembered when [`report_leaks`] runs is printed as a
//! leak:
//!
//! ```text
//! LEAK: 0x55d4c3a0b2a0. Allocation in file main.c on line 12 of size 64b.
//! ```
//!
//! The real allocator is resolved once, with `dlsym`, and the registry keeps
//! all of its own bookkeeping in memory obtained straight from it. Nothing
//! the tracker does internally can land back in the tracked path.
//!
//! From Rust, either build a [`Tracker`] and call it directly, or [`init`]
//! the process-wide one and use the [`malloc!`], [`calloc!`], [`realloc!`]
//! and [`free!`] macros, which capture `file!()` and `line!()`. From C,
//! include `leaktrack.h`.

pub mod alloc;
pub mod config;
mod error;
pub mod externc;
pub mod lifecycle;
mod macros;
mod serialize;
mod util;

pub use alloc::{
    raw::{Lookup, RawAlloc},
    registry::{AllocRecord, Registry},
    report::{write_leaks, Leak, Leaks, ReportFormat},
    tracker::Tracker,
};
pub use config::Config;
pub use error::Error;
pub use lifecycle::{global, init, init_with, report_leaks, teardown, try_global, try_init_with};
