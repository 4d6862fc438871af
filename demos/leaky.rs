//! Leaks a few blocks on purpose and reports them.
//!
//! ```text
//! RUST_LOG=leaktrack=debug cargo run --example leaky
//! LEAKTRACK_FORMAT=json cargo run --example leaky
//! ```

use leaktrack::{calloc, free, malloc, realloc};

fn main() {
    env_logger::init();
    leaktrack::init();

    let kept = malloc!(64);
    let table = calloc!(16, 8);
    let freed = malloc!(128);

    let grown = unsafe { realloc!(kept, 256) };
    unsafe { free!(freed) };

    let tracker = leaktrack::global();
    println!(
        "{} live allocations, {} bytes",
        tracker.live_count(),
        tracker.live_bytes()
    );

    match leaktrack::report_leaks() {
        Ok(n) => println!("{n} leaks reported"),
        Err(e) => eprintln!("could not report leaks: {e}"),
    }

    unsafe {
        free!(grown);
        free!(table);
        leaktrack::teardown();
    }
}
