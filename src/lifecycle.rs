//! The process-wide tracker: created once by [`init`], destroyed once by
//! [`teardown`].
//!
//! Every façade entry point that doesn't take an explicit [`Tracker`] (the
//! macros and the C ABI) goes through [`global`]. Using it before `init` or
//! after `teardown` is a precondition violation and aborts the process.

use std::{
    cell::UnsafeCell,
    io::{self, Write},
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

use log::{debug, warn};

use crate::{util::print::fatal, Config, Error, Lookup, RawAlloc, Tracker};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// Nothing has been set up yet
    Uninit,
    /// Resolving the real allocator and building the registry
    Initializing,
    Init,
    /// Torn down. There is no way back from here.
    TornDown,
}

impl State {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => State::Uninit,
            1 => State::Initializing,
            2 => State::Init,
            _ => State::TornDown,
        }
    }
}

/// A once-initialised, once-destroyed slot for a [`Tracker`] whose state can
/// be polled at any point, including mid-initialisation.
pub(crate) struct TrackerCell {
    cell: UnsafeCell<MaybeUninit<Tracker>>,
    state: AtomicU8,
}

// SAFETY: the tracker is only written while `state` is `Initializing`, which
// exactly one thread can observe, and only read once `Init` is published.
unsafe impl Sync for TrackerCell {}

impl TrackerCell {
    pub(crate) const fn new() -> Self {
        Self {
            cell: UnsafeCell::new(MaybeUninit::uninit()),
            state: AtomicU8::new(State::Uninit as u8),
        }
    }

    pub(crate) fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn try_init(&self, config: &Config) -> Result<&Tracker, Error> {
        self.try_init_from(config, RawAlloc::resolve)
    }

    /// Initialise with the raw allocator `resolve` finds for `config.lookup`.
    ///
    /// A failed resolution leaves the cell `Uninit`: nothing was set up, and a
    /// later call resolves again from scratch.
    fn try_init_from(
        &self,
        config: &Config,
        resolve: impl FnOnce(Lookup) -> Result<RawAlloc, Error>,
    ) -> Result<&Tracker, Error> {
        if let Err(current) = self.state.compare_exchange(
            State::Uninit as u8,
            State::Initializing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(match State::from_u8(current) {
                State::TornDown => Error::TornDown,
                _ => Error::AlreadyInitialized,
            });
        }

        let tracker = match resolve(config.lookup) {
            Ok(raw) => Tracker::new(raw, config),
            Err(e) => {
                self.state.store(State::Uninit as u8, Ordering::Release);
                return Err(e);
            }
        };
        // SAFETY: we won the race to `Initializing`, nobody else touches the cell
        unsafe { (*self.cell.get()).write(tracker) };
        self.state.store(State::Init as u8, Ordering::Release);
        debug!("tracker initialized with {config:?}");

        // SAFETY: just written
        Ok(unsafe { self.assume_init() })
    }

    /// # Safety
    ///
    /// The state must be `Init`.
    unsafe fn assume_init(&self) -> &Tracker {
        // This borrow is not needless
        #[allow(clippy::needless_borrow)]
        unsafe {
            (&*self.cell.get()).assume_init_ref()
        }
    }

    pub(crate) fn get(&self) -> Option<&Tracker> {
        match self.state() {
            // SAFETY: `Init` is only published after the write
            State::Init => Some(unsafe { self.assume_init() }),
            _ => None,
        }
    }

    /// Move the tracker out and mark the cell as torn down.
    ///
    /// # Safety
    ///
    /// No reference handed out by [`get`](Self::get) or
    /// [`try_init`](Self::try_init) may be used afterwards.
    pub(crate) unsafe fn take(&self) -> Option<Tracker> {
        self.state
            .compare_exchange(
                State::Init as u8,
                State::TornDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()?;
        // SAFETY: it was `Init`, and the state change means this is the only read
        Some(unsafe { (*self.cell.get()).assume_init_read() })
    }
}

static TRACKER: TrackerCell = TrackerCell::new();

/// Set up the process-wide tracker from the environment
/// ([`Config::from_env`]). See [`init_with`].
pub fn init() -> &'static Tracker {
    init_with(Config::from_env())
}

/// Resolve the real allocator and create the empty registry.
///
/// Must be called exactly once, before any allocation goes through the
/// macros or the C ABI. If the real allocator can't be resolved, or this is
/// not the first call, a diagnostic is written to stderr and the process
/// aborts.
pub fn init_with(config: Config) -> &'static Tracker {
    match try_init_with(config) {
        Ok(tracker) => tracker,
        Err(e) => fatal(format_args!("init failed: {e}")),
    }
}

/// [`init_with`], but handing the failure back instead of aborting.
///
/// Only a successful call counts as the one-time initialisation. If the real
/// allocator can't be resolved the tracker stays uninitialised and this may
/// be called again.
pub fn try_init_with(config: Config) -> Result<&'static Tracker, Error> {
    TRACKER.try_init(&config)
}

/// Lifecycle state of the process-wide tracker
pub fn state() -> State {
    TRACKER.state()
}

/// The process-wide tracker, if it is currently initialized
pub fn try_global() -> Option<&'static Tracker> {
    TRACKER.get()
}

/// The process-wide tracker. Aborts if [`init`] hasn't run yet or
/// [`teardown`] already has.
pub fn global() -> &'static Tracker {
    match TRACKER.get() {
        Some(tracker) => tracker,
        None => fatal(format_args!(
            "allocation tracked while {:?}; call leaktrack::init() first",
            TRACKER.state()
        )),
    }
}

/// Report the process-wide tracker's leaks to stderr. Must happen before
/// [`teardown`], which discards them.
pub fn report_leaks() -> io::Result<usize> {
    global().report_leaks()
}

/// Destroy the process-wide registry, freeing all of its bookkeeping.
///
/// Records still in the registry are dropped without being reported unless
/// [`Config::report_on_teardown`] is set. The tracked blocks themselves are
/// left alone.
///
/// # Safety
///
/// No other thread may be inside a tracked operation, and no reference
/// returned by [`init`], [`global`] or friends may be used afterwards.
pub unsafe fn teardown() {
    // SAFETY: passed on to the caller
    let Some(tracker) = (unsafe { TRACKER.take() }) else {
        fatal(format_args!("teardown while {:?}", TRACKER.state()));
    };
    retire(tracker, io::stderr().lock());
}

/// Report to `out` if the config asks for it, then drop the tracker and its
/// registry.
fn retire<W: Write>(tracker: Tracker, out: W) {
    if tracker.config().report_on_teardown {
        if let Err(e) = tracker.report_leaks_to(out, tracker.config().format) {
            warn!("could not write leak report: {e}");
        }
    }
    debug!("tearing down, discarding {} records", tracker.live_count());
    drop(tracker);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            lookup: crate::Lookup::Default,
            ..Config::default()
        }
    }

    #[test]
    fn cell_goes_through_every_state() {
        let cell = TrackerCell::new();
        assert_eq!(cell.state(), State::Uninit);
        assert!(cell.get().is_none());

        let tracker = cell.try_init(&config()).unwrap();
        let p = tracker.malloc(16, "a.c", 1);
        assert_eq!(cell.state(), State::Init);
        assert_eq!(cell.get().map(Tracker::live_count), Some(1));

        let tracker = unsafe { cell.take() }.unwrap();
        assert_eq!(cell.state(), State::TornDown);
        assert!(cell.get().is_none());
        unsafe { tracker.free(p, "a.c", 2) };
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn second_init_is_refused() {
        let cell = TrackerCell::new();
        cell.try_init(&config()).unwrap();
        assert_eq!(cell.try_init(&config()).err(), Some(Error::AlreadyInitialized));
        drop(unsafe { cell.take() });
    }

    #[test]
    fn torn_down_cell_stays_down() {
        let cell = TrackerCell::new();
        cell.try_init(&config()).unwrap();
        drop(unsafe { cell.take() });

        assert_eq!(cell.try_init(&config()).err(), Some(Error::TornDown));
        assert!(unsafe { cell.take() }.is_none());
    }

    #[test]
    fn failed_resolution_can_be_retried() {
        let cell = TrackerCell::new();
        let err = cell
            .try_init_from(&config(), |_| {
                Err(Error::Unresolved {
                    symbol: "malloc",
                    reason: "gone".to_owned(),
                })
            })
            .err();
        assert!(matches!(err, Some(Error::Unresolved { symbol: "malloc", .. })));
        assert_eq!(cell.state(), State::Uninit);
        assert!(cell.get().is_none());

        cell.try_init_from(&config(), |_| Ok(RawAlloc::libc())).unwrap();
        assert_eq!(cell.state(), State::Init);
        drop(unsafe { cell.take() });
    }

    #[test]
    fn teardown_reports_only_when_asked() {
        for report_on_teardown in [false, true] {
            let cell = TrackerCell::new();
            let config = Config {
                report_on_teardown,
                ..config()
            };
            let tracker = cell.try_init(&config).unwrap();
            let p = tracker.malloc(16, "exit.c", 9);
            let raw = tracker.raw();

            let mut out = Vec::new();
            retire(unsafe { cell.take() }.unwrap(), &mut out);
            unsafe { raw.free(p) };

            let out = String::from_utf8(out).unwrap();
            if report_on_teardown {
                assert_eq!(
                    out,
                    format!("LEAK: {p:p}. Allocation in file exit.c on line 9 of size 16b.\n")
                );
            } else {
                assert!(out.is_empty());
            }
        }
    }

    #[test]
    fn uninitialized_cell_has_nothing_to_take() {
        let cell = TrackerCell::new();
        assert!(unsafe { cell.take() }.is_none());
        assert_eq!(cell.state(), State::Uninit);
    }
}
