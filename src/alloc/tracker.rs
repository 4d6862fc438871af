//! The tracking façade: `malloc`/`calloc`/`realloc`/`free` with a registry
//! update wrapped around each call to the real allocator.
//!
//! A [`Tracker`] is an ordinary value. The process-wide one lives in
//! [`lifecycle`](crate::lifecycle), but tests and embedders can build as many
//! independent trackers as they like.
//!
//! The registry lock is only ever held around registry access. The delegated
//! call to the real allocator always happens outside of it, so unrelated
//! allocation traffic is never serialised behind the bookkeeping.

use std::{
    ffi::c_void,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{debug, trace, warn};

use super::{
    raw::RawAlloc,
    registry::{AllocRecord, Registry},
};
use crate::{Config, Error};

pub struct Tracker {
    raw: RawAlloc,
    registry: Mutex<Registry>,
    config: Config,
}

impl Tracker {
    /// A tracker with an empty registry, delegating to `raw`.
    pub fn new(raw: RawAlloc, config: &Config) -> Self {
        debug!(
            "new tracker, initial capacity {}, backed by {raw:?}",
            config.initial_capacity
        );
        Self {
            raw,
            registry: Mutex::new(Registry::with_capacity_in(config.initial_capacity, raw)),
            config: *config,
        }
    }

    /// Resolve the real allocator as `config` says, then build a tracker on it.
    pub fn resolve(config: &Config) -> Result<Self, Error> {
        let raw = RawAlloc::resolve(config.lookup)?;
        Ok(Self::new(raw, config))
    }

    /// The untracked allocator underneath this tracker
    pub fn raw(&self) -> RawAlloc {
        self.raw
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        // Nothing panics while holding the lock, but a poisoned registry is
        // still consistent: every mutation is a single map operation.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, ptr: *mut c_void, size: usize, file: &'static str, line: u32) {
        let record = AllocRecord { size, file, line };
        match self.registry().put(ptr, record) {
            Ok(None) => {}
            Ok(Some(stale)) => warn!(
                "{ptr:p} handed out while still tracked from {}:{}, replacing",
                stale.file, stale.line
            ),
            Err(_) => warn!(
                "no memory for bookkeeping, {ptr:p} ({size}b at {file}:{line}) is untracked"
            ),
        }
    }

    /// `malloc(size)`, remembering the call site if it succeeds.
    pub fn malloc(&self, size: usize, file: &'static str, line: u32) -> *mut c_void {
        let ptr = self.raw.malloc(size);
        trace!("malloc({size}) = {ptr:p} at {file}:{line}");
        if !ptr.is_null() {
            self.track(ptr, size, file, line);
        }
        ptr
    }

    /// `calloc(count, size)`, remembering the call site if it succeeds.
    pub fn calloc(
        &self,
        count: usize,
        size: usize,
        file: &'static str,
        line: u32,
    ) -> *mut c_void {
        let ptr = self.raw.calloc(count, size);
        trace!("calloc({count}, {size}) = {ptr:p} at {file}:{line}");
        if !ptr.is_null() {
            // `calloc()` fails on overflow, so this product is exact
            self.track(ptr, count.saturating_mul(size), file, line);
        }
        ptr
    }

    /// `realloc(ptr, size)`.
    ///
    /// On success the record for `ptr` (if any) is replaced by one for the
    /// returned block. On failure `ptr` is still live and keeps its record.
    /// A null `ptr` is a plain allocation, and a null result for a size of
    /// zero means the block was freed, so its record is dropped.
    ///
    /// The old record is taken out of the registry before the real `realloc`
    /// runs and only put back (or replaced) once it returns. While the call is
    /// in flight the block is live but untracked: [`leaks`](Self::leaks),
    /// [`record`](Self::record) and [`live_count`](Self::live_count) on other
    /// threads won't see it. It can't be removed afterwards instead: once a
    /// relocating `realloc` returns, the old address may already have been
    /// handed to another thread, whose record would then be dropped.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this tracker's real allocator.
    pub unsafe fn realloc(
        &self,
        ptr: *mut c_void,
        size: usize,
        file: &'static str,
        line: u32,
    ) -> *mut c_void {
        // Taken out up front: once a relocating realloc returns, the old
        // address may already belong to another thread's fresh allocation.
        let old = if ptr.is_null() {
            None
        } else {
            self.registry().remove(ptr)
        };

        // SAFETY: passed on to the caller
        let new = unsafe { self.raw.realloc(ptr, size) };
        trace!("realloc({ptr:p}, {size}) = {new:p} at {file}:{line}");

        if new.is_null() {
            if size == 0 && !ptr.is_null() {
                // `realloc(ptr, 0)` freed the block
                return new;
            }
            if let Some(old) = old {
                if self.registry().put(ptr, old).is_err() {
                    warn!("no memory for bookkeeping, {ptr:p} is untracked after failed realloc");
                }
            }
            return new;
        }

        self.track(new, size, file, line);
        new
    }

    /// Forget `ptr`, then `free()` it. Untracked and null pointers are passed
    /// straight through.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this tracker's real allocator.
    pub unsafe fn free(&self, ptr: *mut c_void, file: &'static str, line: u32) {
        if !ptr.is_null() && self.registry().remove(ptr).is_none() {
            trace!("free({ptr:p}) of an untracked block at {file}:{line}");
        } else {
            trace!("free({ptr:p}) at {file}:{line}");
        }
        // SAFETY: passed on to the caller
        unsafe { self.raw.free(ptr) }
    }

    /// The record for `ptr`, if it is live and tracked
    pub fn record(&self, ptr: *const c_void) -> Option<AllocRecord> {
        self.registry().get(ptr).copied()
    }

    /// Number of live tracked allocations
    pub fn live_count(&self) -> usize {
        self.registry().len()
    }

    /// Bytes held by live tracked allocations
    pub fn live_bytes(&self) -> usize {
        self.registry().live_bytes()
    }
}
