//! A ptr -> record map whose every byte lives in [`RawAlloc`] memory.

use std::ffi::c_void;

use ahash::RandomState;
use allocator_api2::{alloc::AllocError, boxed::Box};
use hashbrown::HashMap;

use super::raw::RawAlloc;

/// Where and how big a live tracked allocation is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocRecord {
    /// Bytes requested by the call site
    pub size: usize,
    /// `file!()`/`__FILE__` of the call site. Borrowed from the binary, never
    /// owned by the record.
    pub file: &'static str,
    pub line: u32,
}

type Map = HashMap<usize, Box<AllocRecord, RawAlloc>, RandomState, RawAlloc>;

// Fixed seeds: `RandomState::new()` may allocate through the global
// allocator to fetch entropy.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Live allocations, keyed by their address.
///
/// Records and table storage are both allocated with the [`RawAlloc`] the
/// registry was built with, so mutating the registry can never re-enter it.
pub struct Registry {
    map: Map,
    raw: RawAlloc,
}

impl Registry {
    pub fn with_capacity_in(capacity: usize, raw: RawAlloc) -> Self {
        let hasher = RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]);
        Self {
            map: HashMap::with_capacity_and_hasher_in(capacity, hasher, raw),
            raw,
        }
    }

    /// Record `address`. Returns the record that was there before, if the
    /// address was (unexpectedly) already live; its storage has been freed.
    ///
    /// # Errors
    ///
    /// [`AllocError`] if the record or a bigger table could not be allocated.
    /// The registry is unchanged in that case.
    pub fn put(
        &mut self,
        address: *const c_void,
        record: AllocRecord,
    ) -> Result<Option<AllocRecord>, AllocError> {
        self.map.try_reserve(1).map_err(|_| AllocError)?;
        let boxed = Box::try_new_in(record, self.raw)?;
        Ok(self.map.insert(address as usize, boxed).map(|old| *old))
    }

    /// Forget `address`. Absent addresses are fine: they were never tracked.
    pub fn remove(&mut self, address: *const c_void) -> Option<AllocRecord> {
        self.map.remove(&(address as usize)).map(|old| *old)
    }

    pub fn get(&self, address: *const c_void) -> Option<&AllocRecord> {
        self.map.get(&(address as usize)).map(|b| &**b)
    }

    /// Every live `(address, record)` pair, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (*const c_void, &AllocRecord)> + '_ {
        self.map
            .iter()
            .map(|(&address, record)| (address as *const c_void, &**record))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sum of the sizes of every live record
    pub fn live_bytes(&self) -> usize {
        self.map.values().map(|r| r.size).sum()
    }
}
