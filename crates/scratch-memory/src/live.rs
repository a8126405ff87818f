// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The set of tensors resident in scratch memory at a point in a schedule.
//!
//! A [`LiveSet`] is the bookkeeping half of a scratch allocator: it does not
//! hand out addresses, it only enforces that the summed per-core footprint of
//! every produced-but-unconsumed tensor stays within the [`ScratchBudget`].
//!
//! ```text
//!   try_admit(k, bytes) ──► live ──► release(k)   last consumer scheduled
//!                            │
//!                            └─────► evict(k)     moved to bulk memory
//! ```
//!
//! Zero-byte entries are allowed so that bulk-resident tensors can share the
//! same liveness bookkeeping; they never count against the budget.

use crate::{MemoryError, OccupancyStats, ScratchBudget};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy)]
struct Entry {
    bytes: usize,
    /// Admission sequence number; lower is older.
    seq: u64,
}

/// Tracks live tensors keyed by `K` against a per-core budget.
///
/// # Example
/// ```
/// use scratch_memory::{LiveSet, ScratchBudget};
///
/// let mut live = LiveSet::new(ScratchBudget::from_bytes(1000));
/// live.try_admit(1u32, 600).unwrap();
/// assert!(!live.fits(500));
/// live.release(1).unwrap();
/// assert!(live.fits(1000));
/// ```
#[derive(Clone)]
pub struct LiveSet<K: Ord + Copy + fmt::Debug> {
    budget: ScratchBudget,
    entries: BTreeMap<K, Entry>,
    occupancy: usize,
    next_seq: u64,
    stats: OccupancyStats,
}

impl<K: Ord + Copy + fmt::Debug> LiveSet<K> {
    pub fn new(budget: ScratchBudget) -> Self {
        Self {
            budget,
            entries: BTreeMap::new(),
            occupancy: 0,
            next_seq: 0,
            stats: OccupancyStats::default(),
        }
    }

    pub fn budget(&self) -> ScratchBudget {
        self.budget
    }

    /// Current per-core occupancy in bytes.
    pub fn occupancy(&self) -> usize {
        self.occupancy
    }

    pub fn available(&self) -> usize {
        self.budget.as_bytes().saturating_sub(self.occupancy)
    }

    /// Whether `bytes` more would stay within budget.
    pub fn fits(&self, bytes: usize) -> bool {
        bytes <= self.available()
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    /// Footprint of a live tensor.
    pub fn bytes_of(&self, key: K) -> Option<usize> {
        self.entries.get(&key).map(|e| e.bytes)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live keys, oldest admission first.
    pub fn oldest_first(&self) -> Vec<K> {
        let mut keys: Vec<(u64, K)> = self.entries.iter().map(|(k, e)| (e.seq, *k)).collect();
        keys.sort_unstable();
        keys.into_iter().map(|(_, k)| k).collect()
    }

    /// Admits `key` with a per-core footprint of `bytes`.
    pub fn try_admit(&mut self, key: K, bytes: usize) -> Result<(), MemoryError> {
        if self.entries.contains_key(&key) {
            return Err(MemoryError::AlreadyLive(format!("{key:?}")));
        }
        if !self.fits(bytes) {
            self.stats.record_rejection();
            return Err(MemoryError::OutOfScratch {
                requested_bytes: bytes,
                available_bytes: self.available(),
                budget_bytes: self.budget.as_bytes(),
            });
        }
        self.entries.insert(
            key,
            Entry {
                bytes,
                seq: self.next_seq,
            },
        );
        self.next_seq += 1;
        self.occupancy += bytes;
        self.stats.record_admission(self.occupancy);
        tracing::trace!(?key, bytes, occupancy = self.occupancy, "admitted");
        Ok(())
    }

    /// Removes `key` after its last consumer. Returns its footprint.
    pub fn release(&mut self, key: K) -> Result<usize, MemoryError> {
        let bytes = self.remove(key)?;
        self.stats.record_release();
        Ok(bytes)
    }

    /// Moves `key` out of scratch memory while it is still needed.
    ///
    /// The key stays tracked with a zero footprint so it is released
    /// normally once its consumers are done. Returns the bytes freed.
    pub fn evict(&mut self, key: K) -> Result<usize, MemoryError> {
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| MemoryError::NotLive(format!("{key:?}")))?;
        let freed = std::mem::take(&mut entry.bytes);
        self.occupancy -= freed;
        self.stats.record_eviction();
        tracing::trace!(?key, freed, occupancy = self.occupancy, "evicted");
        Ok(freed)
    }

    fn remove(&mut self, key: K) -> Result<usize, MemoryError> {
        let entry = self
            .entries
            .remove(&key)
            .ok_or_else(|| MemoryError::NotLive(format!("{key:?}")))?;
        self.occupancy -= entry.bytes;
        Ok(entry.bytes)
    }

    pub fn stats(&self) -> &OccupancyStats {
        &self.stats
    }

    pub fn peak(&self) -> usize {
        self.stats.peak_bytes
    }
}

impl<K: Ord + Copy + fmt::Debug> fmt::Debug for LiveSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSet")
            .field("budget", &self.budget)
            .field("live", &self.entries.len())
            .field("occupancy", &self.occupancy)
            .finish()
    }
}
