// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # scratch-memory
//!
//! Occupancy accounting for the small per-core scratch memory.
//!
//! # Key Components
//!
//! - [`ScratchBudget`]: the usable per-core capacity, with human-readable
//!   parsing (`"1464K"`, `"1M"`).
//! - [`LiveSet`]: tensors produced but not yet fully consumed, with their
//!   per-core footprint. Admission fails instead of overcommitting.
//! - [`OccupancyStats`]: admissions, evictions and the peak footprint.
//!
//! The memory scheduler owns one `LiveSet` per function it schedules; the
//! live set is what makes the capacity invariant checkable at every step.

mod budget;
mod error;
mod live;
mod stats;

pub use budget::ScratchBudget;
pub use error::MemoryError;
pub use live::LiveSet;
pub use stats::OccupancyStats;
