// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for scratch occupancy tracking.

/// Errors that can occur while tracking scratch occupancy.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Admitting the tensor would exceed the per-core budget.
    #[error("out of scratch: requested {requested_bytes} bytes per core, but only {available_bytes} available (budget: {budget_bytes})")]
    OutOfScratch {
        requested_bytes: usize,
        available_bytes: usize,
        budget_bytes: usize,
    },

    /// The tensor is already live.
    #[error("tensor {0} is already live")]
    AlreadyLive(String),

    /// The tensor is not live.
    #[error("tensor {0} is not live")]
    NotLive(String),

    /// A budget string could not be parsed.
    #[error("invalid scratch budget '{0}': expected a number followed by an optional suffix (K, M)")]
    InvalidBudget(String),
}
