// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for layout planning.

/// Errors that can occur while enumerating, legalizing or scheduling.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// A tensor type admits no layout at all.
    #[error("no layout exists for {tensor}")]
    EmptyLayoutSpace { tensor: String },

    /// A node was left without a legal candidate.
    #[error("node '{node}' has no legal layout: {detail}")]
    NoCandidates { node: String, detail: String },

    /// A node whose layout is forced cannot be placed in scratch memory.
    #[error("node '{node}' needs {required_bytes} bytes per core, only {available_bytes} can be freed")]
    CapacityExceeded {
        node: String,
        required_bytes: usize,
        available_bytes: usize,
    },

    /// A policy produced an inconsistent plan.
    #[error("policy '{policy}' produced an invalid plan: {detail}")]
    InvalidPlan { policy: String, detail: String },

    /// Occupancy bookkeeping failed.
    #[error("scratch bookkeeping error: {0}")]
    Memory(#[from] scratch_memory::MemoryError),
}
