// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # optimizer
//!
//! The layout-and-memory optimization pass over a validated graph.
//!
//! The pass takes:
//! - A validated `Graph` from `graph-ir`.
//! - A `HardwareDesc` from `layout-core`.
//! - An [`OptimizerConfig`] with overrides and the memory layout policy.
//!
//! It runs the `layout-planner` analyses, then rewrites the graph in place:
//! every tensor gets exactly one layout, conversions are inserted where a
//! consumer needs another layout, and spilled values are moved to bulk
//! memory.
//!
//! # Type-State Pipeline
//! ```text
//! LayoutOptimizer<Configured> → LayoutOptimizer<Analyzed> → OptimizationReport
//! ```
//! Configuration errors are raised by `analyze`, which never mutates the
//! graph.
//!
//! # Tracing
//! Trace points go through an [`OptimizerObserver`]; the default
//! [`TracingObserver`] forwards them to `tracing`.

mod config;
mod error;
mod observer;
pub mod overrides;
mod pipeline;
mod report;
mod rewriter;

pub use config::{load_hardware, OptimizerConfig};
pub use error::OptimizerError;
pub use observer::{OptimizerObserver, TracingObserver};
pub use pipeline::{optimize, Analysis, Analyzed, Configured, LayoutOptimizer, OptimizerState};
pub use report::OptimizationReport;
pub use rewriter::{GraphRewriter, RewriteStats};
