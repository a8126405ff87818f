// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # layout-core
//!
//! Vocabulary types shared by every stage of the layout optimizer.
//!
//! This crate provides:
//! - [`ScalarKind`]: element kinds (f32, bf16, f16, u32, u16, u8).
//! - [`Shape`]: dimension lists and their collapsed 2-D / tile-padded views.
//! - [`TensorType`]: shape plus scalar kind; the memoization key for
//!   candidate layouts.
//! - [`Layout`]: page mode, placement, shard shape, grid and memory tier,
//!   with per-core scratch footprint computation.
//! - [`HardwareDesc`] / [`GridShape`]: worker-grid geometry and scratch
//!   capacity.
//!
//! # Design Goals
//! - Plain value types: `Clone + Eq + Ord + Hash + serde`, so they can key
//!   ordered maps and keep every downstream pass deterministic.
//! - Clean error types via `thiserror`.

mod dtype;
mod error;
mod grid;
mod layout;
mod shape;

pub use dtype::ScalarKind;
pub use error::LayoutError;
pub use grid::{GridShape, HardwareDesc};
pub use layout::{
    shard_shape_for, BufferTier, Layout, PageMode, Placement, ShardStrategy, TensorType,
};
pub use shape::{Shape, TILE_HEIGHT, TILE_WIDTH};
