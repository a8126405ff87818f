// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Candidate layout enumeration.
//!
//! For each distinct [`TensorType`] the enumerator produces every layout
//! the worker grid can host, in preference order:
//!
//! ```text
//! per page mode (tiled, then row-major if enabled):
//!   1. bulk interleaved                      always legal
//!   2. sharded, most cores first             block > height > width on ties
//!   3. on-chip interleaved over the grid
//! ```
//!
//! Scratch candidates whose per-core footprint exceeds the usable capacity
//! are dropped. Results are memoized per tensor type.

use crate::PlannerError;
use layout_core::{GridShape, HardwareDesc, Layout, PageMode, ShardStrategy, TensorType};
use std::collections::{BTreeMap, BTreeSet};

/// Candidate layouts per distinct tensor type.
pub type LayoutSpace = BTreeMap<TensorType, Vec<Layout>>;

/// Enumerates and memoizes candidate layouts.
#[derive(Debug, Clone)]
pub struct LayoutSpaceEnumerator {
    hw: HardwareDesc,
    row_major_enabled: bool,
    grids: Vec<GridShape>,
    cache: LayoutSpace,
}

impl LayoutSpaceEnumerator {
    pub fn new(hw: &HardwareDesc, row_major_enabled: bool) -> Self {
        Self {
            hw: hw.clone(),
            row_major_enabled,
            grids: shard_grids(hw.worker_grid),
            cache: BTreeMap::new(),
        }
    }

    /// Candidate layouts for `tensor`, computed once per distinct type.
    pub fn enumerate(&mut self, tensor: &TensorType) -> Result<&[Layout], PlannerError> {
        if !self.cache.contains_key(tensor) {
            let layouts = self.compute(tensor);
            if layouts.is_empty() {
                return Err(PlannerError::EmptyLayoutSpace {
                    tensor: tensor.to_string(),
                });
            }
            tracing::trace!("{tensor}: {} candidate layouts", layouts.len());
            self.cache.insert(tensor.clone(), layouts);
        }
        Ok(self.cache.get(tensor).map(Vec::as_slice).unwrap_or_default())
    }

    /// Enumerates every type in `types` and returns the whole space.
    pub fn build<'a>(
        mut self,
        types: impl IntoIterator<Item = &'a TensorType>,
    ) -> Result<LayoutSpace, PlannerError> {
        for t in types {
            self.enumerate(t)?;
        }
        Ok(self.cache)
    }

    fn compute(&self, tensor: &TensorType) -> Vec<Layout> {
        if tensor.shape.is_degenerate() {
            return Vec::new();
        }
        let capacity = self.hw.usable_scratch_bytes();
        let fits = |l: &Layout| l.scratch_bytes_per_core(&tensor.shape) <= capacity;

        let mut page_modes = vec![PageMode::Tiled];
        if self.row_major_enabled {
            page_modes.push(PageMode::RowMajor);
        }

        let mut out = Vec::new();
        for page_mode in page_modes {
            out.push(Layout::bulk_interleaved(tensor, page_mode));
            out.extend(
                self.grids
                    .iter()
                    .filter_map(|&g| Layout::sharded(tensor, page_mode, g))
                    .filter(fits),
            );
            let interleaved = Layout::on_chip_interleaved(tensor, page_mode, self.hw.worker_grid);
            if fits(&interleaved) {
                out.push(interleaved);
            }
        }
        out
    }
}

/// Every shard grid the worker grid supports, most cores first.
///
/// Height grids are `n × 1` and width grids `1 × n` for `n` up to the core
/// count; block grids are `r × c` inside the worker grid. Grids with a
/// single row or column are classified as height or width.
fn shard_grids(worker: GridShape) -> Vec<GridShape> {
    let volume = worker.volume();
    let mut grids = BTreeSet::new();
    for n in 1..=volume {
        grids.insert(GridShape::new(n, 1));
        grids.insert(GridShape::new(1, n));
    }
    for r in 2..=worker.rows {
        for c in 2..=worker.cols {
            grids.insert(GridShape::new(r, c));
        }
    }

    let rank = |g: &GridShape| match (g.rows, g.cols) {
        (_, 1) => ShardStrategy::Height,
        (1, _) => ShardStrategy::Width,
        _ => ShardStrategy::Block,
    };
    let order = |s: ShardStrategy| match s {
        ShardStrategy::Block => 0,
        ShardStrategy::Height => 1,
        ShardStrategy::Width => 2,
    };
    let mut grids: Vec<GridShape> = grids.into_iter().collect();
    grids.sort_by_key(|g| (std::cmp::Reverse(g.volume()), order(rank(g)), std::cmp::Reverse(g.rows)));
    grids
}
