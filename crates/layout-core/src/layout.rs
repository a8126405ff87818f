// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor types and physical layouts.
//!
//! A [`Layout`] pins down everything the device needs to address a tensor:
//! the page arrangement, where the pages live (sharded across a core grid,
//! interleaved over all cores, or interleaved in bulk memory), the shard
//! shape and the memory tier.
//!
//! ```text
//!            ┌──────────── Scratch tier ─────────────┐  ┌─ Bulk tier ─┐
//! placement: OnChipSharded        OnChipInterleaved      BulkInterleaved
//! cost:      shard bytes          ceil(pages/cores)×page        0
//! ```

use crate::{GridShape, ScalarKind, Shape, TILE_HEIGHT, TILE_WIDTH};
use std::fmt;

/// How a tensor's elements are grouped into pages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PageMode {
    /// 32×32 tiles.
    Tiled,
    /// One row per page.
    RowMajor,
}

impl PageMode {
    /// Accepts `tile`/`tiled` and `row_major`/`rm`.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tile" | "tiled" => Some(Self::Tiled),
            "row_major" | "rowmajor" | "rm" => Some(Self::RowMajor),
            _ => None,
        }
    }
}

/// Where a tensor's pages are placed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    OnChipSharded,
    OnChipInterleaved,
    BulkInterleaved,
}

/// The memory tier backing a tensor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BufferTier {
    /// Small on-chip memory with a hard per-core budget.
    Scratch,
    /// Large off-chip memory.
    Bulk,
}

impl BufferTier {
    /// Accepts the device names (`l1`, `dram`) as well as the tier names.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "l1" | "scratch" => Some(Self::Scratch),
            "dram" | "bulk" => Some(Self::Bulk),
            _ => None,
        }
    }
}

/// How a sharded tensor is cut across its grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardStrategy {
    /// Rows split over an `n × 1` grid.
    Height,
    /// Columns split over a `1 × n` grid.
    Width,
    /// Rows and columns split over an `r × c` grid.
    Block,
}

impl ShardStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Height => "height_sharded",
            Self::Width => "width_sharded",
            Self::Block => "block_sharded",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "height" | "height_sharded" => Some(Self::Height),
            "width" | "width_sharded" => Some(Self::Width),
            "block" | "block_sharded" => Some(Self::Block),
            _ => None,
        }
    }
}

/// A tensor's logical type: shape plus element kind.
///
/// Structurally equal types share one candidate layout list.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TensorType {
    pub shape: Shape,
    pub scalar_kind: ScalarKind,
}

impl TensorType {
    pub fn new(shape: impl Into<Shape>, scalar_kind: ScalarKind) -> Self {
        Self {
            shape: shape.into(),
            scalar_kind,
        }
    }

    /// Returns the same shape with a different element kind.
    pub fn with_scalar_kind(&self, scalar_kind: ScalarKind) -> Self {
        Self {
            shape: self.shape.clone(),
            scalar_kind,
        }
    }

    /// Dense size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.scalar_kind)
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor<{}x{}>", self.shape, self.scalar_kind)
    }
}

/// A physical tensor layout.
///
/// `grid` is the block of cores the tensor is spread over (the whole worker
/// grid for on-chip interleaved, a single core for bulk). `shard_shape` is
/// the per-core shard for sharded layouts and the page shape otherwise.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Layout {
    pub page_mode: PageMode,
    pub placement: Placement,
    pub buffer_tier: BufferTier,
    pub grid: GridShape,
    pub shard_shape: [usize; 2],
    pub scalar_kind: ScalarKind,
}

impl Layout {
    /// Interleaved in bulk memory. Always legal.
    pub fn bulk_interleaved(tensor: &TensorType, page_mode: PageMode) -> Self {
        Self {
            page_mode,
            placement: Placement::BulkInterleaved,
            buffer_tier: BufferTier::Bulk,
            grid: GridShape::unit(),
            shard_shape: page_shape(&tensor.shape, page_mode),
            scalar_kind: tensor.scalar_kind,
        }
    }

    /// Interleaved over every core of `grid`, in scratch memory.
    pub fn on_chip_interleaved(tensor: &TensorType, page_mode: PageMode, grid: GridShape) -> Self {
        Self {
            page_mode,
            placement: Placement::OnChipInterleaved,
            buffer_tier: BufferTier::Scratch,
            grid,
            shard_shape: page_shape(&tensor.shape, page_mode),
            scalar_kind: tensor.scalar_kind,
        }
    }

    /// Sharded over `grid`, or `None` if the shape does not divide evenly.
    pub fn sharded(tensor: &TensorType, page_mode: PageMode, grid: GridShape) -> Option<Self> {
        let shard_shape = shard_shape_for(&tensor.shape, page_mode, grid)?;
        Some(Self {
            page_mode,
            placement: Placement::OnChipSharded,
            buffer_tier: BufferTier::Scratch,
            grid,
            shard_shape,
            scalar_kind: tensor.scalar_kind,
        })
    }

    pub fn is_sharded(&self) -> bool {
        self.placement == Placement::OnChipSharded
    }

    pub fn is_scratch(&self) -> bool {
        self.buffer_tier == BufferTier::Scratch
    }

    pub fn is_tiled(&self) -> bool {
        self.page_mode == PageMode::Tiled
    }

    /// The cut used by a sharded layout.
    pub fn shard_strategy(&self) -> Option<ShardStrategy> {
        if !self.is_sharded() {
            return None;
        }
        Some(match (self.grid.rows, self.grid.cols) {
            (_, 1) => ShardStrategy::Height,
            (1, _) => ShardStrategy::Width,
            _ => ShardStrategy::Block,
        })
    }

    /// Scratch bytes this layout occupies on each core holding a part of
    /// `shape`. Zero for bulk layouts.
    pub fn scratch_bytes_per_core(&self, shape: &Shape) -> usize {
        let elem = self.scalar_kind.size_bytes();
        match self.placement {
            Placement::BulkInterleaved => 0,
            Placement::OnChipSharded => self.shard_shape[0] * self.shard_shape[1] * elem,
            Placement::OnChipInterleaved => {
                let (rows, cols) = match self.page_mode {
                    PageMode::Tiled => shape.tile_padded_2d(),
                    PageMode::RowMajor => shape.collapsed_2d(),
                };
                let [page_rows, page_cols] = self.shard_shape;
                let pages = (rows / page_rows.max(1)) * (cols / page_cols.max(1));
                let pages_per_core = pages.div_ceil(self.grid.volume().max(1));
                pages_per_core * page_rows * page_cols * elem
            }
        }
    }

    /// The eviction target for this layout: same pages and kind, bulk tier,
    /// interleaved placement.
    pub fn to_bulk_interleaved(&self, shape: &Shape) -> Self {
        Self {
            page_mode: self.page_mode,
            placement: Placement::BulkInterleaved,
            buffer_tier: BufferTier::Bulk,
            grid: GridShape::unit(),
            shard_shape: page_shape(shape, self.page_mode),
            scalar_kind: self.scalar_kind,
        }
    }

    /// Re-derives this layout for another tensor.
    ///
    /// Page mode, tier and grid are kept. A sharded layout whose grid does
    /// not divide `tensor` falls back to interleaved on the same grid.
    pub fn retarget(&self, tensor: &TensorType) -> Self {
        match self.placement {
            Placement::BulkInterleaved => Self::bulk_interleaved(tensor, self.page_mode),
            Placement::OnChipInterleaved => {
                Self::on_chip_interleaved(tensor, self.page_mode, self.grid)
            }
            Placement::OnChipSharded => Self::sharded(tensor, self.page_mode, self.grid)
                .unwrap_or_else(|| Self::on_chip_interleaved(tensor, self.page_mode, self.grid)),
        }
    }

    /// Returns this layout with another page mode, re-derived for `tensor`.
    pub fn with_page_mode(&self, page_mode: PageMode, tensor: &TensorType) -> Self {
        Self {
            page_mode,
            ..self.clone()
        }
        .retarget(tensor)
    }

    /// Returns this layout moved to on-chip interleaved placement on the
    /// same grid.
    pub fn to_on_chip_interleaved(&self, tensor: &TensorType) -> Self {
        Self::on_chip_interleaved(tensor, self.page_mode, self.grid)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let page = match self.page_mode {
            PageMode::Tiled => "tile",
            PageMode::RowMajor => "row_major",
        };
        let tier = match self.buffer_tier {
            BufferTier::Scratch => "scratch",
            BufferTier::Bulk => "bulk",
        };
        let placement = match self.shard_strategy() {
            Some(s) => s.as_str(),
            None => "interleaved",
        };
        write!(
            f,
            "{page}/{tier}/{placement}<{}>[{}x{}]/{}",
            self.grid, self.shard_shape[0], self.shard_shape[1], self.scalar_kind
        )
    }
}

/// Page shape in elements: one tile, or one full row.
fn page_shape(shape: &Shape, page_mode: PageMode) -> [usize; 2] {
    match page_mode {
        PageMode::Tiled => [TILE_HEIGHT, TILE_WIDTH],
        PageMode::RowMajor => [1, shape.collapsed_2d().1.max(1)],
    }
}

/// Per-core shard shape for `grid`, if the collapsed shape divides evenly.
///
/// Tiled shards must cover whole tiles.
pub fn shard_shape_for(shape: &Shape, page_mode: PageMode, grid: GridShape) -> Option<[usize; 2]> {
    if grid.volume() == 0 || shape.is_degenerate() {
        return None;
    }
    match page_mode {
        PageMode::Tiled => {
            let (rows, cols) = shape.tile_padded_2d();
            let (tile_rows, tile_cols) = (rows / TILE_HEIGHT, cols / TILE_WIDTH);
            if tile_rows % grid.rows != 0 || tile_cols % grid.cols != 0 {
                return None;
            }
            Some([rows / grid.rows, cols / grid.cols])
        }
        PageMode::RowMajor => {
            let (rows, cols) = shape.collapsed_2d();
            if rows % grid.rows != 0 || cols % grid.cols != 0 {
                return None;
            }
            Some([rows / grid.rows, cols / grid.cols])
        }
    }
}
