// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-operation configurations and the user-forced output layout.

use graph_ir::{Conv2dConfig, NodeId};
use layout_core::{
    BufferTier, GridShape, HardwareDesc, Layout, PageMode, ScalarKind, ShardStrategy, TensorType,
};
use std::collections::BTreeMap;
use std::fmt;

/// Parameters that only make sense for one operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpSpecificAttr {
    Conv2d(Conv2dConfig),
}

/// One candidate configuration for a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct OpConfig {
    pub output_layout: Layout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_specific: Option<OpSpecificAttr>,
}

impl OpConfig {
    pub fn new(output_layout: Layout) -> Self {
        Self {
            output_layout,
            op_specific: None,
        }
    }

    pub fn conv2d_config(&self) -> Option<&Conv2dConfig> {
        match &self.op_specific {
            Some(OpSpecificAttr::Conv2d(c)) => Some(c),
            None => None,
        }
    }
}

impl fmt::Display for OpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.output_layout)?;
        if self.op_specific.is_some() {
            write!(f, " +conv2d")?;
        }
        Ok(())
    }
}

/// Candidate configurations per node, in preference order.
pub type CandidateSet = BTreeMap<NodeId, Vec<OpConfig>>;

/// Tensor memory layout named by an output override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLayoutKind {
    Interleaved,
    HeightSharded,
    WidthSharded,
    BlockSharded,
}

impl MemoryLayoutKind {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "interleaved" => Some(Self::Interleaved),
            "height_sharded" => Some(Self::HeightSharded),
            "width_sharded" => Some(Self::WidthSharded),
            "block_sharded" => Some(Self::BlockSharded),
            _ => None,
        }
    }

    fn matches(self, layout: &Layout) -> bool {
        match self {
            Self::Interleaved => !layout.is_sharded(),
            Self::HeightSharded => layout.shard_strategy() == Some(ShardStrategy::Height),
            Self::WidthSharded => layout.shard_strategy() == Some(ShardStrategy::Width),
            Self::BlockSharded => layout.shard_strategy() == Some(ShardStrategy::Block),
        }
    }
}

/// Output layout fields forced for one node. Unset fields are free.
///
/// The grid only constrains scratch layouts; bulk layouts have no core grid
/// of their own.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputLayoutOverride {
    pub grid: Option<GridShape>,
    pub buffer_tier: Option<BufferTier>,
    pub memory_layout: Option<MemoryLayoutKind>,
    pub page_mode: Option<PageMode>,
    pub scalar_kind: Option<ScalarKind>,
}

impl OutputLayoutOverride {
    /// Whether `layout` agrees with every field that is set.
    pub fn matches(&self, layout: &Layout) -> bool {
        self.buffer_tier.map_or(true, |t| t == layout.buffer_tier)
            && self.memory_layout.map_or(true, |m| m.matches(layout))
            && self.page_mode.map_or(true, |p| p == layout.page_mode)
            && self.scalar_kind.map_or(true, |k| k == layout.scalar_kind)
            && self
                .grid
                .map_or(true, |g| !layout.is_scratch() || g == layout.grid)
    }

    /// Builds the forced layout directly, for overrides naming a layout
    /// the enumerated space does not contain.
    ///
    /// Unset fields default to tiled pages, scratch tier and the worker
    /// grid. Returns `None` when the fields are contradictory or the shape
    /// cannot be sharded that way.
    pub fn construct(&self, tensor: &TensorType, hw: &HardwareDesc) -> Option<Layout> {
        let tensor = match self.scalar_kind {
            Some(kind) => tensor.with_scalar_kind(kind),
            None => tensor.clone(),
        };
        let page_mode = self.page_mode.unwrap_or(PageMode::Tiled);
        let tier = self.buffer_tier.unwrap_or(BufferTier::Scratch);
        let kind = self.memory_layout.unwrap_or(MemoryLayoutKind::Interleaved);
        let worker = hw.worker_grid;

        let layout = match (tier, kind) {
            (BufferTier::Bulk, MemoryLayoutKind::Interleaved) => {
                Layout::bulk_interleaved(&tensor, page_mode)
            }
            (BufferTier::Bulk, _) => return None,
            (BufferTier::Scratch, MemoryLayoutKind::Interleaved) => {
                Layout::on_chip_interleaved(&tensor, page_mode, self.grid.unwrap_or(worker))
            }
            (BufferTier::Scratch, sharded) => {
                let grid = self.grid.unwrap_or(match sharded {
                    MemoryLayoutKind::HeightSharded => GridShape::new(worker.volume(), 1),
                    MemoryLayoutKind::WidthSharded => GridShape::new(1, worker.volume()),
                    _ => worker,
                });
                Layout::sharded(&tensor, page_mode, grid)?
            }
        };
        (self.matches(&layout)
            && layout.scratch_bytes_per_core(&tensor.shape) <= hw.usable_scratch_bytes())
        .then_some(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hw() -> HardwareDesc {
        HardwareDesc::new(GridShape::new(8, 8), 1024 * 1024)
    }

    fn tt() -> TensorType {
        TensorType::new(vec![256, 256], ScalarKind::Bf16)
    }

    #[test]
    fn test_override_matches() {
        let t = tt();
        let sharded = Layout::sharded(&t, PageMode::Tiled, GridShape::new(8, 1)).unwrap();
        let ovr = OutputLayoutOverride {
            memory_layout: Some(MemoryLayoutKind::HeightSharded),
            buffer_tier: Some(BufferTier::Scratch),
            ..Default::default()
        };
        assert!(ovr.matches(&sharded));
        assert!(!ovr.matches(&Layout::bulk_interleaved(&t, PageMode::Tiled)));

        let with_grid = OutputLayoutOverride {
            grid: Some(GridShape::new(4, 1)),
            ..ovr
        };
        assert!(!with_grid.matches(&sharded));
    }

    #[test]
    fn test_grid_ignored_for_bulk() {
        let t = tt();
        let ovr = OutputLayoutOverride {
            grid: Some(GridShape::new(8, 8)),
            buffer_tier: Some(BufferTier::Bulk),
            ..Default::default()
        };
        assert!(ovr.matches(&Layout::bulk_interleaved(&t, PageMode::Tiled)));
    }

    #[test]
    fn test_construct_block_sharded() {
        let ovr = OutputLayoutOverride {
            grid: Some(GridShape::new(4, 4)),
            memory_layout: Some(MemoryLayoutKind::BlockSharded),
            ..Default::default()
        };
        let l = ovr.construct(&tt(), &hw()).unwrap();
        assert_eq!(l.grid, GridShape::new(4, 4));
        assert_eq!(l.shard_shape, [64, 64]);
    }

    #[test]
    fn test_construct_rejects_contradiction() {
        let ovr = OutputLayoutOverride {
            buffer_tier: Some(BufferTier::Bulk),
            memory_layout: Some(MemoryLayoutKind::WidthSharded),
            ..Default::default()
        };
        assert!(ovr.construct(&tt(), &hw()).is_none());
    }

    #[test]
    fn test_construct_row_major_kind_override() {
        let ovr = OutputLayoutOverride {
            page_mode: Some(PageMode::RowMajor),
            scalar_kind: Some(ScalarKind::F32),
            buffer_tier: Some(BufferTier::Bulk),
            ..Default::default()
        };
        let l = ovr.construct(&tt(), &hw()).unwrap();
        assert_eq!(l.page_mode, PageMode::RowMajor);
        assert_eq!(l.scalar_kind, ScalarKind::F32);
    }

    #[test]
    fn test_memory_layout_kind_parse() {
        assert_eq!(
            MemoryLayoutKind::from_str_loose("Block_Sharded"),
            Some(MemoryLayoutKind::BlockSharded)
        );
        assert_eq!(MemoryLayoutKind::from_str_loose("sharded"), None);
    }
}
