// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Node definitions for the dataflow graph IR.
//!
//! Each [`Node`] is one operation instance stored in the graph arena and
//! addressed by a stable [`NodeId`]. The operation kind is a closed enum,
//! [`OpKind`], so every pass dispatches on it with an exhaustive `match`
//! instead of probing attribute bags.

use layout_core::{BufferTier, GridShape, Layout, PageMode, Placement, ScalarKind, ShardStrategy, TensorType};
use std::fmt;

/// Stable identity of a node: its index in the graph arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// An operand edge source: another node's result or a function argument.
///
/// An `Arg` operand is a graph boundary input; it has no producer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operand {
    Node(NodeId),
    Arg(usize),
}

impl Operand {
    /// The producing node, if any.
    pub fn producer(self) -> Option<NodeId> {
        match self {
            Operand::Node(id) => Some(id),
            Operand::Arg(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Node(id) => write!(f, "{id}"),
            Operand::Arg(i) => write!(f, "%arg{i}"),
        }
    }
}

/// Elementwise operations with one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Relu,
    Gelu,
    Sqrt,
    Exp,
}

/// Elementwise operations with two inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
}

/// Tuning parameters specific to 2-D convolutions.
///
/// Every field is optional; unset fields leave the device default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Conv2dConfig {
    pub weights_kind: Option<ScalarKind>,
    pub activation: Option<String>,
    pub input_channels_alignment: Option<u32>,
    pub deallocate_activation: Option<bool>,
    pub reallocate_halo_output: Option<bool>,
    pub act_block_h_override: Option<u32>,
    pub act_block_w_div: Option<u32>,
    pub reshard_if_not_optimal: Option<bool>,
    pub override_sharding_config: Option<bool>,
    pub shard_strategy: Option<ShardStrategy>,
    pub transpose_shards: Option<bool>,
    pub output_page_mode: Option<PageMode>,
    pub enable_act_double_buffer: Option<bool>,
    pub enable_weights_double_buffer: Option<bool>,
}

impl Conv2dConfig {
    /// Copies every field set in `other` over this config.
    pub fn apply_overrides(&mut self, other: &Conv2dConfig) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(
            weights_kind,
            activation,
            input_channels_alignment,
            deallocate_activation,
            reallocate_halo_output,
            act_block_h_override,
            act_block_w_div,
            reshard_if_not_optimal,
            override_sharding_config,
            shard_strategy,
            transpose_shards,
            output_page_mode,
            enable_act_double_buffer,
            enable_weights_double_buffer,
        );
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Memory descriptor carried by buffer allocations and conversions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MemoryConfig {
    pub buffer_tier: BufferTier,
    pub placement: Placement,
    pub grid: GridShape,
    pub shard_shape: [usize; 2],
}

impl MemoryConfig {
    pub fn from_layout(layout: &Layout) -> Self {
        Self {
            buffer_tier: layout.buffer_tier,
            placement: layout.placement,
            grid: layout.grid,
            shard_shape: layout.shard_shape,
        }
    }
}

/// Allocation attributes of an output buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BufferAlloc {
    pub scalar_kind: ScalarKind,
    pub page_mode: PageMode,
    pub memory_config: Option<MemoryConfig>,
}

impl BufferAlloc {
    /// Allocation attributes matching `layout` exactly.
    pub fn from_layout(layout: &Layout) -> Self {
        Self {
            scalar_kind: layout.scalar_kind,
            page_mode: layout.page_mode,
            memory_config: Some(MemoryConfig::from_layout(layout)),
        }
    }
}

/// The kind of operation a node performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Output buffer allocation for a destination-style consumer.
    Empty { alloc: BufferAlloc },
    /// Explicit layout conversion.
    ToLayout { target: Layout },
    Unary(UnaryOp),
    Binary(BinaryOp),
    Matmul,
    Conv2d { config: Option<Conv2dConfig> },
    Softmax { dim: i32 },
    Reshape,
    /// Function terminator; its operands are the function results.
    Return,
}

impl OpKind {
    /// Parses a kind from a manifest op string.
    ///
    /// Kinds with attributes (`empty`, `to_layout`, `conv2d`, `softmax`)
    /// are created with neutral attributes; the loader fills them in.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let kind = match s.to_lowercase().as_str() {
            "empty" => Self::Empty {
                alloc: BufferAlloc {
                    scalar_kind: ScalarKind::Bf16,
                    page_mode: PageMode::Tiled,
                    memory_config: None,
                },
            },
            "relu" => Self::Unary(UnaryOp::Relu),
            "gelu" => Self::Unary(UnaryOp::Gelu),
            "sqrt" => Self::Unary(UnaryOp::Sqrt),
            "exp" => Self::Unary(UnaryOp::Exp),
            "add" => Self::Binary(BinaryOp::Add),
            "sub" | "subtract" => Self::Binary(BinaryOp::Subtract),
            "mul" | "multiply" => Self::Binary(BinaryOp::Multiply),
            "matmul" | "linear" => Self::Matmul,
            "conv2d" | "conv" => Self::Conv2d { config: None },
            "softmax" => Self::Softmax { dim: -1 },
            "reshape" => Self::Reshape,
            "return" => Self::Return,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns a human-readable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty { .. } => "empty",
            Self::ToLayout { .. } => "to_layout",
            Self::Unary(UnaryOp::Relu) => "relu",
            Self::Unary(UnaryOp::Gelu) => "gelu",
            Self::Unary(UnaryOp::Sqrt) => "sqrt",
            Self::Unary(UnaryOp::Exp) => "exp",
            Self::Binary(BinaryOp::Add) => "add",
            Self::Binary(BinaryOp::Subtract) => "subtract",
            Self::Binary(BinaryOp::Multiply) => "multiply",
            Self::Matmul => "matmul",
            Self::Conv2d { .. } => "conv2d",
            Self::Softmax { .. } => "softmax",
            Self::Reshape => "reshape",
            Self::Return => "return",
        }
    }

    /// Destination-style ops take their output buffer as the trailing
    /// operand.
    pub fn is_destination_style(&self) -> bool {
        matches!(
            self,
            Self::Unary(_) | Self::Binary(_) | Self::Matmul | Self::Softmax { .. }
        )
    }

    pub fn is_elementwise(&self) -> bool {
        matches!(self, Self::Unary(_) | Self::Binary(_))
    }

    /// Kinds whose kernels only consume and produce tiled pages.
    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Matmul | Self::Conv2d { .. } | Self::Softmax { .. })
    }

    pub fn produces_tensor(&self) -> bool {
        !matches!(self, Self::Return)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation instance in the graph arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub kind: OpKind,
    /// Stable location name; overrides address nodes through it.
    pub loc: Option<String>,
    pub operands: Vec<Operand>,
    /// Result type, for tensor-producing nodes.
    pub result: Option<TensorType>,
    /// Resolved layout of the result, once assigned.
    pub layout: Option<Layout>,
}

impl Node {
    /// Location name, or the arena id when the node has none.
    pub fn display_name(&self) -> String {
        self.loc.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// The trailing output-buffer operand of a destination-style node.
    pub fn dps_init(&self) -> Option<NodeId> {
        if !self.kind.is_destination_style() {
            return None;
        }
        self.operands.last().and_then(|o| o.producer())
    }

    /// Number of leading operands that carry input data.
    ///
    /// Excludes the output buffer of destination-style nodes.
    pub fn num_data_operands(&self) -> usize {
        if self.kind.is_destination_style() {
            self.operands.len().saturating_sub(1)
        } else {
            self.operands.len()
        }
    }

    /// Returns a concise summary string for display.
    pub fn summary(&self) -> String {
        let operands: Vec<String> = self.operands.iter().map(|o| o.to_string()).collect();
        let ty = match (&self.result, &self.layout) {
            (Some(t), Some(l)) => format!(" -> {t} #{l}"),
            (Some(t), None) => format!(" -> {t}"),
            _ => String::new(),
        };
        format!(
            "{} = {} ({}){} loc({})",
            self.id,
            self.kind,
            operands.join(", "),
            ty,
            self.loc.as_deref().unwrap_or("?"),
        )
    }
}
