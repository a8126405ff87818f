// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-ir
//!
//! The dataflow graph the layout optimizer reads and rewrites.
//!
//! - [`Node`] / [`OpKind`]: one operation instance with a closed set of
//!   kinds, operands and an optional resolved [`layout_core::Layout`].
//! - [`Graph`]: an arena of nodes grouped into [`Function`]s, with a
//!   **type-state pattern** (`Loaded` → `Validated`).
//! - [`GraphLoader`] / [`GraphManifest`]: JSON manifests in and out.
//!
//! # Example
//! ```no_run
//! use graph_ir::GraphLoader;
//! use std::path::Path;
//!
//! let graph = GraphLoader::load(Path::new("./graphs/mlp.json")).unwrap();
//! println!("{graph}");
//! ```

mod error;
pub mod graph;
mod loader;
mod manifest;
mod node;

pub use error::GraphError;
pub use graph::{Function, Graph, ValueType};
pub use loader::GraphLoader;
pub use manifest::{GraphManifest, ManifestFunction, ManifestNode, ManifestValue};
pub use node::{
    BinaryOp, BufferAlloc, Conv2dConfig, MemoryConfig, Node, NodeId, OpKind, Operand, UnaryOp,
};
