// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for layout descriptors.

/// Errors that can occur when describing layouts or hardware.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// The hardware description cannot host any scratch tensor.
    #[error("invalid hardware description: {0}")]
    InvalidHardware(String),
}
