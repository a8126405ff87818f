// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scalar element kinds stored in device tensors.

use std::fmt;

/// Enumerates the element kinds a device tensor can hold.
///
/// The optimizer uses `ScalarKind` to size pages and shards; the kind is
/// part of every [`crate::TensorType`] and every [`crate::Layout`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 16-bit brain floating point.
    Bf16,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 32-bit unsigned integer.
    U32,
    /// 16-bit unsigned integer.
    U16,
    /// 8-bit unsigned integer.
    U8,
}

impl ScalarKind {
    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            ScalarKind::F32 | ScalarKind::U32 => 4,
            ScalarKind::Bf16 | ScalarKind::F16 | ScalarKind::U16 => 2,
            ScalarKind::U8 => 1,
        }
    }

    /// Returns a human-readable label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarKind::F32 => "f32",
            ScalarKind::Bf16 => "bf16",
            ScalarKind::F16 => "f16",
            ScalarKind::U32 => "u32",
            ScalarKind::U16 => "u16",
            ScalarKind::U8 => "u8",
        }
    }

    /// Parses a kind from a manifest or command-line string.
    ///
    /// Accepts the short labels and the long spellings used by graph dumps
    /// (`"float32"`, `"bfloat16"`, `"uint8"`, ...). Case-insensitive.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "f32" | "float32" | "fp32" => Some(Self::F32),
            "bf16" | "bfloat16" => Some(Self::Bf16),
            "f16" | "float16" | "fp16" => Some(Self::F16),
            "u32" | "uint32" => Some(Self::U32),
            "u16" | "uint16" => Some(Self::U16),
            "u8" | "uint8" => Some(Self::U8),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
