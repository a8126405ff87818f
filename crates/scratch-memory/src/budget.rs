// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-core scratch budget and parsing.

use crate::MemoryError;
use std::fmt;

/// The usable scratch capacity of one core.
///
/// # Parsing
/// - `"1464K"` or `"1464KB"` → 1464 × 1024 bytes
/// - `"1M"` or `"1MB"` → 1024² bytes
/// - `"1499136"` → raw byte count
///
/// # Examples
/// ```
/// use scratch_memory::ScratchBudget;
///
/// let b = ScratchBudget::parse("1464K").unwrap();
/// assert_eq!(b.as_bytes(), 1464 * 1024);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ScratchBudget {
    bytes: usize,
}

impl ScratchBudget {
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub fn from_kb(kb: usize) -> Self {
        Self { bytes: kb * 1024 }
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Parses a human-readable budget string. Case-insensitive.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let trimmed = s.trim();
        let upper = trimmed.to_uppercase();
        let (num, multiplier) = if let Some(n) = upper.strip_suffix("MB").or(upper.strip_suffix('M')) {
            (n, 1024 * 1024)
        } else if let Some(n) = upper.strip_suffix("KB").or(upper.strip_suffix('K')) {
            (n, 1024)
        } else if let Some(n) = upper.strip_suffix('B') {
            (n, 1)
        } else {
            (upper.as_str(), 1)
        };

        let value: usize = num
            .trim()
            .parse()
            .map_err(|_| MemoryError::InvalidBudget(s.to_string()))?;
        let bytes = value
            .checked_mul(multiplier)
            .filter(|&b| b > 0)
            .ok_or_else(|| MemoryError::InvalidBudget(s.to_string()))?;
        Ok(Self { bytes })
    }
}

impl fmt::Display for ScratchBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes >= 1024 * 1024 && self.bytes % (1024 * 1024) == 0 {
            write!(f, "{} MB", self.bytes / (1024 * 1024))
        } else if self.bytes >= 1024 && self.bytes % 1024 == 0 {
            write!(f, "{} KB", self.bytes / 1024)
        } else {
            write!(f, "{} B", self.bytes)
        }
    }
}
