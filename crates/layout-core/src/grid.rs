// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Worker-grid geometry and the hardware description consumed by the
//! optimizer.

use crate::LayoutError;
use std::fmt;

/// A rectangular block of worker cores, `rows × cols`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// A single core.
    pub const fn unit() -> Self {
        Self { rows: 1, cols: 1 }
    }

    /// Number of cores in the grid.
    pub fn volume(&self) -> usize {
        self.rows * self.cols
    }

    /// Parses `"8x8"` style strings.
    pub fn parse(s: &str) -> Option<Self> {
        let (r, c) = s.trim().split_once(['x', 'X'])?;
        let rows = r.trim().parse().ok()?;
        let cols = c.trim().parse().ok()?;
        (rows > 0 && cols > 0).then_some(Self { rows, cols })
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// The slice of the hardware description the optimizer needs.
///
/// # TOML Format
/// ```toml
/// worker_grid = { rows = 8, cols = 8 }
/// scratch_bytes_per_core = 1499136
/// scratch_reserved_bytes = 98304
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HardwareDesc {
    /// Compute cores available for sharding.
    pub worker_grid: GridShape,
    /// Total scratch memory per core, in bytes.
    pub scratch_bytes_per_core: usize,
    /// Bytes per core reserved by firmware and kernels.
    #[serde(default)]
    pub scratch_reserved_bytes: usize,
}

impl HardwareDesc {
    pub fn new(worker_grid: GridShape, scratch_bytes_per_core: usize) -> Self {
        Self {
            worker_grid,
            scratch_bytes_per_core,
            scratch_reserved_bytes: 0,
        }
    }

    /// Scratch bytes per core left for tensors.
    pub fn usable_scratch_bytes(&self) -> usize {
        self.scratch_bytes_per_core
            .saturating_sub(self.scratch_reserved_bytes)
    }

    /// Checks that the description can host at least one scratch tensor.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.worker_grid.volume() == 0 {
            return Err(LayoutError::InvalidHardware(format!(
                "worker grid {} has no cores",
                self.worker_grid
            )));
        }
        if self.usable_scratch_bytes() == 0 {
            return Err(LayoutError::InvalidHardware(format!(
                "no usable scratch memory ({} bytes, {} reserved)",
                self.scratch_bytes_per_core, self.scratch_reserved_bytes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_parse() {
        assert_eq!(GridShape::parse("8x4"), Some(GridShape::new(8, 4)));
        assert_eq!(GridShape::parse(" 2X2 "), Some(GridShape::new(2, 2)));
        assert_eq!(GridShape::parse("0x4"), None);
        assert_eq!(GridShape::parse("l1"), None);
    }

    #[test]
    fn test_usable_scratch() {
        let hw = HardwareDesc {
            worker_grid: GridShape::new(8, 8),
            scratch_bytes_per_core: 1000,
            scratch_reserved_bytes: 200,
        };
        assert_eq!(hw.usable_scratch_bytes(), 800);
        hw.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_grid() {
        let hw = HardwareDesc::new(GridShape::new(0, 8), 1024);
        assert!(hw.validate().is_err());
    }
}
