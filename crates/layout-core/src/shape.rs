// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and the 2-D views used for sharding.

use crate::ScalarKind;
use std::fmt;

/// Height and width of a hardware tile, in elements.
pub const TILE_HEIGHT: usize = 32;
/// Width of a hardware tile, in elements.
pub const TILE_WIDTH: usize = 32;

/// Describes the dimensionality of a device tensor.
///
/// Shapes are immutable once created. Sharding operates on the *collapsed*
/// 2-D view of a shape: every leading dimension is folded into the row
/// count and the innermost dimension becomes the column count.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use layout_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), 24);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Creates a 2-D shape (matrix).
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements.
    ///
    /// For a scalar shape (rank 0), returns 1.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns `true` if any dimension is zero.
    pub fn is_degenerate(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }

    /// Computes the dense memory footprint in bytes for a given kind.
    pub fn size_bytes(&self, kind: ScalarKind) -> usize {
        self.num_elements() * kind.size_bytes()
    }

    /// Returns the collapsed `(rows, cols)` view.
    ///
    /// A scalar collapses to `(1, 1)` and a vector to `(1, len)`.
    pub fn collapsed_2d(&self) -> (usize, usize) {
        match self.dims.split_last() {
            None => (1, 1),
            Some((&cols, leading)) => (leading.iter().product(), cols),
        }
    }

    /// Returns the collapsed view padded up to whole tiles.
    pub fn tile_padded_2d(&self) -> (usize, usize) {
        let (rows, cols) = self.collapsed_2d();
        (
            rows.div_ceil(TILE_HEIGHT) * TILE_HEIGHT,
            cols.div_ceil(TILE_WIDTH) * TILE_WIDTH,
        )
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, "x")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Convenience: `Shape::from(vec![2, 3])`.
impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

/// Convenience: `Shape::from(&[2, 3][..])`.
impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_shape() {
        let s = Shape::matrix(3, 4);
        assert_eq!(s.rank(), 2);
        assert_eq!(s.num_elements(), 12);
        assert_eq!(s.size_bytes(ScalarKind::F32), 48);
    }

    #[test]
    fn test_scalar_shape() {
        let s = Shape::new(vec![]);
        assert_eq!(s.num_elements(), 1);
        assert_eq!(s.collapsed_2d(), (1, 1));
    }

    #[test]
    fn test_collapsed_2d() {
        assert_eq!(Shape::new(vec![2, 3, 64]).collapsed_2d(), (6, 64));
        assert_eq!(Shape::new(vec![128]).collapsed_2d(), (1, 128));
    }

    #[test]
    fn test_tile_padded_2d() {
        assert_eq!(Shape::new(vec![1, 1, 33, 20]).tile_padded_2d(), (64, 32));
        assert_eq!(Shape::matrix(64, 64).tile_padded_2d(), (64, 64));
    }

    #[test]
    fn test_degenerate() {
        assert!(Shape::new(vec![0, 768]).is_degenerate());
        assert!(!Shape::matrix(1, 768).is_degenerate());
    }

    #[test]
    fn test_display() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(format!("{s}"), "[2x3x4]");
    }

    #[test]
    fn test_from_conversions() {
        let s1: Shape = vec![2, 3].into();
        let s2: Shape = (&[2, 3][..]).into();
        assert_eq!(s1, s2);
    }
}
