// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Occupancy statistics for a scheduling run.

/// Cumulative statistics about a [`crate::LiveSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OccupancyStats {
    /// Tensors admitted to the live set.
    pub admissions: u64,
    /// Tensors released after their last consumer.
    pub releases: u64,
    /// Tensors evicted to bulk memory.
    pub evictions: u64,
    /// Admissions refused for lack of space.
    pub rejections: u64,
    /// High-water mark of per-core occupancy, in bytes.
    pub peak_bytes: usize,
}

impl OccupancyStats {
    pub(crate) fn record_admission(&mut self, occupancy: usize) {
        self.admissions += 1;
        self.peak_bytes = self.peak_bytes.max(occupancy);
    }

    pub(crate) fn record_release(&mut self) {
        self.releases += 1;
    }

    pub(crate) fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub(crate) fn record_rejection(&mut self) {
        self.rejections += 1;
    }

    /// Peak occupancy as a fraction of `budget_bytes`.
    pub fn peak_utilization(&self, budget_bytes: usize) -> f64 {
        if budget_bytes == 0 {
            return 0.0;
        }
        self.peak_bytes as f64 / budget_bytes as f64
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Occupancy: {} admitted, {} released, {} evicted, {} rejected, peak {:.1} KB/core",
            self.admissions,
            self.releases,
            self.evictions,
            self.rejections,
            self.peak_bytes as f64 / 1024.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_tracking() {
        let mut s = OccupancyStats::default();
        s.record_admission(100);
        s.record_admission(300);
        s.record_admission(50);
        assert_eq!(s.peak_bytes, 300);
        assert_eq!(s.admissions, 3);
    }

    #[test]
    fn test_peak_utilization() {
        let mut s = OccupancyStats::default();
        assert_eq!(s.peak_utilization(0), 0.0);
        s.record_admission(256);
        assert!((s.peak_utilization(1024) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_summary() {
        let mut s = OccupancyStats::default();
        s.record_admission(2048);
        s.record_eviction();
        s.record_rejection();
        let summary = s.summary();
        assert!(summary.contains("1 admitted"));
        assert!(summary.contains("1 evicted"));
        assert!(summary.contains("peak 2.0 KB/core"));
    }
}
