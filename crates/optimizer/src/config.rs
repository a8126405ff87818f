// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Optimizer configuration loaded from TOML files or constructed
//! programmatically.
//!
//! # TOML Format
//! ```toml
//! memory_layout_analysis_enabled = true
//! memory_layout_analysis_policy = "df-sharding"
//! mem_reconfig_enabled = true
//! max_legal_layouts = 64
//! row_major_enabled = false
//!
//! [override_input_layout]
//! add_0 = [0, 1]
//!
//! [override_output_layout.conv_0]
//! grid = { rows = 4, cols = 4 }
//! buffer_tier = "scratch"
//! memory_layout = "block_sharded"
//!
//! [override_conv2d_config.conv_0]
//! act_block_h_override = 64
//! ```

use crate::OptimizerError;
use graph_ir::Conv2dConfig;
use layout_core::HardwareDesc;
use layout_planner::{MemoryLayoutPolicy, OutputLayoutOverride, POLICY_NAMES};
use std::collections::BTreeMap;
use std::path::Path;

/// Configuration for one optimization pass.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Runs the memory scheduler. When off, every node keeps its first
    /// legal candidate.
    pub memory_layout_analysis_enabled: bool,
    /// Policy name: `"df-sharding"`, `"greedy-l1-interleaved"` or
    /// `"bf-interleaved"`.
    pub memory_layout_analysis_policy: String,
    /// Materializes reconfigurations as conversion nodes.
    pub mem_reconfig_enabled: bool,
    /// Candidate cap per node.
    pub max_legal_layouts: usize,
    /// Also enumerates row-major layouts.
    pub row_major_enabled: bool,
    /// Location → operand indices that always receive a conversion.
    pub override_input_layout: BTreeMap<String, Vec<usize>>,
    /// Location → forced output layout fields.
    pub override_output_layout: BTreeMap<String, OutputLayoutOverride>,
    /// Location → forced Conv2d parameters.
    pub override_conv2d_config: BTreeMap<String, Conv2dConfig>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            memory_layout_analysis_enabled: false,
            memory_layout_analysis_policy: POLICY_NAMES[0].to_string(),
            mem_reconfig_enabled: true,
            max_legal_layouts: 64,
            row_major_enabled: false,
            override_input_layout: BTreeMap::new(),
            override_output_layout: BTreeMap::new(),
            override_conv2d_config: BTreeMap::new(),
        }
    }
}

impl OptimizerConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, OptimizerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OptimizerError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, OptimizerError> {
        toml::from_str(toml_str)
            .map_err(|e| OptimizerError::ConfigError(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, OptimizerError> {
        toml::to_string_pretty(self)
            .map_err(|e| OptimizerError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Checks the options that do not depend on the graph.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if self.max_legal_layouts == 0 {
            return Err(OptimizerError::ConfigError(
                "max_legal_layouts must be at least 1".into(),
            ));
        }
        self.create_policy().map(|_| ())
    }

    /// Creates the memory layout policy named by this config.
    pub fn create_policy(&self) -> Result<Box<dyn MemoryLayoutPolicy>, OptimizerError> {
        layout_planner::policy_by_name(&self.memory_layout_analysis_policy).ok_or_else(|| {
            OptimizerError::UnknownPolicy(format!(
                "{}; expected one of {}",
                self.memory_layout_analysis_policy,
                POLICY_NAMES.join(", ")
            ))
        })
    }
}

/// Loads a hardware description from a `.json` or `.toml` file.
pub fn load_hardware(path: &Path) -> Result<HardwareDesc, OptimizerError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        OptimizerError::ConfigError(format!("cannot read hardware '{}': {e}", path.display()))
    })?;
    let hw: HardwareDesc = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .map_err(|e| OptimizerError::ConfigError(format!("hardware JSON parse error: {e}")))?,
        _ => toml::from_str(&content)
            .map_err(|e| OptimizerError::ConfigError(format!("hardware TOML parse error: {e}")))?,
    };
    hw.validate()?;
    Ok(hw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layout_core::{BufferTier, GridShape};
    use layout_planner::MemoryLayoutKind;

    #[test]
    fn test_default() {
        let c = OptimizerConfig::default();
        assert!(!c.memory_layout_analysis_enabled);
        assert!(c.mem_reconfig_enabled);
        assert_eq!(c.memory_layout_analysis_policy, "df-sharding");
        assert_eq!(c.max_legal_layouts, 64);
        assert!(!c.row_major_enabled);
        c.validate().unwrap();
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
memory_layout_analysis_enabled = true
memory_layout_analysis_policy = "bf-interleaved"
max_legal_layouts = 8

[override_input_layout]
add_0 = [0, 1]

[override_output_layout.conv_0]
grid = { rows = 4, cols = 4 }
buffer_tier = "scratch"
memory_layout = "block_sharded"

[override_conv2d_config.conv_0]
act_block_h_override = 64
"#;
        let c = OptimizerConfig::from_toml(toml).unwrap();
        assert!(c.memory_layout_analysis_enabled);
        assert!(c.mem_reconfig_enabled);
        assert_eq!(c.max_legal_layouts, 8);
        assert_eq!(c.override_input_layout["add_0"], vec![0, 1]);
        let out = &c.override_output_layout["conv_0"];
        assert_eq!(out.grid, Some(GridShape::new(4, 4)));
        assert_eq!(out.buffer_tier, Some(BufferTier::Scratch));
        assert_eq!(out.memory_layout, Some(MemoryLayoutKind::BlockSharded));
        assert_eq!(c.override_conv2d_config["conv_0"].act_block_h_override, Some(64));
        assert_eq!(c.create_policy().unwrap().name(), "bf-interleaved");
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let mut c = OptimizerConfig {
            memory_layout_analysis_enabled: true,
            ..Default::default()
        };
        c.override_input_layout.insert("mm_1".into(), vec![1]);
        let back = OptimizerConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_unknown_policy() {
        let c = OptimizerConfig {
            memory_layout_analysis_policy: "optimal".into(),
            ..Default::default()
        };
        assert!(matches!(c.create_policy(), Err(OptimizerError::UnknownPolicy(_))));
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_zero_max_legal_layouts() {
        let c = OptimizerConfig {
            max_legal_layouts: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(OptimizerError::ConfigError(_))));
    }

    #[test]
    fn test_bad_toml() {
        assert!(OptimizerConfig::from_toml("max_legal_layouts = \"many\"").is_err());
    }
}
