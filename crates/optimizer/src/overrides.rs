// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Compact command-line override strings.
//!
//! | option | syntax |
//! |---|---|
//! | input layout | `add_0=0:1,mm_1=1` |
//! | output layout | `conv_0=4x4:l1:block_sharded:tile:bf16` (fields in any order) |
//! | Conv2d config | `conv_0=act_block_h_override#64:reshard_if_not_optimal#true` |
//!
//! Entries are separated by `,`. A location may appear once per option.

use crate::OptimizerError;
use graph_ir::Conv2dConfig;
use layout_core::{BufferTier, GridShape, PageMode, ScalarKind, ShardStrategy};
use layout_planner::{MemoryLayoutKind, OutputLayoutOverride};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Parses `loc=i:j,...` into operand indices per location.
pub fn parse_input_layout_overrides(
    input: &str,
) -> Result<BTreeMap<String, Vec<usize>>, OptimizerError> {
    parse_entries(input, |entry, value| {
        value
            .split(':')
            .map(|t| {
                t.trim()
                    .parse::<usize>()
                    .map_err(|_| invalid(entry, format!("'{t}' is not an operand index")))
            })
            .collect()
    })
}

/// Parses `loc=field:field:...` into output layout overrides.
///
/// Each field is recognized by its value: a grid (`4x4`), a buffer tier
/// (`l1`, `dram`), a memory layout (`interleaved`, `height_sharded`, ...),
/// a page mode (`tile`, `row_major`) or a scalar kind (`bf16`, `f32`, ...).
pub fn parse_output_layout_overrides(
    input: &str,
) -> Result<BTreeMap<String, OutputLayoutOverride>, OptimizerError> {
    parse_entries(input, |entry, value| {
        let mut ovr = OutputLayoutOverride::default();
        for token in value.split(':').map(str::trim) {
            let dup = || invalid(entry, format!("'{token}' sets a field twice"));
            if let Some(grid) = GridShape::parse(token) {
                set_once(&mut ovr.grid, grid).ok_or_else(dup)?;
            } else if let Some(tier) = BufferTier::from_str_loose(token) {
                set_once(&mut ovr.buffer_tier, tier).ok_or_else(dup)?;
            } else if let Some(kind) = MemoryLayoutKind::from_str_loose(token) {
                set_once(&mut ovr.memory_layout, kind).ok_or_else(dup)?;
            } else if let Some(mode) = PageMode::from_str_loose(token) {
                set_once(&mut ovr.page_mode, mode).ok_or_else(dup)?;
            } else if let Some(kind) = ScalarKind::from_str_loose(token) {
                set_once(&mut ovr.scalar_kind, kind).ok_or_else(dup)?;
            } else {
                return Err(invalid(entry, format!("unrecognised field '{token}'")));
            }
        }
        Ok(ovr)
    })
}

/// Parses `loc=param#value:param#value` into Conv2d overrides.
pub fn parse_conv2d_config_overrides(
    input: &str,
) -> Result<BTreeMap<String, Conv2dConfig>, OptimizerError> {
    parse_entries(input, |entry, value| {
        let mut cfg = Conv2dConfig::default();
        for pair in value.split(':') {
            let (key, val) = pair
                .split_once('#')
                .ok_or_else(|| invalid(entry, format!("'{pair}' is not param#value")))?;
            set_conv2d_param(&mut cfg, key.trim(), val.trim())
                .map_err(|detail| invalid(entry, detail))?;
        }
        Ok(cfg)
    })
}

// ── Helpers ────────────────────────────────────────────────────────

fn invalid(input: &str, detail: String) -> OptimizerError {
    OptimizerError::InvalidOverride {
        input: input.to_string(),
        detail,
    }
}

/// Splits `loc=value,loc=value` and parses each value.
fn parse_entries<T>(
    input: &str,
    mut parse: impl FnMut(&str, &str) -> Result<T, OptimizerError>,
) -> Result<BTreeMap<String, T>, OptimizerError> {
    let mut out = BTreeMap::new();
    for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (loc, value) = entry
            .split_once('=')
            .ok_or_else(|| invalid(entry, "expected loc=value".into()))?;
        let loc = loc.trim();
        if loc.is_empty() || value.trim().is_empty() {
            return Err(invalid(entry, "empty location or value".into()));
        }
        let parsed = parse(entry, value.trim())?;
        if out.insert(loc.to_string(), parsed).is_some() {
            return Err(invalid(entry, format!("'{loc}' given more than once")));
        }
    }
    Ok(out)
}

/// Sets an unset field; `None` when it was already set.
fn set_once<T>(slot: &mut Option<T>, value: T) -> Option<()> {
    if slot.is_some() {
        return None;
    }
    *slot = Some(value);
    Some(())
}

fn parse_value<T: FromStr>(key: &str, val: &str) -> Result<T, String> {
    val.parse()
        .map_err(|_| format!("invalid value '{val}' for {key}"))
}

fn set_conv2d_param(cfg: &mut Conv2dConfig, key: &str, val: &str) -> Result<(), String> {
    let dup = || format!("{key} given twice");
    let set = match key {
        "weights_kind" | "weights_dtype" => {
            let kind = ScalarKind::from_str_loose(val)
                .ok_or_else(|| format!("invalid value '{val}' for {key}"))?;
            set_once(&mut cfg.weights_kind, kind)
        }
        "activation" => set_once(&mut cfg.activation, val.to_string()),
        "input_channels_alignment" => {
            set_once(&mut cfg.input_channels_alignment, parse_value(key, val)?)
        }
        "deallocate_activation" => set_once(&mut cfg.deallocate_activation, parse_value(key, val)?),
        "reallocate_halo_output" => {
            set_once(&mut cfg.reallocate_halo_output, parse_value(key, val)?)
        }
        "act_block_h_override" => set_once(&mut cfg.act_block_h_override, parse_value(key, val)?),
        "act_block_w_div" => set_once(&mut cfg.act_block_w_div, parse_value(key, val)?),
        "reshard_if_not_optimal" => {
            set_once(&mut cfg.reshard_if_not_optimal, parse_value(key, val)?)
        }
        "override_sharding_config" => {
            set_once(&mut cfg.override_sharding_config, parse_value(key, val)?)
        }
        "shard_layout" | "shard_strategy" => {
            let strategy = ShardStrategy::from_str_loose(val)
                .ok_or_else(|| format!("invalid value '{val}' for {key}"))?;
            set_once(&mut cfg.shard_strategy, strategy)
        }
        "transpose_shards" => set_once(&mut cfg.transpose_shards, parse_value(key, val)?),
        "output_layout" | "output_page_mode" => {
            let mode = PageMode::from_str_loose(val)
                .ok_or_else(|| format!("invalid value '{val}' for {key}"))?;
            set_once(&mut cfg.output_page_mode, mode)
        }
        "enable_act_double_buffer" => {
            set_once(&mut cfg.enable_act_double_buffer, parse_value(key, val)?)
        }
        "enable_weights_double_buffer" => {
            set_once(&mut cfg.enable_weights_double_buffer, parse_value(key, val)?)
        }
        _ => return Err(format!("unknown Conv2d parameter '{key}'")),
    };
    set.ok_or_else(dup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_overrides() {
        let m = parse_input_layout_overrides("add_0=0:1, mm_1=1").unwrap();
        assert_eq!(m["add_0"], vec![0, 1]);
        assert_eq!(m["mm_1"], vec![1]);
        assert!(parse_input_layout_overrides("").unwrap().is_empty());
    }

    #[test]
    fn test_input_overrides_reject_garbage() {
        assert!(parse_input_layout_overrides("add_0").is_err());
        assert!(parse_input_layout_overrides("add_0=x").is_err());
        assert!(parse_input_layout_overrides("=0").is_err());
        assert!(parse_input_layout_overrides("a=0,a=1").is_err());
    }

    #[test]
    fn test_output_overrides_any_order() {
        let a = parse_output_layout_overrides("conv_0=4x4:l1:block_sharded:tile:bf16").unwrap();
        let b = parse_output_layout_overrides("conv_0=bf16:tile:block_sharded:l1:4x4").unwrap();
        assert_eq!(a, b);
        let o = &a["conv_0"];
        assert_eq!(o.grid, Some(GridShape::new(4, 4)));
        assert_eq!(o.buffer_tier, Some(BufferTier::Scratch));
        assert_eq!(o.memory_layout, Some(MemoryLayoutKind::BlockSharded));
        assert_eq!(o.page_mode, Some(PageMode::Tiled));
        assert_eq!(o.scalar_kind, Some(ScalarKind::Bf16));
    }

    #[test]
    fn test_output_overrides_partial() {
        let m = parse_output_layout_overrides("mm_0=dram,sm_0=row_major").unwrap();
        assert_eq!(m["mm_0"].buffer_tier, Some(BufferTier::Bulk));
        assert_eq!(m["mm_0"].grid, None);
        assert_eq!(m["sm_0"].page_mode, Some(PageMode::RowMajor));
    }

    #[test]
    fn test_output_overrides_reject_duplicates_and_unknowns() {
        assert!(matches!(
            parse_output_layout_overrides("c=l1:dram"),
            Err(OptimizerError::InvalidOverride { .. })
        ));
        assert!(parse_output_layout_overrides("c=4x4:fancy").is_err());
    }

    #[test]
    fn test_conv2d_overrides() {
        let m = parse_conv2d_config_overrides(
            "conv_0=act_block_h_override#64:reshard_if_not_optimal#true:shard_layout#height_sharded",
        )
        .unwrap();
        let c = &m["conv_0"];
        assert_eq!(c.act_block_h_override, Some(64));
        assert_eq!(c.reshard_if_not_optimal, Some(true));
        assert_eq!(c.shard_strategy, Some(ShardStrategy::Height));
        assert_eq!(c.activation, None);
    }

    #[test]
    fn test_conv2d_overrides_reject_bad_values() {
        assert!(parse_conv2d_config_overrides("c=act_block_h_override#tall").is_err());
        assert!(parse_conv2d_config_overrides("c=unknown_param#1").is_err());
        assert!(parse_conv2d_config_overrides("c=activation").is_err());
        assert!(parse_conv2d_config_overrides("c=activation#relu:activation#gelu").is_err());
    }
}
