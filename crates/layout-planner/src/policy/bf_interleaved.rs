// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Breadth-first on-chip interleaved policy.
//!
//! Runs nodes level by level (Kahn's algorithm, FIFO) and admits only
//! on-chip interleaved candidates. Wide graphs keep more tensors live at
//! once than under [`crate::DfSharding`], so expect more evictions.

use super::first_fit::{self, FitRules};
use super::greedy_interleaved::on_chip_interleaved;
use super::{Dependencies, MemoryLayoutPolicy, PolicyInput};
use crate::{FunctionPlan, PlannerError};

#[derive(Debug, Clone, Default)]
pub struct BfInterleaved;

impl BfInterleaved {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryLayoutPolicy for BfInterleaved {
    fn name(&self) -> &str {
        "bf-interleaved"
    }

    fn plan_function(&self, input: &PolicyInput<'_>) -> Result<FunctionPlan, PlannerError> {
        let deps = Dependencies::new(input);
        let order = deps.breadth_first();
        let rules = FitRules {
            admit: on_chip_interleaved,
            reuse_chain: false,
        };
        first_fit::schedule(self.name(), input, &deps, order, rules)
    }
}
