// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Depth-first sharding policy.
//!
//! Follows each producer to its consumers before starting another path, so
//! a tensor is consumed soon after it is produced and the live set stays
//! small. Every scratch candidate is admissible, sharded layouts first as
//! the candidate order ranks them. An elementwise node reading a sharded
//! tensor first tries the producer's own layout, which leaves the edge
//! without a conversion.
//!
//! # When to use
//! - Default policy. Best for long elementwise chains that shard well.

use super::first_fit::{self, FitRules};
use super::{Dependencies, MemoryLayoutPolicy, PolicyInput};
use crate::{FunctionPlan, PlannerError};
use layout_core::Layout;

#[derive(Debug, Clone, Default)]
pub struct DfSharding;

impl DfSharding {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryLayoutPolicy for DfSharding {
    fn name(&self) -> &str {
        "df-sharding"
    }

    fn plan_function(&self, input: &PolicyInput<'_>) -> Result<FunctionPlan, PlannerError> {
        let deps = Dependencies::new(input);
        let order = deps.depth_first();
        let rules = FitRules {
            admit: Layout::is_scratch,
            reuse_chain: true,
        };
        first_fit::schedule(self.name(), input, &deps, order, rules)
    }
}
