// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! DeploymentPlan: the diff between two root groups, as data (§3, §4.5).
//!
//! Steps are tagged variants rather than polymorphic objects, per the
//! Design Note in §9: "represent steps as tagged variants ... execution is
//! a pure function from (plan, observed-state) to (next-action,
//! remaining-plan), enabling resumption."

use serde::{Deserialize, Serialize};

use crate::model::ids::AbsolutePathId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeploymentAction {
    StartApplication {
        run_spec_id: AbsolutePathId,
        to_version: u64,
    },
    ScaleApplication {
        run_spec_id: AbsolutePathId,
        to: u32,
    },
    RestartApplication {
        run_spec_id: AbsolutePathId,
        to_version: u64,
    },
    StopApplication {
        run_spec_id: AbsolutePathId,
    },
    /// Interleaved with `RestartApplication`/version-changing scale steps
    /// per §4.5: waits until `running-and-healthy >=
    /// minimumHealthCapacity x target` of the new version before the step
    /// is considered complete.
    ReadinessCheckStep {
        run_spec_id: AbsolutePathId,
        to_version: u64,
    },
}

impl DeploymentAction {
    pub fn run_spec_id(&self) -> &AbsolutePathId {
        match self {
            DeploymentAction::StartApplication { run_spec_id, .. }
            | DeploymentAction::ScaleApplication { run_spec_id, .. }
            | DeploymentAction::RestartApplication { run_spec_id, .. }
            | DeploymentAction::StopApplication { run_spec_id }
            | DeploymentAction::ReadinessCheckStep { run_spec_id, .. } => run_spec_id,
        }
    }
}

/// A single step: a set of mutually independent actions that execute
/// concurrently (§4.5's "within each level, emit parallel step actions").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStep {
    pub actions: Vec<DeploymentAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Superseded by a `force`d overriding plan; in-flight actions are
    /// allowed to complete (§4.5).
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub id: String,
    pub original_root_version: u64,
    pub target_root_version: u64,
    pub steps: Vec<DeploymentStep>,
    /// Index of the first step not yet completed; allows resumption after
    /// a leader change without re-planning (§4.5's idempotent steps).
    pub current_step: usize,
    pub status: DeploymentStatus,
    /// Epoch millis of the first `advance()` call that moved this plan out
    /// of `Pending`; used to compute deployment duration for metrics.
    pub started_at_millis: Option<u64>,
}

impl DeploymentPlan {
    pub fn new(
        id: impl Into<String>,
        original_root_version: u64,
        target_root_version: u64,
        steps: Vec<DeploymentStep>,
    ) -> Self {
        Self {
            id: id.into(),
            original_root_version,
            target_root_version,
            steps,
            current_step: 0,
            status: DeploymentStatus::Pending,
            started_at_millis: None,
        }
    }

    /// The run spec ids this plan holds locks on, per §4.5's "a plan holds
    /// locks on its affected runspec ids".
    pub fn locked_run_spec_ids(&self) -> Vec<&AbsolutePathId> {
        let mut ids: Vec<&AbsolutePathId> = self
            .steps
            .iter()
            .flat_map(|step| step.actions.iter())
            .map(DeploymentAction::run_spec_id)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn is_complete(&self) -> bool {
        self.current_step >= self.steps.len()
    }

    pub fn current_step(&self) -> Option<&DeploymentStep> {
        self.steps.get(self.current_step)
    }
}
