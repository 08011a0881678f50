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

//! Instance: one realization of a RunSpec (§3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::ids::{AbsolutePathId, InstanceId, TaskId};
use crate::model::reservation::Reservation;
use crate::model::runspec::UnreachableStrategy;
use crate::model::task::{Condition, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Goal {
    Running,
    Stopped,
    Decommissioned,
}

impl Goal {
    /// Terminal goals keep no further lifecycle ahead of them: `Stopped`
    /// retains the record for relaunch, `Decommissioned` schedules removal
    /// (§3).
    pub fn is_terminal(self) -> bool {
        matches!(self, Goal::Stopped | Goal::Decommissioned)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub hostname: String,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceState {
    pub condition: Condition,
    /// When `condition` was last updated, epoch millis.
    pub since: u64,
    /// When the instance first became healthy/running, if ever.
    pub active_since: Option<u64>,
    pub healthy: Option<bool>,
    pub goal: Goal,
    /// Set when `condition` transitions to `Unreachable`, consumed by the
    /// unreachable-promotion ticker in §4.1.
    pub unreachable_since: Option<u64>,
}

impl InstanceState {
    pub fn scheduled(now: u64) -> Self {
        Self {
            condition: Condition::Scheduled,
            since: now,
            active_since: None,
            healthy: None,
            goal: Goal::Running,
            unreachable_since: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: InstanceId,
    pub run_spec_id: AbsolutePathId,
    pub run_spec_version: u64,
    pub agent_info: Option<AgentInfo>,
    pub state: InstanceState,
    pub tasks: HashMap<TaskId, Task>,
    pub reservation: Option<Reservation>,
    /// Incremented each time the instance is reverted to `Scheduled` after
    /// a failed launch attempt (§4.4's "reverts to Scheduled with
    /// incremented incarnation").
    pub incarnation: u32,
    pub scheduled_at: u64,
    /// Snapshot of the run spec's unreachable policy at launch time, so
    /// the unreachable-promotion ticker (§4.1) doesn't need to re-resolve
    /// it against a run spec that may have since changed or been removed.
    pub unreachable_strategy: UnreachableStrategy,
}

impl Instance {
    pub fn new_scheduled(
        instance_id: InstanceId,
        run_spec_id: AbsolutePathId,
        run_spec_version: u64,
        now: u64,
    ) -> Self {
        Self {
            instance_id,
            run_spec_id,
            run_spec_version,
            agent_info: None,
            state: InstanceState::scheduled(now),
            tasks: HashMap::new(),
            reservation: None,
            incarnation: 0,
            scheduled_at: now,
            unreachable_strategy: UnreachableStrategy::default_enabled(),
        }
    }

    pub fn is_resident(&self) -> bool {
        self.reservation.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decommissioned_and_stopped_goals_are_terminal() {
        assert!(Goal::Stopped.is_terminal());
        assert!(Goal::Decommissioned.is_terminal());
        assert!(!Goal::Running.is_terminal());
    }

    #[test]
    fn new_instance_starts_scheduled() {
        let instance = Instance::new_scheduled(
            InstanceId("/a.instance-1".into()),
            AbsolutePathId::new("/a"),
            1,
            1000,
        );
        assert_eq!(instance.state.condition, Condition::Scheduled);
        assert_eq!(instance.incarnation, 0);
        assert!(instance.tasks.is_empty());
    }
}
