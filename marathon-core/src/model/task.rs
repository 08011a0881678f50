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

//! Task: one OS-level execution on an agent (§3).

use serde::{Deserialize, Serialize};

use crate::model::ids::TaskId;

/// The condition derived from the most recent Mesos `TaskState`, per the
/// mapping rules in §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    Scheduled,
    Provisioned,
    Staging,
    Starting,
    Running,
    Killing,
    Killed,
    Finished,
    Failed,
    Error,
    Gone,
    Unreachable,
    UnreachableInactive,
    Dropped,
    Unknown,
}

impl Condition {
    /// Terminal conditions are ones from which no further `MesosUpdate`
    /// advances the task; a terminal status on a task is the trigger for
    /// the instance-level goal handling in §4.1.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Condition::Killed
                | Condition::Finished
                | Condition::Failed
                | Condition::Error
                | Condition::Gone
                | Condition::Dropped
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub host_ports: Vec<u32>,
    pub ip_addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Raw Mesos status string (e.g. `TASK_RUNNING`), kept for diagnostics
    /// alongside the derived `condition`.
    pub mesos_status: String,
    pub network_info: NetworkInfo,
    pub condition: Condition,
    /// Clamped to `maxStatusMessageLength` (120 bytes) before being stored,
    /// per §4.1 and the literal scenario in §8.
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub agent_id: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn terminal_conditions_are_exhaustively_terminal() {
        let terminal = [
            Condition::Killed,
            Condition::Finished,
            Condition::Failed,
            Condition::Error,
            Condition::Gone,
            Condition::Dropped,
        ];
        for c in terminal {
            assert!(c.is_terminal(), "{c:?} should be terminal");
        }
    }

    #[test]
    fn non_terminal_conditions_are_not_terminal() {
        let non_terminal = [
            Condition::Scheduled,
            Condition::Provisioned,
            Condition::Staging,
            Condition::Starting,
            Condition::Running,
            Condition::Killing,
            Condition::Unreachable,
            Condition::UnreachableInactive,
            Condition::Unknown,
        ];
        for c in non_terminal {
            assert!(!c.is_terminal(), "{c:?} should not be terminal");
        }
    }
}
