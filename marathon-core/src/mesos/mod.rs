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

//! The resource-broker (Mesos) callback-and-action contract (§6).
//!
//! Only the interface is modeled here -- the native Mesos client library
//! itself is an external collaborator (Non-goal, §1). `MesosDriver` is the
//! set of actions the core emits against the broker; `MesosCallbacks` is
//! the set of callbacks a `SchedulerAdapter` (in `marathon-scheduler`)
//! implements to consume broker-originated events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::task::Condition;

/// Raw Mesos `TaskState` values, as delivered on `statusUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MesosTaskState {
    TaskStaging,
    TaskRunning,
    TaskFinished,
    TaskFailed,
    TaskKilled,
    TaskLost,
    TaskGoneByOperator,
    TaskUnreachable,
    TaskDropped,
    TaskUnknown,
}

impl MesosTaskState {
    /// The condition mapping rules from §4.1. `TaskLost` and
    /// `TaskGoneByOperator` both map to `Gone`, per the spec's grouping.
    pub fn to_condition(self) -> Condition {
        match self {
            MesosTaskState::TaskStaging => Condition::Staging,
            MesosTaskState::TaskRunning => Condition::Running,
            MesosTaskState::TaskFinished => Condition::Finished,
            MesosTaskState::TaskFailed => Condition::Failed,
            MesosTaskState::TaskKilled => Condition::Killed,
            MesosTaskState::TaskLost | MesosTaskState::TaskGoneByOperator => Condition::Gone,
            MesosTaskState::TaskUnreachable => Condition::Unreachable,
            MesosTaskState::TaskDropped => Condition::Dropped,
            MesosTaskState::TaskUnknown => Condition::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MesosTaskStatus {
    pub task_id: String,
    pub agent_id: String,
    pub state: MesosTaskState,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterInfo {
    pub framework_id: Option<String>,
    pub master_url: String,
    pub domain_region: Option<String>,
    pub domain_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filters {
    pub refuse_seconds: Option<f64>,
}

/// Actions the core emits against the resource broker (§6). Implemented by
/// the concrete Mesos client adapter; `marathon-scheduler`'s components
/// only depend on this trait.
#[async_trait]
pub trait MesosDriver: Send + Sync {
    async fn accept_offers(
        &self,
        offer_ids: Vec<String>,
        operations: Vec<MesosOperation>,
        filters: Filters,
    ) -> Result<()>;

    async fn decline_offer(&self, offer_id: String, filters: Filters) -> Result<()>;

    async fn kill_task(&self, task_id: String) -> Result<()>;

    async fn reconcile_tasks(&self, task_ids: Vec<String>) -> Result<()>;

    async fn revive_offers(&self) -> Result<()>;

    async fn suppress_offers(&self) -> Result<()>;

    /// Stop the underlying driver. `failover = true` preserves the
    /// framework id for the next registration (§4.6).
    async fn stop(&self, failover: bool) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MesosOperation {
    Launch { task_id: String },
    Reserve { labels: Vec<(String, String)> },
    CreateVolume { container_path: String, size_mb: u64 },
    Unreserve,
    DestroyVolume { volume_id: String },
}

/// Callbacks the core consumes from the resource broker (§6). A
/// `SchedulerAdapter` implements this trait; see `marathon-scheduler`.
#[async_trait]
pub trait MesosCallbacks: Send + Sync {
    async fn registered(&self, framework_id: String, master_info: MasterInfo) -> Result<()>;
    async fn reregistered(&self, master_info: MasterInfo) -> Result<()>;
    async fn disconnected(&self) -> Result<()>;
    async fn offers(&self, offers: Vec<crate::model::offer::Offer>) -> Result<()>;
    async fn rescinded(&self, offer_id: String) -> Result<()>;
    async fn status_update(&self, status: MesosTaskStatus) -> Result<()>;
    async fn framework_message(&self, executor_id: String, data: Vec<u8>) -> Result<()>;
    async fn slave_lost(&self, agent_id: String) -> Result<()>;
    async fn executor_lost(&self, executor_id: String, agent_id: String) -> Result<()>;
    async fn error(&self, message: String) -> Result<()>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lost_and_gone_by_operator_both_map_to_gone() {
        assert_eq!(MesosTaskState::TaskLost.to_condition(), Condition::Gone);
        assert_eq!(MesosTaskState::TaskGoneByOperator.to_condition(), Condition::Gone);
    }

    #[test]
    fn running_maps_to_running() {
        assert_eq!(MesosTaskState::TaskRunning.to_condition(), Condition::Running);
    }

    #[test]
    fn unreachable_maps_to_unreachable() {
        assert_eq!(MesosTaskState::TaskUnreachable.to_condition(), Condition::Unreachable);
    }
}
