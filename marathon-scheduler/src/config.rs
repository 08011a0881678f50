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
//

//! Marathon scheduler configuration (§6 "Configuration surface").

use clap::ArgEnum;

/// Every recognized configuration option from §6, with the same
/// builder (`with_*`) / `Default` style the teacher's own
/// `SchedulerConfig` uses.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_instances_per_offer: u32,
    pub offer_matching_timeout_millis: u64,

    pub instance_tracker_update_queue_size: usize,
    pub instance_tracker_num_parallel_updates: usize,
    pub instance_tracker_query_timeout_millis: u64,

    pub default_backoff_seconds: u64,
    pub default_backoff_factor: f64,
    pub max_launch_delay_seconds: u64,

    pub default_minimum_health_capacity: f64,
    pub default_maximum_over_capacity: f64,

    pub residency_relaunch_escalation_timeout_seconds: u64,
    pub residency_task_lost_behavior: ResidencyTaskLostBehavior,

    pub unreachable_inactive_after_seconds: u64,
    pub unreachable_expunge_after_seconds: u64,
    /// How often the unreachable-promotion ticker sweeps the tracker's
    /// instances (§4.1).
    pub unreachable_ticker_interval_seconds: u64,
    /// How long an instance must hold `Running` condition before the
    /// launch queue's backoff for its run spec is reset (§4.3).
    pub launch_stable_interval_seconds: u64,

    pub max_versions: u32,
    pub storage_compaction_scan_batch_size: u32,
    pub storage_compaction_interval_seconds: u64,

    pub reconciliation_interval_seconds: u64,
    pub reconciliation_initial_delay_seconds: u64,
    /// How long a reconciled task may go without a fresh status update
    /// before the reconciliation ticker degrades it to `Unknown` (§5, §7).
    pub reconciliation_grace_period_seconds: u64,

    /// Exact constant per §6: "every outgoing status-update event is
    /// truncated to at most 120 bytes in its `message` field".
    pub max_status_message_length: usize,

    pub storage_backend: StorageBackend,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_instances_per_offer: 2,
            offer_matching_timeout_millis: 5_000,

            instance_tracker_update_queue_size: 10_000,
            instance_tracker_num_parallel_updates: 8,
            instance_tracker_query_timeout_millis: 2_000,

            default_backoff_seconds: 1,
            default_backoff_factor: 1.15,
            max_launch_delay_seconds: 300,

            default_minimum_health_capacity: 1.0,
            default_maximum_over_capacity: 0.0,

            residency_relaunch_escalation_timeout_seconds: 3600,
            residency_task_lost_behavior: ResidencyTaskLostBehavior::WaitForever,

            unreachable_inactive_after_seconds: 5 * 60,
            unreachable_expunge_after_seconds: 10 * 60,
            unreachable_ticker_interval_seconds: 30,
            launch_stable_interval_seconds: 5 * 60,

            max_versions: 25,
            storage_compaction_scan_batch_size: 256,
            storage_compaction_interval_seconds: 3600,

            reconciliation_interval_seconds: 600,
            reconciliation_initial_delay_seconds: 30,
            reconciliation_grace_period_seconds: 60,

            max_status_message_length: 120,

            storage_backend: StorageBackend::Memory,
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_instances_per_offer(mut self, n: u32) -> Self {
        self.max_instances_per_offer = n;
        self
    }

    pub fn with_offer_matching_timeout_millis(mut self, millis: u64) -> Self {
        self.offer_matching_timeout_millis = millis;
        self
    }

    pub fn with_instance_tracker_update_queue_size(mut self, size: usize) -> Self {
        self.instance_tracker_update_queue_size = size;
        self
    }

    pub fn with_instance_tracker_num_parallel_updates(mut self, n: usize) -> Self {
        self.instance_tracker_num_parallel_updates = n;
        self
    }

    pub fn with_default_backoff(mut self, seconds: u64, factor: f64) -> Self {
        self.default_backoff_seconds = seconds;
        self.default_backoff_factor = factor;
        self
    }

    pub fn with_max_launch_delay_seconds(mut self, seconds: u64) -> Self {
        self.max_launch_delay_seconds = seconds;
        self
    }

    pub fn with_unreachable_timeouts(mut self, inactive_after: u64, expunge_after: u64) -> Self {
        self.unreachable_inactive_after_seconds = inactive_after;
        self.unreachable_expunge_after_seconds = expunge_after;
        self
    }

    pub fn with_storage_backend(mut self, backend: StorageBackend) -> Self {
        self.storage_backend = backend;
        self
    }
}

#[derive(Clone, Copy, ArgEnum, Debug, PartialEq, Eq, serde::Deserialize)]
pub enum ResidencyTaskLostBehavior {
    WaitForever,
    RelaunchAfterTimeout,
}

impl std::str::FromStr for ResidencyTaskLostBehavior {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ArgEnum::from_str(s, true)
    }
}

/// Which `StateBackendClient` implementation `marathon-cli` wires up.
/// Visible to clap as an `--storage` flag, mirroring the teacher's
/// `SlotsPolicy`/`ArgEnum` pattern.
#[derive(Clone, Copy, ArgEnum, Debug, PartialEq, Eq, serde::Deserialize)]
pub enum StorageBackend {
    Memory,
    Sled,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ArgEnum::from_str(s, true)
    }
}
