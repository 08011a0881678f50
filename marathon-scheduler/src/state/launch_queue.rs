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

//! Launch Queue (§4.3): bounded per-spec backlog of outstanding instance
//! demand, with backoff.
//!
//! Grounded on the teacher's `ExecutorReservation`/slot bookkeeping style
//! (`state::executor_manager::ExecutorReservation`): a small plain struct
//! tracked in a concurrent map, generalized here from "slots" to
//! "outstanding instance demand per RunSpec". Stored in a `dashmap`, the
//! teacher's own dependency for exactly this kind of sharded concurrent
//! map.

use dashmap::DashMap;
use marathon_core::model::AbsolutePathId;

use crate::config::SchedulerConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LaunchAttemptResult {
    Matched,
    NoMatch,
    TaskFailed,
    /// `Running` for the configured minimum stable interval; resets
    /// backoff to the configured floor (§4.3).
    Stable,
}

#[derive(Debug, Clone)]
pub struct LaunchQueueEntry {
    pub run_spec_id: AbsolutePathId,
    pub outstanding: u32,
    pub backoff_seconds: u64,
    /// Epoch millis before which this spec should not be offered again.
    pub backoff_deadline_millis: u64,
    pub last_match_count: u64,
    pub last_no_match_count: u64,
}

impl LaunchQueueEntry {
    fn new(run_spec_id: AbsolutePathId, outstanding: u32, default_backoff_seconds: u64) -> Self {
        Self {
            run_spec_id,
            outstanding,
            backoff_seconds: default_backoff_seconds,
            backoff_deadline_millis: 0,
            last_match_count: 0,
            last_no_match_count: 0,
        }
    }
}

pub struct LaunchQueue {
    entries: DashMap<AbsolutePathId, LaunchQueueEntry>,
    default_backoff_seconds: u64,
    backoff_factor: f64,
    max_launch_delay_seconds: u64,
}

impl LaunchQueue {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            entries: DashMap::new(),
            default_backoff_seconds: config.default_backoff_seconds,
            backoff_factor: config.default_backoff_factor,
            max_launch_delay_seconds: config.max_launch_delay_seconds,
        }
    }

    /// Add `count` instances of demand for `run_spec_id`, creating the
    /// entry if it doesn't already exist.
    pub fn add(&self, run_spec_id: AbsolutePathId, count: u32) {
        self.entries
            .entry(run_spec_id.clone())
            .and_modify(|e| e.outstanding += count)
            .or_insert_with(|| LaunchQueueEntry::new(run_spec_id, count, self.default_backoff_seconds));
    }

    /// Remove all demand for a run spec, e.g. on scale-to-zero or delete.
    pub fn purge(&self, run_spec_id: &AbsolutePathId) {
        self.entries.remove(run_spec_id);
    }

    /// Every spec with outstanding demand whose backoff deadline has
    /// passed, eligible to be offered against (§4.2 step 1 consumes this).
    pub fn eligible(&self, now_millis: u64) -> Vec<LaunchQueueEntry> {
        self.entries
            .iter()
            .filter(|e| e.outstanding > 0 && e.backoff_deadline_millis <= now_millis)
            .map(|e| e.clone())
            .collect()
    }

    /// Decrement outstanding demand after a successful launch.
    pub fn decrement(&self, run_spec_id: &AbsolutePathId, by: u32) {
        if let Some(mut entry) = self.entries.get_mut(run_spec_id) {
            entry.outstanding = entry.outstanding.saturating_sub(by);
        }
    }

    /// Record the result of a launch attempt and update backoff per §4.3:
    /// `TaskFailed` multiplies the delay by `backoffFactor` up to
    /// `maxLaunchDelay`; `Stable` resets to the configured floor.
    pub fn notify_launch_attempt(&self, run_spec_id: &AbsolutePathId, result: LaunchAttemptResult, now_millis: u64) {
        if let Some(mut entry) = self.entries.get_mut(run_spec_id) {
            match result {
                LaunchAttemptResult::Matched => {
                    entry.last_match_count += 1;
                }
                LaunchAttemptResult::NoMatch => {
                    entry.last_no_match_count += 1;
                }
                LaunchAttemptResult::TaskFailed => {
                    let next = (entry.backoff_seconds as f64 * self.backoff_factor) as u64;
                    entry.backoff_seconds = next.min(self.max_launch_delay_seconds);
                    entry.backoff_deadline_millis = now_millis + entry.backoff_seconds * 1000;
                }
                LaunchAttemptResult::Stable => {
                    entry.backoff_seconds = self.default_backoff_seconds;
                    entry.backoff_deadline_millis = 0;
                }
            }
        }
    }

    pub fn entry(&self, run_spec_id: &AbsolutePathId) -> Option<LaunchQueueEntry> {
        self.entries.get(run_spec_id).map(|e| e.clone())
    }
}
