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

//! Marathon's stateful scheduling components (§4): durable state behind a
//! pluggable `StateBackendClient`, the Instance Tracker, Launch Queue,
//! Offer Matcher, Task Launcher/Reservation Manager, Deployment Planner &
//! Executor, Leader Election, metrics, and the `SchedulerAdapter` that
//! wires Mesos callbacks to all of the above.

pub mod config;
pub mod metrics;
pub mod scheduler_server;
pub mod state;

#[cfg(test)]
pub mod test_utils;

pub use config::{ResidencyTaskLostBehavior, SchedulerConfig, StorageBackend};
pub use metrics::{NoopMetricsCollector, SchedulerMetricsCollector};
pub use scheduler_server::SchedulerAdapter;
pub use state::{
    match_offer, InstanceEvent, InstanceOp, InstanceTracker, Keyspace, LaunchCandidate,
    LaunchQueue, LeaderElection, OfferMatchResult, StateBackendClient,
};
