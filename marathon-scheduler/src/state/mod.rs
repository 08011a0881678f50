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

//! The scheduler's stateful components (§4): durable state behind
//! `StateBackendClient`, the single-writer Instance Tracker, the Launch
//! Queue, the Offer Matcher, the Task Launcher/Reservation Manager, the
//! Deployment Planner/Executor, and Leader Election.

pub mod backend;
pub mod deployment;
pub mod instance_tracker;
pub mod launch_queue;
pub mod leader;
pub mod offer_matcher;
pub mod reservation_manager;
pub mod task_launcher;

pub use backend::{Keyspace, StateBackendClient};
pub use instance_tracker::{InstanceEvent, InstanceOp, InstanceTracker};
pub use launch_queue::LaunchQueue;
pub use leader::LeaderElection;
pub use offer_matcher::{match_offer, LaunchCandidate, OfferMatchResult};
