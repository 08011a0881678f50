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

//! Deployment Planner & Executor (§4.5).
//!
//! Grounded in the teacher's `QueryStageScheduler` event-loop wiring: plan
//! steps are posted as events and advanced by a single actor, the same
//! "post an event, the actor advances shared state, status updates flow
//! back in" shape as `SchedulerServer::submit_job`/`update_task_status`.

pub mod executor;
pub mod plan;

pub use executor::{DeploymentExecutor, DeploymentObserver, StepOutcome};
pub use plan::plan_deployment;
