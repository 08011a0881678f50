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

//! The declarative data model (§3): RunSpec, Group, Instance, Task,
//! Reservation and DeploymentPlan, plus the offer/constraint types the
//! offer matcher (§4.2) consumes.

pub mod constraints;
pub mod deployment;
pub mod group;
pub mod ids;
pub mod instance;
pub mod offer;
pub mod reservation;
pub mod resources;
pub mod runspec;
pub mod task;

pub use constraints::{Constraint, ConstraintField, ConstraintOp, NoMatchReason};
pub use deployment::{DeploymentAction, DeploymentPlan, DeploymentStatus, DeploymentStep};
pub use group::Group;
pub use ids::{AbsolutePathId, InstanceId, TaskId};
pub use instance::{AgentInfo, Goal, Instance, InstanceState};
pub use offer::{Offer, PlacedInstance};
pub use reservation::{Reservation, ReservationState};
pub use resources::{ResourceQuantity, Volume};
pub use runspec::{
    AppSpec, ContainerSpec, HealthCheck, HealthCheckProtocol, KillSelection, PodSpec, PodTaskSpec,
    ResidencyDescriptor, RunSpecCommon, RunSpecKind, TaskLostBehavior, UnreachableStrategy,
    UpgradeStrategy,
};
pub use task::{Condition, NetworkInfo, Task, TaskStatus};
