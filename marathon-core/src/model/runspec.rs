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

//! RunSpec: the declarative description of a workload (§3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::constraints::Constraint;
use crate::model::ids::AbsolutePathId;
use crate::model::resources::{ResourceQuantity, Volume};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub cmd: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchUri {
    pub uri: String,
    pub extract: bool,
    pub executable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpgradeStrategy {
    pub minimum_health_capacity: f64,
    pub maximum_over_capacity: f64,
}

impl UpgradeStrategy {
    pub fn new(minimum_health_capacity: f64, maximum_over_capacity: f64) -> Self {
        Self {
            minimum_health_capacity,
            maximum_over_capacity,
        }
    }
}

impl Default for UpgradeStrategy {
    fn default() -> Self {
        Self::new(1.0, 0.0)
    }
}

/// Governs when an `Unreachable` instance is promoted to
/// `UnreachableInactive` and ultimately expunged. Per the resolved Open
/// Question (§9 of the original spec, decided in `DESIGN.md`), the default
/// differs between resident and non-resident specs; callers may still
/// override either default explicitly, and the chosen value round-trips
/// through persistence rather than being re-derived from residency at
/// read time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UnreachableStrategy {
    Disabled,
    Enabled {
        inactive_after_secs: u64,
        expunge_after_secs: u64,
    },
}

impl UnreachableStrategy {
    pub fn disabled() -> Self {
        UnreachableStrategy::Disabled
    }

    pub fn default_enabled() -> Self {
        UnreachableStrategy::Enabled {
            inactive_after_secs: 5 * 60,
            expunge_after_secs: 10 * 60,
        }
    }

    /// The default for a spec with (`residency.is_some()`) or without a
    /// residency descriptor, per the Open Question resolution.
    pub fn default_for_residency(resident: bool) -> Self {
        if resident {
            Self::disabled()
        } else {
            Self::default_enabled()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillSelection {
    YoungestFirst,
    OldestFirst,
}

impl Default for KillSelection {
    fn default() -> Self {
        KillSelection::YoungestFirst
    }
}

/// Present only on resident (stateful) specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskLostBehavior {
    WaitForever,
    RelaunchAfterTimeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidencyDescriptor {
    pub task_lost_behavior: TaskLostBehavior,
    pub relaunch_escalation_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub protocol: HealthCheckProtocol,
    pub path: Option<String>,
    pub port_index: Option<u32>,
    pub grace_period_secs: u64,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthCheckProtocol {
    Http,
    Tcp,
    Command,
}

/// Shared fields between `AppSpec` and `PodSpec`, per §3 ("RunSpec
/// (abstract)"). Concrete specs expose these via `RunSpecRef`/`RunSpecKind`
/// rather than duplicating the fields in both structs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpecCommon {
    pub id: AbsolutePathId,
    pub version: u64,
    pub resources: ResourceQuantity,
    pub role: String,
    pub accepted_resource_roles: Vec<String>,
    pub fetch: Vec<FetchUri>,
    pub constraints: Vec<Constraint>,
    pub health_checks: Vec<HealthCheck>,
    pub upgrade_strategy: UpgradeStrategy,
    pub unreachable_strategy: UnreachableStrategy,
    pub kill_selection: KillSelection,
    pub residency: Option<ResidencyDescriptor>,
    pub volumes: Vec<Volume>,
    /// App-to-app dependency edges, consumed by the deployment planner's
    /// DAG alongside group-level dependencies (§4.5).
    pub dependencies: Vec<AbsolutePathId>,
    pub instances: u32,
    pub region_preference: Option<String>,
}

impl RunSpecCommon {
    pub fn is_resident(&self) -> bool {
        self.residency.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSpec {
    pub common: RunSpecCommon,
    pub container: ContainerSpec,
}

/// One task within a pod; each carries its own resource split out of the
/// pod's overall request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodTaskSpec {
    pub name: String,
    pub resources: ResourceQuantity,
    pub container: ContainerSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    pub common: RunSpecCommon,
    pub tasks: Vec<PodTaskSpec>,
}

/// A RunSpec is either a single-task App or a coscheduled-task-group Pod
/// (§3). Kept as a tagged enum per the Design Notes convention of modeling
/// variant data as tagged variants rather than trait objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunSpecKind {
    App(AppSpec),
    Pod(PodSpec),
}

impl RunSpecKind {
    pub fn common(&self) -> &RunSpecCommon {
        match self {
            RunSpecKind::App(app) => &app.common,
            RunSpecKind::Pod(pod) => &pod.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut RunSpecCommon {
        match self {
            RunSpecKind::App(app) => &mut app.common,
            RunSpecKind::Pod(pod) => &mut pod.common,
        }
    }

    pub fn id(&self) -> &AbsolutePathId {
        &self.common().id
    }

    pub fn is_resident(&self) -> bool {
        self.common().is_resident()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn app(id: &str, resident: bool) -> RunSpecKind {
        let residency = resident.then_some(ResidencyDescriptor {
            task_lost_behavior: TaskLostBehavior::WaitForever,
            relaunch_escalation_timeout_secs: 3600,
        });
        RunSpecKind::App(AppSpec {
            common: RunSpecCommon {
                id: AbsolutePathId::new(id),
                version: 1,
                resources: ResourceQuantity::new(0.1, 32.0, 10.0, 0.0),
                role: "*".into(),
                accepted_resource_roles: vec!["*".into()],
                fetch: vec![],
                constraints: vec![],
                health_checks: vec![],
                upgrade_strategy: UpgradeStrategy::default(),
                unreachable_strategy: UnreachableStrategy::default_for_residency(resident),
                kill_selection: KillSelection::default(),
                residency,
                volumes: vec![],
                dependencies: vec![],
                instances: 1,
                region_preference: None,
            },
            container: ContainerSpec {
                image: "alpine".into(),
                cmd: Some("sleep 1000".into()),
                args: vec![],
                env: HashMap::new(),
            },
        })
    }

    #[test]
    fn resident_specs_default_unreachable_disabled() {
        let spec = app("/rt/write", true);
        assert_eq!(spec.common().unreachable_strategy, UnreachableStrategy::Disabled);
    }

    #[test]
    fn non_resident_specs_default_unreachable_enabled() {
        let spec = app("/web/api", false);
        match spec.common().unreachable_strategy {
            UnreachableStrategy::Enabled {
                inactive_after_secs,
                expunge_after_secs,
            } => {
                assert_eq!(inactive_after_secs, 300);
                assert_eq!(expunge_after_secs, 600);
            }
            UnreachableStrategy::Disabled => panic!("expected enabled strategy"),
        }
    }
}
