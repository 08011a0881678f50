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

//! Task Launcher (§4.4): turns a matched offer into Mesos operations and
//! updates the Instance Tracker with the outcome.
//!
//! Grounded in `ExecutorManager::register_executor`'s sequencing: persist
//! metadata first, mutate the in-memory view second, return what happened
//! third. Here: record the instance as `Provisioned` in the tracker first,
//! then ask the driver to accept the offer -- on a send failure the
//! instance reverts to `Scheduled` with its incarnation incremented, per
//! §4.4.

use std::sync::Arc;

use marathon_core::error::Result;
use marathon_core::mesos::{MesosDriver, MesosOperation};
use marathon_core::model::ids::{InstanceId, TaskId};
use marathon_core::model::instance::{AgentInfo, Instance};
use marathon_core::model::offer::Offer;
use marathon_core::model::runspec::RunSpecKind;
use uuid::Uuid;

use crate::state::instance_tracker::{InstanceOp, InstanceTracker};
use crate::state::reservation_manager::{self, ReservationDecision};

/// One instance launched as part of a matched offer, before it is handed
/// to the tracker.
pub struct LaunchPlan {
    pub instance: Instance,
    pub operations: Vec<MesosOperation>,
}

/// Build the launch plan for `count` new instances of `run_spec` against
/// `offer`, reusing an existing resident reservation when one applies.
pub fn plan_launch(
    run_spec: &RunSpecKind,
    offer: &Offer,
    count: u32,
    existing_reservation_owner: Option<&Instance>,
) -> Vec<LaunchPlan> {
    let common = run_spec.common();
    let agent_info = AgentInfo {
        agent_id: offer.agent_id.clone(),
        hostname: offer.hostname.clone(),
        region: offer.region.clone(),
        zone: offer.zone.clone(),
        attributes: offer.attributes.clone(),
    };

    (0..count)
        .map(|_| {
            let instance_id = InstanceId::new(&common.id, Uuid::new_v4());
            let mut instance = Instance::new_scheduled(
                instance_id.clone(),
                common.id.clone(),
                common.version,
                marathon_core::utils::timestamp_millis(),
            );
            instance.agent_info = Some(agent_info.clone());
            instance.unreachable_strategy = common.unreachable_strategy;

            let mut operations = Vec::new();
            if common.is_resident() {
                let decision = existing_reservation_owner
                    .map(|owner| reservation_manager::decide(common, owner))
                    .unwrap_or(ReservationDecision::ReserveAndLaunch);
                match decision {
                    ReservationDecision::ReserveAndLaunch => {
                        let mut reservation =
                            reservation_manager::new_reservation(common, offer.agent_id.clone());
                        reservation
                            .labels
                            .insert("marathon-instance-id".to_owned(), instance_id.to_string());

                        for volume in &common.volumes {
                            if let marathon_core::model::resources::Volume::Persistent {
                                container_path,
                                size_mb,
                            } = volume
                            {
                                operations.push(MesosOperation::CreateVolume {
                                    container_path: container_path.clone(),
                                    size_mb: *size_mb,
                                });
                            }
                        }
                        operations.push(MesosOperation::Reserve {
                            labels: reservation.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                        });
                        instance.reservation = Some(reservation);
                    }
                    ReservationDecision::RelaunchExisting => {
                        if let Some(owner) = existing_reservation_owner {
                            instance.reservation = owner.reservation.clone();
                        }
                    }
                    ReservationDecision::NotResident => unreachable!("checked common.is_resident() above"),
                }
            }

            let task_id = TaskId::new(instance_id, instance.incarnation);
            operations.push(MesosOperation::Launch {
                task_id: task_id.to_string(),
            });

            LaunchPlan { instance, operations }
        })
        .collect()
}

/// Record the instance as `Provisioned` in the tracker first, then submit
/// the launch plan's operations to Mesos -- crash-safety ordering per
/// §4.4: a crash between the tracker write and the broker call resurfaces
/// as a still-`Provisioned` instance the reconciliation loop can resolve,
/// rather than a Mesos task the tracker never knew about. On a driver
/// failure the instance is reverted to `Scheduled` with an incremented
/// incarnation rather than left in a launching limbo state.
pub async fn launch(
    driver: &Arc<dyn MesosDriver>,
    tracker: &InstanceTracker,
    offer_id: &str,
    plan: LaunchPlan,
) -> Result<()> {
    let mut provisioned = plan.instance.clone();
    provisioned.state.condition = marathon_core::model::task::Condition::Provisioned;
    provisioned.state.since = marathon_core::utils::timestamp_millis();
    tracker.process(InstanceOp::Schedule(provisioned)).await?;

    let filters = marathon_core::mesos::Filters { refuse_seconds: None };
    let result = driver
        .accept_offers(vec![offer_id.to_owned()], plan.operations.clone(), filters)
        .await;

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            let mut reverted = plan.instance;
            reverted.incarnation += 1;
            reverted.state = marathon_core::model::instance::InstanceState::scheduled(
                marathon_core::utils::timestamp_millis(),
            );
            tracker.process(InstanceOp::RevertTo(reverted)).await?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use marathon_core::model::ids::AbsolutePathId;
    use marathon_core::model::resources::ResourceQuantity;
    use marathon_core::model::runspec::{
        AppSpec, ContainerSpec, KillSelection, RunSpecCommon, UnreachableStrategy, UpgradeStrategy,
    };
    use std::collections::HashMap;

    fn offer() -> Offer {
        Offer {
            offer_id: "o1".into(),
            agent_id: "agent-1".into(),
            hostname: "host-1".into(),
            region: None,
            zone: None,
            attributes: HashMap::new(),
            resources: ResourceQuantity::new(4.0, 1024.0, 100.0, 0.0),
            roles: vec!["*".into()],
            reservation_labels: HashMap::new(),
        }
    }

    fn app(resident: bool) -> RunSpecKind {
        RunSpecKind::App(AppSpec {
            common: RunSpecCommon {
                id: AbsolutePathId::new("/a"),
                version: 1,
                resources: ResourceQuantity::new(1.0, 128.0, 10.0, 0.0),
                role: "*".into(),
                accepted_resource_roles: vec!["*".into()],
                fetch: vec![],
                constraints: vec![],
                health_checks: vec![],
                upgrade_strategy: UpgradeStrategy::default(),
                unreachable_strategy: UnreachableStrategy::default_for_residency(resident),
                kill_selection: KillSelection::default(),
                residency: None,
                volumes: vec![],
                dependencies: vec![],
                instances: 1,
                region_preference: None,
            },
            container: ContainerSpec {
                image: "alpine".into(),
                cmd: None,
                args: vec![],
                env: HashMap::new(),
            },
        })
    }

    #[test]
    fn plan_launch_produces_one_plan_per_requested_instance() {
        let spec = app(false);
        let plans = plan_launch(&spec, &offer(), 3, None);
        assert_eq!(plans.len(), 3);
        for plan in &plans {
            assert!(!plan.operations.is_empty());
            assert_eq!(
                plan.instance.agent_info.as_ref().unwrap().agent_id,
                "agent-1"
            );
        }
    }

    #[test]
    fn non_resident_plan_has_no_reservation() {
        let spec = app(false);
        let plans = plan_launch(&spec, &offer(), 1, None);
        assert!(plans[0].instance.reservation.is_none());
    }
}
