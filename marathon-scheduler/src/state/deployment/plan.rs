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

//! Plan computation: diff two root `Group` trees into a `DeploymentPlan`
//! (§4.5). The diff walks every run spec present in either tree; the
//! dependency DAG (group- and app-level edges, same edges `Group::validate`
//! checks) is topologically leveled with Kahn's algorithm so that each
//! `DeploymentStep` only contains actions whose dependencies are already
//! satisfied by an earlier step.

use std::collections::{HashMap, HashSet};

use marathon_core::error::{MarathonError, Result};
use marathon_core::model::deployment::{DeploymentAction, DeploymentPlan, DeploymentStep};
use marathon_core::model::group::Group;
use marathon_core::model::ids::AbsolutePathId;
use marathon_core::model::runspec::RunSpecKind;

/// Compute the plan to move from `old` to `new`. `new` must already have
/// passed `Group::validate` (§3's uniqueness/DAG invariants).
pub fn plan_deployment(old: &Group, new: &Group, plan_id: impl Into<String>) -> Result<DeploymentPlan> {
    new.validate()?;

    let old_specs: HashMap<&AbsolutePathId, &RunSpecKind> =
        old.all_run_specs().into_iter().map(|s| (s.id(), s)).collect();
    let new_specs: HashMap<&AbsolutePathId, &RunSpecKind> =
        new.all_run_specs().into_iter().map(|s| (s.id(), s)).collect();

    let mut actions_by_id: HashMap<AbsolutePathId, DeploymentAction> = HashMap::new();

    for (id, new_spec) in &new_specs {
        let action = match old_specs.get(id) {
            None => DeploymentAction::StartApplication {
                run_spec_id: (*id).clone(),
                to_version: new_spec.common().version,
            },
            Some(old_spec) => {
                if old_spec.common().version == new_spec.common().version {
                    continue; // unchanged, no action needed
                }
                if specs_equal_except_instances(old_spec, new_spec) {
                    DeploymentAction::ScaleApplication {
                        run_spec_id: (*id).clone(),
                        to: new_spec.common().instances,
                    }
                } else {
                    DeploymentAction::RestartApplication {
                        run_spec_id: (*id).clone(),
                        to_version: new_spec.common().version,
                    }
                }
            }
        };
        actions_by_id.insert((*id).clone(), action);
    }

    for (id, _) in &old_specs {
        if !new_specs.contains_key(id) {
            actions_by_id.insert(
                (*id).clone(),
                DeploymentAction::StopApplication { run_spec_id: (*id).clone() },
            );
        }
    }

    let levels = topological_levels(new, actions_by_id.keys().cloned().collect())?;

    let mut steps = Vec::new();
    for level in levels {
        let mut actions: Vec<DeploymentAction> = level
            .into_iter()
            .filter_map(|id| actions_by_id.remove(&id))
            .collect();
        if actions.is_empty() {
            continue;
        }
        // Interleave a readiness check after every version-changing action,
        // per §4.5.
        let readiness: Vec<DeploymentAction> = actions
            .iter()
            .filter_map(|a| match a {
                DeploymentAction::StartApplication { run_spec_id, to_version }
                | DeploymentAction::RestartApplication { run_spec_id, to_version } => {
                    Some(DeploymentAction::ReadinessCheckStep {
                        run_spec_id: run_spec_id.clone(),
                        to_version: *to_version,
                    })
                }
                _ => None,
            })
            .collect();

        steps.push(DeploymentStep { actions: std::mem::take(&mut actions) });
        if !readiness.is_empty() {
            steps.push(DeploymentStep { actions: readiness });
        }
    }

    Ok(DeploymentPlan::new(plan_id, old.version, new.version, steps))
}

fn specs_equal_except_instances(a: &RunSpecKind, b: &RunSpecKind) -> bool {
    let mut a_common = a.common().clone();
    let mut b_common = b.common().clone();
    a_common.instances = 0;
    b_common.instances = 0;
    a_common.version = 0;
    b_common.version = 0;
    a_common == b_common
}

/// Level the affected ids by the same dependency edges `Group::validate`
/// checks (Kahn's algorithm), so independent subtrees execute in the same
/// step while a dependent app always lands in a later step than its
/// dependency.
fn topological_levels(tree: &Group, affected: Vec<AbsolutePathId>) -> Result<Vec<Vec<AbsolutePathId>>> {
    let affected: HashSet<AbsolutePathId> = affected.into_iter().collect();
    if affected.is_empty() {
        return Ok(Vec::new());
    }

    let mut edges: HashMap<AbsolutePathId, Vec<AbsolutePathId>> = HashMap::new();
    for spec in tree.all_run_specs() {
        edges
            .entry(spec.id().clone())
            .or_default()
            .extend(spec.common().dependencies.iter().cloned());
    }

    let mut indegree: HashMap<AbsolutePathId, usize> = affected.iter().map(|id| (id.clone(), 0)).collect();
    for id in &affected {
        for dep in edges.get(id).into_iter().flatten() {
            if affected.contains(dep) {
                *indegree.get_mut(id).unwrap() += 1;
            }
        }
    }

    let mut levels = Vec::new();
    let mut remaining = indegree.clone();
    let mut processed = 0usize;
    while processed < affected.len() {
        let ready: Vec<AbsolutePathId> = remaining
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(id, _)| id.clone())
            .collect();
        if ready.is_empty() {
            return Err(MarathonError::validation("dependency cycle detected while planning deployment"));
        }
        for id in &ready {
            remaining.remove(id);
        }
        for id in &affected {
            if remaining.contains_key(id) {
                if let Some(deps) = edges.get(id) {
                    if deps.iter().any(|d| ready.contains(d)) {
                        *remaining.get_mut(id).unwrap() -= deps.iter().filter(|d| ready.contains(d)).count();
                    }
                }
            }
        }
        processed += ready.len();
        levels.push(ready);
    }

    Ok(levels)
}

#[cfg(test)]
mod test {
    use super::*;
    use marathon_core::model::resources::ResourceQuantity;
    use marathon_core::model::runspec::{
        AppSpec, ContainerSpec, KillSelection, RunSpecCommon, UnreachableStrategy, UpgradeStrategy,
    };

    fn app(id: &str, version: u64, instances: u32, dependencies: Vec<&str>) -> RunSpecKind {
        RunSpecKind::App(AppSpec {
            common: RunSpecCommon {
                id: AbsolutePathId::new(id),
                version,
                resources: ResourceQuantity::ZERO,
                role: "*".into(),
                accepted_resource_roles: vec!["*".into()],
                fetch: vec![],
                constraints: vec![],
                health_checks: vec![],
                upgrade_strategy: UpgradeStrategy::default(),
                unreachable_strategy: UnreachableStrategy::default_enabled(),
                kill_selection: KillSelection::default(),
                residency: None,
                volumes: vec![],
                dependencies: dependencies.into_iter().map(AbsolutePathId::new).collect(),
                instances,
                region_preference: None,
            },
            container: ContainerSpec {
                image: "alpine".into(),
                cmd: None,
                args: vec![],
                env: Default::default(),
            },
        })
    }

    #[test]
    fn new_app_produces_start_and_readiness_steps() {
        let old = Group::root(1);
        let mut new = Group::root(2);
        new.run_specs.push(app("/a", 1, 1, vec![]));

        let plan = plan_deployment(&old, &new, "plan-1").unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert!(matches!(
            plan.steps[0].actions[0],
            DeploymentAction::StartApplication { .. }
        ));
        assert!(matches!(
            plan.steps[1].actions[0],
            DeploymentAction::ReadinessCheckStep { .. }
        ));
    }

    #[test]
    fn dependent_app_lands_in_a_later_step() {
        let old = Group::root(1);
        let mut new = Group::root(2);
        new.run_specs.push(app("/a", 1, 1, vec![]));
        new.run_specs.push(app("/b", 1, 1, vec!["/a"]));

        let plan = plan_deployment(&old, &new, "plan-1").unwrap();
        let a_step = plan
            .steps
            .iter()
            .position(|s| s.actions.iter().any(|a| a.run_spec_id().as_str() == "/a"))
            .unwrap();
        let b_step = plan
            .steps
            .iter()
            .position(|s| s.actions.iter().any(|a| a.run_spec_id().as_str() == "/b"))
            .unwrap();
        assert!(b_step > a_step);
    }

    #[test]
    fn scale_only_change_produces_scale_application() {
        let mut old = Group::root(1);
        old.run_specs.push(app("/a", 1, 1, vec![]));
        let mut new = Group::root(2);
        new.run_specs.push(app("/a", 2, 3, vec![]));

        let plan = plan_deployment(&old, &new, "plan-1").unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert!(matches!(
            plan.steps[0].actions[0],
            DeploymentAction::ScaleApplication { to: 3, .. }
        ));
    }

    #[test]
    fn removed_app_produces_stop_application() {
        let mut old = Group::root(1);
        old.run_specs.push(app("/a", 1, 1, vec![]));
        let new = Group::root(2);

        let plan = plan_deployment(&old, &new, "plan-1").unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert!(matches!(
            plan.steps[0].actions[0],
            DeploymentAction::StopApplication { .. }
        ));
    }

    #[test]
    fn unchanged_app_produces_no_action() {
        let mut old = Group::root(1);
        old.run_specs.push(app("/a", 1, 1, vec![]));
        let mut new = Group::root(2);
        new.run_specs.push(app("/a", 1, 1, vec![]));

        let plan = plan_deployment(&old, &new, "plan-1").unwrap();
        assert!(plan.steps.is_empty());
    }
}
