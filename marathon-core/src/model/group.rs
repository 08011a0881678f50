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

//! Group tree: the declarative root aggregate (§3).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{MarathonError, Result};
use crate::model::ids::AbsolutePathId;
use crate::model::runspec::RunSpecKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: AbsolutePathId,
    pub version: u64,
    /// Ordering edges to sibling groups, consumed by the deployment
    /// planner's dependency DAG alongside app-to-app dependencies (§4.5).
    pub dependencies: Vec<AbsolutePathId>,
    pub groups: Vec<Group>,
    pub run_specs: Vec<RunSpecKind>,
}

impl Group {
    pub fn root(version: u64) -> Self {
        Self {
            id: AbsolutePathId::root(),
            version,
            dependencies: vec![],
            groups: vec![],
            run_specs: vec![],
        }
    }

    /// All run specs in the tree, depth-first.
    pub fn all_run_specs(&self) -> Vec<&RunSpecKind> {
        let mut out: Vec<&RunSpecKind> = self.run_specs.iter().collect();
        for child in &self.groups {
            out.extend(child.all_run_specs());
        }
        out
    }

    /// All groups in the tree, including `self`, depth-first.
    pub fn all_groups(&self) -> Vec<&Group> {
        let mut out = vec![self];
        for child in &self.groups {
            out.extend(child.all_groups());
        }
        out
    }

    /// Validate the two invariants from §3: every runspec id is unique in
    /// the tree, and dependencies (group- and app-level) form a DAG.
    pub fn validate(&self) -> Result<()> {
        self.validate_unique_run_spec_ids()?;
        self.validate_dependency_dag()?;
        Ok(())
    }

    fn validate_unique_run_spec_ids(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in self.all_run_specs() {
            if !seen.insert(spec.id().clone()) {
                return Err(MarathonError::validation(format!(
                    "duplicate run spec id in tree: {}",
                    spec.id()
                )));
            }
        }
        Ok(())
    }

    fn validate_dependency_dag(&self) -> Result<()> {
        let mut edges: HashMap<AbsolutePathId, Vec<AbsolutePathId>> = HashMap::new();

        for group in self.all_groups() {
            edges
                .entry(group.id.clone())
                .or_default()
                .extend(group.dependencies.iter().cloned());
        }
        for spec in self.all_run_specs() {
            edges
                .entry(spec.id().clone())
                .or_default()
                .extend(spec.common().dependencies.iter().cloned());
        }

        let mut state: HashMap<AbsolutePathId, VisitState> = HashMap::new();
        for node in edges.keys().cloned().collect::<Vec<_>>() {
            if matches!(state.get(&node), None | Some(VisitState::Unvisited)) {
                detect_cycle(&node, &edges, &mut state)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    InProgress,
    Done,
}

fn detect_cycle(
    node: &AbsolutePathId,
    edges: &HashMap<AbsolutePathId, Vec<AbsolutePathId>>,
    state: &mut HashMap<AbsolutePathId, VisitState>,
) -> Result<()> {
    state.insert(node.clone(), VisitState::InProgress);
    if let Some(deps) = edges.get(node) {
        for dep in deps {
            match state.get(dep).copied().unwrap_or(VisitState::Unvisited) {
                VisitState::InProgress => {
                    return Err(MarathonError::validation(format!(
                        "dependency cycle detected involving {dep}"
                    )));
                }
                VisitState::Unvisited => detect_cycle(dep, edges, state)?,
                VisitState::Done => {}
            }
        }
    }
    state.insert(node.clone(), VisitState::Done);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::resources::ResourceQuantity;
    use crate::model::runspec::{
        AppSpec, ContainerSpec, KillSelection, RunSpecCommon, UnreachableStrategy, UpgradeStrategy,
    };

    fn app(id: &str, dependencies: Vec<&str>) -> RunSpecKind {
        RunSpecKind::App(AppSpec {
            common: RunSpecCommon {
                id: AbsolutePathId::new(id),
                version: 1,
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
                instances: 1,
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
    fn rejects_duplicate_run_spec_ids() {
        let mut root = Group::root(1);
        root.run_specs.push(app("/a", vec![]));
        root.run_specs.push(app("/a", vec![]));
        assert!(root.validate().is_err());
    }

    #[test]
    fn accepts_acyclic_dependencies() {
        let mut root = Group::root(1);
        root.run_specs.push(app("/a", vec![]));
        root.run_specs.push(app("/b", vec!["/a"]));
        assert!(root.validate().is_ok());
    }

    #[test]
    fn rejects_cyclic_dependencies() {
        let mut root = Group::root(1);
        root.run_specs.push(app("/a", vec!["/b"]));
        root.run_specs.push(app("/b", vec!["/a"]));
        assert!(root.validate().is_err());
    }

    #[test]
    fn empty_root_validates() {
        let root = Group::root(1);
        assert!(root.validate().is_ok());
    }
}
