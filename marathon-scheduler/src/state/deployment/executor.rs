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

//! Deployment step execution (§4.5): advances a `DeploymentPlan` one step
//! at a time against the Launch Queue, posting readiness checks as a pure
//! function of observed instance health.
//!
//! Grounded in `SchedulerServer::update_task_status`'s shape: an external
//! status observation ("how many instances of this run spec are healthy
//! right now") drives a pure decision about whether the current step is
//! done, rather than the executor polling instance state itself.

use marathon_core::model::deployment::{DeploymentAction, DeploymentPlan, DeploymentStatus};
use marathon_core::model::ids::AbsolutePathId;

use crate::metrics::SchedulerMetricsCollector;
use crate::state::launch_queue::LaunchQueue;

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The step was dispatched and immediately considered complete (no
    /// readiness wait applies, e.g. `StopApplication`).
    Dispatched,
    /// The step is a readiness check still waiting on more healthy
    /// instances.
    AwaitingReadiness { run_spec_id: AbsolutePathId, healthy: u32, required: u32 },
    /// The readiness check's target is met; the step can advance.
    Ready,
    PlanComplete,
    PlanCancelled,
}

/// Facts about a run spec's current instances and the actions that mutate
/// them, supplied by the caller from the Instance Tracker's current view
/// (kept decoupled so `advance` stays a pure decision loop over these
/// calls).
pub trait DeploymentObserver {
    /// The deployment's target instance count for this run spec.
    fn total_instances(&self, run_spec_id: &AbsolutePathId) -> u32;
    fn healthy_count(&self, run_spec_id: &AbsolutePathId) -> u32;
    fn minimum_health_capacity(&self, run_spec_id: &AbsolutePathId) -> f64;
    fn maximum_over_capacity(&self, run_spec_id: &AbsolutePathId) -> f64;
    /// Non-terminal instances of `run_spec_id` whose version is not
    /// `to_version`.
    fn old_version_instance_count(&self, run_spec_id: &AbsolutePathId, to_version: u64) -> u32;
    /// Non-terminal instances of `run_spec_id` already at `to_version`.
    fn new_version_instance_count(&self, run_spec_id: &AbsolutePathId, to_version: u64) -> u32;
    /// Kill `count` of the oldest non-`to_version` instances of
    /// `run_spec_id`, per `killSelection` (§4.4).
    fn kill_oldest_old_version(&self, run_spec_id: &AbsolutePathId, to_version: u64, count: u32);
    /// Kill `count` instances of `run_spec_id` to satisfy a scale-down
    /// (`ScaleApplication`), per `killSelection` (§4.4).
    fn kill_excess_instances(&self, run_spec_id: &AbsolutePathId, count: u32);
}

pub struct DeploymentExecutor;

impl DeploymentExecutor {
    /// Dispatch every action in the plan's current step against the
    /// launch queue, then report what the caller should do next.
    pub fn advance(
        plan: &mut DeploymentPlan,
        launch_queue: &LaunchQueue,
        observer: &dyn DeploymentObserver,
        metrics: &dyn SchedulerMetricsCollector,
        now_millis: u64,
    ) -> StepOutcome {
        if plan.status == DeploymentStatus::Cancelled {
            metrics.record_deployment_cancelled(&plan.id);
            return StepOutcome::PlanCancelled;
        }
        if plan.is_complete() {
            plan.status = DeploymentStatus::Succeeded;
            metrics.record_deployment_succeeded(&plan.id, plan.started_at_millis.unwrap_or(now_millis), now_millis);
            return StepOutcome::PlanComplete;
        }

        if plan.status == DeploymentStatus::Pending {
            plan.started_at_millis = Some(now_millis);
            metrics.record_deployment_started(&plan.id);
        }
        plan.status = DeploymentStatus::Running;
        let step = plan.current_step().expect("is_complete() checked above").clone();

        // A step mixing a readiness check with other actions never happens
        // by construction (the planner emits them in separate steps), so
        // it's safe to special-case an all-readiness step here.
        if let Some(DeploymentAction::ReadinessCheckStep { run_spec_id, to_version }) = step.actions.first() {
            let target = observer.total_instances(run_spec_id);
            let old_count = observer.old_version_instance_count(run_spec_id, *to_version);
            let new_count = observer.new_version_instance_count(run_spec_id, *to_version);
            let max_total = (target as f64 * (1.0 + observer.maximum_over_capacity(run_spec_id))).ceil() as u32;
            let current_total = old_count + new_count;
            // Kill off surplus old-version instances on every poll, bounded
            // by `maximumOverCapacity`, rather than only once the readiness
            // threshold below happens to already be met (§4.5).
            if current_total > max_total {
                let kill_count = (current_total - max_total).min(old_count);
                if kill_count > 0 {
                    observer.kill_oldest_old_version(run_spec_id, *to_version, kill_count);
                }
            }

            let required = (target as f64 * observer.minimum_health_capacity(run_spec_id)).ceil() as u32;
            let healthy = observer.healthy_count(run_spec_id);
            if healthy >= required {
                plan.current_step += 1;
                return StepOutcome::Ready;
            }
            return StepOutcome::AwaitingReadiness {
                run_spec_id: run_spec_id.clone(),
                healthy,
                required,
            };
        }

        for action in &step.actions {
            match action {
                DeploymentAction::StartApplication { run_spec_id, .. } => {
                    launch_queue.add(run_spec_id.clone(), observer.total_instances(run_spec_id));
                }
                DeploymentAction::ScaleApplication { run_spec_id, to } => {
                    let current = observer.total_instances(run_spec_id);
                    if *to > current {
                        launch_queue.add(run_spec_id.clone(), to - current);
                    } else if *to < current {
                        observer.kill_excess_instances(run_spec_id, current - to);
                    }
                }
                DeploymentAction::RestartApplication { run_spec_id, .. } => {
                    launch_queue.add(run_spec_id.clone(), observer.total_instances(run_spec_id));
                }
                DeploymentAction::StopApplication { run_spec_id } => {
                    launch_queue.purge(run_spec_id);
                }
                DeploymentAction::ReadinessCheckStep { .. } => unreachable!("handled above"),
            }
        }

        plan.current_step += 1;
        StepOutcome::Dispatched
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::test_utils::TestMetricsCollector;
    use marathon_core::model::deployment::DeploymentStep;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A `DeploymentObserver` with every fact fixed except the healthy and
    /// old/new version counts, which tests mutate via the atomics to model
    /// instances coming up (or being killed) across successive polls.
    struct TestObserver {
        total: u32,
        healthy: AtomicU32,
        minimum_health_capacity: f64,
        maximum_over_capacity: f64,
        old_version: AtomicU32,
        new_version: AtomicU32,
        killed_old: AtomicU32,
        killed_excess: AtomicU32,
    }

    impl TestObserver {
        fn new(total: u32, healthy: u32) -> Self {
            Self {
                total,
                healthy: AtomicU32::new(healthy),
                minimum_health_capacity: 1.0,
                maximum_over_capacity: 0.0,
                old_version: AtomicU32::new(0),
                new_version: AtomicU32::new(0),
                killed_old: AtomicU32::new(0),
                killed_excess: AtomicU32::new(0),
            }
        }

        fn with_versions(mut self, old: u32, new: u32) -> Self {
            self.old_version = AtomicU32::new(old);
            self.new_version = AtomicU32::new(new);
            self
        }

        fn with_maximum_over_capacity(mut self, over: f64) -> Self {
            self.maximum_over_capacity = over;
            self
        }
    }

    impl DeploymentObserver for TestObserver {
        fn total_instances(&self, _run_spec_id: &AbsolutePathId) -> u32 {
            self.total
        }

        fn healthy_count(&self, _run_spec_id: &AbsolutePathId) -> u32 {
            self.healthy.load(Ordering::SeqCst)
        }

        fn minimum_health_capacity(&self, _run_spec_id: &AbsolutePathId) -> f64 {
            self.minimum_health_capacity
        }

        fn maximum_over_capacity(&self, _run_spec_id: &AbsolutePathId) -> f64 {
            self.maximum_over_capacity
        }

        fn old_version_instance_count(&self, _run_spec_id: &AbsolutePathId, _to_version: u64) -> u32 {
            self.old_version.load(Ordering::SeqCst)
        }

        fn new_version_instance_count(&self, _run_spec_id: &AbsolutePathId, _to_version: u64) -> u32 {
            self.new_version.load(Ordering::SeqCst)
        }

        fn kill_oldest_old_version(&self, _run_spec_id: &AbsolutePathId, _to_version: u64, count: u32) {
            self.old_version.fetch_sub(count, Ordering::SeqCst);
            self.killed_old.fetch_add(count, Ordering::SeqCst);
        }

        fn kill_excess_instances(&self, _run_spec_id: &AbsolutePathId, count: u32) {
            self.killed_excess.fetch_add(count, Ordering::SeqCst);
        }
    }

    fn plan_with_readiness_step() -> DeploymentPlan {
        let mut plan = DeploymentPlan::new(
            "plan-1",
            1,
            2,
            vec![
                DeploymentStep {
                    actions: vec![DeploymentAction::StartApplication {
                        run_spec_id: AbsolutePathId::new("/a"),
                        to_version: 2,
                    }],
                },
                DeploymentStep {
                    actions: vec![DeploymentAction::ReadinessCheckStep {
                        run_spec_id: AbsolutePathId::new("/a"),
                        to_version: 2,
                    }],
                },
            ],
        );
        plan.status = DeploymentStatus::Running;
        plan
    }

    #[test]
    fn start_step_adds_demand_to_launch_queue() {
        let mut plan = plan_with_readiness_step();
        let queue = LaunchQueue::new(&SchedulerConfig::default());
        let observer = TestObserver::new(3, 0);
        let metrics = TestMetricsCollector::default();
        let outcome = DeploymentExecutor::advance(&mut plan, &queue, &observer, &metrics, 1000);
        assert_eq!(outcome, StepOutcome::Dispatched);
        assert_eq!(queue.entry(&AbsolutePathId::new("/a")).unwrap().outstanding, 3);
        assert_eq!(plan.current_step, 1);
    }

    #[test]
    fn readiness_step_waits_until_threshold_met() {
        let mut plan = plan_with_readiness_step();
        plan.current_step = 1;
        let queue = LaunchQueue::new(&SchedulerConfig::default());
        let observer = TestObserver::new(3, 1).with_versions(0, 1);
        let metrics = TestMetricsCollector::default();
        let outcome = DeploymentExecutor::advance(&mut plan, &queue, &observer, &metrics, 1000);
        assert!(matches!(outcome, StepOutcome::AwaitingReadiness { healthy: 1, required: 3, .. }));
        assert_eq!(plan.current_step, 1);
    }

    #[test]
    fn readiness_step_advances_once_threshold_met() {
        let mut plan = plan_with_readiness_step();
        plan.current_step = 1;
        let queue = LaunchQueue::new(&SchedulerConfig::default());
        let observer = TestObserver::new(3, 3).with_versions(0, 3);
        let metrics = TestMetricsCollector::default();
        let outcome = DeploymentExecutor::advance(&mut plan, &queue, &observer, &metrics, 1000);
        assert_eq!(outcome, StepOutcome::Ready);
        assert_eq!(plan.current_step, 2);
    }

    #[test]
    fn readiness_step_kills_old_version_surplus_bounded_by_over_capacity() {
        let mut plan = plan_with_readiness_step();
        plan.current_step = 1;
        let queue = LaunchQueue::new(&SchedulerConfig::default());
        // target 3, no over-capacity allowed, but 3 old + 2 new are up --
        // 2 over max_total of 3, and both should come from the old version.
        let observer = TestObserver::new(3, 2).with_versions(3, 2);
        let metrics = TestMetricsCollector::default();
        let _ = DeploymentExecutor::advance(&mut plan, &queue, &observer, &metrics, 1000);
        assert_eq!(observer.killed_old.load(Ordering::SeqCst), 2);
        assert_eq!(observer.old_version.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn readiness_step_respects_maximum_over_capacity_before_killing() {
        let mut plan = plan_with_readiness_step();
        plan.current_step = 1;
        let queue = LaunchQueue::new(&SchedulerConfig::default());
        // target 3 with 50% over-capacity allows up to 5 total; 3 old + 2
        // new == 5, so nothing should be killed yet.
        let observer = TestObserver::new(3, 2).with_versions(3, 2).with_maximum_over_capacity(0.5);
        let metrics = TestMetricsCollector::default();
        let _ = DeploymentExecutor::advance(&mut plan, &queue, &observer, &metrics, 1000);
        assert_eq!(observer.killed_old.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn scale_down_kills_excess_instances() {
        let mut plan = DeploymentPlan::new(
            "plan-2",
            1,
            2,
            vec![DeploymentStep {
                actions: vec![DeploymentAction::ScaleApplication {
                    run_spec_id: AbsolutePathId::new("/a"),
                    to: 1,
                }],
            }],
        );
        plan.status = DeploymentStatus::Running;
        let queue = LaunchQueue::new(&SchedulerConfig::default());
        let observer = TestObserver::new(3, 3);
        let metrics = TestMetricsCollector::default();
        let _ = DeploymentExecutor::advance(&mut plan, &queue, &observer, &metrics, 1000);
        assert_eq!(observer.killed_excess.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn completed_plan_reports_plan_complete() {
        let mut plan = plan_with_readiness_step();
        plan.current_step = 2;
        let queue = LaunchQueue::new(&SchedulerConfig::default());
        let observer = TestObserver::new(0, 0);
        let metrics = TestMetricsCollector::default();
        let outcome = DeploymentExecutor::advance(&mut plan, &queue, &observer, &metrics, 2000);
        assert_eq!(outcome, StepOutcome::PlanComplete);
        assert_eq!(plan.status, DeploymentStatus::Succeeded);
        crate::test_utils::assert_succeeded_event("plan-1", &metrics);
    }
}
