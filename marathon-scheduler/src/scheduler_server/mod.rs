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

//! `SchedulerAdapter`: the `MesosCallbacks` implementation that wires
//! resource-broker events to the scheduling core (§4.2, §6).
//!
//! Grounded on `marathon_core::event_loop::EventLoop`: every callback posts
//! a `SchedulerEvent` into a single bounded mailbox (`try_post_event`, so a
//! stalled consumer never blocks the broker's own callback thread) and one
//! consumer task drains it serially, the same "one logical writer, fed
//! through a bounded channel" shape as the Instance Tracker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::{info, warn};
use tokio::sync::RwLock;

use marathon_core::error::Result;
use marathon_core::event_loop::{EventAction, EventLoop, EventSender};
use marathon_core::mesos::{Filters, MasterInfo, MesosCallbacks, MesosDriver, MesosTaskStatus};
use marathon_core::model::group::Group;
use marathon_core::model::ids::{AbsolutePathId, InstanceId, TaskId};
use marathon_core::model::instance::Goal;
use marathon_core::model::offer::{Offer, PlacedInstance};
use marathon_core::model::reservation::ReservationState;
use marathon_core::model::runspec::RunSpecKind;
use marathon_core::model::task::Condition;

use crate::config::SchedulerConfig;
use crate::metrics::SchedulerMetricsCollector;
use crate::state::instance_tracker::{InstanceEvent, InstanceOp, InstanceTracker};
use crate::state::launch_queue::{LaunchAttemptResult, LaunchQueue};
use crate::state::leader::LeaderElection;
use crate::state::offer_matcher::{match_offer, LaunchCandidate, OfferMatchResult};
use crate::state::task_launcher;

/// Events the adapter's event loop consumes, one per `MesosCallbacks`
/// method plus the two synthetic `Registered`/`Reregistered` cases that
/// need to trigger `revive_offers`.
#[derive(Debug)]
enum SchedulerEvent {
    Registered { framework_id: String, master_info: MasterInfo },
    Reregistered { master_info: MasterInfo },
    Disconnected,
    Offers(Vec<Offer>),
    Rescinded(String),
    StatusUpdate(MesosTaskStatus),
    SlaveLost(String),
    ExecutorLost { executor_id: String, agent_id: String },
    Error(String),
}

/// Shared state driving the event loop. Not exposed outside this module;
/// `SchedulerAdapter` is the public handle.
struct SchedulerState {
    tracker: InstanceTracker,
    launch_queue: LaunchQueue,
    driver: Arc<dyn MesosDriver>,
    group: RwLock<Group>,
    config: SchedulerConfig,
    local_region: Option<String>,
    /// Resolved CLUSTER pins, keyed by run spec then constraint index, per
    /// the Open Question resolution in §9: pinned once and held for the
    /// life of the run spec's current version.
    cluster_pins: DashMap<AbsolutePathId, HashMap<usize, String>>,
    leader: Arc<dyn LeaderElection>,
    metrics: Arc<dyn SchedulerMetricsCollector>,
    /// The id this process most recently registered with; cleared when the
    /// broker reports the framework was removed (§4.6).
    framework_id: RwLock<Option<String>>,
}

#[async_trait]
impl EventAction<SchedulerEvent> for SchedulerState {
    async fn on_receive(&self, event: SchedulerEvent) -> Result<Option<SchedulerEvent>> {
        match event {
            SchedulerEvent::Registered { framework_id, master_info } => {
                info!("registered with framework id {framework_id}, master {}", master_info.master_url);
                *self.framework_id.write().await = Some(framework_id);
                self.driver.revive_offers().await?;
            }
            SchedulerEvent::Reregistered { master_info } => {
                info!("reregistered with master {}", master_info.master_url);
                self.driver.revive_offers().await?;
            }
            SchedulerEvent::Disconnected => {
                // Hold no further opinion about the broker connection once
                // disconnected: stop the driver and give up leadership so a
                // standby instance takes over and reconnects fresh (§4.6).
                warn!("disconnected from resource broker; stopping driver and abdicating leadership");
                self.driver.stop(true).await?;
                self.leader.abdicate().await?;
            }
            SchedulerEvent::Offers(offers) => {
                self.handle_offers(offers).await?;
            }
            SchedulerEvent::Rescinded(offer_id) => {
                info!("offer rescinded: {offer_id}");
            }
            SchedulerEvent::StatusUpdate(status) => {
                self.handle_status_update(status).await?;
            }
            SchedulerEvent::SlaveLost(agent_id) => {
                warn!("agent lost: {agent_id}");
            }
            SchedulerEvent::ExecutorLost { executor_id, agent_id } => {
                warn!("executor {executor_id} lost on agent {agent_id}");
            }
            SchedulerEvent::Error(message) => {
                // Distinguish "this framework was removed" -- unrecoverable,
                // the driver must not be failed over and leadership should
                // be given up -- from other broker errors, which are just
                // logged (§4.6).
                let lower = message.to_lowercase();
                if lower.contains("framework") && (lower.contains("remov") || lower.contains("unknown")) {
                    warn!("resource broker reports this framework was removed: {message}");
                    *self.framework_id.write().await = None;
                    self.driver.stop(false).await?;
                    self.leader.abdicate().await?;
                } else {
                    warn!("resource broker reported an error: {message}");
                }
            }
        }
        Ok(None)
    }
}

impl SchedulerState {
    /// Match every offer against outstanding demand and dispatch launches,
    /// per §4.2's per-offer evaluation loop.
    async fn handle_offers(&self, offers: Vec<Offer>) -> Result<()> {
        let group = self.group.read().await;
        let now = marathon_core::utils::timestamp_millis();
        let eligible = self.launch_queue.eligible(now);
        let total_outstanding: u64 = eligible.iter().map(|e| e.outstanding as u64).sum();
        self.metrics.set_pending_instance_queue_size(total_outstanding);

        let run_specs: HashMap<AbsolutePathId, &RunSpecKind> =
            group.all_run_specs().into_iter().map(|s| (s.id().clone(), s)).collect();

        let mut candidate_specs: Vec<(&RunSpecKind, u32)> = Vec::new();
        let mut placed_lists: Vec<Vec<PlacedInstance>> = Vec::new();
        let mut pins_list: Vec<HashMap<usize, String>> = Vec::new();

        for entry in &eligible {
            let Some(run_spec) = run_specs.get(&entry.run_spec_id) else {
                continue;
            };
            let placed = self
                .tracker
                .snapshot_for_run_spec(&entry.run_spec_id)
                .into_iter()
                .filter_map(|instance| {
                    instance.agent_info.map(|a| PlacedInstance {
                        hostname: a.hostname,
                        region: a.region,
                        zone: a.zone,
                        attributes: a.attributes,
                    })
                })
                .collect();
            let pins = self
                .cluster_pins
                .get(&entry.run_spec_id)
                .map(|p| p.clone())
                .unwrap_or_default();
            candidate_specs.push((*run_spec, entry.outstanding));
            placed_lists.push(placed);
            pins_list.push(pins);
        }

        for offer in offers {
            if candidate_specs.is_empty() {
                self.decline(&offer).await?;
                continue;
            }

            let candidates: Vec<LaunchCandidate> = candidate_specs
                .iter()
                .zip(placed_lists.iter())
                .zip(pins_list.iter())
                .map(|(((run_spec, outstanding), placed), pins)| LaunchCandidate {
                    run_spec,
                    outstanding: *outstanding,
                    placed,
                    cluster_pins: pins,
                    existing_reservation_label: None,
                })
                .collect();

            let results = match_offer(&offer, &candidates, &self.config, self.local_region.as_deref());
            let mut accepted_any = false;
            for result in results {
                match result {
                    OfferMatchResult::Match { run_spec_id, count } => {
                        self.metrics.record_offer_match(run_spec_id.as_str());
                        let Some(run_spec) = run_specs.get(&run_spec_id) else {
                            continue;
                        };
                        let reservation_owner = self
                            .tracker
                            .snapshot_for_run_spec(&run_spec_id)
                            .into_iter()
                            .find(|i| {
                                i.state.goal == Goal::Running
                                    && i.reservation.as_ref().map(|r| r.state) == Some(ReservationState::Suspended)
                            });
                        let plans = task_launcher::plan_launch(run_spec, &offer, count, reservation_owner.as_ref());
                        for plan in plans {
                            match task_launcher::launch(&self.driver, &self.tracker, &offer.offer_id, plan).await {
                                Ok(()) => {
                                    accepted_any = true;
                                    self.launch_queue.decrement(&run_spec_id, 1);
                                    self.launch_queue.notify_launch_attempt(
                                        &run_spec_id,
                                        LaunchAttemptResult::Matched,
                                        now,
                                    );
                                }
                                Err(err) => {
                                    warn!("launch failed for {run_spec_id}: {err}");
                                    self.launch_queue.notify_launch_attempt(
                                        &run_spec_id,
                                        LaunchAttemptResult::TaskFailed,
                                        now,
                                    );
                                }
                            }
                        }
                    }
                    OfferMatchResult::NoMatch { run_spec_id, .. } => {
                        self.metrics.record_offer_no_match(run_spec_id.as_str());
                        self.launch_queue.notify_launch_attempt(&run_spec_id, LaunchAttemptResult::NoMatch, now);
                    }
                }
            }
            if !accepted_any {
                self.decline(&offer).await?;
            }
        }
        Ok(())
    }

    async fn decline(&self, offer: &Offer) -> Result<()> {
        self.driver
            .decline_offer(offer.offer_id.clone(), Filters { refuse_seconds: None })
            .await
    }

    /// Translate a raw Mesos status update into an `InstanceOp::MesosUpdate`
    /// (§4.1), recovering the instance id and incarnation from the task id
    /// string (`TaskId`'s `Display` format, §3).
    async fn handle_status_update(&self, status: MesosTaskStatus) -> Result<()> {
        let condition = status.state.to_condition();
        let Some((instance_part, incarnation_part)) = status.task_id.rsplit_once('.') else {
            warn!("malformed task id in status update: {}", status.task_id);
            return Ok(());
        };
        let Ok(incarnation) = incarnation_part.parse::<u32>() else {
            warn!("non-numeric incarnation in task id: {}", status.task_id);
            return Ok(());
        };
        let instance_id = InstanceId(instance_part.to_owned());
        let task_id = TaskId::new(instance_id.clone(), incarnation);

        self.tracker
            .process(InstanceOp::MesosUpdate {
                instance_id,
                task_id,
                condition,
                message: status.message,
                now_millis: marathon_core::utils::timestamp_millis(),
            })
            .await?;
        Ok(())
    }
}

/// Public handle wrapping the running event loop. Implements
/// `MesosCallbacks`; every method posts onto the loop's mailbox and
/// returns as soon as the post succeeds (or fails fast on overflow).
pub struct SchedulerAdapter {
    _event_loop: EventLoop<SchedulerEvent>,
    sender: EventSender<SchedulerEvent>,
    state: Arc<SchedulerState>,
}

impl SchedulerAdapter {
    pub fn new(
        tracker: InstanceTracker,
        launch_queue: LaunchQueue,
        driver: Arc<dyn MesosDriver>,
        group: Group,
        config: SchedulerConfig,
        local_region: Option<String>,
        leader: Arc<dyn LeaderElection>,
        metrics: Arc<dyn SchedulerMetricsCollector>,
    ) -> Result<Self> {
        let state = Arc::new(SchedulerState {
            tracker,
            launch_queue,
            driver,
            group: RwLock::new(group),
            config,
            local_region,
            cluster_pins: DashMap::new(),
            leader,
            metrics,
            framework_id: RwLock::new(None),
        });

        let mut event_loop = EventLoop::new("scheduler-adapter".to_owned(), 1024, state.clone());
        let sender = event_loop.get_sender()?;
        event_loop.start()?;

        tokio::spawn(run_instance_event_bridge(state.clone()));
        tokio::spawn(run_reconciliation_ticker(state.clone()));

        Ok(Self { _event_loop: event_loop, sender, state })
    }

    /// Replace the currently active root group, e.g. after a deployment
    /// plan finishes applying. Offers evaluated after this call see the
    /// new tree.
    pub async fn replace_group(&self, group: Group) {
        *self.state.group.write().await = group;
    }

    pub fn launch_queue(&self) -> &LaunchQueue {
        &self.state.launch_queue
    }

    pub fn tracker(&self) -> &InstanceTracker {
        &self.state.tracker
    }
}

/// Consume `InstanceEvent`s raised by the Instance Tracker's background
/// ticker and terminal-status handling, translating them into launch-queue
/// demand (§4.1, §4.3): a resident instance whose task died under a
/// `Running` goal needs relaunching, and a stably-running instance resets
/// its run spec's backoff.
async fn run_instance_event_bridge(state: Arc<SchedulerState>) {
    let mut events = state.tracker.subscribe(256);
    while let Some(event) = events.recv().await {
        match event {
            InstanceEvent::NeedsRelaunch { run_spec_id } => {
                state.launch_queue.add(run_spec_id, 1);
            }
            InstanceEvent::StableRun { run_spec_id } => {
                let now = marathon_core::utils::timestamp_millis();
                state.launch_queue.notify_launch_attempt(&run_spec_id, LaunchAttemptResult::Stable, now);
            }
            InstanceEvent::InstanceChanged { .. }
            | InstanceEvent::InstanceHealthChanged { .. }
            | InstanceEvent::StatusUpdate { .. } => {}
        }
    }
}

/// Periodic reconciliation against the resource broker (§5, §7): after the
/// initial delay, every interval, ask the driver to reconcile every
/// non-terminal task, then degrade any instance that goes a full grace
/// period without a fresh status update to `Unknown` -- the broker either
/// never had the task or silently dropped it.
async fn run_reconciliation_ticker(state: Arc<SchedulerState>) {
    tokio::time::sleep(std::time::Duration::from_secs(state.config.reconciliation_initial_delay_seconds)).await;
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(state.config.reconciliation_interval_seconds));
    let mut requested_at: HashMap<InstanceId, u64> = HashMap::new();

    loop {
        interval.tick().await;
        let now = marathon_core::utils::timestamp_millis();
        let instances = state.tracker.snapshot_all();

        let mut task_ids = Vec::new();
        for instance in &instances {
            for task in instance.tasks.values() {
                if !task.status.condition.is_terminal() {
                    task_ids.push(task.id.to_string());
                    requested_at.entry(instance.instance_id.clone()).or_insert(now);
                }
            }
        }
        if !task_ids.is_empty() {
            if let Err(err) = state.driver.reconcile_tasks(task_ids).await {
                warn!("reconcile_tasks failed: {err}");
            }
        }

        let grace_millis = state.config.reconciliation_grace_period_seconds * 1000;
        let mut settled = Vec::new();
        for (instance_id, sent_at) in requested_at.iter() {
            if now.saturating_sub(*sent_at) < grace_millis {
                continue;
            }
            settled.push(instance_id.clone());
            let Some(instance) = state.tracker.get(instance_id) else {
                continue;
            };
            if instance.state.since < *sent_at {
                let task_id = instance
                    .tasks
                    .keys()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| TaskId::new(instance_id.clone(), instance.incarnation));
                let _ = state
                    .tracker
                    .process(InstanceOp::MesosUpdate {
                        instance_id: instance_id.clone(),
                        task_id,
                        condition: Condition::Unknown,
                        message: Some("no status update since reconciliation request".to_owned()),
                        now_millis: now,
                    })
                    .await;
            }
        }
        for id in settled {
            requested_at.remove(&id);
        }
    }
}

#[async_trait]
impl MesosCallbacks for SchedulerAdapter {
    async fn registered(&self, framework_id: String, master_info: MasterInfo) -> Result<()> {
        self.sender.try_post_event(SchedulerEvent::Registered { framework_id, master_info })
    }

    async fn reregistered(&self, master_info: MasterInfo) -> Result<()> {
        self.sender.try_post_event(SchedulerEvent::Reregistered { master_info })
    }

    async fn disconnected(&self) -> Result<()> {
        self.sender.try_post_event(SchedulerEvent::Disconnected)
    }

    async fn offers(&self, offers: Vec<Offer>) -> Result<()> {
        self.sender.try_post_event(SchedulerEvent::Offers(offers))
    }

    async fn rescinded(&self, offer_id: String) -> Result<()> {
        self.sender.try_post_event(SchedulerEvent::Rescinded(offer_id))
    }

    async fn status_update(&self, status: MesosTaskStatus) -> Result<()> {
        self.sender.try_post_event(SchedulerEvent::StatusUpdate(status))
    }

    async fn framework_message(&self, _executor_id: String, _data: Vec<u8>) -> Result<()> {
        // Marathon's core has no use for arbitrary executor messages; the
        // broker-specific executor implementation is out of scope (§1).
        Ok(())
    }

    async fn slave_lost(&self, agent_id: String) -> Result<()> {
        self.sender.try_post_event(SchedulerEvent::SlaveLost(agent_id))
    }

    async fn executor_lost(&self, executor_id: String, agent_id: String) -> Result<()> {
        self.sender.try_post_event(SchedulerEvent::ExecutorLost { executor_id, agent_id })
    }

    async fn error(&self, message: String) -> Result<()> {
        self.sender.try_post_event(SchedulerEvent::Error(message))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use marathon_core::mesos::{MesosOperation, MesosTaskState};
    use marathon_core::model::ids::AbsolutePathId;
    use marathon_core::model::resources::ResourceQuantity;
    use marathon_core::model::runspec::{
        AppSpec, ContainerSpec, KillSelection, RunSpecCommon, UnreachableStrategy, UpgradeStrategy,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::metrics::NoopMetricsCollector;
    use crate::state::backend::memory::MemoryStateBackendClient;
    use crate::state::leader::StaticLeaderElection;

    struct RecordingDriver {
        accepted: AtomicUsize,
        declined: AtomicUsize,
    }

    impl RecordingDriver {
        fn new() -> Self {
            Self { accepted: AtomicUsize::new(0), declined: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl MesosDriver for RecordingDriver {
        async fn accept_offers(
            &self,
            _offer_ids: Vec<String>,
            _operations: Vec<MesosOperation>,
            _filters: Filters,
        ) -> Result<()> {
            self.accepted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn decline_offer(&self, _offer_id: String, _filters: Filters) -> Result<()> {
            self.declined.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn kill_task(&self, _task_id: String) -> Result<()> {
            Ok(())
        }

        async fn reconcile_tasks(&self, _task_ids: Vec<String>) -> Result<()> {
            Ok(())
        }

        async fn revive_offers(&self) -> Result<()> {
            Ok(())
        }

        async fn suppress_offers(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self, _failover: bool) -> Result<()> {
            Ok(())
        }
    }

    fn app(id: &str, cpus: f64, mem_mb: f64, instances: u32) -> RunSpecKind {
        RunSpecKind::App(AppSpec {
            common: RunSpecCommon {
                id: AbsolutePathId::new(id),
                version: 1,
                resources: ResourceQuantity::new(cpus, mem_mb, 10.0, 0.0),
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
                dependencies: vec![],
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

    fn offer(cpus: f64, mem_mb: f64) -> Offer {
        Offer {
            offer_id: "o1".into(),
            agent_id: "agent-1".into(),
            hostname: "host-1".into(),
            region: None,
            zone: None,
            attributes: HashMap::new(),
            resources: ResourceQuantity::new(cpus, mem_mb, 100.0, 0.0),
            roles: vec!["*".into()],
            reservation_labels: HashMap::new(),
        }
    }

    fn state_with_app(driver: Arc<dyn MesosDriver>) -> SchedulerState {
        let config = SchedulerConfig::default();
        let tracker = InstanceTracker::spawn(Arc::new(MemoryStateBackendClient::new()), &config);
        let launch_queue = LaunchQueue::new(&config);
        let mut group = Group::root(1);
        group.run_specs.push(app("/a", 1.0, 128.0, 2));
        launch_queue.add(AbsolutePathId::new("/a"), 2);

        SchedulerState {
            tracker,
            launch_queue,
            driver,
            group: RwLock::new(group),
            config,
            local_region: None,
            cluster_pins: DashMap::new(),
            leader: Arc::new(StaticLeaderElection::new()),
            metrics: Arc::new(NoopMetricsCollector),
            framework_id: RwLock::new(None),
        }
    }

    #[tokio::test]
    async fn offers_with_no_outstanding_demand_are_declined() {
        let driver = Arc::new(RecordingDriver::new());
        let config = SchedulerConfig::default();
        let tracker = InstanceTracker::spawn(Arc::new(MemoryStateBackendClient::new()), &config);
        let state = SchedulerState {
            tracker,
            launch_queue: LaunchQueue::new(&config),
            driver: driver.clone(),
            group: RwLock::new(Group::root(1)),
            config,
            local_region: None,
            cluster_pins: DashMap::new(),
            leader: Arc::new(StaticLeaderElection::new()),
            metrics: Arc::new(NoopMetricsCollector),
            framework_id: RwLock::new(None),
        };

        state.handle_offers(vec![offer(4.0, 1024.0)]).await.unwrap();
        assert_eq!(driver.declined.load(Ordering::SeqCst), 1);
        assert_eq!(driver.accepted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn matching_offer_launches_and_decrements_queue() {
        let driver = Arc::new(RecordingDriver::new());
        let state = state_with_app(driver.clone());

        state.handle_offers(vec![offer(4.0, 1024.0)]).await.unwrap();

        assert!(driver.accepted.load(Ordering::SeqCst) > 0);
        let remaining = state.launch_queue.entry(&AbsolutePathId::new("/a")).unwrap().outstanding;
        assert!(remaining < 2);
    }

    #[tokio::test]
    async fn status_update_applies_to_the_tracker() {
        let driver = Arc::new(RecordingDriver::new());
        let state = state_with_app(driver);

        let instance_id = InstanceId("a.instance-1".to_owned());
        let instance = marathon_core::model::instance::Instance::new_scheduled(
            instance_id.clone(),
            AbsolutePathId::new("/a"),
            1,
            0,
        );
        state.tracker.process(InstanceOp::Schedule(instance)).await.unwrap();

        let task_id = TaskId::new(instance_id.clone(), 0);
        state
            .handle_status_update(MesosTaskStatus {
                task_id: task_id.to_string(),
                agent_id: "agent-1".into(),
                state: MesosTaskState::TaskRunning,
                message: None,
            })
            .await
            .unwrap();

        let updated = state.tracker.get(&instance_id).unwrap();
        assert_eq!(
            updated.tasks.get(&task_id).unwrap().status.condition,
            marathon_core::model::task::Condition::Running
        );
    }
}
