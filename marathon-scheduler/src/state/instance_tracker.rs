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

//! Instance Tracker (§4.1): single-writer serialization of every instance
//! mutation.
//!
//! Grounded on the teacher's single-writer `ExecutorManager`
//! (`state::executor_manager::ExecutorManager` -- a clonable handle
//! wrapping `Arc<RwLock<...>>` state plus an `Arc<dyn StateBackendClient>`)
//! and on the teacher's `dashmap` dependency for the sharded per-id lock
//! set. Per-instance-id ordering is enforced by routing each operation
//! through a `dashmap`-sharded set of `tokio::sync::Mutex` "instance
//! locks", mirroring `ExecutorManager::reserve_slots`'s use of a single
//! keyspace lock for atomicity, applied here per-instance instead of
//! globally so operations on distinct ids proceed concurrently.

use std::sync::Arc;

use dashmap::DashMap;
use marathon_core::error::{MarathonError, Result};
use marathon_core::model::instance::{Goal, Instance, InstanceState};
use marathon_core::model::ids::{AbsolutePathId, InstanceId, TaskId};
use marathon_core::model::task::{Condition, Task, TaskStatus};
use marathon_core::model::reservation::Reservation;
use marathon_core::utils::clamp_status_message;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::config::SchedulerConfig;
use crate::state::backend::{Keyspace, StateBackendClient};

/// Operations the tracker accepts, per §4.1's `process(op) -> effect`.
#[derive(Debug)]
pub enum InstanceOp {
    Schedule(Instance),
    ForceExpunge(InstanceId),
    MesosUpdate {
        instance_id: InstanceId,
        task_id: TaskId,
        condition: Condition,
        message: Option<String>,
        now_millis: u64,
    },
    Reserve(InstanceId, Reservation),
    RevertTo(Instance),
}

impl InstanceOp {
    fn instance_id(&self) -> &InstanceId {
        match self {
            InstanceOp::Schedule(instance) => &instance.instance_id,
            InstanceOp::ForceExpunge(id) => id,
            InstanceOp::MesosUpdate { instance_id, .. } => instance_id,
            InstanceOp::Reserve(id, _) => id,
            InstanceOp::RevertTo(instance) => &instance.instance_id,
        }
    }
}

/// Semantic event names from §6's "Event stream" surface, carrying just
/// enough payload for a subscriber to act; publication is fan-out,
/// best-effort (§5).
#[derive(Debug, Clone)]
pub enum InstanceEvent {
    InstanceChanged { instance_id: InstanceId },
    InstanceHealthChanged { instance_id: InstanceId, healthy: bool },
    StatusUpdate { instance_id: InstanceId, task_id: TaskId, message: Option<String> },
    /// A resident instance's task went terminal while its goal is still
    /// `Running`: the reservation was suspended and the run spec needs
    /// another unit of launch-queue demand to relaunch against it (§4.1).
    NeedsRelaunch { run_spec_id: AbsolutePathId },
    /// An instance has held `Running` condition for at least the
    /// configured stable interval, signalling the launch queue to reset
    /// that run spec's backoff (§4.2/§4.3).
    StableRun { run_spec_id: AbsolutePathId },
}

#[derive(Debug)]
pub enum Effect {
    Update {
        new_instance: Instance,
        previous: Option<Instance>,
        events: Vec<InstanceEvent>,
    },
    Expunge {
        instance: Instance,
        events: Vec<InstanceEvent>,
    },
    Noop,
}

/// Handle to the single-writer actor. Cloning is cheap; every clone
/// shares the same mailbox and per-instance lock set, mirroring
/// `ExecutorManager`'s clonable-handle-over-shared-state shape.
#[derive(Clone)]
pub struct InstanceTracker {
    sender: mpsc::Sender<Request>,
    inner: Arc<Inner>,
}

struct Request {
    op: InstanceOp,
    reply: oneshot::Sender<Result<Effect>>,
}

struct Inner {
    state: Arc<dyn StateBackendClient>,
    instances: DashMap<InstanceId, Instance>,
    locks: DashMap<InstanceId, Arc<Mutex<()>>>,
    subscribers: parking_lot::Mutex<Vec<mpsc::Sender<InstanceEvent>>>,
    max_status_message_length: usize,
}

impl InstanceTracker {
    /// Spawn the actor task and return a handle. `num_parallel_updates`
    /// workers drain the mailbox concurrently; each claims the relevant
    /// instance lock before mutating, so operations on the same id are
    /// still totally ordered (§4.1, §5).
    pub fn spawn(state: Arc<dyn StateBackendClient>, config: &SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.instance_tracker_update_queue_size);
        let inner = Arc::new(Inner {
            state,
            instances: DashMap::new(),
            locks: DashMap::new(),
            subscribers: parking_lot::Mutex::new(Vec::new()),
            max_status_message_length: config.max_status_message_length,
        });

        let num_workers = config.instance_tracker_num_parallel_updates.max(1);
        let rx = Arc::new(Mutex::new(rx));
        for _ in 0..num_workers {
            let inner = inner.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let request = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    match request {
                        Some(Request { op, reply }) => {
                            let result = apply(&inner, op).await;
                            let _ = reply.send(result);
                        }
                        None => break,
                    }
                }
            });
        }

        let tracker = Self { sender: tx, inner };
        tokio::spawn(run_unreachable_ticker(
            tracker.clone(),
            std::time::Duration::from_secs(config.unreachable_ticker_interval_seconds),
            config.launch_stable_interval_seconds,
        ));
        tracker
    }

    /// Publish an event directly to subscribers without an accompanying
    /// tracker mutation or persistence write, for synthetic signals raised
    /// by the background tickers (§4.1, §4.3).
    pub fn emit(&self, event: InstanceEvent) {
        let subscribers = self.inner.subscribers.lock();
        for sub in subscribers.iter() {
            let _ = sub.try_send(event.clone());
        }
    }

    /// Submit an operation. Overflow of the bounded mailbox fails fast
    /// with `MarathonError::Overflow` rather than blocking (§4.1).
    pub async fn process(&self, op: InstanceOp) -> Result<Effect> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .try_send(Request { op, reply: reply_tx })
            .map_err(|_| MarathonError::overflow("instance tracker mailbox full"))?;
        reply_rx
            .await
            .map_err(|_| MarathonError::internal("instance tracker worker dropped the reply channel"))?
    }

    /// Register a new subscriber for `InstanceEvent`s. Best-effort: a
    /// subscriber that falls behind its buffer drops events rather than
    /// backpressuring the tracker (§5).
    pub fn subscribe(&self, buffer: usize) -> mpsc::Receiver<InstanceEvent> {
        let (tx, rx) = mpsc::channel(buffer);
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Direct, eventually-consistent read access bypassing the mailbox,
    /// mirroring the teacher's `ExecutorManager` getters that read past
    /// the writer actor for cheap consistency (§5).
    pub fn get(&self, instance_id: &InstanceId) -> Option<Instance> {
        self.inner.instances.get(instance_id).map(|e| e.value().clone())
    }

    pub fn snapshot_for_run_spec(&self, run_spec_id: &AbsolutePathId) -> Vec<Instance> {
        self.inner
            .instances
            .iter()
            .filter(|e| &e.value().run_spec_id == run_spec_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn snapshot_all(&self) -> Vec<Instance> {
        self.inner.instances.iter().map(|e| e.value().clone()).collect()
    }
}

async fn apply(inner: &Inner, op: InstanceOp) -> Result<Effect> {
    let instance_id = op.instance_id().clone();
    let lock = inner
        .locks
        .entry(instance_id.clone())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock().await;

    let effect = match op {
        InstanceOp::Schedule(instance) => {
            let previous = inner.instances.get(&instance.instance_id).map(|e| (*e).clone());
            inner.instances.insert(instance.instance_id.clone(), instance.clone());
            Effect::Update {
                new_instance: instance.clone(),
                previous,
                events: vec![InstanceEvent::InstanceChanged {
                    instance_id: instance.instance_id,
                }],
            }
        }
        InstanceOp::ForceExpunge(id) => match inner.instances.remove(&id) {
            Some((_, instance)) => Effect::Expunge {
                instance,
                events: vec![InstanceEvent::InstanceChanged { instance_id: id }],
            },
            None => Effect::Noop,
        },
        InstanceOp::MesosUpdate {
            instance_id,
            task_id,
            condition,
            message,
            now_millis,
        } => apply_mesos_update(inner, instance_id, task_id, condition, message, now_millis),
        InstanceOp::Reserve(id, reservation) => {
            if let Some(mut instance) = inner.instances.get_mut(&id) {
                instance.reservation = Some(reservation);
                let snapshot: Instance = (*instance).clone();
                Effect::Update {
                    new_instance: snapshot,
                    previous: None,
                    events: vec![InstanceEvent::InstanceChanged { instance_id: id }],
                }
            } else {
                return Err(MarathonError::not_found(format!("no such instance: {id}")));
            }
        }
        InstanceOp::RevertTo(instance) => {
            let previous = inner.instances.get(&instance.instance_id).map(|e| (*e).clone());
            inner.instances.insert(instance.instance_id.clone(), instance.clone());
            Effect::Update {
                new_instance: instance.clone(),
                previous,
                events: vec![InstanceEvent::InstanceChanged {
                    instance_id: instance.instance_id,
                }],
            }
        }
    };

    if let Err(err) = persist(inner, &effect).await {
        // Diverging in-memory and durable state is exactly the inconsistency
        // the fail-stop strategy in §7 exists to catch: crash the leader
        // rather than keep serving reads from a view the store disagrees
        // with.
        let crash_err = MarathonError::inconsistent_state(format!(
            "failed to persist instance {instance_id}: {err}"
        ));
        crash_err.crash_if_fail_stop();
        return Err(crash_err);
    }
    publish(inner, &effect);
    Ok(effect)
}

/// State computation from a Mesos status update (§4.1): derive the new
/// condition, clamp the message, and apply the goal-dependent policy
/// rules for terminal statuses.
fn apply_mesos_update(
    inner: &Inner,
    instance_id: InstanceId,
    task_id: TaskId,
    condition: Condition,
    message: Option<String>,
    now_millis: u64,
) -> Effect {
    let Some(mut instance) = inner.instances.get_mut(&instance_id) else {
        return Effect::Noop;
    };

    // Once a task reaches a terminal condition, further updates for that
    // task id are ignored (monotonic incarnation invariant, §3).
    if let Some(existing) = instance.tasks.get(&task_id) {
        if existing.status.condition.is_terminal() {
            return Effect::Noop;
        }
    }

    let clamped_message = message.map(|m| clamp_status_message(&m, inner.max_status_message_length));

    let mut events = vec![InstanceEvent::StatusUpdate {
        instance_id: instance_id.clone(),
        task_id: task_id.clone(),
        message: clamped_message.clone(),
    }];

    instance.tasks.insert(
        task_id.clone(),
        Task {
            id: task_id.clone(),
            status: TaskStatus {
                mesos_status: format!("{condition:?}"),
                network_info: Default::default(),
                condition,
                message: clamped_message,
            },
            agent_id: instance
                .agent_info
                .as_ref()
                .map(|a| a.agent_id.clone())
                .unwrap_or_default(),
        },
    );

    if condition.is_terminal() {
        match instance.state.goal {
            Goal::Stopped => {
                // Keep the instance, clear the task, retain the
                // reservation, flip condition to Scheduled awaiting
                // re-launch (§4.1).
                instance.tasks.clear();
                if let Some(reservation) = instance.reservation.as_mut() {
                    reservation.mark_suspended();
                }
                instance.state = InstanceState::scheduled(now_millis);
                events.push(InstanceEvent::InstanceChanged {
                    instance_id: instance_id.clone(),
                });
            }
            Goal::Decommissioned => {
                let snapshot: Instance = (*instance).clone();
                drop(instance);
                inner.instances.remove(&instance_id);
                events.push(InstanceEvent::InstanceChanged {
                    instance_id: instance_id.clone(),
                });
                return Effect::Expunge {
                    instance: snapshot,
                    events,
                };
            }
            Goal::Running => {
                // The task died but the operator still wants this instance
                // running: clear it back to Scheduled so the offer matcher
                // picks it up again, and -- if it's resident -- suspend the
                // reservation rather than leave it Launched, so the relaunch
                // reuses the same reservation/volume instead of reserving a
                // fresh one (§4.1, §4.4).
                instance.tasks.clear();
                if instance.is_resident() {
                    if let Some(reservation) = instance.reservation.as_mut() {
                        reservation.mark_suspended();
                    }
                }
                let run_spec_id = instance.run_spec_id.clone();
                instance.state = InstanceState::scheduled(now_millis);
                events.push(InstanceEvent::InstanceChanged {
                    instance_id: instance_id.clone(),
                });
                events.push(InstanceEvent::NeedsRelaunch { run_spec_id });
            }
        }
    } else {
        if condition == Condition::Unreachable {
            instance.state.unreachable_since = Some(now_millis);
        }
        instance.state.condition = condition;
        instance.state.since = now_millis;
    }

    let snapshot: Instance = (*instance).clone();
    Effect::Update {
        new_instance: snapshot,
        previous: None,
        events,
    }
}

async fn persist(inner: &Inner, effect: &Effect) -> Result<()> {
    match effect {
        Effect::Update { new_instance, .. } => {
            let bytes = serde_json::to_vec(new_instance)?;
            inner
                .state
                .put(Keyspace::Instances, new_instance.instance_id.to_string(), bytes)
                .await
        }
        Effect::Expunge { instance, .. } => {
            inner
                .state
                .delete(Keyspace::Instances, &instance.instance_id.to_string())
                .await
        }
        Effect::Noop => Ok(()),
    }
}

fn publish(inner: &Inner, effect: &Effect) {
    let events: &[InstanceEvent] = match effect {
        Effect::Update { events, .. } => events,
        Effect::Expunge { events, .. } => events,
        Effect::Noop => return,
    };
    let subscribers = inner.subscribers.lock();
    for event in events {
        for sub in subscribers.iter() {
            // Best-effort fan-out: a slow subscriber drops events past its
            // buffer rather than blocking the tracker (§5).
            let _ = sub.try_send(event.clone());
        }
    }
}

/// Background ticker promoting `Unreachable -> UnreachableInactive` and
/// expunging past `expungeAfter`, plus raising `StableRun` for instances
/// that have held `Running` past the stable interval, per §4.1/§4.3. Run
/// as a `tokio::spawn`ed loop, mirroring the teacher's
/// `expire_dead_executors` background task in `scheduler_server::mod`.
/// Reads `Instance::unreachable_strategy` per-instance rather than an
/// externally-supplied policy map, so it only needs the tracker's own
/// public `snapshot_all` accessor.
pub async fn run_unreachable_ticker(
    tracker: InstanceTracker,
    tick_interval: std::time::Duration,
    stable_interval_seconds: u64,
) {
    let mut interval = tokio::time::interval(tick_interval);
    loop {
        interval.tick().await;
        let now = marathon_core::utils::timestamp_millis();
        for instance in tracker.snapshot_all() {
            let marathon_core::model::runspec::UnreachableStrategy::Enabled {
                inactive_after_secs,
                expunge_after_secs,
            } = instance.unreachable_strategy
            else {
                // Disabled: residency's default for an unreachable resident
                // task is to keep waiting on its reservation rather than be
                // promoted/expunged out from under its persistent volumes.
                continue;
            };

            if let Some(unreachable_since) = instance.state.unreachable_since {
                let elapsed_secs = now.saturating_sub(unreachable_since) / 1000;
                if elapsed_secs >= expunge_after_secs {
                    let _ = tracker.process(InstanceOp::ForceExpunge(instance.instance_id.clone())).await;
                    continue;
                } else if elapsed_secs >= inactive_after_secs
                    && instance.state.condition == Condition::Unreachable
                {
                    let _ = tracker
                        .process(InstanceOp::MesosUpdate {
                            instance_id: instance.instance_id.clone(),
                            task_id: instance.tasks.keys().next().cloned().unwrap_or_else(|| {
                                TaskId::new(instance.instance_id.clone(), instance.incarnation)
                            }),
                            condition: Condition::UnreachableInactive,
                            message: None,
                            now_millis: now,
                        })
                        .await;
                }
            }

            if instance.state.condition == Condition::Running
                && now.saturating_sub(instance.state.since) / 1000 >= stable_interval_seconds
            {
                tracker.emit(InstanceEvent::StableRun { run_spec_id: instance.run_spec_id.clone() });
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::backend::memory::MemoryStateBackendClient;
    use marathon_core::model::AbsolutePathId;

    fn scheduled_instance(id: &str) -> Instance {
        Instance::new_scheduled(
            InstanceId(format!("{id}.instance-1")),
            AbsolutePathId::new(id),
            1,
            1000,
        )
    }

    #[tokio::test]
    async fn schedule_then_query_round_trips() {
        let tracker = InstanceTracker::spawn(Arc::new(MemoryStateBackendClient::new()), &SchedulerConfig::default());
        let instance = scheduled_instance("/a");
        let effect = tracker.process(InstanceOp::Schedule(instance.clone())).await.unwrap();
        match effect {
            Effect::Update { new_instance, .. } => {
                assert_eq!(new_instance.instance_id, instance.instance_id);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_update_on_stopped_goal_reverts_to_scheduled() {
        let tracker = InstanceTracker::spawn(Arc::new(MemoryStateBackendClient::new()), &SchedulerConfig::default());
        let mut instance = scheduled_instance("/a");
        instance.state.goal = Goal::Stopped;
        tracker.process(InstanceOp::Schedule(instance.clone())).await.unwrap();

        let task_id = TaskId::new(instance.instance_id.clone(), 0);
        let effect = tracker
            .process(InstanceOp::MesosUpdate {
                instance_id: instance.instance_id.clone(),
                task_id,
                condition: Condition::Finished,
                message: None,
                now_millis: 2000,
            })
            .await
            .unwrap();

        match effect {
            Effect::Update { new_instance, .. } => {
                assert_eq!(new_instance.state.condition, Condition::Scheduled);
                assert!(new_instance.tasks.is_empty());
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_update_on_decommissioned_goal_expunges() {
        let tracker = InstanceTracker::spawn(Arc::new(MemoryStateBackendClient::new()), &SchedulerConfig::default());
        let mut instance = scheduled_instance("/a");
        instance.state.goal = Goal::Decommissioned;
        tracker.process(InstanceOp::Schedule(instance.clone())).await.unwrap();

        let task_id = TaskId::new(instance.instance_id.clone(), 0);
        let effect = tracker
            .process(InstanceOp::MesosUpdate {
                instance_id: instance.instance_id.clone(),
                task_id,
                condition: Condition::Finished,
                message: None,
                now_millis: 2000,
            })
            .await
            .unwrap();

        assert!(matches!(effect, Effect::Expunge { .. }));
    }

    #[tokio::test]
    async fn status_message_is_clamped() {
        let tracker = InstanceTracker::spawn(Arc::new(MemoryStateBackendClient::new()), &SchedulerConfig::default());
        let instance = scheduled_instance("/a");
        tracker.process(InstanceOp::Schedule(instance.clone())).await.unwrap();

        let task_id = TaskId::new(instance.instance_id.clone(), 0);
        let long_message = "x".repeat(500);
        let effect = tracker
            .process(InstanceOp::MesosUpdate {
                instance_id: instance.instance_id.clone(),
                task_id: task_id.clone(),
                condition: Condition::Running,
                message: Some(long_message),
                now_millis: 2000,
            })
            .await
            .unwrap();

        match effect {
            Effect::Update { new_instance, .. } => {
                let task = new_instance.tasks.get(&task_id).unwrap();
                assert_eq!(task.status.message.as_ref().unwrap().len(), 120);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }
}
