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

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use marathon_core::error::Result;
use marathon_core::mesos::{Filters, MesosDriver, MesosOperation};
use marathon_core::model::ids::AbsolutePathId;
use marathon_core::model::offer::Offer;
use marathon_core::model::resources::ResourceQuantity;
use marathon_core::model::runspec::{
    AppSpec, ContainerSpec, KillSelection, ResidencyDescriptor, RunSpecCommon, RunSpecKind,
    TaskLostBehavior, UnreachableStrategy, UpgradeStrategy,
};

use crate::metrics::SchedulerMetricsCollector;

/// Utility for running some async check multiple times to verify a
/// condition. Runs the check at the given interval up to a maximum of the
/// given iterations.
pub async fn await_condition<Fut: Future<Output = Result<bool>>, F: Fn() -> Fut>(
    interval: Duration,
    iterations: usize,
    cond: F,
) -> Result<bool> {
    let mut iteration = 0;

    while iteration < iterations {
        let check = cond().await?;

        if check {
            return Ok(true);
        } else {
            iteration += 1;
            tokio::time::sleep(interval).await;
        }
    }

    Ok(false)
}

/// A single-task app spec with no constraints, fetch uris, or volumes,
/// for offer-matching and instance-tracker fixtures.
pub fn test_app(id: &str, cpus: f64, mem_mb: f64, instances: u32, resident: bool) -> RunSpecKind {
    let residency = resident.then_some(ResidencyDescriptor {
        task_lost_behavior: TaskLostBehavior::WaitForever,
        relaunch_escalation_timeout_secs: 3600,
    });

    RunSpecKind::App(AppSpec {
        common: RunSpecCommon {
            id: AbsolutePathId::new(id),
            version: 1,
            resources: ResourceQuantity::new(cpus, mem_mb, 0.0, 0.0),
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
            instances,
            region_preference: None,
        },
        container: ContainerSpec {
            image: "alpine".into(),
            cmd: Some("sleep 3600".into()),
            args: vec![],
            env: HashMap::new(),
        },
    })
}

/// An offer with the given resources, no roles beyond `"*"` and no
/// reservation labels, attached to a synthetic agent.
pub fn test_offer(offer_id: &str, cpus: f64, mem_mb: f64) -> Offer {
    Offer {
        offer_id: offer_id.to_owned(),
        agent_id: format!("agent-{offer_id}"),
        hostname: format!("host-{offer_id}"),
        region: None,
        zone: None,
        attributes: HashMap::new(),
        resources: ResourceQuantity::new(cpus, mem_mb, 0.0, 0.0),
        roles: vec!["*".into()],
        reservation_labels: HashMap::new(),
    }
}

#[derive(Debug, Clone)]
pub enum DriverCall {
    AcceptOffers {
        offer_ids: Vec<String>,
        operations: Vec<MesosOperation>,
    },
    DeclineOffer {
        offer_id: String,
    },
    KillTask {
        task_id: String,
    },
    ReconcileTasks {
        task_ids: Vec<String>,
    },
    ReviveOffers,
    SuppressOffers,
    Stop {
        failover: bool,
    },
}

/// A `MesosDriver` that records every call it receives instead of talking
/// to a real resource broker, mirroring the teacher's virtual-executor
/// pattern for the equivalent RPC boundary.
#[derive(Default)]
pub struct VirtualMesosDriver {
    pub calls: Mutex<Vec<DriverCall>>,
}

impl VirtualMesosDriver {
    pub fn accepted_offer_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, DriverCall::AcceptOffers { .. }))
            .count()
    }

    pub fn declined_offer_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, DriverCall::DeclineOffer { .. }))
            .count()
    }
}

#[async_trait]
impl MesosDriver for VirtualMesosDriver {
    async fn accept_offers(
        &self,
        offer_ids: Vec<String>,
        operations: Vec<MesosOperation>,
        _filters: Filters,
    ) -> Result<()> {
        self.calls
            .lock()
            .push(DriverCall::AcceptOffers { offer_ids, operations });
        Ok(())
    }

    async fn decline_offer(&self, offer_id: String, _filters: Filters) -> Result<()> {
        self.calls.lock().push(DriverCall::DeclineOffer { offer_id });
        Ok(())
    }

    async fn kill_task(&self, task_id: String) -> Result<()> {
        self.calls.lock().push(DriverCall::KillTask { task_id });
        Ok(())
    }

    async fn reconcile_tasks(&self, task_ids: Vec<String>) -> Result<()> {
        self.calls.lock().push(DriverCall::ReconcileTasks { task_ids });
        Ok(())
    }

    async fn revive_offers(&self) -> Result<()> {
        self.calls.lock().push(DriverCall::ReviveOffers);
        Ok(())
    }

    async fn suppress_offers(&self) -> Result<()> {
        self.calls.lock().push(DriverCall::SuppressOffers);
        Ok(())
    }

    async fn stop(&self, failover: bool) -> Result<()> {
        self.calls.lock().push(DriverCall::Stop { failover });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum MetricEvent {
    Started(String),
    Succeeded(String, u64, u64),
    Failed(String),
    Cancelled(String),
    OfferMatch(String),
    OfferNoMatch(String),
}

impl MetricEvent {
    pub fn plan_id(&self) -> &str {
        match self {
            MetricEvent::Started(id) => id,
            MetricEvent::Succeeded(id, _, _) => id,
            MetricEvent::Failed(id) => id,
            MetricEvent::Cancelled(id) => id,
            MetricEvent::OfferMatch(id) => id,
            MetricEvent::OfferNoMatch(id) => id,
        }
    }
}

#[derive(Default, Clone)]
pub struct TestMetricsCollector {
    pub events: Arc<Mutex<Vec<MetricEvent>>>,
}

impl TestMetricsCollector {
    pub fn events_for(&self, plan_id: &str) -> Vec<MetricEvent> {
        self.events
            .lock()
            .iter()
            .filter(|ev| ev.plan_id() == plan_id)
            .cloned()
            .collect()
    }
}

impl SchedulerMetricsCollector for TestMetricsCollector {
    fn record_deployment_started(&self, plan_id: &str) {
        self.events.lock().push(MetricEvent::Started(plan_id.to_owned()));
    }

    fn record_deployment_succeeded(&self, plan_id: &str, started_at_millis: u64, finished_at_millis: u64) {
        self.events
            .lock()
            .push(MetricEvent::Succeeded(plan_id.to_owned(), started_at_millis, finished_at_millis));
    }

    fn record_deployment_failed(&self, plan_id: &str) {
        self.events.lock().push(MetricEvent::Failed(plan_id.to_owned()));
    }

    fn record_deployment_cancelled(&self, plan_id: &str) {
        self.events.lock().push(MetricEvent::Cancelled(plan_id.to_owned()));
    }

    fn set_pending_instance_queue_size(&self, _value: u64) {}

    fn record_offer_match(&self, run_spec_id: &str) {
        self.events.lock().push(MetricEvent::OfferMatch(run_spec_id.to_owned()));
    }

    fn record_offer_no_match(&self, run_spec_id: &str) {
        self.events.lock().push(MetricEvent::OfferNoMatch(run_spec_id.to_owned()));
    }
}

pub fn assert_started_event(plan_id: &str, collector: &TestMetricsCollector) {
    let found = collector
        .events_for(plan_id)
        .iter()
        .any(|ev| matches!(ev, MetricEvent::Started(_)));
    assert!(found, "expected a started event for plan {plan_id}");
}

pub fn assert_succeeded_event(plan_id: &str, collector: &TestMetricsCollector) {
    let found = collector
        .events_for(plan_id)
        .iter()
        .any(|ev| matches!(ev, MetricEvent::Succeeded(_, _, _)));
    assert!(found, "expected a succeeded event for plan {plan_id}");
}

pub fn assert_failed_event(plan_id: &str, collector: &TestMetricsCollector) {
    let found = collector
        .events_for(plan_id)
        .iter()
        .any(|ev| matches!(ev, MetricEvent::Failed(_)));
    assert!(found, "expected a failed event for plan {plan_id}");
}

pub fn assert_cancelled_event(plan_id: &str, collector: &TestMetricsCollector) {
    let found = collector
        .events_for(plan_id)
        .iter()
        .any(|ev| matches!(ev, MetricEvent::Cancelled(_)));
    assert!(found, "expected a cancelled event for plan {plan_id}");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn collector_tracks_events_per_plan() {
        let collector = TestMetricsCollector::default();
        collector.record_deployment_started("plan-a");
        collector.record_deployment_succeeded("plan-a", 0, 100);
        collector.record_deployment_failed("plan-b");

        assert_started_event("plan-a", &collector);
        assert_succeeded_event("plan-a", &collector);
        assert_failed_event("plan-b", &collector);
        assert!(collector.events_for("plan-c").is_empty());
    }

    #[tokio::test]
    async fn driver_records_accept_and_decline_calls() {
        let driver = VirtualMesosDriver::default();
        driver
            .accept_offers(vec!["offer-1".into()], vec![], Filters { refuse_seconds: None })
            .await
            .unwrap();
        driver.decline_offer("offer-2".into(), Filters { refuse_seconds: None }).await.unwrap();

        assert_eq!(driver.accepted_offer_count(), 1);
        assert_eq!(driver.declined_offer_count(), 1);
    }
}
