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

//! Metrics surface (§6): deployment lifecycle counters and the pending
//! launch-queue gauge, collected behind a trait so the concrete backend
//! (Prometheus today) stays swappable.

#[cfg(feature = "prometheus-metrics")]
pub mod prometheus;

/// What a metrics backend must record. Timestamps are epoch millis,
/// matching the rest of the core (`marathon_core::utils::timestamp_millis`).
pub trait SchedulerMetricsCollector: Send + Sync {
    fn record_deployment_started(&self, plan_id: &str);
    fn record_deployment_succeeded(&self, plan_id: &str, started_at_millis: u64, finished_at_millis: u64);
    fn record_deployment_failed(&self, plan_id: &str);
    fn record_deployment_cancelled(&self, plan_id: &str);
    fn set_pending_instance_queue_size(&self, value: u64);
    fn record_offer_match(&self, run_spec_id: &str);
    fn record_offer_no_match(&self, run_spec_id: &str);
}

/// Discards everything; used where a caller has no registry to hand (unit
/// tests, `marathon-cli --no-metrics` style local runs).
pub struct NoopMetricsCollector;

impl SchedulerMetricsCollector for NoopMetricsCollector {
    fn record_deployment_started(&self, _plan_id: &str) {}
    fn record_deployment_succeeded(&self, _plan_id: &str, _started_at_millis: u64, _finished_at_millis: u64) {}
    fn record_deployment_failed(&self, _plan_id: &str) {}
    fn record_deployment_cancelled(&self, _plan_id: &str) {}
    fn set_pending_instance_queue_size(&self, _value: u64) {}
    fn record_offer_match(&self, _run_spec_id: &str) {}
    fn record_offer_no_match(&self, _run_spec_id: &str) {}
}
