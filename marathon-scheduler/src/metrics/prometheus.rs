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

use std::sync::Arc;

use marathon_core::error::{MarathonError, Result};
use once_cell::sync::OnceCell;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry, Counter, CounterVec, Gauge,
    Histogram, Registry,
};
use prometheus::{Encoder, TextEncoder};
use warp::Reply;

use crate::metrics::SchedulerMetricsCollector;

static COLLECTOR: OnceCell<Arc<dyn SchedulerMetricsCollector>> = OnceCell::new();

pub struct PrometheusMetricsCollector {
    deployment_duration_seconds: Histogram,
    deployments_started: Counter,
    deployments_succeeded: Counter,
    deployments_failed: Counter,
    deployments_cancelled: Counter,
    pending_instance_queue_size: Gauge,
    offer_matches: CounterVec,
    offer_no_matches: CounterVec,
}

impl PrometheusMetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let deployment_duration_seconds = register_histogram_with_registry!(
            "marathon_deployment_duration_seconds",
            "Histogram of deployment plan duration in seconds",
            vec![1_f64, 5_f64, 30_f64, 60_f64, 300_f64],
            registry
        )
        .map_err(|e| MarathonError::internal(format!("error registering metric: {e:?}")))?;

        let deployments_started = register_counter_with_registry!(
            "marathon_deployments_started_total",
            "Counter of deployment plans started",
            registry
        )
        .map_err(|e| MarathonError::internal(format!("error registering metric: {e:?}")))?;

        let deployments_succeeded = register_counter_with_registry!(
            "marathon_deployments_succeeded_total",
            "Counter of deployment plans that completed successfully",
            registry
        )
        .map_err(|e| MarathonError::internal(format!("error registering metric: {e:?}")))?;

        let deployments_failed = register_counter_with_registry!(
            "marathon_deployments_failed_total",
            "Counter of deployment plans that failed",
            registry
        )
        .map_err(|e| MarathonError::internal(format!("error registering metric: {e:?}")))?;

        let deployments_cancelled = register_counter_with_registry!(
            "marathon_deployments_cancelled_total",
            "Counter of deployment plans that were cancelled",
            registry
        )
        .map_err(|e| MarathonError::internal(format!("error registering metric: {e:?}")))?;

        let pending_instance_queue_size = register_gauge_with_registry!(
            "marathon_pending_instance_queue_size",
            "Number of instances outstanding in the launch queue",
            registry
        )
        .map_err(|e| MarathonError::internal(format!("error registering metric: {e:?}")))?;

        let offer_matches = register_counter_vec_with_registry!(
            "marathon_offer_matches_total",
            "Counter of offers matched per run spec",
            &["run_spec_id"],
            registry
        )
        .map_err(|e| MarathonError::internal(format!("error registering metric: {e:?}")))?;

        let offer_no_matches = register_counter_vec_with_registry!(
            "marathon_offer_no_matches_total",
            "Counter of offers rejected per run spec",
            &["run_spec_id"],
            registry
        )
        .map_err(|e| MarathonError::internal(format!("error registering metric: {e:?}")))?;

        Ok(Self {
            deployment_duration_seconds,
            deployments_started,
            deployments_succeeded,
            deployments_failed,
            deployments_cancelled,
            pending_instance_queue_size,
            offer_matches,
            offer_no_matches,
        })
    }

    pub fn current() -> Result<Arc<dyn SchedulerMetricsCollector>> {
        COLLECTOR
            .get_or_try_init(|| {
                let collector = Self::new(::prometheus::default_registry())?;
                Ok(Arc::new(collector) as Arc<dyn SchedulerMetricsCollector>)
            })
            .map(|arc| arc.clone())
    }
}

impl SchedulerMetricsCollector for PrometheusMetricsCollector {
    fn record_deployment_started(&self, _plan_id: &str) {
        self.deployments_started.inc();
    }

    fn record_deployment_succeeded(&self, _plan_id: &str, started_at_millis: u64, finished_at_millis: u64) {
        self.deployments_succeeded.inc();
        self.deployment_duration_seconds
            .observe(finished_at_millis.saturating_sub(started_at_millis) as f64 / 1000_f64);
    }

    fn record_deployment_failed(&self, _plan_id: &str) {
        self.deployments_failed.inc();
    }

    fn record_deployment_cancelled(&self, _plan_id: &str) {
        self.deployments_cancelled.inc();
    }

    fn set_pending_instance_queue_size(&self, value: u64) {
        self.pending_instance_queue_size.set(value as f64);
    }

    fn record_offer_match(&self, run_spec_id: &str) {
        self.offer_matches.with_label_values(&[run_spec_id]).inc();
    }

    fn record_offer_no_match(&self, run_spec_id: &str) {
        self.offer_no_matches.with_label_values(&[run_spec_id]).inc();
    }
}

/// Serve the registry's current state in Prometheus text format, for the
/// `/metrics` endpoint `marathon-cli` exposes via `warp` (§6).
pub fn get_metrics() -> Result<impl Reply> {
    let encoder = TextEncoder::new();

    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| MarathonError::internal(format!("error encoding prometheus metrics: {e:?}")))?;

    Ok(warp::reply::with_header(buffer, "content-type", encoder.format_type()))
}
