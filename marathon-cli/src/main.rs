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

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

use marathon_core::error::Result;
use marathon_core::mesos::{Filters, MesosDriver, MesosOperation};
use marathon_core::model::group::Group;
use marathon_scheduler::state::backend::memory::MemoryStateBackendClient;
#[cfg(feature = "sled")]
use marathon_scheduler::state::backend::sled::SledStateBackendClient;
use marathon_scheduler::state::leader::StaticLeaderElection;
use marathon_scheduler::{
    InstanceTracker, LaunchQueue, NoopMetricsCollector, ResidencyTaskLostBehavior, SchedulerAdapter,
    SchedulerConfig, SchedulerMetricsCollector, StateBackendClient, StorageBackend,
};

/// Command line flags for the Marathon scheduling core, grounded in the
/// `clap`-derive style used throughout the workspace's config types.
#[derive(Parser, Debug)]
#[clap(name = "marathon-scheduler", about = "Marathon scheduling core")]
struct Args {
    #[clap(long, arg_enum, default_value = "memory")]
    storage: StorageBackend,

    #[clap(long, default_value = "/var/lib/marathon/state")]
    sled_path: String,

    #[clap(long)]
    local_region: Option<String>,

    #[clap(long)]
    local_zone: Option<String>,

    #[clap(long, default_value_t = 2)]
    max_instances_per_offer: u32,

    #[clap(long, arg_enum, default_value = "wait-forever")]
    residency_task_lost_behavior: ResidencyTaskLostBehavior,

    #[clap(long, default_value = "0.0.0.0:9090")]
    metrics_bind_addr: SocketAddr,
}

/// Stands in for a real broker connection. Marathon's core only models the
/// callback-and-action contract (`marathon_core::mesos`); a concrete
/// framework-scheduler-driver implementation connecting to a live Mesos
/// master is an external collaborator, matching the Non-goal in §1.
struct UnconnectedMesosDriver;

#[async_trait::async_trait]
impl MesosDriver for UnconnectedMesosDriver {
    async fn accept_offers(
        &self,
        offer_ids: Vec<String>,
        _operations: Vec<MesosOperation>,
        _filters: Filters,
    ) -> Result<()> {
        warn!("no resource broker connection configured; dropping accept for {offer_ids:?}");
        Ok(())
    }

    async fn decline_offer(&self, _offer_id: String, _filters: Filters) -> Result<()> {
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

#[cfg(feature = "prometheus-metrics")]
async fn serve_metrics(addr: SocketAddr) {
    use warp::Filter;

    let route = warp::path("metrics").and_then(|| async move {
        marathon_scheduler::metrics::prometheus::get_metrics()
            .map_err(|_| warp::reject::reject())
    });

    info!("serving metrics on {addr}");
    warp::serve(route).run(addr).await;
}

#[cfg(not(feature = "prometheus-metrics"))]
async fn serve_metrics(_addr: SocketAddr) {}

#[cfg(feature = "prometheus-metrics")]
fn build_metrics_collector() -> Result<Arc<dyn SchedulerMetricsCollector>> {
    marathon_scheduler::metrics::prometheus::PrometheusMetricsCollector::current()
}

#[cfg(not(feature = "prometheus-metrics"))]
fn build_metrics_collector() -> Result<Arc<dyn SchedulerMetricsCollector>> {
    Ok(Arc::new(NoopMetricsCollector))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let mut config = SchedulerConfig::default()
        .with_max_instances_per_offer(args.max_instances_per_offer)
        .with_storage_backend(args.storage);
    config.residency_task_lost_behavior = args.residency_task_lost_behavior;

    let state: Arc<dyn StateBackendClient> = match args.storage {
        StorageBackend::Memory => Arc::new(MemoryStateBackendClient::new()),
        #[cfg(feature = "sled")]
        StorageBackend::Sled => Arc::new(SledStateBackendClient::new(&args.sled_path)?),
        #[cfg(not(feature = "sled"))]
        StorageBackend::Sled => {
            panic!("built without the `sled` feature; rebuild with --features sled")
        }
    };

    let tracker = InstanceTracker::spawn(state, &config);
    let launch_queue = LaunchQueue::new(&config);
    let driver = Arc::new(UnconnectedMesosDriver);
    let group = Group::root(1);
    let leader = Arc::new(StaticLeaderElection::new());
    let metrics = build_metrics_collector()?;

    let adapter = SchedulerAdapter::new(
        tracker,
        launch_queue,
        driver,
        group,
        config,
        args.local_region.clone(),
        leader,
        metrics,
    )?;

    info!(
        "marathon scheduler started (region={:?}, zone={:?})",
        args.local_region, args.local_zone
    );

    tokio::spawn(serve_metrics(args.metrics_bind_addr));

    // Keeps the adapter's event-loop actor alive for the life of the
    // process; a real deployment's broker connection drives `adapter`
    // through its `MesosCallbacks` impl instead of this idle wait.
    let _ = adapter;
    std::future::pending::<()>().await;
    Ok(())
}
