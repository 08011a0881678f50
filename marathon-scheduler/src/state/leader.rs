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

//! Leader Election (§4.6): Marathon's scheduling core never implements
//! leader election itself -- it is driven by an external coordinator, and
//! only consumes the interface, per the Design Note in §9. This mirrors
//! the teacher's `cluster::mod.rs` split between `ClusterState` (owned
//! data) and an externally-driven coordination layer.

use async_trait::async_trait;
use marathon_core::error::Result;
use tokio::sync::watch;

/// What a `LeaderElection` implementation must provide. A production
/// deployment backs this with ZooKeeper or a Raft-backed coordinator; for
/// local testing, `StaticLeaderElection` always reports leadership.
#[async_trait]
pub trait LeaderElection: Send + Sync {
    /// True if this process currently holds leadership.
    fn is_leader(&self) -> bool;

    /// A channel that flips to `true`/`false` as leadership changes,
    /// so callers can react without polling.
    fn subscribe(&self) -> watch::Receiver<bool>;

    /// Voluntarily give up leadership, e.g. on fatal inconsistency
    /// (`MarathonError::crash_if_fail_stop`) or graceful shutdown.
    async fn abdicate(&self) -> Result<()>;
}

/// Always-leader implementation for local runs and tests, grounded on the
/// teacher's single-node `InMemoryClusterState` test fixture shape.
pub struct StaticLeaderElection {
    tx: watch::Sender<bool>,
}

impl StaticLeaderElection {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }
}

impl Default for StaticLeaderElection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaderElection for StaticLeaderElection {
    fn is_leader(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    async fn abdicate(&self) -> Result<()> {
        let _ = self.tx.send(false);
        Ok(())
    }
}
