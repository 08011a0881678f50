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

//! Pluggable persistence backend (§6 "Persistence").
//!
//! Grounded directly on the teacher's `cluster::storage::KeyValueStore`:
//! the same keyspace/lock/watch/transaction shape, generalized from
//! Ballista's job/executor keyspaces to Marathon's root group, instances,
//! framework id and deployment plan keyspaces (§6: "Root group, instances,
//! framework id, and deployment plans are stored under distinct
//! prefixes").

pub mod memory;
#[cfg(feature = "sled")]
pub mod sled;

use std::collections::HashSet;

use async_trait::async_trait;
use futures::{future, Stream};
use marathon_core::Result;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Keyspace {
    RootGroup,
    Instances,
    FrameworkId,
    DeploymentPlans,
    Versions,
}

#[derive(Debug, Eq, PartialEq, Hash)]
pub enum Operation {
    Put(Vec<u8>),
    Delete,
}

/// Persistence abstraction used by the Instance Tracker, the deployment
/// planner and the leader's framework-id bookkeeping. Linearizable
/// per-key writes and stable version ordering, per §6.
#[async_trait]
pub trait StateBackendClient: Send + Sync {
    async fn get(&self, keyspace: Keyspace, key: &str) -> Result<Vec<u8>>;

    async fn get_from_prefix(
        &self,
        keyspace: Keyspace,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>>;

    async fn scan(&self, keyspace: Keyspace, limit: Option<usize>) -> Result<Vec<(String, Vec<u8>)>>;

    async fn scan_keys(&self, keyspace: Keyspace) -> Result<HashSet<String>>;

    async fn put(&self, keyspace: Keyspace, key: String, value: Vec<u8>) -> Result<()>;

    /// Bundle multiple operations across one or more keyspaces in a single
    /// atomic transaction: either all succeed or all fail.
    async fn apply_txn(&self, ops: Vec<(Operation, Keyspace, String)>) -> Result<()>;

    /// Acquire locks in a fixed, deterministic order to avoid deadlocks
    /// between callers locking the same id set in different orders.
    async fn acquire_locks(&self, mut ids: Vec<(Keyspace, &str)>) -> Result<Vec<Box<dyn Lock>>> {
        ids.sort_by_key(|n| format!("/{:?}/{}", n.0, n.1));
        future::try_join_all(ids.into_iter().map(|(ks, key)| self.lock(ks, key))).await
    }

    /// Atomically move the given key from one keyspace to another.
    async fn mv(&self, from_keyspace: Keyspace, to_keyspace: Keyspace, key: &str) -> Result<()>;

    async fn lock(&self, keyspace: Keyspace, key: &str) -> Result<Box<dyn Lock>>;

    async fn watch(&self, keyspace: Keyspace, prefix: String) -> Result<Box<dyn Watch<Item = WatchEvent>>>;

    async fn delete(&self, keyspace: Keyspace, key: &str) -> Result<()>;
}

#[async_trait]
pub trait Watch: Stream<Item = WatchEvent> + Send + Unpin {
    async fn cancel(&mut self) -> Result<()>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WatchEvent {
    Put(String, Vec<u8>),
    Delete(String),
}

#[async_trait]
pub trait Lock: Send + Sync {
    async fn unlock(&mut self);
}

#[async_trait]
impl<T: Send + Sync> Lock for OwnedMutexGuard<T> {
    async fn unlock(&mut self) {}
}
