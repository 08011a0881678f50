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

//! In-memory `StateBackendClient`, for tests and for running without a
//! durable store (`--storage memory`, §6 CLI surface).

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::Stream;
use marathon_core::error::Result;
use tokio::sync::{mpsc, Mutex};

use super::{Keyspace, Lock, Operation, StateBackendClient, Watch, WatchEvent};

#[derive(Default)]
pub struct MemoryStateBackendClient {
    data: DashMap<(Keyspace, String), Vec<u8>>,
    locks: DashMap<(Keyspace, String), Arc<Mutex<()>>>,
}

impl MemoryStateBackendClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateBackendClient for MemoryStateBackendClient {
    async fn get(&self, keyspace: Keyspace, key: &str) -> Result<Vec<u8>> {
        Ok(self
            .data
            .get(&(keyspace, key.to_owned()))
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn get_from_prefix(
        &self,
        keyspace: Keyspace,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.key().0 == keyspace && entry.key().1.starts_with(prefix))
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect())
    }

    async fn scan(&self, keyspace: Keyspace, limit: Option<usize>) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out: Vec<(String, Vec<u8>)> = self
            .data
            .iter()
            .filter(|entry| entry.key().0 == keyspace)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn scan_keys(&self, keyspace: Keyspace) -> Result<HashSet<String>> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.key().0 == keyspace)
            .map(|entry| entry.key().1.clone())
            .collect())
    }

    async fn put(&self, keyspace: Keyspace, key: String, value: Vec<u8>) -> Result<()> {
        self.data.insert((keyspace, key), value);
        Ok(())
    }

    async fn apply_txn(&self, ops: Vec<(Operation, Keyspace, String)>) -> Result<()> {
        // All-or-nothing is trivially satisfied: a single in-process
        // DashMap insert/remove cannot partially fail.
        for (op, keyspace, key) in ops {
            match op {
                Operation::Put(value) => {
                    self.data.insert((keyspace, key), value);
                }
                Operation::Delete => {
                    self.data.remove(&(keyspace, key));
                }
            }
        }
        Ok(())
    }

    async fn mv(&self, from_keyspace: Keyspace, to_keyspace: Keyspace, key: &str) -> Result<()> {
        if let Some((_, value)) = self.data.remove(&(from_keyspace, key.to_owned())) {
            self.data.insert((to_keyspace, key.to_owned()), value);
        }
        Ok(())
    }

    async fn lock(&self, keyspace: Keyspace, key: &str) -> Result<Box<dyn Lock>> {
        let mutex = self
            .locks
            .entry((keyspace, key.to_owned()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        Ok(Box::new(guard))
    }

    async fn watch(&self, _keyspace: Keyspace, _prefix: String) -> Result<Box<dyn Watch<Item = WatchEvent>>> {
        // No in-process subscriber plumbing for the memory backend; callers
        // needing change notification should poll `scan`/`get_from_prefix`.
        let (_tx, rx) = mpsc::channel(1);
        Ok(Box::new(NoopWatch { rx }))
    }

    async fn delete(&self, keyspace: Keyspace, key: &str) -> Result<()> {
        self.data.remove(&(keyspace, key.to_owned()));
        Ok(())
    }
}

struct NoopWatch {
    rx: mpsc::Receiver<WatchEvent>,
}

impl Stream for NoopWatch {
    type Item = WatchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

#[async_trait]
impl Watch for NoopWatch {
    async fn cancel(&mut self) -> Result<()> {
        Ok(())
    }
}
