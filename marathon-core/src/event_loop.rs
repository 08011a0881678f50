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

//! A bounded single-consumer mailbox driving a serialized actor loop.
//!
//! This is the primitive the Instance Tracker, the Deployment Executor and
//! the Offer/Reservation pipeline are all built on: one logical writer per
//! component, fed through a bounded channel so that a slow consumer fails
//! fast (`OverflowError`) instead of applying unbounded backpressure to
//! every caller.

use std::sync::Arc;

use log::{error, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{MarathonError, Result};

/// Implemented by the logic that drives one event-loop instance. An action
/// may return a follow-up event, which is re-posted to the same loop; this
/// lets a handler express "and now do this too" without a second mailbox.
#[async_trait::async_trait]
pub trait EventAction<E>: Send + Sync {
    fn on_start(&self) {}

    fn on_stop(&self) {}

    async fn on_receive(&self, event: E) -> Result<Option<E>>;

    fn on_error(&self, error: MarathonError) {
        error!("event loop action failed: {error}");
    }
}

/// Handle used to post events into a running `EventLoop`.
#[derive(Clone)]
pub struct EventSender<E> {
    name: Arc<str>,
    tx: mpsc::Sender<E>,
}

impl<E: Send + 'static> EventSender<E> {
    pub async fn post_event(&self, event: E) -> Result<()> {
        self.tx.send(event).await.map_err(|_| {
            MarathonError::overflow(format!(
                "event loop '{}' mailbox closed or full",
                self.name
            ))
        })
    }

    /// Non-blocking post used by callers on a hot path (e.g. a Mesos
    /// callback) that must not await an unbounded amount of backpressure.
    pub fn try_post_event(&self, event: E) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MarathonError::overflow(format!(
                "event loop '{}' mailbox is full",
                self.name
            )),
            mpsc::error::TrySendError::Closed(_) => {
                MarathonError::overflow(format!("event loop '{}' mailbox closed", self.name))
            }
        })
    }
}

/// A named, bounded event loop. Construct with `new`, call `start` once to
/// spawn the consumer task, and use `get_sender` to obtain a cheap `Clone`
/// handle for producers.
pub struct EventLoop<E: 'static> {
    name: String,
    buffer_size: usize,
    tx: mpsc::Sender<E>,
    rx: Option<mpsc::Receiver<E>>,
    action: Arc<dyn EventAction<E>>,
    join: Option<JoinHandle<()>>,
}

impl<E: Send + 'static> EventLoop<E> {
    pub fn new(name: String, buffer_size: usize, action: Arc<dyn EventAction<E>>) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);
        Self {
            name,
            buffer_size,
            tx,
            rx: Some(rx),
            action,
            join: None,
        }
    }

    pub fn get_sender(&self) -> Result<EventSender<E>> {
        Ok(EventSender {
            name: Arc::from(self.name.as_str()),
            tx: self.tx.clone(),
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Spawn the consumer task. Idempotent: calling `start` twice is a
    /// no-op after the first call.
    pub fn start(&mut self) -> Result<()> {
        let Some(mut rx) = self.rx.take() else {
            return Ok(());
        };

        let action = self.action.clone();
        let name = self.name.clone();
        let sender = self.get_sender()?;

        action.on_start();

        let join = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match action.on_receive(event).await {
                    Ok(Some(followup)) => {
                        if let Err(e) = sender.try_post_event(followup) {
                            warn!("event loop '{name}' dropped a follow-up event: {e}");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => action.on_error(e),
                }
            }
            action.on_stop();
        });

        self.join = Some(join);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

impl<E> Drop for EventLoop<E> {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}
