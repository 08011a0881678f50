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

//! Error taxonomy for the Marathon scheduling core.
//!
//! Mirrors the taxonomy in the specification 1:1: each variant names the
//! failure mode a caller needs to distinguish, not the underlying library
//! that produced it.

use std::fmt;

pub type Result<T> = std::result::Result<T, MarathonError>;

/// Errors produced by the Marathon scheduling core.
#[derive(thiserror::Error, Debug)]
pub enum MarathonError {
    /// Malformed RunSpec/Group tree: reject the input, do not persist it.
    #[error("validation error: {0}")]
    Validation(String),

    /// A deployment lock conflict, or a compare-and-set conflict on the
    /// root group version. Retryable by the caller.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An id referenced by the caller does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A deadline expired while a call was in flight. The underlying
    /// operation may still be running to completion.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A bounded queue was full; the caller must retry rather than block.
    #[error("overflow: {0}")]
    Overflow(String),

    /// An invariant of the data model was violated. This is always a bug,
    /// and the process that observes it fails stop rather than continue
    /// operating on a store it can no longer trust.
    #[error("inconsistent state: {0}")]
    InconsistentState {
        message: String,
        /// Whether the caller should crash the process after observing
        /// this error. Always `true` today; kept explicit because the
        /// crash strategy is itself part of the error's contract, not an
        /// afterthought layered on by the caller.
        fail_stop: bool,
    },

    /// A call to the resource broker failed for a reason expected to be
    /// transient (connection reset, broker momentarily unavailable).
    #[error("transient broker error: {0}")]
    TransientBroker(String),

    /// Storage-backend failure that does not fit the categories above.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Wraps an arbitrary internal error that does not fit the taxonomy
    /// above; used sparingly, at component boundaries only.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MarathonError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::Overflow(msg.into())
    }

    pub fn inconsistent_state(msg: impl Into<String>) -> Self {
        Self::InconsistentState {
            message: msg.into(),
            fail_stop: true,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Crash the process after logging the inconsistency, per the
    /// fail-stop crash strategy in §7. A fresh leader rebuilds from
    /// persistence and resource-broker reconciliation.
    pub fn crash_if_fail_stop(&self) {
        if let MarathonError::InconsistentState { message, fail_stop } = self {
            if *fail_stop {
                log::error!("fatal inconsistent state, crashing leader: {message}");
                std::process::abort();
            }
        }
    }
}

/// Failures surfaced by a `StateBackendClient` implementation.
#[derive(Debug)]
pub struct StorageError(pub String);

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StorageError {}

impl From<serde_json::Error> for MarathonError {
    fn from(e: serde_json::Error) -> Self {
        MarathonError::Storage(StorageError(format!("serde error: {e}")))
    }
}
