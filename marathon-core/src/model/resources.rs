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

use serde::{Deserialize, Serialize};

/// cpu/mem/disk/gpu resource request or offer, as used throughout §3 and
/// §4.2 ("requested cpus+mem+disk+gpus <= offered").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuantity {
    pub cpus: f64,
    pub mem_mb: f64,
    pub disk_mb: f64,
    pub gpus: f64,
}

impl ResourceQuantity {
    pub const ZERO: ResourceQuantity = ResourceQuantity {
        cpus: 0.0,
        mem_mb: 0.0,
        disk_mb: 0.0,
        gpus: 0.0,
    };

    pub fn new(cpus: f64, mem_mb: f64, disk_mb: f64, gpus: f64) -> Self {
        Self {
            cpus,
            mem_mb,
            disk_mb,
            gpus,
        }
    }

    /// True if `self` fits within `other` on every dimension.
    pub fn fits_within(&self, other: &ResourceQuantity) -> bool {
        self.cpus <= other.cpus
            && self.mem_mb <= other.mem_mb
            && self.disk_mb <= other.disk_mb
            && self.gpus <= other.gpus
    }

    pub fn saturating_sub(&self, other: &ResourceQuantity) -> ResourceQuantity {
        ResourceQuantity {
            cpus: (self.cpus - other.cpus).max(0.0),
            mem_mb: (self.mem_mb - other.mem_mb).max(0.0),
            disk_mb: (self.disk_mb - other.disk_mb).max(0.0),
            gpus: (self.gpus - other.gpus).max(0.0),
        }
    }

    pub fn add(&self, other: &ResourceQuantity) -> ResourceQuantity {
        ResourceQuantity {
            cpus: self.cpus + other.cpus,
            mem_mb: self.mem_mb + other.mem_mb,
            disk_mb: self.disk_mb + other.disk_mb,
            gpus: self.gpus + other.gpus,
        }
    }
}

impl Default for ResourceQuantity {
    fn default() -> Self {
        Self::ZERO
    }
}

/// A volume attached to a RunSpec. Only `Persistent` volumes participate in
/// the residency/reservation lifecycle (§3, §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Volume {
    Persistent {
        container_path: String,
        size_mb: u64,
    },
    External {
        container_path: String,
        name: String,
        provider: String,
    },
    Ephemeral {
        container_path: String,
    },
    Host {
        container_path: String,
        host_path: String,
    },
    Secret {
        container_path: String,
        secret: String,
    },
}

impl Volume {
    pub fn persistent_size_mb(&self) -> Option<u64> {
        match self {
            Volume::Persistent { size_mb, .. } => Some(*size_mb),
            _ => None,
        }
    }
}
