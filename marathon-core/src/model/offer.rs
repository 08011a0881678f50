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

use serde::{Deserialize, Serialize};

use crate::model::resources::ResourceQuantity;

/// A resource offer from one agent, as surfaced by the Mesos `offers`
/// callback (§6). Only the fields the offer matcher (§4.2) needs are
/// modeled; the raw Mesos offer is otherwise opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: String,
    pub agent_id: String,
    pub hostname: String,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub attributes: HashMap<String, String>,
    pub resources: ResourceQuantity,
    /// Roles this offer is usable for.
    pub roles: Vec<String>,
    /// Reserved-resource labels already present on the offer, keyed by
    /// reservation label (used to recognize a resident task's own
    /// existing reservation, §4.4).
    pub reservation_labels: HashMap<String, String>,
}

impl Offer {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "hostname" => Some(self.hostname.as_str()),
            "@region" => self.region.as_deref(),
            "@zone" => self.zone.as_deref(),
            other => self.attributes.get(other).map(String::as_str),
        }
    }
}

/// A previously-placed instance's relevant placement facts, used by the
/// constraint evaluator (§4.2) to check UNIQUE/CLUSTER/GROUP_BY/MAX_PER
/// against the instances of the same RunSpec already running.
#[derive(Debug, Clone)]
pub struct PlacedInstance {
    pub hostname: String,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl PlacedInstance {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "hostname" => Some(self.hostname.as_str()),
            "@region" => self.region.as_deref(),
            "@zone" => self.zone.as_deref(),
            other => self.attributes.get(other).map(String::as_str),
        }
    }
}

impl From<&Offer> for PlacedInstance {
    fn from(offer: &Offer) -> Self {
        PlacedInstance {
            hostname: offer.hostname.clone(),
            region: offer.region.clone(),
            zone: offer.zone.clone(),
            attributes: offer.attributes.clone(),
        }
    }
}
