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

//! Reservation Manager (§4.4): tracks the resident-task reservation state
//! machine (`New -> Launched -> Suspended -> Launched`/released), kept as
//! tagged variants directly on the `Instance` record per the Design Note
//! in §9.
//!
//! Grounded on `ExecutorManager::register_executor`'s sequencing --
//! persist metadata, then mutate the in-memory view, then return what
//! happened -- generalized here to the reserve/relaunch/release cycle.

use marathon_core::model::instance::Instance;
use marathon_core::model::reservation::{Reservation, ReservationState};
use marathon_core::model::runspec::RunSpecCommon;

/// What the caller should do with a matched offer for a resident spec.
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationDecision {
    /// No reservation exists yet: reserve resources and create any
    /// persistent volumes before launching.
    ReserveAndLaunch,
    /// A suspended reservation already exists on this agent: relaunch
    /// against it without re-reserving.
    RelaunchExisting,
    /// The instance is not resident; nothing to do here.
    NotResident,
}

/// Decide how to proceed for a resident `RunSpecCommon`, given the
/// instance's current reservation (if any).
pub fn decide(common: &RunSpecCommon, instance: &Instance) -> ReservationDecision {
    if !common.is_resident() {
        return ReservationDecision::NotResident;
    }
    match instance.reservation.as_ref().map(|r| r.state) {
        None => ReservationDecision::ReserveAndLaunch,
        Some(ReservationState::Suspended) => ReservationDecision::RelaunchExisting,
        Some(ReservationState::New) | Some(ReservationState::Launched) => {
            ReservationDecision::RelaunchExisting
        }
    }
}

/// Build a fresh reservation for a newly-placed resident instance, sized
/// from the spec's volume requests.
pub fn new_reservation(common: &RunSpecCommon, agent_id: impl Into<String>) -> Reservation {
    let volume_ids: Vec<String> = common
        .volumes
        .iter()
        .enumerate()
        .filter_map(|(i, v)| {
            v.persistent_size_mb()
                .map(|_| format!("{}-vol-{}", common.id.as_str().trim_start_matches('/'), i))
        })
        .collect();
    Reservation::new(agent_id, volume_ids)
}
