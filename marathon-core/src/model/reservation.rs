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

//! Reservation: the resident-task claim on agent resources (§3, §4.4).
//!
//! Modeled as tagged variants on the instance record per the Design Note
//! in §9 ("Resident reservation state -> tagged variants on the instance
//! record; transitions only through the tracker writer"), rather than as
//! a generic state-machine object.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub agent_id: String,
    /// Labels binding this reservation to the owning instance id (§3's
    /// "exactly one instance id" invariant is enforced by the tracker, not
    /// encoded in this struct).
    pub labels: HashMap<String, String>,
    pub persistent_volume_ids: Vec<String>,
    pub state: ReservationState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationState {
    /// Reserved, no task launched against it yet.
    New,
    /// A task is running on the reserved resources.
    Launched,
    /// The task is terminal and the instance's goal is `Stopped`; the
    /// reservation is retained so it can be relaunched against later.
    Suspended,
}

impl Reservation {
    pub fn new(agent_id: impl Into<String>, persistent_volume_ids: Vec<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            labels: HashMap::new(),
            persistent_volume_ids,
            state: ReservationState::New,
        }
    }

    /// `New -> Launched` or `Suspended -> Launched`, the only two
    /// transitions that result in a running task (§4.4).
    pub fn mark_launched(&mut self) {
        self.state = ReservationState::Launched;
    }

    /// `Launched -> Suspended`, on a terminal task status for a resident
    /// instance -- whether its goal is `Stopped` (awaiting an operator
    /// restart) or still `Running` (awaiting automatic relaunch against
    /// the same reservation, §4.1/§4.4).
    pub fn mark_suspended(&mut self) {
        self.state = ReservationState::Suspended;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_reservation_starts_in_new_state() {
        let r = Reservation::new("agent-1", vec!["pv-1".into()]);
        assert_eq!(r.state, ReservationState::New);
    }

    #[test]
    fn suspend_then_relaunch_round_trips() {
        let mut r = Reservation::new("agent-1", vec!["pv-1".into()]);
        r.mark_launched();
        r.mark_suspended();
        assert_eq!(r.state, ReservationState::Suspended);
        r.mark_launched();
        assert_eq!(r.state, ReservationState::Launched);
    }
}
