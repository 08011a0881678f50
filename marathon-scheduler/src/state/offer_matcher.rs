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

//! Offer Matcher (§4.2): given one offer and the current outstanding
//! demand, decide which (RunSpec, count) to launch, or why not.
//!
//! Grounded on `reserve_slots_bias`/`reserve_slots_round_robin` (teacher's
//! `cluster::mod.rs`) for the "iterate candidates, take what fits" shape,
//! generalized from slot-counting to the full role/constraint/resource
//! pipeline in §4.2.

use std::collections::HashMap;

use marathon_core::model::constraints::{evaluate_constraint, NoMatchReason};
use marathon_core::model::offer::{Offer, PlacedInstance};
use marathon_core::model::{AbsolutePathId, RunSpecKind};

use crate::config::SchedulerConfig;

/// One run spec with outstanding demand, as the matcher sees it. Built by
/// the caller (the scheduler driver) from the launch queue and the
/// instance tracker's current placement snapshot.
pub struct LaunchCandidate<'a> {
    pub run_spec: &'a RunSpecKind,
    pub outstanding: u32,
    pub placed: &'a [PlacedInstance],
    /// Resolved CLUSTER pins, keyed by the constraint's index in
    /// `run_spec.common().constraints`, per the Open Question in §9.
    pub cluster_pins: &'a HashMap<usize, String>,
    /// Present when this demand is a relaunch against an existing resident
    /// reservation; the offer must carry a matching reservation label.
    pub existing_reservation_label: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub enum OfferMatchResult {
    Match {
        run_spec_id: AbsolutePathId,
        count: u32,
    },
    NoMatch {
        run_spec_id: AbsolutePathId,
        offer_id: String,
        reasons: Vec<NoMatchReason>,
    },
}

/// Evaluate one offer against every candidate, in priority order. Returns
/// one result per candidate examined; the caller decides how many
/// `Match` results to actually accept (an offer may satisfy more than one
/// spec in a single pass, per §4.2).
pub fn match_offer(
    offer: &Offer,
    candidates: &[LaunchCandidate],
    config: &SchedulerConfig,
    local_region: Option<&str>,
) -> Vec<OfferMatchResult> {
    let mut remaining = offer.resources;
    let mut ordered: Vec<&LaunchCandidate> = candidates.iter().collect();
    // Tie-break: prefer the local region when the runspec's region
    // preference matches the leader's local region (§4.2 step 5).
    ordered.sort_by_key(|c| {
        let prefers_local = matches!(
            (c.run_spec.common().region_preference.as_deref(), local_region),
            (Some(pref), Some(local)) if pref == local
        );
        std::cmp::Reverse(prefers_local)
    });

    let mut results = Vec::with_capacity(ordered.len());
    for candidate in ordered {
        results.push(match_one(offer, candidate, &mut remaining, config));
    }
    results
}

fn match_one(
    offer: &Offer,
    candidate: &LaunchCandidate,
    remaining: &mut marathon_core::model::ResourceQuantity,
    config: &SchedulerConfig,
) -> OfferMatchResult {
    let common = candidate.run_spec.common();
    let mut reasons = Vec::new();

    let role_ok = offer.roles.contains(&common.role)
        && common
            .accepted_resource_roles
            .iter()
            .any(|r| offer.roles.contains(r));
    if !role_ok {
        reasons.push(NoMatchReason::UnfulfilledRole);
    }

    for (idx, constraint) in common.constraints.iter().enumerate() {
        let pin = candidate.cluster_pins.get(&idx).map(String::as_str);
        let eval = evaluate_constraint(constraint, offer, candidate.placed, pin);
        if !eval.satisfied {
            reasons.push(NoMatchReason::UnfulfilledConstraint);
        }
    }

    if common.is_resident() {
        if let Some(label) = candidate.existing_reservation_label {
            if !offer.reservation_labels.values().any(|v| v == label) {
                reasons.push(NoMatchReason::NoCorrespondingReservationFound);
            }
        }
    }

    if !common.resources.fits_within(remaining) {
        if common.resources.cpus > remaining.cpus {
            reasons.push(NoMatchReason::InsufficientCpus);
        }
        if common.resources.mem_mb > remaining.mem_mb {
            reasons.push(NoMatchReason::InsufficientMemory);
        }
        if common.resources.disk_mb > remaining.disk_mb {
            reasons.push(NoMatchReason::InsufficientDisk);
        }
        if common.resources.gpus > remaining.gpus {
            reasons.push(NoMatchReason::InsufficientGpus);
        }
    }

    if !reasons.is_empty() {
        return OfferMatchResult::NoMatch {
            run_spec_id: common.id.clone(),
            offer_id: offer.offer_id.clone(),
            reasons,
        };
    }

    // How many instances fit, bounded by outstanding demand and the
    // per-offer cap (§4.2 step 4).
    let mut count = candidate.outstanding.min(config.max_instances_per_offer);
    if common.resources.cpus > 0.0 {
        count = count.min((remaining.cpus / common.resources.cpus).floor() as u32);
    }
    if common.resources.mem_mb > 0.0 {
        count = count.min((remaining.mem_mb / common.resources.mem_mb).floor() as u32);
    }
    if count == 0 {
        return OfferMatchResult::NoMatch {
            run_spec_id: common.id.clone(),
            offer_id: offer.offer_id.clone(),
            reasons: vec![NoMatchReason::InsufficientCpus],
        };
    }

    *remaining = remaining.saturating_sub(&marathon_core::model::ResourceQuantity::new(
        common.resources.cpus * count as f64,
        common.resources.mem_mb * count as f64,
        common.resources.disk_mb * count as f64,
        common.resources.gpus * count as f64,
    ));

    OfferMatchResult::Match {
        run_spec_id: common.id.clone(),
        count,
    }
}
