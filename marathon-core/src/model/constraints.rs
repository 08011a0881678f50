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

//! Placement constraint model and evaluator (§4.2).
//!
//! The evaluator is a pure function of `(offer, placed instances,
//! constraint, resolved CLUSTER pin)`, per the Design Note in §9 that
//! constraints should be tagged variants evaluated functionally rather
//! than as polymorphic objects. The one piece of state this can't be pure
//! over -- the CLUSTER-with-empty-value pin -- is threaded in explicitly
//! as `pinned_value` rather than reconstructed from `placed`, because the
//! pin must survive even after every instance pinned to it has been
//! killed (Open Question, §9).

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::offer::{Offer, PlacedInstance};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintField {
    Hostname,
    Region,
    Zone,
    Attribute(String),
}

impl ConstraintField {
    fn key(&self) -> &str {
        match self {
            ConstraintField::Hostname => "hostname",
            ConstraintField::Region => "@region",
            ConstraintField::Zone => "@zone",
            ConstraintField::Attribute(name) => name.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintOp {
    Unique,
    /// `None` means "pin to whatever agent value first matches".
    Cluster(Option<String>),
    /// `None` means `inf`: as many groups as currently exist.
    GroupBy(Option<u32>),
    Like(String),
    Unlike(String),
    MaxPer(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub field: ConstraintField,
    pub op: ConstraintOp,
}

impl Constraint {
    pub fn unique(field: ConstraintField) -> Self {
        Self {
            field,
            op: ConstraintOp::Unique,
        }
    }
}

/// Result of evaluating one constraint against one offer.
pub struct ConstraintEval {
    pub satisfied: bool,
    /// For GROUP_BY, the group key the offer would be placed into; used by
    /// the offer matcher's tie-break rule (prefer least-loaded group).
    pub group_key: Option<String>,
}

/// Evaluate a single constraint. `pinned_value` is the already-resolved
/// CLUSTER pin for this `(runspec, constraint)` pair, if any was
/// previously recorded in the RunSpec's placement context.
pub fn evaluate_constraint(
    constraint: &Constraint,
    offer: &Offer,
    placed: &[PlacedInstance],
    pinned_value: Option<&str>,
) -> ConstraintEval {
    let key = constraint.field.key();
    let offer_value = offer.attribute(key);

    match &constraint.op {
        ConstraintOp::Unique => {
            let satisfied = match offer_value {
                Some(v) => !placed.iter().any(|p| p.attribute(key) == Some(v)),
                // A missing attribute can never collide.
                None => true,
            };
            ConstraintEval {
                satisfied,
                group_key: None,
            }
        }

        ConstraintOp::Cluster(value) => {
            let required = value.as_deref().or(pinned_value);
            let satisfied = match (required, offer_value) {
                (Some(required), Some(actual)) => required == actual,
                // Nothing pinned yet and no explicit value: this offer's
                // value becomes the pin ("pin to whatever first matches").
                (None, Some(_)) => true,
                _ => false,
            };
            ConstraintEval {
                satisfied,
                group_key: None,
            }
        }

        ConstraintOp::GroupBy(min_groups) => {
            let Some(offer_group) = offer_value else {
                return ConstraintEval {
                    satisfied: false,
                    group_key: None,
                };
            };

            let mut counts: HashMap<&str, usize> = HashMap::new();
            for p in placed {
                if let Some(v) = p.attribute(key) {
                    *counts.entry(v).or_insert(0) += 1;
                }
            }

            let existing_groups = counts.len();
            let is_new_group = !counts.contains_key(offer_group);

            let satisfied = if is_new_group {
                // A brand-new group is always an acceptable way to grow
                // the distribution, as long as we haven't already reached
                // any explicit minimum group count on other groups first.
                true
            } else {
                let this_group_count = counts.get(offer_group).copied().unwrap_or(0);
                let min_count = counts.values().copied().min().unwrap_or(0);
                let groups_ok = match min_groups {
                    Some(min) => existing_groups as u32 >= *min,
                    None => true, // inf: always fine once groups exist
                };
                this_group_count == min_count && groups_ok
            };

            ConstraintEval {
                satisfied,
                group_key: Some(offer_group.to_owned()),
            }
        }

        ConstraintOp::Like(pattern) => {
            let satisfied = match (compile(pattern), offer_value) {
                (Ok(re), Some(v)) => re.is_match(v),
                _ => false,
            };
            ConstraintEval {
                satisfied,
                group_key: None,
            }
        }

        ConstraintOp::Unlike(pattern) => {
            let satisfied = match (compile(pattern), offer_value) {
                (Ok(re), Some(v)) => !re.is_match(v),
                // Missing attribute: accept, per §4.2.
                (_, None) => true,
                (Err(_), Some(_)) => false,
            };
            ConstraintEval {
                satisfied,
                group_key: None,
            }
        }

        ConstraintOp::MaxPer(n) => {
            let satisfied = match offer_value {
                Some(v) => {
                    let count = placed.iter().filter(|p| p.attribute(key) == Some(v)).count();
                    (count as u32) < *n
                }
                None => true,
            };
            ConstraintEval {
                satisfied,
                group_key: None,
            }
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(pattern)
}

/// Why a single offer failed to match a RunSpec, ordered by the funnel
/// precedence from §4.2/§8: when an offer fails for more than one reason,
/// the *primary* reason reported is the minimum of this order, not
/// necessarily the first check that happened to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NoMatchReason {
    InsufficientCpus,
    InsufficientMemory,
    InsufficientDisk,
    InsufficientGpus,
    UnfulfilledRole,
    UnfulfilledConstraint,
    DeclinedScarceResources,
    NoCorrespondingReservationFound,
}

impl NoMatchReason {
    /// Pick the primary reason out of every reason an offer failed for.
    pub fn primary(reasons: &[NoMatchReason]) -> Option<NoMatchReason> {
        reasons.iter().copied().min()
    }
}

#[cfg(test)]
mod no_match_reason_test {
    use super::NoMatchReason;

    #[test]
    fn insufficient_cpus_outranks_unfulfilled_constraint() {
        let reasons = [
            NoMatchReason::UnfulfilledConstraint,
            NoMatchReason::InsufficientCpus,
        ];
        assert_eq!(NoMatchReason::primary(&reasons), Some(NoMatchReason::InsufficientCpus));
    }

    #[test]
    fn empty_reasons_has_no_primary() {
        assert_eq!(NoMatchReason::primary(&[]), None);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap as Map;

    fn offer_with_attr(hostname: &str, attrs: &[(&str, &str)]) -> Offer {
        Offer {
            offer_id: "o1".into(),
            agent_id: "a1".into(),
            hostname: hostname.into(),
            region: None,
            zone: None,
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            resources: Default::default(),
            roles: vec!["*".into()],
            reservation_labels: Map::new(),
        }
    }

    fn placed(hostname: &str) -> PlacedInstance {
        PlacedInstance {
            hostname: hostname.into(),
            region: None,
            zone: None,
            attributes: Map::new(),
        }
    }

    #[test]
    fn unique_rejects_used_hostname() {
        let c = Constraint::unique(ConstraintField::Hostname);
        let offer = offer_with_attr("host-1", &[]);
        let eval = evaluate_constraint(&c, &offer, &[placed("host-1")], None);
        assert!(!eval.satisfied);
    }

    #[test]
    fn unique_allows_new_hostname() {
        let c = Constraint::unique(ConstraintField::Hostname);
        let offer = offer_with_attr("host-2", &[]);
        let eval = evaluate_constraint(&c, &offer, &[placed("host-1")], None);
        assert!(eval.satisfied);
    }

    #[test]
    fn cluster_pins_to_first_match_when_value_empty() {
        let c = Constraint {
            field: ConstraintField::Hostname,
            op: ConstraintOp::Cluster(None),
        };
        let offer = offer_with_attr("host-1", &[]);
        let eval = evaluate_constraint(&c, &offer, &[], None);
        assert!(eval.satisfied);
    }

    #[test]
    fn cluster_respects_existing_pin() {
        let c = Constraint {
            field: ConstraintField::Hostname,
            op: ConstraintOp::Cluster(None),
        };
        let offer = offer_with_attr("host-2", &[]);
        let eval = evaluate_constraint(&c, &offer, &[], Some("host-1"));
        assert!(!eval.satisfied);
    }

    #[test]
    fn like_matches_regex() {
        let c = Constraint {
            field: ConstraintField::Attribute("rack".into()),
            op: ConstraintOp::Like("rack-[0-9]+".into()),
        };
        let offer = offer_with_attr("host-1", &[("rack", "rack-12")]);
        assert!(evaluate_constraint(&c, &offer, &[], None).satisfied);
    }

    #[test]
    fn unlike_accepts_missing_attribute() {
        let c = Constraint {
            field: ConstraintField::Attribute("rack".into()),
            op: ConstraintOp::Unlike("rack-bad".into()),
        };
        let offer = offer_with_attr("host-1", &[]);
        assert!(evaluate_constraint(&c, &offer, &[], None).satisfied);
    }

    #[test]
    fn max_per_enforces_cap() {
        let c = Constraint {
            field: ConstraintField::Hostname,
            op: ConstraintOp::MaxPer(1),
        };
        let offer = offer_with_attr("host-1", &[]);
        let eval = evaluate_constraint(&c, &offer, &[placed("host-1")], None);
        assert!(!eval.satisfied);
    }

    #[test]
    fn group_by_prefers_new_group() {
        let c = Constraint {
            field: ConstraintField::Attribute("rack".into()),
            op: ConstraintOp::GroupBy(None),
        };
        let offer = offer_with_attr("host-1", &[("rack", "rack-b")]);
        let mut placed_instances = vec![];
        for _ in 0..3 {
            placed_instances.push(PlacedInstance {
                hostname: "host-x".into(),
                region: None,
                zone: None,
                attributes: [("rack".to_string(), "rack-a".to_string())].into(),
            });
        }
        let eval = evaluate_constraint(&c, &offer, &placed_instances, None);
        assert!(eval.satisfied);
        assert_eq!(eval.group_key.as_deref(), Some("rack-b"));
    }
}
