//! Learning Engine: operational and normative learning.
//!
//! The Iron Rule: learning may bias strategy selection; it may never mutate
//! policy. Operational heuristics are extracted automatically from lineage
//! records; normative changes only ever surface as `PolicyProposal`s that a
//! human approves or rejects. The engine's coupling to the ledger is
//! read-only and strictly after the fact; it can never influence the
//! decision that just happened.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{
    fresh_id, GovernanceVerdict, HeuristicStatus, LineageRecord, OperationalHeuristic,
    PolicyProposal, ReviewStatus,
};

pub struct LearningEngine {
    heuristics: HashMap<String, OperationalHeuristic>,
    policy_proposals: HashMap<String, PolicyProposal>,
}

impl LearningEngine {
    pub fn new() -> Self {
        Self {
            heuristics: HashMap::new(),
            policy_proposals: HashMap::new(),
        }
    }

    // --- Operational learning (automatic) ---

    /// Extract an operational heuristic from a completed lineage record.
    /// Multi-attempt cycles with rejections are the teachable ones; a
    /// single-attempt success has nothing to offer.
    pub fn learn_from_lineage(&mut self, record: &LineageRecord) -> Option<OperationalHeuristic> {
        if record.total_attempts <= 1 {
            return None;
        }

        let rejections: Vec<_> = record
            .governance_decisions
            .iter()
            .filter(|d| d.verdict == GovernanceVerdict::Rejected)
            .collect();
        if rejections.is_empty() {
            return None;
        }

        for rejection in rejections {
            for constraint_name in &rejection.violated_constraints {
                let Some(pattern) = extract_pattern(record, constraint_name) else {
                    continue;
                };
                let existing_id = self
                    .heuristics
                    .values()
                    .find(|h| h.pattern == pattern)
                    .map(|h| h.id.clone());
                if let Some(id) = existing_id {
                    let existing = self.heuristics.get_mut(&id).expect("heuristic indexed by id");
                    existing.hit_count += 1;
                    if record.execution_success {
                        // Exponential moving average toward success.
                        existing.success_rate = 0.8 * existing.success_rate + 0.2;
                    }
                } else {
                    let heuristic = OperationalHeuristic {
                        id: fresh_id("heur"),
                        pattern,
                        source_lineage_ids: vec![record.id.clone()],
                        hit_count: 1,
                        success_rate: if record.execution_success { 1.0 } else { 0.0 },
                        status: HeuristicStatus::Active,
                        learned_at: Utc::now(),
                    };
                    log::debug!(
                        "[LearningEngine] New heuristic {}: {}",
                        heuristic.id,
                        heuristic.pattern
                    );
                    self.heuristics
                        .insert(heuristic.id.clone(), heuristic.clone());
                    return Some(heuristic);
                }
            }
        }
        None
    }

    /// Heuristics relevant to a strategy-generation context, sorted by
    /// `hit_count × success_rate`.
    pub fn heuristics_for_context(
        &self,
        world_snapshot: &serde_json::Value,
    ) -> Vec<OperationalHeuristic> {
        let mut relevant: Vec<OperationalHeuristic> = self
            .heuristics
            .values()
            .filter(|h| h.status == HeuristicStatus::Active)
            .filter(|h| heuristic_matches_context(h, world_snapshot))
            .cloned()
            .collect();
        relevant.sort_by(|a, b| {
            let score_a = a.hit_count as f64 * a.success_rate;
            let score_b = b.hit_count as f64 * b.success_rate;
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        relevant
    }

    pub fn all_heuristics(&self) -> Vec<OperationalHeuristic> {
        self.heuristics.values().cloned().collect()
    }

    // --- Normative learning (human-approved only) ---

    /// Surface a policy change proposal for human review. Never auto-applies.
    pub fn propose_policy_change(
        &mut self,
        proposed_change: &str,
        rationale: &str,
        supporting_lineage_ids: Vec<String>,
        risk_assessment: &str,
    ) -> PolicyProposal {
        let proposal = PolicyProposal {
            id: fresh_id("pprop"),
            proposed_change: proposed_change.to_string(),
            rationale: rationale.to_string(),
            supporting_lineage_ids,
            risk_assessment: risk_assessment.to_string(),
            proposed_by: "strategy_layer".to_string(),
            status: ReviewStatus::PendingReview,
            reviewed_by: None,
            reviewed_at: None,
        };
        self.policy_proposals
            .insert(proposal.id.clone(), proposal.clone());
        proposal
    }

    pub fn pending_proposals(&self) -> Vec<PolicyProposal> {
        self.policy_proposals
            .values()
            .filter(|p| p.status == ReviewStatus::PendingReview)
            .cloned()
            .collect()
    }

    pub fn all_proposals(&self) -> Vec<PolicyProposal> {
        self.policy_proposals.values().cloned().collect()
    }

    pub fn approve_proposal(
        &mut self,
        proposal_id: &str,
        reviewer: &str,
    ) -> Option<PolicyProposal> {
        self.review_proposal(proposal_id, reviewer, ReviewStatus::Approved)
    }

    pub fn reject_proposal(&mut self, proposal_id: &str, reviewer: &str) -> Option<PolicyProposal> {
        self.review_proposal(proposal_id, reviewer, ReviewStatus::Rejected)
    }

    fn review_proposal(
        &mut self,
        proposal_id: &str,
        reviewer: &str,
        status: ReviewStatus,
    ) -> Option<PolicyProposal> {
        let proposal = self.policy_proposals.get_mut(proposal_id)?;
        if proposal.status != ReviewStatus::PendingReview {
            return None;
        }
        proposal.status = status;
        proposal.reviewed_by = Some(reviewer.to_string());
        proposal.reviewed_at = Some(Utc::now());
        Some(proposal.clone())
    }

    /// Analyze lineage records for constraints with high escalation rates;
    /// suggest a human review when a constraint escalates more often than
    /// not across a meaningful sample. The system proposes, humans decide.
    pub fn detect_policy_improvement_opportunity(
        &mut self,
        records: &[LineageRecord],
    ) -> Option<PolicyProposal> {
        let mut escalation_counts: HashMap<String, usize> = HashMap::new();
        let mut total_counts: HashMap<String, usize> = HashMap::new();

        for record in records {
            for decision in &record.governance_decisions {
                for constraint in &decision.violated_constraints {
                    *total_counts.entry(constraint.clone()).or_default() += 1;
                    if record.escalated_to_human {
                        *escalation_counts.entry(constraint.clone()).or_default() += 1;
                    }
                }
            }
        }

        let mut names: Vec<&String> = total_counts.keys().collect();
        names.sort();
        for constraint_name in names {
            let total = total_counts[constraint_name];
            if total < 5 {
                continue; // Minimum sample size.
            }
            let escalated = escalation_counts.get(constraint_name).copied().unwrap_or(0);
            if escalated as f64 / total as f64 > 0.5 {
                let supporting: Vec<String> =
                    records.iter().take(10).map(|r| r.id.clone()).collect();
                return Some(self.propose_policy_change(
                    &format!(
                        "Review constraint '{}': High escalation rate ({}/{} = {:.0}%)",
                        constraint_name,
                        escalated,
                        total,
                        escalated as f64 / total as f64 * 100.0
                    ),
                    &format!(
                        "Constraint '{}' is causing frequent escalations to human. The \
                         strategy layer cannot find compliant alternatives in most cases.",
                        constraint_name
                    ),
                    supporting,
                    "Modifying this constraint could reduce human escalation workload but \
                     may weaken governance guardrails.",
                ));
            }
        }
        None
    }
}

impl Default for LearningEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a reusable pattern from a constraint violation in context.
fn extract_pattern(record: &LineageRecord, constraint_name: &str) -> Option<String> {
    let entities = record
        .world_state_snapshot
        .get("entities")
        .and_then(|e| e.as_object());

    if let Some(entities) = entities {
        for entity_data in entities.values() {
            let props = entity_data.get("properties").and_then(|p| p.as_object());
            let Some(props) = props else { continue };
            let geo = props
                .get("geo")
                .or_else(|| props.get("jurisdiction"))
                .and_then(|g| g.as_str())
                .unwrap_or("");

            match constraint_name {
                "gdpr_consent_required" if !geo.is_empty() => {
                    return Some(format!("geo:{} → prepend consent_verification", geo));
                }
                "no_contact_outside_hours" => {
                    if let Some(local_hour) = props.get("local_hour").and_then(|h| h.as_i64()) {
                        return Some(format!(
                            "local_hour:{} → defer_or_route_to_human",
                            local_hour
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    Some(format!("constraint:{} → check_before_action", constraint_name))
}

fn heuristic_matches_context(
    heuristic: &OperationalHeuristic,
    world_snapshot: &serde_json::Value,
) -> bool {
    let pattern = &heuristic.pattern;
    let Some(geo_val) = pattern
        .strip_prefix("geo:")
        .and_then(|rest| rest.split_whitespace().next())
    else {
        return false;
    };

    let Some(entities) = world_snapshot.get("entities").and_then(|e| e.as_object()) else {
        return false;
    };
    entities.values().any(|entity_data| {
        let props = entity_data
            .get("properties")
            .and_then(|p| p.as_object())
            .or_else(|| entity_data.as_object());
        props
            .and_then(|p| p.get("geo").or_else(|| p.get("jurisdiction")))
            .and_then(|g| g.as_str())
            .map(|g| g.eq_ignore_ascii_case(geo_val))
            .unwrap_or(false)
    })
}
