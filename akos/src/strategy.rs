//! Strategy generation: the pluggable producer of the next proposal.
//!
//! The kernel depends only on the [`StrategyGenerator`] trait; the default
//! implementation is a deterministic ladder of strategies ordered from most
//! automated to safest. An LLM-backed generator is a drop-in replacement
//! implementing the same trait.

use chrono::Utc;
use serde_json::json;

use crate::types::{
    fresh_id, AccumulatedRejection, DriftEvent, Intent, PlannedAction, StrategyProposal,
    WorldModel,
};

/// Pluggable strategy backend. Given the intent, the drift that triggered
/// the cycle, and the rejections accumulated so far, produce the next
/// proposal. Attempt N must differ materially from rejected attempts < N.
pub trait StrategyGenerator: Send + Sync {
    fn generate(
        &self,
        intent: &Intent,
        world: &WorldModel,
        drift: &DriftEvent,
        accumulated_rejections: &[AccumulatedRejection],
        prior_proposals: &[StrategyProposal],
        attempt_number: u32,
    ) -> StrategyProposal;
}

/// Static per-action-type cost table.
fn action_cost(action_type: &str) -> f64 {
    match action_type {
        "send_email" => 0.10,
        "send_sms" => 0.15,
        "query_crm" => 0.05,
        "route_to_human" => 5.00,
        "automated_outreach" => 0.20,
        "direct_call" => 1.00,
        "update_record" => 0.02,
        _ => 0.50,
    }
}

/// Deterministic rule-ladder generator. Rungs, most automated first:
///
/// 1. direct automated outreach (single-shot)
/// 2. prefetch consent/status, then conditionally reach out
/// 3. hand off to a human work queue
///
/// Each attempt starts at the rung indexed by the attempt number and skips
/// rungs whose action pattern matches an accumulated rejection signature.
pub struct RuleLadderGenerator;

impl RuleLadderGenerator {
    pub fn new() -> Self {
        Self
    }

    const RUNG_COUNT: usize = 3;

    /// Whether a rung's action pattern matches a known rejection signature.
    fn rung_blocked(rung: usize, accumulated: &[AccumulatedRejection]) -> bool {
        let signatures: Vec<String> = accumulated
            .iter()
            .map(|r| r.constraint.to_lowercase())
            .collect();
        match rung {
            // Direct outreach is blocked once consent rules have rejected it.
            0 => signatures.iter().any(|s| s.contains("gdpr")),
            // Query-then-outreach is blocked when no consent can exist.
            1 => signatures
                .iter()
                .any(|s| s.contains("no consent") || s.contains("no_consent")),
            _ => false,
        }
    }

    fn rung_actions(&self, rung: usize, drift: &DriftEvent) -> Vec<PlannedAction> {
        let target = drift.entity_id.clone();
        match rung {
            0 => vec![PlannedAction {
                action_type: "send_email".to_string(),
                target,
                parameters: json!({
                    "template": "high_value_lead_response",
                    "personalized": true,
                }),
                requires_consent: false,
                reversible: true,
                risk_score: 3,
            }],
            1 => vec![
                PlannedAction {
                    action_type: "query_crm".to_string(),
                    target: target.clone(),
                    parameters: json!({
                        "fields": ["gdpr_consent", "contact_preferences"],
                    }),
                    requires_consent: false,
                    reversible: true,
                    risk_score: 1,
                },
                PlannedAction {
                    action_type: "send_email".to_string(),
                    target,
                    parameters: json!({
                        "template": "high_value_lead_response",
                        "conditional": "if_consent_verified",
                    }),
                    requires_consent: true,
                    reversible: true,
                    risk_score: 3,
                },
            ],
            _ => vec![PlannedAction {
                action_type: "route_to_human".to_string(),
                target,
                parameters: json!({
                    "queue": "sales_queue",
                    "context": {
                        "reason": "Compliance requires human-initiated first contact",
                        "consent_capture_form": true,
                        "sla_remaining_minutes": drift.sla_remaining_minutes.unwrap_or(2.0),
                    },
                    "priority": "urgent",
                }),
                requires_consent: false,
                reversible: true,
                risk_score: 2,
            }],
        }
    }

    fn describe_plan(actions: &[PlannedAction]) -> String {
        actions
            .iter()
            .enumerate()
            .map(|(i, a)| format!("{}. {} → {}", i + 1, a.action_type, a.target))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn build_rationale(
        attempt: u32,
        accumulated: &[AccumulatedRejection],
        actions: &[PlannedAction],
    ) -> String {
        if attempt == 1 {
            return "First attempt: direct automated approach for fastest SLA compliance."
                .to_string();
        }
        let constraint_summary = accumulated
            .iter()
            .map(|r| r.constraint.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let action_types = actions
            .iter()
            .map(|a| a.action_type.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Attempt {}: adapted strategy to avoid [{}]. Using [{}].",
            attempt, constraint_summary, action_types
        )
    }
}

impl StrategyGenerator for RuleLadderGenerator {
    fn generate(
        &self,
        intent: &Intent,
        _world: &WorldModel,
        drift: &DriftEvent,
        accumulated_rejections: &[AccumulatedRejection],
        prior_proposals: &[StrategyProposal],
        attempt_number: u32,
    ) -> StrategyProposal {
        // Later attempts start lower on the ladder; from there pick the first
        // rung not blocked by an accumulated rejection, falling back to the
        // safest rung.
        let start = (attempt_number as usize - 1).min(Self::RUNG_COUNT - 1);
        let rung = (start..Self::RUNG_COUNT)
            .find(|r| !Self::rung_blocked(*r, accumulated_rejections))
            .unwrap_or(Self::RUNG_COUNT - 1);

        let actions = self.rung_actions(rung, drift);
        let estimated_cost = actions.iter().map(|a| action_cost(&a.action_type)).sum();

        StrategyProposal {
            id: fresh_id("prop"),
            intent_id: intent.id.clone(),
            attempt_number,
            plan_description: Self::describe_plan(&actions),
            rationale: Self::build_rationale(attempt_number, accumulated_rejections, &actions),
            actions,
            estimated_cost,
            prior_rejection_id: prior_proposals.last().map(|p| p.id.clone()),
            generated_at: Utc::now(),
        }
    }
}

impl Default for RuleLadderGenerator {
    fn default() -> Self {
        Self::new()
    }
}
