//! The constraint-guided autonomy loop, the defining behavior of the kernel.
//!
//! On governance rejection, the machine-readable reason is accumulated and
//! the strategy layer reformulates; on an escalate verdict or budget
//! exhaustion the cycle ends in human escalation. States:
//!
//! ```text
//! GENERATE → EVALUATE → { DISPATCH | ACCUMULATE → GENERATE | ESCALATE }
//! ```
//!
//! One invocation handles one drift event. The loop is synchronous with
//! respect to governance: generation and evaluation are CPU-only; only the
//! dispatch step touches the outside world. Whatever the outcome, the loop
//! produces the lineage record for durable append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::KernelResult;
use crate::execution::ExecutionDispatcher;
use crate::governance_kernel::GovernanceKernel;
use crate::strategy::StrategyGenerator;
use crate::types::{
    fresh_id, AccumulatedRejection, DriftEvent, ExecutionResult, GovernanceDecision,
    GovernanceVerdict, Intent, LineageRecord, StrategyProposal,
};
use crate::world_model::WorldModelStore;

/// Terminal state of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopVerdict {
    Approved,
    Escalated,
}

/// Everything one cycle produced: all proposals, all decisions, the approved
/// plan (if any) and its execution outcome.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub intent: Intent,
    pub drift: DriftEvent,
    pub proposals: Vec<StrategyProposal>,
    pub decisions: Vec<GovernanceDecision>,
    pub accumulated_rejections: Vec<AccumulatedRejection>,
    pub verdict: LoopVerdict,
    pub approved_proposal: Option<StrategyProposal>,
    pub execution_result: Option<ExecutionResult>,
    pub total_attempts: u32,
}

impl LoopOutcome {
    pub fn escalated(&self) -> bool {
        self.verdict == LoopVerdict::Escalated
    }

    pub fn execution_success(&self) -> bool {
        self.execution_result
            .as_ref()
            .map(|r| r.success)
            .unwrap_or(false)
    }

    /// Build the complete lineage record for this cycle.
    pub fn build_lineage_record(
        &self,
        cycle_id: &str,
        world_state_snapshot: serde_json::Value,
        now: DateTime<Utc>,
    ) -> LineageRecord {
        // An approval that recorded soft-constraint violations means a
        // lower-priority preference was knowingly set aside for this intent.
        let mut priority_override_applied = false;
        let mut deprioritized_intent = None;
        let mut deprioritization_rationale = None;
        for decision in &self.decisions {
            if decision.verdict == GovernanceVerdict::Approved
                && !decision.violated_constraints.is_empty()
            {
                priority_override_applied = true;
                deprioritized_intent = Some(decision.violated_constraints.join(", "));
                deprioritization_rationale = Some(format!(
                    "Soft constraints deprioritized to serve intent {} (priority {})",
                    self.intent.id, self.intent.priority
                ));
            }
        }

        let resolution_duration_seconds =
            (now - self.drift.detected_at).num_milliseconds() as f64 / 1000.0;

        LineageRecord {
            id: fresh_id("lin"),
            cycle_id: cycle_id.to_string(),
            intent: self.intent.clone(),
            drift_detected: self.drift.description.clone(),
            drift_severity: self.drift.severity,
            world_state_snapshot,
            proposals: self.proposals.clone(),
            governance_decisions: self.decisions.clone(),
            final_approved_proposal: self.approved_proposal.as_ref().map(|p| p.id.clone()),
            execution_result: self.execution_result.clone(),
            execution_success: self.execution_success(),
            total_attempts: self.total_attempts,
            escalated_to_human: self.escalated(),
            human_authorization_token: None,
            resolved_at: Some(now),
            resolution_duration_seconds: Some(resolution_duration_seconds.max(0.0)),
            conflicting_intents: None,
            priority_override_applied,
            deprioritized_intent,
            deprioritization_rationale,
            uncertainty: self.decisions.last().map(|d| d.uncertainty.clone()),
            artifact_provenance: None,
            signature: String::new(),
            prior_record_hash: None,
        }
    }
}

/// Bounded retry driver around the governance evaluator.
pub struct AutonomyLoop<'a> {
    governance: &'a GovernanceKernel,
    dispatcher: &'a ExecutionDispatcher,
    strategy: &'a dyn StrategyGenerator,
    max_attempts: u32,
}

impl<'a> AutonomyLoop<'a> {
    pub fn new(
        governance: &'a GovernanceKernel,
        dispatcher: &'a ExecutionDispatcher,
        strategy: &'a dyn StrategyGenerator,
        max_attempts: u32,
    ) -> Self {
        Self {
            governance,
            dispatcher,
            strategy,
            max_attempts,
        }
    }

    /// Run the full cycle for one drift event. `intents` is the complete
    /// active set used for constraint resolution and conflict detection; the
    /// accumulated rejections are the only feedback channel between attempts.
    pub fn run(
        &self,
        intent: &Intent,
        drift: &DriftEvent,
        world: &mut WorldModelStore,
        intents: &[Intent],
        now: DateTime<Utc>,
    ) -> KernelResult<LoopOutcome> {
        let mut proposals: Vec<StrategyProposal> = Vec::new();
        let mut decisions: Vec<GovernanceDecision> = Vec::new();
        let mut accumulated: Vec<AccumulatedRejection> = Vec::new();
        let mut approved_proposal = None;
        let mut execution_result = None;
        let mut verdict = LoopVerdict::Escalated;
        let mut attempt = 0;

        while attempt < self.max_attempts {
            attempt += 1;

            let proposal = self.strategy.generate(
                intent,
                world.model(),
                drift,
                &accumulated,
                &proposals,
                attempt,
            );
            log::debug!(
                "[AutonomyLoop] Attempt {}/{} for {}: {}",
                attempt,
                self.max_attempts,
                drift.entity_id,
                proposal.plan_description
            );
            proposals.push(proposal.clone());

            let decision = self
                .governance
                .evaluate(&proposal, intents, world.model(), now, None);
            decisions.push(decision.clone());

            match decision.verdict {
                GovernanceVerdict::Approved => {
                    let result = self.dispatcher.execute(&proposal, &decision, world)?;
                    approved_proposal = Some(proposal);
                    execution_result = Some(result);
                    verdict = LoopVerdict::Approved;
                    break;
                }
                GovernanceVerdict::Escalate => {
                    verdict = LoopVerdict::Escalated;
                    break;
                }
                GovernanceVerdict::Rejected => {
                    // This is where constraint-guided reformulation happens:
                    // the rejection becomes input to the next attempt.
                    accumulated.push(AccumulatedRejection {
                        source: format!("governance_rejection_{}", decision.id),
                        constraint: decision.rejection_reason.clone().unwrap_or_default(),
                        detail: decision.rejection_detail.clone().unwrap_or_default(),
                    });
                }
            }
        }

        if verdict == LoopVerdict::Escalated {
            log::info!(
                "[AutonomyLoop] Cycle for {} ended in escalation after {} attempt(s)",
                drift.entity_id,
                attempt
            );
        }

        Ok(LoopOutcome {
            intent: intent.clone(),
            drift: drift.clone(),
            proposals,
            decisions,
            accumulated_rejections: accumulated,
            verdict,
            approved_proposal,
            execution_result,
            total_attempts: attempt,
        })
    }
}
