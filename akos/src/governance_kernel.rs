//! AKOS Governance Kernel
//!
//! This module defines the Governance Kernel, the high-privilege component
//! responsible for evaluating strategy proposals against the constraints of
//! active intents. It is the mandatory intermediary between the strategy
//! layer and the executor.
//!
//! The kernel's responsibilities include:
//! - Resolving the active constraint set under temporal authority.
//! - Hard/soft constraint checking with machine-readable rejection reasons.
//! - Graduated authorization (L0-L4) derived from action risk.
//! - Maintaining the Action Type Registry; unregistered types are rejected.
//! - Multi-phase authorization for complex action lifecycles.
//! - Emitting a structured uncertainty declaration on every decision.
//!
//! Evaluation is pure with respect to its arguments and the registry: no
//! per-call state is retained, and nothing below the kernel can modify its
//! policies.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Timelike, Utc};
use croner::Cron;
use regex::Regex;

use crate::types::{
    fresh_id, ActionTypeSpec, AuthorizationLevel, Constraint, ConstraintSummary, ConstraintType,
    GovernanceDecision, GovernancePhaseResult, GovernanceVerdict, Intent, PhaseConfig,
    PolicySnapshot, RiskProfile, StrategyProposal, TemporalContext, UncertaintyDeclaration,
    WorldModel,
};

/// Action types that perform direct outreach to an entity.
const OUTREACH_ACTION_TYPES: &[&str] =
    &["send_email", "send_sms", "direct_call", "automated_outreach"];

/// Jurisdictions recognized as EU/EEA for consent checks.
const EU_JURISDICTIONS: &[&str] = &[
    "EU", "EEA", "DE", "FR", "IT", "ES", "NL", "BE", "AT", "SE", "DK", "FI", "IE", "PT", "GR",
    "PL", "CZ", "RO", "HU", "BG", "HR", "SK", "SI", "LT", "LV", "EE", "CY", "MT", "LU",
];

const EVALUATOR_NAME: &str = "governance_kernel";

// ---------------------------------------------------------------------------
// Temporal authority
// ---------------------------------------------------------------------------

/// A constraint is active iff `always` is set or its cron schedule matches
/// the current wall clock to the minute. Parse failure fails safe: inactive.
fn constraint_is_active(constraint: &Constraint, now: DateTime<Utc>) -> bool {
    let activation = &constraint.activation;
    if activation.always {
        return true;
    }
    let Some(schedule) = activation.schedule.as_deref() else {
        return false;
    };
    let minute = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    match Cron::new(schedule).parse() {
        Ok(cron) => cron.is_time_matching(&minute).unwrap_or(false),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Constraint violation rules
// ---------------------------------------------------------------------------

/// Python-style truthiness over JSON values; used for open property maps.
fn json_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

fn is_outreach(action_type: &str) -> bool {
    OUTREACH_ACTION_TYPES.contains(&action_type)
}

/// Rule-based violation engine keyed by canonical constraint name. The set
/// is closed: names without a registered rule never violate.
fn check_constraint_violation(
    proposal: &StrategyProposal,
    constraint: &Constraint,
    world: &WorldModel,
) -> bool {
    match constraint.name.as_str() {
        "gdpr_consent_required" => check_gdpr_consent(proposal, world),
        "no_contact_outside_hours" => check_contact_hours(proposal, world),
        "cost_ceiling" => check_cost_ceiling(proposal, constraint),
        _ => false,
    }
}

/// Outreach toward an EU/EEA entity without consent on file. When no entity
/// data exists, an action that declares `requires_consent` also violates.
fn check_gdpr_consent(proposal: &StrategyProposal, world: &WorldModel) -> bool {
    for action in proposal.actions.iter().filter(|a| is_outreach(&a.action_type)) {
        match world.entities.get(&action.target) {
            Some(entity) => {
                let props = &entity.properties;
                let geo = props
                    .get("geo")
                    .or_else(|| props.get("jurisdiction"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let is_eu = EU_JURISDICTIONS.contains(&geo.to_uppercase().as_str());
                if is_eu {
                    let consent = props.get("gdpr_consent").map(json_truthy).unwrap_or(false);
                    if !consent {
                        return true;
                    }
                }
            }
            None => {
                if action.requires_consent {
                    return true;
                }
            }
        }
    }
    false
}

/// Outreach toward an entity whose reported local hour is in the quiet
/// window [22..24) ∪ [0..7).
fn check_contact_hours(proposal: &StrategyProposal, world: &WorldModel) -> bool {
    for action in proposal.actions.iter().filter(|a| is_outreach(&a.action_type)) {
        if let Some(entity) = world.entities.get(&action.target) {
            if let Some(local_hour) = entity.properties.get("local_hour").and_then(|v| v.as_i64())
            {
                if !(7..22).contains(&local_hour) {
                    return true;
                }
            }
        }
    }
    false
}

/// Estimated cost exceeds a dollar literal embedded in the constraint
/// description (e.g. "Keep per-action cost below $2").
fn check_cost_ceiling(proposal: &StrategyProposal, constraint: &Constraint) -> bool {
    let re = Regex::new(r"\$(\d+(?:\.\d+)?)").expect("dollar literal pattern");
    if let Some(caps) = re.captures(&constraint.description) {
        if let Ok(ceiling) = caps[1].parse::<f64>() {
            return proposal.estimated_cost > ceiling;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Machine-readable rejection reason: violated names joined by `|`.
fn format_structured_reason(violations: &[String]) -> String {
    violations.join("|")
}

fn format_human_reason(
    violations: &[String],
    proposal: &StrategyProposal,
    world: &WorldModel,
) -> String {
    let mut parts = Vec::new();
    for v in violations {
        match v.as_str() {
            "gdpr_consent_required" => {
                for action in proposal.actions.iter().filter(|a| is_outreach(&a.action_type)) {
                    if let Some(entity) = world.entities.get(&action.target) {
                        let geo = entity
                            .properties
                            .get("geo")
                            .or_else(|| entity.properties.get("jurisdiction"))
                            .and_then(|g| g.as_str())
                            .unwrap_or("unknown");
                        parts.push(format!(
                            "Entity {} is {} jurisdiction. No GDPR consent on file. \
                             Direct outreach prohibited without verified consent.",
                            action.target, geo
                        ));
                    }
                }
            }
            "no_contact_outside_hours" => {
                parts.push("Automated outreach is restricted during this time window.".to_string());
            }
            other => parts.push(format!("Constraint '{}' was violated.", other)),
        }
    }
    if parts.is_empty() {
        "One or more constraints were violated.".to_string()
    } else {
        parts.join(" ")
    }
}

fn serialize_active_policies(constraints: &[Constraint]) -> PolicySnapshot {
    PolicySnapshot {
        active_constraints: constraints
            .iter()
            .map(|c| ConstraintSummary {
                name: c.name.clone(),
                constraint_type: c.constraint_type,
                description: c.description.clone(),
            })
            .collect(),
        count: constraints.len(),
    }
}

fn temporal_snapshot(now: DateTime<Utc>) -> TemporalContext {
    TemporalContext {
        evaluated_at: now,
        hour: now.hour(),
        weekday: now.format("%A").to_string(),
        is_business_hours: (9..18).contains(&now.hour()),
    }
}

// ---------------------------------------------------------------------------
// Authorization mapping (L0-L4)
// ---------------------------------------------------------------------------

/// Graduated authorization model:
///   risk 1-3:  L0 (fully autonomous)
///   risk 4-5:  L1 (execute, notify afterwards)
///   risk 6-7:  L2 (propose, await approval)
///   risk 8:    L3 (collaborative decision)
///   risk 9-10: L4 (human decides)
fn authorization_level_for_risk(max_risk: u8) -> AuthorizationLevel {
    match max_risk {
        0..=3 => AuthorizationLevel::L0,
        4..=5 => AuthorizationLevel::L1,
        6..=7 => AuthorizationLevel::L2,
        8 => AuthorizationLevel::L3,
        _ => AuthorizationLevel::L4,
    }
}

/// Legacy string-based tier, preserved for the API and older consumers.
fn authorization_tier_for_risk(max_risk: u8) -> &'static str {
    match max_risk {
        0..=3 => "auto_execute",
        4..=6 => "notify_proceed",
        7..=8 => "require_approval",
        _ => "escalate",
    }
}

// ---------------------------------------------------------------------------
// Structured uncertainty
// ---------------------------------------------------------------------------

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Build the uncertainty declaration for a decision: assumptions made,
/// conditions that could invalidate it, evidence basis, and known gaps.
fn build_uncertainty_declaration(
    proposal: &StrategyProposal,
    world: &WorldModel,
    active_constraints: &[Constraint],
    soft_violations: &[String],
) -> UncertaintyDeclaration {
    let mut assumptions = Vec::new();
    let mut watch_conditions = Vec::new();
    let mut evidence_basis = Vec::new();
    let mut known_unknowns = Vec::new();
    let mut entity_confidences = Vec::new();

    for action in &proposal.actions {
        match world.entities.get(&action.target) {
            Some(entity) => {
                if entity.confidence < 1.0 {
                    assumptions.push(format!(
                        "Entity {} data confidence is {:.0}% (not fully verified)",
                        action.target,
                        entity.confidence * 100.0
                    ));
                    watch_conditions.push(format!(
                        "Entity {} data may be stale or inaccurate",
                        action.target
                    ));
                }
                evidence_basis.push(format!(
                    "Entity {}: source={}, last_updated={}",
                    action.target,
                    entity.source,
                    entity.last_updated.to_rfc3339()
                ));
                entity_confidences.push(entity.confidence);
            }
            None => {
                known_unknowns.push(format!(
                    "No world model data for target entity {}",
                    action.target
                ));
            }
        }
    }

    if active_constraints.is_empty() {
        known_unknowns
            .push("No active constraints evaluated — policy may be incomplete".to_string());
    }

    if !soft_violations.is_empty() {
        watch_conditions.push(format!(
            "Soft constraints were violated: {}. These may indicate risk the hard \
             constraint set does not cover.",
            soft_violations.join(", ")
        ));
    }

    let avg_confidence = if entity_confidences.is_empty() {
        0.5
    } else {
        entity_confidences.iter().sum::<f64>() / entity_confidences.len() as f64
    };

    let mut confidence = avg_confidence;
    if !soft_violations.is_empty() {
        confidence *= 0.9;
    }
    if !known_unknowns.is_empty() {
        confidence *= 0.8;
    }

    UncertaintyDeclaration {
        assumptions,
        watch_conditions,
        evidence_basis,
        known_unknowns,
        confidence_level: round2(confidence.clamp(0.0, 1.0)),
    }
}

// ---------------------------------------------------------------------------
// Intent conflict resolution
// ---------------------------------------------------------------------------

/// How a set of conflicting intents was resolved: the highest-priority
/// intent wins; the others' soft preferences are deprioritized.
#[derive(Debug, Clone)]
pub struct ConflictResolution {
    pub primary_intent: String,
    pub deprioritized: Vec<String>,
    pub rationale: String,
}

/// Collect other active intents whose hard constraints the proposal would
/// violate in isolation. The check runs against an empty world model so it
/// tests the structure of the proposal, not the current world state.
fn detect_intent_conflicts<'a>(
    proposal: &StrategyProposal,
    intents: &'a [Intent],
    now: DateTime<Utc>,
) -> Vec<&'a Intent> {
    let empty_world = WorldModel {
        entities: HashMap::new(),
        last_reconciled: now,
        drift_events: Vec::new(),
    };

    intents
        .iter()
        .filter(|intent| intent.id != proposal.intent_id && intent.active)
        .filter(|intent| {
            intent
                .hard_constraints
                .iter()
                .any(|c| check_constraint_violation(proposal, c, &empty_world))
        })
        .collect()
}

/// Hard constraints of every conflicting intent stay inviolable; among valid
/// solutions the highest-priority intent's preference wins, and the tradeoff
/// is recorded in lineage.
pub fn resolve_intent_conflict(conflicting: &[&Intent]) -> ConflictResolution {
    let mut sorted: Vec<&Intent> = conflicting.to_vec();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
    let primary = sorted[0];
    let deprioritized: Vec<String> = sorted[1..].iter().map(|i| i.id.clone()).collect();
    let losing_priorities: Vec<u8> = sorted[1..].iter().map(|i| i.priority).collect();

    ConflictResolution {
        primary_intent: primary.id.clone(),
        deprioritized,
        rationale: format!(
            "Priority differential: {} vs {:?}",
            primary.priority, losing_priorities
        ),
    }
}

// ---------------------------------------------------------------------------
// Governance Kernel
// ---------------------------------------------------------------------------

fn baseline_action_types() -> HashMap<String, ActionTypeSpec> {
    let entries = [
        ActionTypeSpec {
            type_id: "task_execution".to_string(),
            description: "Executing an operational task within an existing capability".to_string(),
            risk_profile: RiskProfile {
                impact_scope: "local".to_string(),
                reversibility: "reversible".to_string(),
                blast_radius: "narrow".to_string(),
            },
            default_authorization_level: AuthorizationLevel::L0,
            applicable_policies: Vec::new(),
            escalation_config: HashMap::new(),
            phase_config: Vec::new(),
            registered_by: None,
            registered_at: None,
        },
        ActionTypeSpec {
            type_id: "skill_modification".to_string(),
            description:
                "Modifying the instructions, criteria, or parameters of an existing capability"
                    .to_string(),
            risk_profile: RiskProfile {
                impact_scope: "team".to_string(),
                reversibility: "partially_reversible".to_string(),
                blast_radius: "moderate".to_string(),
            },
            default_authorization_level: AuthorizationLevel::L2,
            applicable_policies: Vec::new(),
            escalation_config: HashMap::new(),
            phase_config: Vec::new(),
            registered_by: None,
            registered_at: None,
        },
        ActionTypeSpec {
            type_id: "drift_reconciliation".to_string(),
            description:
                "Autonomous corrective action when world state diverges from declared intent"
                    .to_string(),
            risk_profile: RiskProfile {
                impact_scope: "local".to_string(),
                reversibility: "reversible".to_string(),
                blast_radius: "narrow".to_string(),
            },
            default_authorization_level: AuthorizationLevel::L1,
            applicable_policies: Vec::new(),
            escalation_config: HashMap::new(),
            phase_config: Vec::new(),
            registered_by: None,
            registered_at: None,
        },
        ActionTypeSpec {
            type_id: "escalation".to_string(),
            description:
                "Routing a decision to human authority at the system's authorized boundary"
                    .to_string(),
            risk_profile: RiskProfile {
                impact_scope: "local".to_string(),
                reversibility: "reversible".to_string(),
                blast_radius: "narrow".to_string(),
            },
            default_authorization_level: AuthorizationLevel::L0,
            applicable_policies: Vec::new(),
            escalation_config: HashMap::new(),
            phase_config: Vec::new(),
            registered_by: None,
            registered_at: None,
        },
        ActionTypeSpec {
            type_id: "policy_proposal".to_string(),
            description: "Proposing a change to governance policy (human decides)".to_string(),
            risk_profile: RiskProfile {
                impact_scope: "org".to_string(),
                reversibility: "reversible".to_string(),
                blast_radius: "wide".to_string(),
            },
            default_authorization_level: AuthorizationLevel::L4,
            applicable_policies: Vec::new(),
            escalation_config: HashMap::new(),
            phase_config: Vec::new(),
            registered_by: None,
            registered_at: None,
        },
    ];

    entries
        .into_iter()
        .map(|spec| (spec.type_id.clone(), spec))
        .collect()
}

/// The Governance Kernel evaluates proposals against active policies.
/// Immutable from below: only human-declared intents define its behavior.
pub struct GovernanceKernel {
    action_type_registry: RwLock<HashMap<String, ActionTypeSpec>>,
}

impl GovernanceKernel {
    pub fn new() -> Self {
        Self {
            action_type_registry: RwLock::new(baseline_action_types()),
        }
    }

    // --- Action Type Registry ---

    pub fn get_action_type(&self, type_id: &str) -> Option<ActionTypeSpec> {
        self.action_type_registry
            .read()
            .expect("action type registry poisoned")
            .get(type_id)
            .cloned()
    }

    pub fn registered_action_types(&self) -> Vec<ActionTypeSpec> {
        let mut specs: Vec<ActionTypeSpec> = self
            .action_type_registry
            .read()
            .expect("action type registry poisoned")
            .values()
            .cloned()
            .collect();
        specs.sort_by(|a, b| a.type_id.cmp(&b.type_id));
        specs
    }

    /// Register a new action type. Registration is itself a governed action:
    /// the registering authority is recorded alongside the time.
    pub fn register_action_type(
        &self,
        mut spec: ActionTypeSpec,
        registered_by: &str,
        now: DateTime<Utc>,
    ) -> ActionTypeSpec {
        spec.registered_by = Some(registered_by.to_string());
        spec.registered_at = Some(now);
        log::info!(
            "[GovernanceKernel] Registered action type '{}' (by {})",
            spec.type_id,
            registered_by
        );
        self.action_type_registry
            .write()
            .expect("action type registry poisoned")
            .insert(spec.type_id.clone(), spec.clone());
        spec
    }

    pub fn validate_action_type(&self, type_id: &str) -> bool {
        self.action_type_registry
            .read()
            .expect("action type registry poisoned")
            .contains_key(type_id)
    }

    // --- Multi-phase authorization ---

    /// Evaluate a single phase of a multi-phase lifecycle. Authorization at
    /// one phase does not automatically satisfy subsequent phases.
    pub fn evaluate_phase(
        &self,
        phase: &PhaseConfig,
        proposal: &StrategyProposal,
        intents: &[Intent],
        world: &WorldModel,
        now: DateTime<Utc>,
        prior_results: &[GovernancePhaseResult],
    ) -> GovernancePhaseResult {
        let active_constraints = active_constraints(intents, now);

        let hard_violations: Vec<String> = active_constraints
            .iter()
            .filter(|c| c.constraint_type == ConstraintType::Hard)
            .filter(|c| check_constraint_violation(proposal, c, world))
            .map(|c| c.name.clone())
            .collect();

        if !hard_violations.is_empty() {
            return GovernancePhaseResult {
                phase_name: phase.phase_name.clone(),
                verdict: GovernanceVerdict::Rejected,
                authorization_level: phase.default_authorization_level,
                rejection_reason: Some(format_structured_reason(&hard_violations)),
                rejection_detail: Some(format_human_reason(&hard_violations, proposal, world)),
                violated_constraints: hard_violations,
                evaluated_at: now,
            };
        }

        // Phase-conditional escalation: an earlier low-level approval raises
        // this phase to at least L2.
        let mut auth_level = phase.default_authorization_level;
        if phase.escalation_on_deviation
            && prior_results
                .iter()
                .any(|p| p.verdict == GovernanceVerdict::Approved)
            && auth_level < AuthorizationLevel::L2
        {
            auth_level = AuthorizationLevel::L2;
        }

        GovernancePhaseResult {
            phase_name: phase.phase_name.clone(),
            verdict: GovernanceVerdict::Approved,
            authorization_level: auth_level,
            violated_constraints: Vec::new(),
            rejection_reason: None,
            rejection_detail: None,
            evaluated_at: now,
        }
    }

    /// Evaluate all phases in declaration order, sharing the same active
    /// constraint context. A required non-approved phase terminates the chain.
    pub fn evaluate_multi_phase(
        &self,
        phases: &[PhaseConfig],
        proposal: &StrategyProposal,
        intents: &[Intent],
        world: &WorldModel,
        now: DateTime<Utc>,
    ) -> Vec<GovernancePhaseResult> {
        let mut results = Vec::new();
        for phase in phases {
            let result = self.evaluate_phase(phase, proposal, intents, world, now, &results);
            let terminal = phase.required && result.verdict != GovernanceVerdict::Approved;
            results.push(result);
            if terminal {
                break;
            }
        }
        results
    }

    // --- Core evaluation ---

    /// Evaluate a strategy proposal against all active policies.
    ///
    /// Returns APPROVED, REJECTED (with machine-readable reason), or
    /// ESCALATE. Every decision carries a structured uncertainty declaration,
    /// a policy snapshot, and the temporal context of the evaluation.
    pub fn evaluate(
        &self,
        proposal: &StrategyProposal,
        intents: &[Intent],
        world: &WorldModel,
        now: DateTime<Utc>,
        action_type_id: Option<&str>,
    ) -> GovernanceDecision {
        let decision_id = fresh_id("gov");

        // 0. Registry check: unregistered action types are rejected outright.
        if let Some(type_id) = action_type_id {
            if !self.validate_action_type(type_id) {
                log::warn!(
                    "[GovernanceKernel] Rejecting proposal {}: unregistered action type '{}'",
                    proposal.id,
                    type_id
                );
                return GovernanceDecision {
                    id: decision_id,
                    proposal_id: proposal.id.clone(),
                    verdict: GovernanceVerdict::Rejected,
                    violated_constraints: Vec::new(),
                    rejection_reason: Some("unregistered_action_type".to_string()),
                    rejection_detail: Some(format!(
                        "Action type '{}' is not registered in the Action Type Registry. \
                         The system cannot take actions outside its registered governance \
                         configuration.",
                        type_id
                    )),
                    authorization_level: None,
                    authorization_tier: None,
                    policy_snapshot: PolicySnapshot::default(),
                    temporal_context: temporal_snapshot(now),
                    evaluated_at: now,
                    uncertainty: build_uncertainty_declaration(proposal, world, &[], &[]),
                    action_type_id: Some(type_id.to_string()),
                    phase_results: Vec::new(),
                    evaluator: EVALUATOR_NAME.to_string(),
                };
            }
        }

        // 1. Resolve active constraints under temporal authority.
        let constraints = active_constraints(intents, now);

        // 2. Hard constraints: any violation rejects.
        let hard_violations: Vec<String> = constraints
            .iter()
            .filter(|c| c.constraint_type == ConstraintType::Hard)
            .filter(|c| check_constraint_violation(proposal, c, world))
            .map(|c| c.name.clone())
            .collect();

        // 3. Soft constraints: violations recorded, non-blocking.
        let soft_violations: Vec<String> = constraints
            .iter()
            .filter(|c| c.constraint_type == ConstraintType::Soft)
            .filter(|c| check_constraint_violation(proposal, c, world))
            .map(|c| c.name.clone())
            .collect();

        let uncertainty =
            build_uncertainty_declaration(proposal, world, &constraints, &soft_violations);

        if !hard_violations.is_empty() {
            log::info!(
                "[GovernanceKernel] Rejecting proposal {} (attempt {}): {}",
                proposal.id,
                proposal.attempt_number,
                hard_violations.join("|")
            );
            return GovernanceDecision {
                id: decision_id,
                proposal_id: proposal.id.clone(),
                verdict: GovernanceVerdict::Rejected,
                rejection_reason: Some(format_structured_reason(&hard_violations)),
                rejection_detail: Some(format_human_reason(&hard_violations, proposal, world)),
                violated_constraints: hard_violations,
                authorization_level: None,
                authorization_tier: None,
                policy_snapshot: serialize_active_policies(&constraints),
                temporal_context: temporal_snapshot(now),
                evaluated_at: now,
                uncertainty,
                action_type_id: action_type_id.map(|s| s.to_string()),
                phase_results: Vec::new(),
                evaluator: EVALUATOR_NAME.to_string(),
            };
        }

        // 4. Graduated authorization from max action risk.
        let max_risk = proposal
            .actions
            .iter()
            .map(|a| a.risk_score)
            .max()
            .unwrap_or(1);
        let mut auth_level = authorization_level_for_risk(max_risk);
        let tier = authorization_tier_for_risk(max_risk);

        // The action type's default wins when it demands a higher level.
        if let Some(type_id) = action_type_id {
            if let Some(spec) = self.get_action_type(type_id) {
                if spec.default_authorization_level > auth_level {
                    auth_level = spec.default_authorization_level;
                }
            }
        }

        // Risk beyond the system's authority escalates to a human.
        if tier == "escalate" {
            log::warn!(
                "[GovernanceKernel] Escalating proposal {}: max risk {} exceeds system authority",
                proposal.id,
                max_risk
            );
            return GovernanceDecision {
                id: decision_id,
                proposal_id: proposal.id.clone(),
                verdict: GovernanceVerdict::Escalate,
                violated_constraints: Vec::new(),
                rejection_reason: Some("risk_exceeds_system_authority".to_string()),
                rejection_detail: Some(format!(
                    "Maximum risk score {} exceeds system authority threshold.",
                    max_risk
                )),
                authorization_level: Some(auth_level),
                authorization_tier: Some(tier.to_string()),
                policy_snapshot: serialize_active_policies(&constraints),
                temporal_context: temporal_snapshot(now),
                evaluated_at: now,
                uncertainty,
                action_type_id: action_type_id.map(|s| s.to_string()),
                phase_results: Vec::new(),
                evaluator: EVALUATOR_NAME.to_string(),
            };
        }

        // 5. Intent conflicts: if the serving intent is not the highest
        // priority among the conflicting set, escalate.
        let conflicts = detect_intent_conflicts(proposal, intents, now);
        if !conflicts.is_empty() {
            if let Some(serving) = intents.iter().find(|i| i.id == proposal.intent_id) {
                let mut all_conflicting: Vec<&Intent> = vec![serving];
                all_conflicting.extend(conflicts.iter().copied());
                let resolution = resolve_intent_conflict(&all_conflicting);
                if resolution.primary_intent != serving.id {
                    let involved: Vec<&str> =
                        all_conflicting.iter().map(|i| i.id.as_str()).collect();
                    return GovernanceDecision {
                        id: decision_id,
                        proposal_id: proposal.id.clone(),
                        verdict: GovernanceVerdict::Escalate,
                        violated_constraints: Vec::new(),
                        rejection_reason: Some("unresolvable_intent_conflict".to_string()),
                        rejection_detail: Some(format!(
                            "Intent conflict between {:?}. Serving intent {} is not highest \
                             priority.",
                            involved, serving.id
                        )),
                        authorization_level: Some(auth_level),
                        authorization_tier: Some(tier.to_string()),
                        policy_snapshot: serialize_active_policies(&constraints),
                        temporal_context: temporal_snapshot(now),
                        evaluated_at: now,
                        uncertainty,
                        action_type_id: action_type_id.map(|s| s.to_string()),
                        phase_results: Vec::new(),
                        evaluator: EVALUATOR_NAME.to_string(),
                    };
                }
            }
        }

        // 6. Multi-phase authorization when the action type declares phases.
        let mut phase_results = Vec::new();
        if let Some(type_id) = action_type_id {
            if let Some(spec) = self.get_action_type(type_id) {
                if !spec.phase_config.is_empty() {
                    phase_results =
                        self.evaluate_multi_phase(&spec.phase_config, proposal, intents, world, now);
                    if let Some(failed) = phase_results
                        .iter()
                        .find(|p| p.verdict != GovernanceVerdict::Approved)
                    {
                        return GovernanceDecision {
                            id: decision_id,
                            proposal_id: proposal.id.clone(),
                            verdict: failed.verdict,
                            violated_constraints: failed.violated_constraints.clone(),
                            rejection_reason: failed.rejection_reason.clone(),
                            rejection_detail: failed.rejection_detail.clone(),
                            authorization_level: Some(auth_level),
                            authorization_tier: Some(tier.to_string()),
                            policy_snapshot: serialize_active_policies(&constraints),
                            temporal_context: temporal_snapshot(now),
                            evaluated_at: now,
                            uncertainty,
                            action_type_id: action_type_id.map(|s| s.to_string()),
                            phase_results: phase_results.clone(),
                            evaluator: EVALUATOR_NAME.to_string(),
                        };
                    }
                }
            }
        }

        // 7. Approved. Violated soft constraints ride along for the record.
        GovernanceDecision {
            id: decision_id,
            proposal_id: proposal.id.clone(),
            verdict: GovernanceVerdict::Approved,
            violated_constraints: soft_violations,
            rejection_reason: None,
            rejection_detail: None,
            authorization_level: Some(auth_level),
            authorization_tier: Some(tier.to_string()),
            policy_snapshot: serialize_active_policies(&constraints),
            temporal_context: temporal_snapshot(now),
            evaluated_at: now,
            uncertainty,
            action_type_id: action_type_id.map(|s| s.to_string()),
            phase_results,
            evaluator: EVALUATOR_NAME.to_string(),
        }
    }
}

impl Default for GovernanceKernel {
    fn default() -> Self {
        Self::new()
    }
}

/// All constraints of active intents that are in force at `now`.
fn active_constraints(intents: &[Intent], now: DateTime<Utc>) -> Vec<Constraint> {
    let mut active = Vec::new();
    for intent in intents.iter().filter(|i| i.active) {
        for constraint in intent
            .hard_constraints
            .iter()
            .chain(intent.soft_constraints.iter())
        {
            if constraint_is_active(constraint, now) {
                active.push(constraint.clone());
            }
        }
    }
    active
}
