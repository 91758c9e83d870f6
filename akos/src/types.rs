//! Core data model for the autonomy kernel.
//!
//! Design goals:
//! - Small, serializable structures with clear provenance fields.
//! - Open property maps for entity state; rule code reads specific keys
//!   rather than baking domain fields into the types.
//! - Deterministic serialization: optional fields are omitted when unset so
//!   the canonical form used for ledger signatures is stable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type IntentId = String;
pub type EntityId = String;
pub type ProposalId = String;
pub type DecisionId = String;

/// Prefixed short identifier, e.g. `prop_1c9f2ab04d3e`.
pub fn fresh_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &hex[..12])
}

// ---------------------------------------------------------------------------
// Intents & constraints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintType {
    /// Never violate. Rejection is automatic.
    Hard,
    /// Prefer to satisfy. Can be deprioritized with a lineage record.
    Soft,
}

/// Temporal authority: when a constraint is in force.
///
/// A constraint is active iff `always` is set or the cron schedule matches
/// the current wall clock to the minute. An unparseable schedule fails safe:
/// the constraint is simply inactive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyActivation {
    #[serde(default = "default_true")]
    pub always: bool,
    /// Cron expression (five-field, minute resolution).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Runtime condition hook (reserved; not evaluated by the kernel).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Suspends the constraint during declared emergencies.
    #[serde(default)]
    pub emergency_override: bool,
}

impl Default for PolicyActivation {
    fn default() -> Self {
        Self {
            always: true,
            schedule: None,
            condition: None,
            emergency_override: false,
        }
    }
}

/// A governance constraint attached to an intent, keyed by canonical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// e.g. `gdpr_consent_required`
    pub name: String,
    #[serde(rename = "type")]
    pub constraint_type: ConstraintType,
    /// Human-readable rule text.
    pub description: String,
    #[serde(default)]
    pub activation: PolicyActivation,
}

impl Constraint {
    pub fn hard(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            constraint_type: ConstraintType::Hard,
            description: description.to_string(),
            activation: PolicyActivation::default(),
        }
    }

    pub fn soft(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            constraint_type: ConstraintType::Soft,
            description: description.to_string(),
            activation: PolicyActivation::default(),
        }
    }
}

/// The primary declaration object. Operators define what "good" looks like;
/// everything the kernel does serves one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: IntentId,
    pub objective: String,
    /// 1 = lowest, 100 = highest.
    pub priority: u8,
    pub hard_constraints: Vec<Constraint>,
    pub soft_constraints: Vec<Constraint>,
    /// Max $ per action cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_ceiling: Option<f64>,
    /// Human who declared this intent.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// World model
// ---------------------------------------------------------------------------

/// A single entity tracked in the world model. `properties` is an open
/// key→value bag; drift rules and constraint checks read specific keys
/// (`geo`, `gdpr_consent`, `local_hour`, `created_at`, `last_contacted`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_type: String,
    /// External system id, unique within the store.
    pub entity_id: EntityId,
    pub properties: HashMap<String, serde_json::Value>,
    pub last_updated: DateTime<Utc>,
    /// Where this data came from.
    pub source: String,
    /// Data confidence in [0, 1].
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Active intent ids that obligate this entity.
    #[serde(default)]
    pub obligations: Vec<IntentId>,
}

fn default_confidence() -> f64 {
    1.0
}

/// The kernel's internal representation of operational reality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldModel {
    pub entities: HashMap<EntityId, EntityState>,
    pub last_reconciled: DateTime<Utc>,
    #[serde(default)]
    pub drift_events: Vec<DriftEvent>,
}

/// A detected deviation between the world model and an intent-implied target
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftEvent {
    pub entity_id: EntityId,
    pub intent_id: IntentId,
    pub description: String,
    /// 1 = cosmetic, 10 = critical.
    pub severity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_remaining_minutes: Option<f64>,
    pub detected_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// A single step in a proposed strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    /// e.g. `send_email`, `query_crm`, `route_to_human`.
    pub action_type: String,
    /// Target entity id.
    pub target: EntityId,
    /// Action-specific configuration.
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub requires_consent: bool,
    #[serde(default = "default_true")]
    pub reversible: bool,
    /// 1 = trivial, 10 = critical.
    pub risk_score: u8,
}

/// A proposed plan of action, submitted to the governance evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProposal {
    pub id: ProposalId,
    /// Which intent this serves.
    pub intent_id: IntentId,
    /// Which retry within the cycle (1, 2, 3...).
    pub attempt_number: u32,
    pub plan_description: String,
    /// Ordered execution steps.
    pub actions: Vec<PlannedAction>,
    pub estimated_cost: f64,
    /// Why this plan was chosen.
    pub rationale: String,
    /// If this is a retry, which rejected proposal prompted it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_rejection_id: Option<ProposalId>,
    pub generated_at: DateTime<Utc>,
}

/// One entry of the feedback channel between retry attempts: a governance
/// rejection reduced to its machine-readable core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatedRejection {
    /// Source decision, e.g. `governance_rejection_gov_1c9f2ab04d3e`.
    pub source: String,
    /// Machine-readable reason (violated constraint names joined by `|`).
    pub constraint: String,
    /// Human-readable detail.
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Governance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernanceVerdict {
    Approved,
    Rejected,
    Escalate,
}

/// Graduated authorization model. Levels order from fully autonomous to
/// human-only; comparisons rely on the declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthorizationLevel {
    /// Fully autonomous; pre-approved routine operations.
    L0,
    /// Execute autonomously, notify a human afterwards.
    L1,
    /// Propose the action, await human approval.
    L2,
    /// Joint human-system decision process.
    L3,
    /// The system provides analysis; a human decides.
    L4,
}

/// Risk profile of an action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    /// `local` | `team` | `org`
    pub impact_scope: String,
    /// `reversible` | `partially_reversible` | `irreversible`
    pub reversibility: String,
    /// `narrow` | `moderate` | `wide`
    pub blast_radius: String,
}

/// One governance gate in a multi-phase action lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub phase_name: String,
    pub default_authorization_level: AuthorizationLevel,
    /// Raise the authorization level when earlier phases already approved at
    /// a lower one.
    #[serde(default)]
    pub escalation_on_deviation: bool,
    /// A required phase terminates the chain on any non-approved verdict.
    #[serde(default = "default_true")]
    pub required: bool,
}

/// Outcome of evaluating a single authorization phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernancePhaseResult {
    pub phase_name: String,
    pub verdict: GovernanceVerdict,
    pub authorization_level: AuthorizationLevel,
    #[serde(default)]
    pub violated_constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_detail: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

/// A registered category of autonomous action with its governance
/// configuration. Actions with unregistered types are rejected outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTypeSpec {
    pub type_id: String,
    pub description: String,
    pub risk_profile: RiskProfile,
    pub default_authorization_level: AuthorizationLevel,
    /// Constraint names this type is specifically subject to.
    #[serde(default)]
    pub applicable_policies: Vec<String>,
    /// Open escalation routing configuration.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub escalation_config: HashMap<String, serde_json::Value>,
    /// Multi-phase authorization gates, evaluated in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phase_config: Vec<PhaseConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
}

/// Structured uncertainty: what the kernel did *not* know at the moment of
/// authorization. Emitted on every decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyDeclaration {
    /// Assumptions the decision rests on.
    #[serde(default)]
    pub assumptions: Vec<String>,
    /// Conditions that could invalidate the decision.
    #[serde(default)]
    pub watch_conditions: Vec<String>,
    /// What the decision was based on.
    #[serde(default)]
    pub evidence_basis: Vec<String>,
    /// Identified gaps.
    #[serde(default)]
    pub known_unknowns: Vec<String>,
    /// Aggregate confidence in [0, 1], rounded to 2 decimals.
    pub confidence_level: f64,
}

/// Serializable summary of one active constraint, for policy snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub constraint_type: ConstraintType,
    pub description: String,
}

/// The policy set in force at the moment of evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    #[serde(default)]
    pub active_constraints: Vec<ConstraintSummary>,
    #[serde(default)]
    pub count: usize,
}

/// Wall-clock context captured at the moment of evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalContext {
    pub evaluated_at: DateTime<Utc>,
    pub hour: u32,
    /// e.g. `Monday`
    pub weekday: String,
    pub is_business_hours: bool,
}

/// The governance evaluator's ruling on a strategy proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceDecision {
    pub id: DecisionId,
    pub proposal_id: ProposalId,
    pub verdict: GovernanceVerdict,
    /// On rejection: the violated hard constraints. On approval: the violated
    /// soft constraints (recorded, non-blocking).
    #[serde(default)]
    pub violated_constraints: Vec<String>,
    /// Machine-readable rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Human-readable rejection explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_level: Option<AuthorizationLevel>,
    /// Legacy tier string: `auto_execute` | `notify_proceed` |
    /// `require_approval` | `escalate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_tier: Option<String>,
    #[serde(default)]
    pub policy_snapshot: PolicySnapshot,
    pub temporal_context: TemporalContext,
    pub evaluated_at: DateTime<Utc>,
    pub uncertainty: UncertaintyDeclaration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phase_results: Vec<GovernancePhaseResult>,
    pub evaluator: String,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Outcome of dispatching one planned action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_type: String,
    pub target: EntityId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_seconds: f64,
}

/// A world-model mutation derived from an execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub entity_id: EntityId,
    pub field: String,
    pub new_value: serde_json::Value,
    pub source: String,
}

/// Aggregated outcome of executing an approved strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub proposal_id: ProposalId,
    pub actions_completed: Vec<ActionOutcome>,
    pub actions_failed: Vec<ActionOutcome>,
    pub success: bool,
    pub world_state_changes: Vec<StateChange>,
    pub executed_at: DateTime<Utc>,
    pub execution_duration_seconds: f64,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Tunable knobs of the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_seconds: u64,
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,
    /// Retry budget of one constraint-guided cycle.
    #[serde(default = "default_retry_budget")]
    pub max_retry_budget: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
    /// Consecutive escalations before an entity's circuit opens.
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
}

fn default_heartbeat() -> u64 {
    60
}
fn default_drift_threshold() -> f64 {
    0.7
}
fn default_retry_budget() -> u32 {
    3
}
fn default_cooldown() -> u64 {
    300
}
fn default_breaker_threshold() -> u32 {
    5
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat(),
            drift_threshold: default_drift_threshold(),
            max_retry_budget: default_retry_budget(),
            cooldown_seconds: default_cooldown(),
            circuit_breaker_threshold: default_breaker_threshold(),
        }
    }
}

/// Per-entity state that prevents oscillation on drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DampeningState {
    pub entity_id: EntityId,
    pub last_intervention_at: DateTime<Utc>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Once open, cleared only by human resolution of the escalation.
    #[serde(default)]
    pub circuit_broken: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    Pending,
    Resolved,
}

/// A decision routed to human authority, either because risk exceeded the
/// system's boundary or because the retry budget was exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: String,
    pub cycle_id: String,
    pub lineage_id: String,
    pub intent_id: IntentId,
    pub entity_id: EntityId,
    pub drift_description: String,
    pub proposals_tried: usize,
    pub rejection_reasons: Vec<String>,
    pub status: EscalationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Lineage
// ---------------------------------------------------------------------------

/// Governance-relevant metadata for a durable output produced by a governed
/// action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactProvenance {
    pub artifact_id: String,
    /// e.g. `report`, `recommendation`, `component`.
    pub artifact_type: String,
    /// SHA-256 hex over the artifact content.
    pub integrity_hash: String,
    #[serde(default)]
    pub validation_evidence: HashMap<String, serde_json::Value>,
    /// Whether the validating entity is independent of the producer.
    #[serde(default)]
    pub validation_independent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validating_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_uncertainty: Option<UncertaintyDeclaration>,
}

/// The system-of-record entry: one per reconciliation cycle. Every field
/// answers what happened, why, under whose authority, and what resulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub id: String,
    /// Groups all attempts for one drift event.
    pub cycle_id: String,

    // What triggered this
    pub intent: Intent,
    pub drift_detected: String,
    pub drift_severity: u8,
    pub world_state_snapshot: serde_json::Value,

    // What was proposed
    pub proposals: Vec<StrategyProposal>,

    // What governance decided
    pub governance_decisions: Vec<GovernanceDecision>,

    // What was executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_approved_proposal: Option<ProposalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionResult>,
    #[serde(default)]
    pub execution_success: bool,

    // Meta
    pub total_attempts: u32,
    #[serde(default)]
    pub escalated_to_human: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_authorization_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_duration_seconds: Option<f64>,

    // Conflict resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicting_intents: Option<Vec<IntentId>>,
    #[serde(default)]
    pub priority_override_applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprioritized_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprioritization_rationale: Option<String>,

    // Structured uncertainty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<UncertaintyDeclaration>,

    // Output artifact provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_provenance: Option<ArtifactProvenance>,

    // Integrity
    /// SHA-256 hex over the canonical JSON form with this field zeroed.
    #[serde(default)]
    pub signature: String,
    /// Signature of the immediately preceding record; `None` for genesis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_record_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// Learning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeuristicStatus {
    Active,
    Deprecated,
}

/// A learned search pattern. Biases strategy selection; never policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalHeuristic {
    pub id: String,
    /// e.g. `geo:EU → prepend consent_verification`
    pub pattern: String,
    /// Which rejection cycles taught this.
    pub source_lineage_ids: Vec<String>,
    #[serde(default)]
    pub hit_count: u32,
    #[serde(default)]
    pub success_rate: f64,
    pub status: HeuristicStatus,
    pub learned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    PendingReview,
    Approved,
    Rejected,
}

/// A proposed change to governance rules. Surfaced for human review; the
/// kernel never applies one on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyProposal {
    pub id: String,
    pub proposed_change: String,
    pub rationale: String,
    pub supporting_lineage_ids: Vec<String>,
    pub risk_assessment: String,
    pub proposed_by: String,
    pub status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}
