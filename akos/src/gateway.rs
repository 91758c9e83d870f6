//! HTTP gateway: thin REST surface over the kernel.
//!
//! Endpoints map 1:1 to kernel operations; failures surface the
//! machine-readable error kind in the body. The gateway owns no state of its
//! own: every handler goes through the shared [`AKOS`] components.

use std::collections::HashMap;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::KernelError;
use crate::kernel::AKOS;
use crate::types::{
    fresh_id, ActionTypeSpec, Constraint, ConstraintType, EntityState, Intent, PolicyActivation,
    ReconcilerConfig, StrategyProposal,
};

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

struct ApiError(KernelError);

impl From<KernelError> for ApiError {
    fn from(e: KernelError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            KernelError::IntentNotFound(_) => (StatusCode::NOT_FOUND, "intent_not_found"),
            KernelError::EscalationNotFound(_) => (StatusCode::NOT_FOUND, "escalation_not_found"),
            KernelError::UnapprovedExecution { .. } => {
                (StatusCode::CONFLICT, "unapproved_execution")
            }
            KernelError::IntegrityFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "integrity_failure")
            }
            KernelError::Config(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_config"),
            KernelError::Ledger(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ledger_error"),
            KernelError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
            }
            KernelError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        (
            status,
            Json(json!({"error": kind, "detail": self.0.to_string()})),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConstraintInput {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    activation: PolicyActivation,
}

impl ConstraintInput {
    fn into_constraint(self, constraint_type: ConstraintType) -> Constraint {
        Constraint {
            name: self.name,
            constraint_type,
            description: self.description,
            activation: self.activation,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntentCreateRequest {
    objective: String,
    #[serde(default = "default_priority")]
    priority: u8,
    #[serde(default)]
    hard_constraints: Vec<ConstraintInput>,
    #[serde(default)]
    soft_constraints: Vec<ConstraintInput>,
    #[serde(default)]
    cost_ceiling: Option<f64>,
    #[serde(default = "default_created_by")]
    created_by: String,
}

fn default_priority() -> u8 {
    50
}

fn default_created_by() -> String {
    "api_user".to_string()
}

impl IntentCreateRequest {
    fn into_intent(self, id: String, created_at: chrono::DateTime<Utc>) -> Intent {
        Intent {
            id,
            objective: self.objective,
            priority: self.priority,
            hard_constraints: self
                .hard_constraints
                .into_iter()
                .map(|c| c.into_constraint(ConstraintType::Hard))
                .collect(),
            soft_constraints: self
                .soft_constraints
                .into_iter()
                .map(|c| c.into_constraint(ConstraintType::Soft))
                .collect(),
            cost_ceiling: self.cost_ceiling,
            created_by: self.created_by,
            created_at,
            active: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EntityIngestRequest {
    entity_type: String,
    entity_id: String,
    properties: HashMap<String, Value>,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    obligations: Vec<String>,
}

fn default_source() -> String {
    "api".to_string()
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    proposal: StrategyProposal,
    #[serde(default)]
    intent_ids: Option<Vec<String>>,
    #[serde(default)]
    action_type_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterActionTypeRequest {
    spec: ActionTypeSpec,
    registered_by: String,
}

#[derive(Debug, Deserialize)]
struct EscalationResolveRequest {
    resolution: String,
    resolver: String,
}

#[derive(Debug, Deserialize)]
struct ProposalReviewRequest {
    reviewer: String,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(kernel: AKOS) -> Router {
    Router::new()
        // Intents
        .route("/intents", post(create_intent).get(list_intents))
        .route(
            "/intents/:intent_id",
            get(get_intent).put(update_intent).delete(delete_intent),
        )
        // World state
        .route("/world/state", get(world_state))
        .route("/world/entities/:entity_id", get(get_entity))
        .route("/world/ingest", post(ingest_entity))
        // Reconciler
        .route("/reconciler/status", get(reconciler_status))
        .route("/reconciler/trigger", post(trigger_reconciliation))
        .route(
            "/reconciler/config",
            get(get_reconciler_config).put(update_reconciler_config),
        )
        // Governance
        .route("/governance/policies", get(get_policies))
        .route("/governance/evaluate", post(evaluate_proposal))
        .route("/governance/decisions", get(recent_decisions))
        .route(
            "/governance/action-types",
            get(list_action_types).post(register_action_type),
        )
        .route("/governance/action-types/:type_id", get(get_action_type))
        // Lineage
        .route("/lineage", get(recent_lineage))
        .route("/lineage/verify", get(verify_lineage))
        .route("/lineage/escalations", get(lineage_escalations))
        .route("/lineage/by-intent/:intent_id", get(lineage_by_intent))
        .route("/lineage/by-entity/:entity_id", get(lineage_by_entity))
        .route("/lineage/:cycle_id", get(lineage_by_cycle))
        // Learning
        .route("/learning/heuristics", get(get_heuristics))
        .route("/learning/proposals", get(get_policy_proposals))
        .route(
            "/learning/proposals/:proposal_id/approve",
            post(approve_policy_proposal),
        )
        .route(
            "/learning/proposals/:proposal_id/reject",
            post(reject_policy_proposal),
        )
        // Escalations
        .route("/escalations/pending", get(pending_escalations))
        .route(
            "/escalations/:escalation_id/resolve",
            post(resolve_escalation),
        )
        .with_state(kernel)
}

/// Bind and serve the gateway until the process ends.
pub async fn serve(kernel: AKOS, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[Gateway] Listening on {}", addr);
    axum::serve(listener, router(kernel).into_make_service()).await
}

// ---------------------------------------------------------------------------
// Intent handlers
// ---------------------------------------------------------------------------

async fn create_intent(
    State(kernel): State<AKOS>,
    Json(req): Json<IntentCreateRequest>,
) -> Json<Value> {
    let intent = req.into_intent(fresh_id("intent"), Utc::now());
    let id = intent.id.clone();
    kernel
        .reconciler
        .lock()
        .expect("reconciler lock poisoned")
        .register_intent(intent.clone());
    Json(json!({"id": id, "intent": intent}))
}

async fn list_intents(State(kernel): State<AKOS>) -> Json<Vec<Intent>> {
    Json(
        kernel
            .reconciler
            .lock()
            .expect("reconciler lock poisoned")
            .intents(),
    )
}

async fn get_intent(
    State(kernel): State<AKOS>,
    Path(intent_id): Path<String>,
) -> ApiResult<Json<Intent>> {
    let reconciler = kernel.reconciler.lock().expect("reconciler lock poisoned");
    reconciler
        .intent(&intent_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| KernelError::IntentNotFound(intent_id).into())
}

/// Replace an intent. Replacement preserves `created_at`.
async fn update_intent(
    State(kernel): State<AKOS>,
    Path(intent_id): Path<String>,
    Json(req): Json<IntentCreateRequest>,
) -> ApiResult<Json<Intent>> {
    let mut reconciler = kernel.reconciler.lock().expect("reconciler lock poisoned");
    let Some(old) = reconciler.intent(&intent_id) else {
        return Err(KernelError::IntentNotFound(intent_id).into());
    };
    let updated = req.into_intent(intent_id, old.created_at);
    reconciler.register_intent(updated.clone());
    Ok(Json(updated))
}

async fn delete_intent(
    State(kernel): State<AKOS>,
    Path(intent_id): Path<String>,
) -> Json<Value> {
    kernel
        .reconciler
        .lock()
        .expect("reconciler lock poisoned")
        .unregister_intent(&intent_id);
    Json(json!({"status": "deactivated", "intent_id": intent_id}))
}

// ---------------------------------------------------------------------------
// World handlers
// ---------------------------------------------------------------------------

async fn world_state(State(kernel): State<AKOS>) -> Json<Value> {
    Json(kernel.world.lock().expect("world lock poisoned").snapshot())
}

async fn get_entity(
    State(kernel): State<AKOS>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityState>, StatusCode> {
    kernel
        .world
        .lock()
        .expect("world lock poisoned")
        .get(&entity_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn ingest_entity(
    State(kernel): State<AKOS>,
    Json(req): Json<EntityIngestRequest>,
) -> Json<Value> {
    let entity = EntityState {
        entity_type: req.entity_type,
        entity_id: req.entity_id.clone(),
        properties: req.properties,
        last_updated: Utc::now(),
        source: req.source,
        confidence: req.confidence,
        obligations: req.obligations,
    };
    kernel
        .world
        .lock()
        .expect("world lock poisoned")
        .upsert(entity);
    Json(json!({"status": "ingested", "entity_id": req.entity_id}))
}

// ---------------------------------------------------------------------------
// Reconciler handlers
// ---------------------------------------------------------------------------

async fn reconciler_status(State(kernel): State<AKOS>) -> Json<Value> {
    let status = kernel
        .reconciler
        .lock()
        .expect("reconciler lock poisoned")
        .status();
    Json(serde_json::to_value(status).unwrap_or(Value::Null))
}

async fn trigger_reconciliation(State(kernel): State<AKOS>) -> Json<Value> {
    let results = kernel
        .reconciler
        .lock()
        .expect("reconciler lock poisoned")
        .reconcile_once(Utc::now());
    Json(json!({"cycle_count": results.len(), "results": results}))
}

async fn get_reconciler_config(State(kernel): State<AKOS>) -> Json<ReconcilerConfig> {
    Json(
        kernel
            .reconciler
            .lock()
            .expect("reconciler lock poisoned")
            .config
            .clone(),
    )
}

async fn update_reconciler_config(
    State(kernel): State<AKOS>,
    Json(config): Json<ReconcilerConfig>,
) -> Json<ReconcilerConfig> {
    let mut reconciler = kernel.reconciler.lock().expect("reconciler lock poisoned");
    reconciler.config = config.clone();
    Json(config)
}

// ---------------------------------------------------------------------------
// Governance handlers
// ---------------------------------------------------------------------------

async fn get_policies(State(kernel): State<AKOS>) -> Json<Value> {
    let intents = kernel
        .reconciler
        .lock()
        .expect("reconciler lock poisoned")
        .intents();
    let mut policies = Vec::new();
    for intent in intents {
        for constraint in intent
            .hard_constraints
            .iter()
            .chain(intent.soft_constraints.iter())
        {
            policies.push(json!({"intent_id": intent.id.clone(), "constraint": constraint}));
        }
    }
    Json(Value::Array(policies))
}

/// Stateless evaluation of a caller-supplied proposal.
async fn evaluate_proposal(
    State(kernel): State<AKOS>,
    Json(req): Json<EvaluateRequest>,
) -> Json<Value> {
    let mut intents = kernel
        .reconciler
        .lock()
        .expect("reconciler lock poisoned")
        .intents();
    if let Some(ids) = &req.intent_ids {
        intents.retain(|i| ids.contains(&i.id));
    }
    let world = kernel.world.lock().expect("world lock poisoned");
    let decision = kernel.governance.evaluate(
        &req.proposal,
        &intents,
        world.model(),
        Utc::now(),
        req.action_type_id.as_deref(),
    );
    Json(serde_json::to_value(decision).unwrap_or(Value::Null))
}

async fn recent_decisions(State(kernel): State<AKOS>) -> ApiResult<Json<Value>> {
    let records = kernel.ledger.query_recent(20)?;
    let decisions: Vec<Value> = records
        .iter()
        .flat_map(|r| r.governance_decisions.iter())
        .map(|d| serde_json::to_value(d).unwrap_or(Value::Null))
        .collect();
    Ok(Json(Value::Array(decisions)))
}

async fn list_action_types(State(kernel): State<AKOS>) -> Json<Vec<ActionTypeSpec>> {
    Json(kernel.governance.registered_action_types())
}

async fn get_action_type(
    State(kernel): State<AKOS>,
    Path(type_id): Path<String>,
) -> Result<Json<ActionTypeSpec>, StatusCode> {
    kernel
        .governance
        .get_action_type(&type_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn register_action_type(
    State(kernel): State<AKOS>,
    Json(req): Json<RegisterActionTypeRequest>,
) -> Json<ActionTypeSpec> {
    Json(
        kernel
            .governance
            .register_action_type(req.spec, &req.registered_by, Utc::now()),
    )
}

// ---------------------------------------------------------------------------
// Lineage handlers
// ---------------------------------------------------------------------------

async fn recent_lineage(
    State(kernel): State<AKOS>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let records = kernel.ledger.query_recent(query.limit)?;
    Ok(Json(serde_json::to_value(records).unwrap_or(Value::Null)))
}

async fn verify_lineage(State(kernel): State<AKOS>) -> ApiResult<Json<Value>> {
    let integrity_valid = kernel.ledger.verify_chain_integrity()?;
    let total_records = kernel.ledger.count()?;
    Ok(Json(json!({
        "integrity_valid": integrity_valid,
        "total_records": total_records,
    })))
}

async fn lineage_escalations(State(kernel): State<AKOS>) -> ApiResult<Json<Value>> {
    let records = kernel.ledger.query_escalations(None)?;
    Ok(Json(serde_json::to_value(records).unwrap_or(Value::Null)))
}

async fn lineage_by_intent(
    State(kernel): State<AKOS>,
    Path(intent_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let records = kernel.ledger.query_by_intent(&intent_id)?;
    Ok(Json(serde_json::to_value(records).unwrap_or(Value::Null)))
}

async fn lineage_by_entity(
    State(kernel): State<AKOS>,
    Path(entity_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let records = kernel.ledger.query_by_entity(&entity_id)?;
    Ok(Json(serde_json::to_value(records).unwrap_or(Value::Null)))
}

async fn lineage_by_cycle(
    State(kernel): State<AKOS>,
    Path(cycle_id): Path<String>,
) -> ApiResult<Response> {
    let records = kernel.ledger.get_by_cycle(&cycle_id)?;
    if records.is_empty() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "cycle_not_found"})),
        )
            .into_response());
    }
    Ok(Json(serde_json::to_value(records).unwrap_or(Value::Null)).into_response())
}

// ---------------------------------------------------------------------------
// Learning handlers
// ---------------------------------------------------------------------------

async fn get_heuristics(State(kernel): State<AKOS>) -> Json<Value> {
    let heuristics = kernel
        .learning
        .lock()
        .expect("learning lock poisoned")
        .all_heuristics();
    Json(serde_json::to_value(heuristics).unwrap_or(Value::Null))
}

async fn get_policy_proposals(State(kernel): State<AKOS>) -> Json<Value> {
    let proposals = kernel
        .learning
        .lock()
        .expect("learning lock poisoned")
        .all_proposals();
    Json(serde_json::to_value(proposals).unwrap_or(Value::Null))
}

async fn approve_policy_proposal(
    State(kernel): State<AKOS>,
    Path(proposal_id): Path<String>,
    Json(req): Json<ProposalReviewRequest>,
) -> Result<Json<Value>, StatusCode> {
    kernel
        .learning
        .lock()
        .expect("learning lock poisoned")
        .approve_proposal(&proposal_id, &req.reviewer)
        .map(|p| Json(serde_json::to_value(p).unwrap_or(Value::Null)))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn reject_policy_proposal(
    State(kernel): State<AKOS>,
    Path(proposal_id): Path<String>,
    Json(req): Json<ProposalReviewRequest>,
) -> Result<Json<Value>, StatusCode> {
    kernel
        .learning
        .lock()
        .expect("learning lock poisoned")
        .reject_proposal(&proposal_id, &req.reviewer)
        .map(|p| Json(serde_json::to_value(p).unwrap_or(Value::Null)))
        .ok_or(StatusCode::NOT_FOUND)
}

// ---------------------------------------------------------------------------
// Escalation handlers
// ---------------------------------------------------------------------------

async fn pending_escalations(State(kernel): State<AKOS>) -> Json<Value> {
    let pending = kernel
        .reconciler
        .lock()
        .expect("reconciler lock poisoned")
        .pending_escalations();
    Json(serde_json::to_value(pending).unwrap_or(Value::Null))
}

async fn resolve_escalation(
    State(kernel): State<AKOS>,
    Path(escalation_id): Path<String>,
    Json(req): Json<EscalationResolveRequest>,
) -> ApiResult<Json<Value>> {
    let resolved = kernel
        .reconciler
        .lock()
        .expect("reconciler lock poisoned")
        .resolve_escalation(&escalation_id, &req.resolution, &req.resolver, Utc::now())?;
    Ok(Json(serde_json::to_value(resolved).unwrap_or(Value::Null)))
}
