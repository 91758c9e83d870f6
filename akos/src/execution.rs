//! Executor Dispatcher: fans approved strategies out to per-action-type
//! handlers and reports structured outcomes back to the world model.
//!
//! Behavioral contract:
//! - Accepts only proposals carrying a decision with verdict APPROVED; the
//!   pre-guard failure is fatal to the call and never retried.
//! - Unknown action types and handler failures are per-action outcomes,
//!   aggregated into the result, not call-level errors.
//! - Outreach-shaped actions stamp `last_contacted`/`contact_method` on the
//!   target entity.
//!
//! The default handlers are mocks; the production system registers adapters
//! for CRM, email, and task-queue integrations through the same registry.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};

use crate::errors::{KernelError, KernelResult};
use crate::types::{
    ActionOutcome, ExecutionResult, GovernanceDecision, GovernanceVerdict, PlannedAction,
    StateChange, StrategyProposal,
};
use crate::world_model::WorldModelStore;

/// A registered executor for one action type. Handlers may block (external
/// effects live here); they are expected to enforce their own timeouts.
pub trait ActionHandler: Send + Sync {
    fn call(&self, action: &PlannedAction, world: &mut WorldModelStore) -> Result<Value, String>;
}

impl<F> ActionHandler for F
where
    F: Fn(&PlannedAction, &mut WorldModelStore) -> Result<Value, String> + Send + Sync,
{
    fn call(&self, action: &PlannedAction, world: &mut WorldModelStore) -> Result<Value, String> {
        self(action, world)
    }
}

/// Action types whose completion marks the target entity as contacted.
const CONTACT_MARKING_TYPES: &[&str] = &["send_email", "route_to_human", "automated_outreach"];

pub struct ExecutionDispatcher {
    handlers: HashMap<String, Box<dyn ActionHandler>>,
}

impl ExecutionDispatcher {
    /// Dispatcher with the default mock handler set.
    pub fn new() -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
        };
        dispatcher.register_defaults();
        dispatcher
    }

    /// Dispatcher with no handlers; every action fails with
    /// `no executor registered`.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register_handler(&mut self, action_type: &str, handler: Box<dyn ActionHandler>) {
        self.handlers.insert(action_type.to_string(), handler);
    }

    fn register_defaults(&mut self) {
        self.register_handler(
            "send_email",
            Box::new(|action: &PlannedAction, _: &mut WorldModelStore| {
                Ok(json!({"status": "sent", "message_id": format!("msg_{}_email", action.target)}))
            }),
        );
        self.register_handler(
            "send_sms",
            Box::new(|action: &PlannedAction, _: &mut WorldModelStore| {
                Ok(json!({"status": "sent", "message_id": format!("msg_{}_sms", action.target)}))
            }),
        );
        self.register_handler(
            "query_crm",
            Box::new(|action: &PlannedAction, world: &mut WorldModelStore| {
                match world.get(&action.target) {
                    Some(entity) => Ok(json!({"found": true, "properties": entity.properties})),
                    None => Ok(json!({"found": false, "properties": {}})),
                }
            }),
        );
        self.register_handler(
            "route_to_human",
            Box::new(|action: &PlannedAction, _: &mut WorldModelStore| {
                let queue = action
                    .parameters
                    .get("queue")
                    .and_then(|q| q.as_str())
                    .unwrap_or("default");
                Ok(json!({"status": "routed", "queue": queue, "context_attached": true}))
            }),
        );
        self.register_handler(
            "automated_outreach",
            Box::new(|_: &PlannedAction, _: &mut WorldModelStore| {
                Ok(json!({"status": "sent", "channel": "automated"}))
            }),
        );
        self.register_handler(
            "direct_call",
            Box::new(|action: &PlannedAction, _: &mut WorldModelStore| {
                Ok(json!({"status": "initiated", "call_id": format!("call_{}", action.target)}))
            }),
        );
        self.register_handler(
            "update_record",
            Box::new(|action: &PlannedAction, world: &mut WorldModelStore| {
                let updates: HashMap<String, Value> = action
                    .parameters
                    .get("updates")
                    .and_then(|u| u.as_object())
                    .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                if world.get(&action.target).is_none() {
                    return Ok(json!({"status": "not_found"}));
                }
                let fields: Vec<String> = updates.keys().cloned().collect();
                world.apply_execution(&action.target, updates);
                Ok(json!({"status": "updated", "fields": fields}))
            }),
        );
    }

    /// Execute an approved strategy proposal.
    ///
    /// GUARD: never executes without governance approval.
    pub fn execute(
        &self,
        proposal: &StrategyProposal,
        decision: &GovernanceDecision,
        world: &mut WorldModelStore,
    ) -> KernelResult<ExecutionResult> {
        if decision.verdict != GovernanceVerdict::Approved {
            return Err(KernelError::UnapprovedExecution {
                proposal_id: proposal.id.clone(),
                verdict: decision.verdict,
            });
        }

        let start = Instant::now();
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut state_changes = Vec::new();

        for action in &proposal.actions {
            let outcome = self.dispatch_action(action, world);
            if outcome.success {
                state_changes.extend(apply_state_changes(action, world));
                completed.push(outcome);
            } else {
                log::warn!(
                    "[ExecutionDispatcher] Action {} on {} failed: {}",
                    action.action_type,
                    action.target,
                    outcome.error.as_deref().unwrap_or("unknown")
                );
                failed.push(outcome);
            }
        }

        let success = failed.is_empty();
        Ok(ExecutionResult {
            proposal_id: proposal.id.clone(),
            actions_completed: completed,
            actions_failed: failed,
            success,
            world_state_changes: state_changes,
            executed_at: Utc::now(),
            execution_duration_seconds: round3(start.elapsed().as_secs_f64()),
        })
    }

    fn dispatch_action(&self, action: &PlannedAction, world: &mut WorldModelStore) -> ActionOutcome {
        let Some(handler) = self.handlers.get(&action.action_type) else {
            return ActionOutcome {
                action_type: action.action_type.clone(),
                target: action.target.clone(),
                success: false,
                data: None,
                error: Some(format!(
                    "No executor registered for action type: {}",
                    action.action_type
                )),
                duration_seconds: 0.0,
            };
        };

        let start = Instant::now();
        match handler.call(action, world) {
            Ok(data) => ActionOutcome {
                action_type: action.action_type.clone(),
                target: action.target.clone(),
                success: true,
                data: Some(data),
                error: None,
                duration_seconds: round3(start.elapsed().as_secs_f64()),
            },
            Err(message) => ActionOutcome {
                action_type: action.action_type.clone(),
                target: action.target.clone(),
                success: false,
                data: None,
                error: Some(message),
                duration_seconds: round3(start.elapsed().as_secs_f64()),
            },
        }
    }
}

impl Default for ExecutionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Stamp contact metadata on the target entity after an outreach-shaped
/// action completes.
fn apply_state_changes(action: &PlannedAction, world: &mut WorldModelStore) -> Vec<StateChange> {
    let mut changes = Vec::new();
    if !CONTACT_MARKING_TYPES.contains(&action.action_type.as_str()) {
        return changes;
    }
    if let Some(entity) = world.entity_mut(&action.target) {
        let contacted_at = Utc::now().to_rfc3339();
        entity
            .properties
            .insert("last_contacted".to_string(), json!(contacted_at));
        entity
            .properties
            .insert("contact_method".to_string(), json!(action.action_type));
        entity.last_updated = Utc::now();
        changes.push(StateChange {
            entity_id: action.target.clone(),
            field: "last_contacted".to_string(),
            new_value: json!(contacted_at),
            source: action.action_type.clone(),
        });
    }
    changes
}
