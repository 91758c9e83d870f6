//! End-to-end: lead response compliance under consent constraints.
//!
//! Exercises the full kernel (reconciler drift detection, the bounded
//! propose/evaluate/reformulate cycle, execution, lineage, and chain
//! verification) against three variants of the same scenario:
//! a consentless EU lead resolved via human handoff, a consented lead
//! handled by direct outreach, and a constraint-saturated lead that
//! exhausts its budget and escalates.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use akos::types::{Constraint, ConstraintType, EntityState, GovernanceVerdict, Intent,
    PolicyActivation, ReconcilerConfig};
use akos::{KernelConfig, LoopVerdict, AKOS};

fn kernel(config: ReconcilerConfig) -> AKOS {
    AKOS::new(KernelConfig {
        reconciler: config,
        ..Default::default()
    })
    .unwrap()
}

fn sla_intent() -> Intent {
    Intent {
        id: "lead_response_sla".to_string(),
        objective: "Respond to high-value leads within 10 minutes".to_string(),
        priority: 80,
        hard_constraints: vec![
            Constraint::hard(
                "gdpr_consent_required",
                "Must verify GDPR consent before any direct outreach to EU leads",
            ),
            Constraint {
                name: "no_contact_outside_hours".to_string(),
                constraint_type: ConstraintType::Hard,
                description: "No automated outreach between 10PM-7AM lead local time".to_string(),
                activation: PolicyActivation {
                    always: false,
                    schedule: Some("* 22-23,0-6 * * *".to_string()),
                    condition: None,
                    emergency_override: false,
                },
            },
        ],
        soft_constraints: vec![Constraint::soft(
            "prefer_automation",
            "Prefer automated responses over human routing when possible",
        )],
        cost_ceiling: None,
        created_by: "operator".to_string(),
        created_at: Utc::now(),
        active: true,
    }
}

fn cost_intent() -> Intent {
    Intent {
        id: "cost_optimization".to_string(),
        objective: "Keep per-action cost below $2".to_string(),
        priority: 40,
        hard_constraints: vec![],
        soft_constraints: vec![Constraint::soft(
            "use_lightweight_models",
            "Prefer lightweight models for routine decisions",
        )],
        cost_ceiling: None,
        created_by: "operator".to_string(),
        created_at: Utc::now(),
        active: true,
    }
}

fn lead_4821(consent: bool, local_hour: i64) -> EntityState {
    let created = Utc::now() - Duration::minutes(8);
    let mut properties = HashMap::new();
    properties.insert("name".to_string(), json!("EU High-Value Lead"));
    properties.insert("value".to_string(), json!(50000));
    properties.insert("geo".to_string(), json!("EU"));
    properties.insert("jurisdiction".to_string(), json!("EU"));
    properties.insert("gdpr_consent".to_string(), json!(consent));
    properties.insert("local_hour".to_string(), json!(local_hour));
    properties.insert("created_at".to_string(), json!(created.to_rfc3339()));
    properties.insert("ingested_at".to_string(), json!(created.to_rfc3339()));
    EntityState {
        entity_type: "lead".to_string(),
        entity_id: "lead_4821".to_string(),
        properties,
        last_updated: Utc::now(),
        source: "crm_webhook".to_string(),
        confidence: 1.0,
        obligations: vec!["lead_response_sla".to_string()],
    }
}

fn setup(kernel: &AKOS, consent: bool, local_hour: i64) {
    {
        let mut reconciler = kernel.reconciler.lock().unwrap();
        reconciler.register_intent(sla_intent());
        reconciler.register_intent(cost_intent());
    }
    kernel
        .world
        .lock()
        .unwrap()
        .upsert(lead_4821(consent, local_hour));
}

#[test]
fn consentless_eu_lead_resolves_through_human_handoff() {
    let kernel = kernel(ReconcilerConfig {
        cooldown_seconds: 0,
        max_retry_budget: 3,
        ..Default::default()
    });
    setup(&kernel, false, 14);

    let results = kernel
        .reconciler
        .lock()
        .unwrap()
        .reconcile_once(Utc::now());
    assert_eq!(results.len(), 1);
    let report = &results[0];
    assert_eq!(report.verdict, Some(LoopVerdict::Approved));
    assert_eq!(report.attempts, 3);
    assert!(report.execution_success);
    assert!(!report.escalated);

    // The lineage answers: what intent, what drift, what was proposed, what
    // was rejected and why, what was finally approved, what happened.
    let records = kernel.ledger.query_recent(1).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];

    assert_eq!(record.intent.id, "lead_response_sla");
    assert_eq!(record.intent.priority, 80);
    assert!(record.drift_detected.contains("lead_4821") || record.drift_severity >= 7);

    assert_eq!(record.proposals.len(), 3);
    assert_eq!(record.proposals[0].attempt_number, 1);
    assert_eq!(record.proposals[1].attempt_number, 2);
    assert_eq!(record.proposals[2].attempt_number, 3);

    assert_eq!(record.governance_decisions.len(), 3);
    assert_eq!(
        record.governance_decisions[0].verdict,
        GovernanceVerdict::Rejected
    );
    assert_eq!(
        record.governance_decisions[1].verdict,
        GovernanceVerdict::Rejected
    );
    assert_eq!(
        record.governance_decisions[2].verdict,
        GovernanceVerdict::Approved
    );
    assert!(record.governance_decisions[0]
        .rejection_reason
        .as_deref()
        .unwrap()
        .to_lowercase()
        .contains("gdpr"));

    assert_eq!(record.total_attempts, 3);
    assert!(!record.escalated_to_human);
    assert!(record.execution_success);
    let approved_id = record.final_approved_proposal.as_deref().unwrap();
    let approved = record
        .proposals
        .iter()
        .find(|p| p.id == approved_id)
        .unwrap();
    assert!(approved
        .actions
        .iter()
        .any(|a| a.action_type == "route_to_human"));

    assert!(kernel.ledger.verify_chain_integrity().unwrap());
}

#[test]
fn consented_lead_gets_direct_outreach_first_attempt() {
    let kernel = kernel(ReconcilerConfig {
        cooldown_seconds: 0,
        max_retry_budget: 3,
        ..Default::default()
    });
    setup(&kernel, true, 14);

    let results = kernel
        .reconciler
        .lock()
        .unwrap()
        .reconcile_once(Utc::now());
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].attempts, 1);
    assert_eq!(results[0].verdict, Some(LoopVerdict::Approved));

    let record = &kernel.ledger.query_recent(1).unwrap()[0];
    assert_eq!(record.total_attempts, 1);
    let approved_id = record.final_approved_proposal.as_deref().unwrap();
    let approved = record
        .proposals
        .iter()
        .find(|p| p.id == approved_id)
        .unwrap();
    assert_eq!(approved.actions[0].action_type, "send_email");

    // Execution reported back into the world model.
    let world = kernel.world.lock().unwrap();
    let entity = world.get("lead_4821").unwrap();
    assert!(entity.properties.contains_key("last_contacted"));
    assert_eq!(
        entity.properties.get("contact_method"),
        Some(&json!("send_email"))
    );
}

#[test]
fn constraint_saturated_lead_escalates_on_budget_exhaustion() {
    let kernel = kernel(ReconcilerConfig {
        cooldown_seconds: 0,
        max_retry_budget: 2,
        ..Default::default()
    });
    // Quiet-hours constraint made unconditional so both hard constraints bind.
    {
        let mut reconciler = kernel.reconciler.lock().unwrap();
        let mut intent = sla_intent();
        intent.hard_constraints[1].activation = PolicyActivation::default();
        reconciler.register_intent(intent);
    }
    kernel.world.lock().unwrap().upsert(lead_4821(false, 23));

    let results = kernel
        .reconciler
        .lock()
        .unwrap()
        .reconcile_once(Utc::now());
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].verdict, Some(LoopVerdict::Escalated));
    assert!(results[0].escalated);

    let record = &kernel.ledger.query_recent(1).unwrap()[0];
    assert!(record.escalated_to_human);
    assert!(record.final_approved_proposal.is_none());
    assert_eq!(record.total_attempts, 2);

    let pending = kernel.reconciler.lock().unwrap().pending_escalations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].entity_id, "lead_4821");
    assert_eq!(pending[0].proposals_tried, 2);
    assert!(!pending[0].rejection_reasons.is_empty());
}
