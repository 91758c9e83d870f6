//! Governance evaluator properties: hard-constraint safety, uncertainty on
//! every decision, and authorization monotonicity.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;

use akos::governance_kernel::GovernanceKernel;
use akos::types::{
    fresh_id, AuthorizationLevel, Constraint, ConstraintType, EntityState, GovernanceVerdict,
    Intent, PlannedAction, StrategyProposal, WorldModel,
};

fn world_with(entities: Vec<EntityState>) -> WorldModel {
    WorldModel {
        entities: entities
            .into_iter()
            .map(|e| (e.entity_id.clone(), e))
            .collect(),
        last_reconciled: Utc::now(),
        drift_events: Vec::new(),
    }
}

fn entity(id: &str, props: &[(&str, serde_json::Value)], confidence: f64) -> EntityState {
    EntityState {
        entity_type: "lead".to_string(),
        entity_id: id.to_string(),
        properties: props
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
        last_updated: Utc::now(),
        source: "crm_webhook".to_string(),
        confidence,
        obligations: vec![],
    }
}

fn proposal_with_risk(target: &str, risk: u8) -> StrategyProposal {
    StrategyProposal {
        id: fresh_id("prop"),
        intent_id: "lead_response_sla".to_string(),
        attempt_number: 1,
        plan_description: format!("1. send_email → {}", target),
        actions: vec![PlannedAction {
            action_type: "send_email".to_string(),
            target: target.to_string(),
            parameters: json!({}),
            requires_consent: false,
            reversible: true,
            risk_score: risk,
        }],
        estimated_cost: 0.10,
        rationale: "test".to_string(),
        prior_rejection_id: None,
        generated_at: Utc::now(),
    }
}

fn constrained_intent() -> Intent {
    Intent {
        id: "lead_response_sla".to_string(),
        objective: "Respond to high-value leads within 10 minutes".to_string(),
        priority: 80,
        hard_constraints: vec![Constraint::hard(
            "gdpr_consent_required",
            "Must verify GDPR consent before any direct outreach to EU leads",
        )],
        soft_constraints: vec![Constraint::soft(
            "cost_ceiling",
            "Prefer per-action cost below $1",
        )],
        cost_ceiling: None,
        created_by: "operator".to_string(),
        created_at: Utc::now(),
        active: true,
    }
}

// An approved decision never rides on a violated hard constraint: every
// violated name on an approval is a soft constraint, and re-checking the
// hard set confirms none trips.
#[test]
fn approved_decisions_never_violate_active_hard_constraints() {
    let kernel = GovernanceKernel::new();
    let intent = constrained_intent();
    let consented = world_with(vec![entity(
        "lead_1",
        &[("geo", json!("EU")), ("gdpr_consent", json!(true))],
        1.0,
    )]);

    let mut expensive = proposal_with_risk("lead_1", 3);
    expensive.estimated_cost = 4.0; // Trips the soft cost preference only.
    let decision = kernel.evaluate(
        &expensive,
        std::slice::from_ref(&intent),
        &consented,
        Utc::now(),
        None,
    );

    assert_eq!(decision.verdict, GovernanceVerdict::Approved);
    let hard_names: Vec<&str> = intent
        .hard_constraints
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    for violated in &decision.violated_constraints {
        assert!(
            !hard_names.contains(&violated.as_str()),
            "approved decision lists violated hard constraint {}",
            violated
        );
    }
    assert_eq!(decision.violated_constraints, vec!["cost_ceiling"]);
}

// Every decision path emits a well-formed uncertainty declaration.
#[test]
fn uncertainty_is_present_on_every_verdict() {
    let kernel = GovernanceKernel::new();
    let intent = constrained_intent();
    let now = Utc::now();

    let consentless = world_with(vec![entity(
        "lead_1",
        &[("geo", json!("EU")), ("gdpr_consent", json!(false))],
        0.8,
    )]);
    let consented = world_with(vec![entity(
        "lead_1",
        &[("geo", json!("EU")), ("gdpr_consent", json!(true))],
        0.8,
    )]);

    let decisions = vec![
        // Rejected (hard constraint).
        kernel.evaluate(
            &proposal_with_risk("lead_1", 3),
            std::slice::from_ref(&intent),
            &consentless,
            now,
            None,
        ),
        // Approved.
        kernel.evaluate(
            &proposal_with_risk("lead_1", 3),
            std::slice::from_ref(&intent),
            &consented,
            now,
            None,
        ),
        // Escalated (risk beyond authority).
        kernel.evaluate(
            &proposal_with_risk("lead_1", 10),
            std::slice::from_ref(&intent),
            &consented,
            now,
            None,
        ),
        // Rejected (unregistered action type).
        kernel.evaluate(
            &proposal_with_risk("lead_1", 3),
            std::slice::from_ref(&intent),
            &consented,
            now,
            Some("nonexistent"),
        ),
    ];

    for decision in decisions {
        let u = &decision.uncertainty;
        assert!(
            (0.0..=1.0).contains(&u.confidence_level),
            "confidence {} out of range for {:?}",
            u.confidence_level,
            decision.verdict
        );
    }
}

// Uncertainty synthesis composes its documented inputs.
#[test]
fn uncertainty_reflects_confidence_and_gaps() {
    let kernel = GovernanceKernel::new();
    let intent = constrained_intent();
    let world = world_with(vec![entity(
        "lead_1",
        &[("geo", json!("US"))],
        0.7,
    )]);

    let decision = kernel.evaluate(
        &proposal_with_risk("lead_1", 2),
        &[intent],
        &world,
        Utc::now(),
        None,
    );
    assert_eq!(decision.verdict, GovernanceVerdict::Approved);
    let u = &decision.uncertainty;
    assert!(u.assumptions.iter().any(|a| a.contains("70%")));
    assert!(u.watch_conditions.iter().any(|w| w.contains("lead_1")));
    assert!(u.evidence_basis.iter().any(|e| e.contains("crm_webhook")));
    assert!((u.confidence_level - 0.7).abs() < 1e-9);
}

// Authorization level is non-decreasing in max risk across the whole range.
#[test]
fn authorization_level_is_monotonic_in_risk() {
    let kernel = GovernanceKernel::new();
    let intent = constrained_intent();
    let world = world_with(vec![entity(
        "lead_1",
        &[("geo", json!("US"))],
        1.0,
    )]);

    let mut last = AuthorizationLevel::L0;
    for risk in 1..=10u8 {
        let decision = kernel.evaluate(
            &proposal_with_risk("lead_1", risk),
            std::slice::from_ref(&intent),
            &world,
            Utc::now(),
            None,
        );
        let level = decision.authorization_level.expect("level always derived");
        assert!(level >= last, "authorization dropped at risk {}", risk);
        last = level;
    }
    assert_eq!(last, AuthorizationLevel::L4);
}

// Scenario: a single risk-10 action is beyond system authority.
#[test]
fn critical_risk_escalates_with_machine_readable_reason() {
    let kernel = GovernanceKernel::new();
    let intent = constrained_intent();
    let world = world_with(vec![]);
    let decision = kernel.evaluate(
        &proposal_with_risk("lead_1", 10),
        &[intent],
        &world,
        Utc::now(),
        None,
    );
    assert_eq!(decision.verdict, GovernanceVerdict::Escalate);
    assert_eq!(
        decision.rejection_reason.as_deref(),
        Some("risk_exceeds_system_authority")
    );
    assert_eq!(decision.authorization_level, Some(AuthorizationLevel::L4));
}

// Scenario: unregistered action types never pass governance.
#[test]
fn unregistered_action_type_is_rejected() {
    let kernel = GovernanceKernel::new();
    let decision = kernel.evaluate(
        &proposal_with_risk("lead_1", 2),
        &[constrained_intent()],
        &world_with(vec![]),
        Utc::now(),
        Some("nonexistent"),
    );
    assert_eq!(decision.verdict, GovernanceVerdict::Rejected);
    assert_eq!(
        decision.rejection_reason.as_deref(),
        Some("unregistered_action_type")
    );
}

// Registering a type is governed: authority and time are recorded, and the
// type immediately participates in evaluation.
#[test]
fn registered_action_type_carries_provenance() {
    let kernel = GovernanceKernel::new();
    let spec = akos::types::ActionTypeSpec {
        type_id: "ticket_triage".to_string(),
        description: "Classify and route inbound tickets".to_string(),
        risk_profile: akos::types::RiskProfile {
            impact_scope: "local".to_string(),
            reversibility: "reversible".to_string(),
            blast_radius: "narrow".to_string(),
        },
        default_authorization_level: AuthorizationLevel::L1,
        applicable_policies: vec![],
        escalation_config: HashMap::new(),
        phase_config: vec![],
        registered_by: None,
        registered_at: None,
    };
    let registered = kernel.register_action_type(spec, "operator", Utc::now());
    assert_eq!(registered.registered_by.as_deref(), Some("operator"));
    assert!(registered.registered_at.is_some());

    let decision = kernel.evaluate(
        &proposal_with_risk("lead_1", 2),
        &[constrained_intent()],
        &world_with(vec![]),
        Utc::now(),
        Some("ticket_triage"),
    );
    assert_eq!(decision.verdict, GovernanceVerdict::Approved);
    assert_eq!(decision.authorization_level, Some(AuthorizationLevel::L1));
}

// Soft constraints can be violated on approval, but a hard constraint of the
// same name blocks.
#[test]
fn constraint_hardness_decides_blocking() {
    let kernel = GovernanceKernel::new();
    let world = world_with(vec![]);
    let mut proposal = proposal_with_risk("lead_1", 2);
    proposal.estimated_cost = 9.0;

    let mut soft_intent = constrained_intent();
    soft_intent.hard_constraints.clear();
    let soft = kernel.evaluate(
        &proposal,
        std::slice::from_ref(&soft_intent),
        &world,
        Utc::now(),
        None,
    );
    assert_eq!(soft.verdict, GovernanceVerdict::Approved);

    let hard_intent = Intent {
        hard_constraints: vec![Constraint {
            name: "cost_ceiling".to_string(),
            constraint_type: ConstraintType::Hard,
            description: "Never exceed $1 per cycle".to_string(),
            activation: Default::default(),
        }],
        soft_constraints: vec![],
        ..constrained_intent()
    };
    let hard = kernel.evaluate(&proposal, &[hard_intent], &world, Utc::now(), None);
    assert_eq!(hard.verdict, GovernanceVerdict::Rejected);
    assert_eq!(hard.violated_constraints, vec!["cost_ceiling"]);
}
