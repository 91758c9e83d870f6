//! Reconciler: the heartbeat of the kernel.
//!
//! Periodically scans the world model for drift from declared intents and
//! dispatches each drift event into one bounded autonomy cycle. Per-entity
//! dampening (cooldown + circuit breaker) prevents oscillation; escalations
//! land in a queue awaiting human resolution; every cycle is appended to the
//! lineage ledger inside the world-model critical section, before the
//! mutated entity state becomes visible to any other reader.
//!
//! Drift detection is tiered; this module ships the Tier-0 rule set:
//! deterministic, near-zero-cost checks. Heavier observation tiers plug in
//! through the same [`DriftRule`] trait.
//!
//! Concurrency: one reconciliation tick processes entities sequentially and
//! runs under the owning mutex; concurrent ticks on the same state are not
//! supported. The async entry point waits on a stop signal or the heartbeat
//! timeout; an in-flight tick always runs to completion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::autonomy_loop::{AutonomyLoop, LoopVerdict};
use crate::errors::{KernelError, KernelResult};
use crate::execution::ExecutionDispatcher;
use crate::governance_kernel::GovernanceKernel;
use crate::learning::LearningEngine;
use crate::lineage::LineageLedger;
use crate::strategy::StrategyGenerator;
use crate::types::{
    fresh_id, DampeningState, DriftEvent, EntityId, EntityState, Escalation, EscalationStatus,
    Intent, IntentId, ReconcilerConfig,
};
use crate::world_model::WorldModelStore;

// ---------------------------------------------------------------------------
// Drift rules
// ---------------------------------------------------------------------------

/// A deterministic drift check run against every entity each tick.
pub trait DriftRule: Send + Sync {
    fn check(
        &self,
        entity: &EntityState,
        intents: &[Intent],
        now: DateTime<Utc>,
    ) -> Option<DriftEvent>;
}

/// SLA drift: the intent objective declares a response window ("within 10
/// minutes"); an uncontacted entity that has consumed 70% of the window is
/// drifting, with severity growing as the window closes.
pub struct SlaDriftRule {
    window_pattern: Regex,
    hours_pattern: Regex,
}

impl SlaDriftRule {
    pub fn new() -> Self {
        Self {
            window_pattern: Regex::new(r"(?i)within\s+(\d+)\s+minutes?").expect("sla pattern"),
            hours_pattern: Regex::new(r"(?i)within\s+(\d+)\s+hours?").expect("sla pattern"),
        }
    }

    fn extract_sla_minutes(&self, objective: &str) -> Option<f64> {
        if let Some(caps) = self.window_pattern.captures(objective) {
            return caps[1].parse::<f64>().ok();
        }
        if let Some(caps) = self.hours_pattern.captures(objective) {
            return caps[1].parse::<f64>().ok().map(|h| h * 60.0);
        }
        None
    }
}

impl Default for SlaDriftRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a timestamp property: RFC3339 first, then a naive ISO form taken
/// as UTC.
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Utc.from_local_datetime(&naive).single())
}

impl DriftRule for SlaDriftRule {
    fn check(
        &self,
        entity: &EntityState,
        intents: &[Intent],
        now: DateTime<Utc>,
    ) -> Option<DriftEvent> {
        let props = &entity.properties;

        for intent_id in &entity.obligations {
            let Some(intent) = intents.iter().find(|i| &i.id == intent_id && i.active) else {
                continue;
            };
            let Some(sla_minutes) = self.extract_sla_minutes(&intent.objective) else {
                continue;
            };

            if props.contains_key("last_contacted") {
                continue; // Already handled.
            }

            let created = props
                .get("created_at")
                .or_else(|| props.get("ingested_at"))
                .and_then(parse_timestamp)?;

            let minutes_waiting = (now - created).num_seconds() as f64 / 60.0;
            let remaining = sla_minutes - minutes_waiting;

            if minutes_waiting >= sla_minutes * 0.7 {
                let severity =
                    ((8.0 + (minutes_waiting / sla_minutes) * 2.0).floor() as u8).min(10);
                return Some(DriftEvent {
                    entity_id: entity.entity_id.clone(),
                    intent_id: intent_id.clone(),
                    description: format!(
                        "Entity {} has been waiting {:.1} minutes. SLA is {} minutes. \
                         Remaining: {:.1} minutes.",
                        entity.entity_id,
                        minutes_waiting,
                        sla_minutes,
                        remaining.max(0.0)
                    ),
                    severity,
                    sla_remaining_minutes: Some(remaining.max(0.0)),
                    detected_at: now,
                });
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Outcome of processing one drift event within a tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub drift: DriftEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<LoopVerdict>,
    pub attempts: u32,
    pub escalated: bool,
    pub execution_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot of reconciler state for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerStatus {
    pub status: String,
    pub config: ReconcilerConfig,
    pub registered_intents: usize,
    pub tracked_entities: usize,
    pub pending_escalations: usize,
}

pub struct Reconciler {
    world: Arc<Mutex<WorldModelStore>>,
    governance: Arc<GovernanceKernel>,
    dispatcher: Arc<ExecutionDispatcher>,
    ledger: Arc<LineageLedger>,
    learning: Arc<Mutex<LearningEngine>>,
    strategy: Arc<dyn StrategyGenerator>,
    pub config: ReconcilerConfig,
    intents: HashMap<IntentId, Intent>,
    dampening: HashMap<EntityId, DampeningState>,
    drift_rules: Vec<Box<dyn DriftRule>>,
    escalations: Vec<Escalation>,
    running: Arc<AtomicBool>,
}

impl Reconciler {
    pub fn new(
        world: Arc<Mutex<WorldModelStore>>,
        governance: Arc<GovernanceKernel>,
        dispatcher: Arc<ExecutionDispatcher>,
        ledger: Arc<LineageLedger>,
        learning: Arc<Mutex<LearningEngine>>,
        strategy: Arc<dyn StrategyGenerator>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            world,
            governance,
            dispatcher,
            ledger,
            learning,
            strategy,
            config,
            intents: HashMap::new(),
            dampening: HashMap::new(),
            drift_rules: vec![Box::new(SlaDriftRule::new())],
            escalations: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    // --- Intent registry ---

    pub fn register_intent(&mut self, intent: Intent) {
        self.intents.insert(intent.id.clone(), intent);
    }

    pub fn unregister_intent(&mut self, intent_id: &str) {
        self.intents.remove(intent_id);
    }

    pub fn intent(&self, intent_id: &str) -> Option<&Intent> {
        self.intents.get(intent_id)
    }

    pub fn intents(&self) -> Vec<Intent> {
        self.intents.values().cloned().collect()
    }

    pub fn register_drift_rule(&mut self, rule: Box<dyn DriftRule>) {
        self.drift_rules.push(rule);
    }

    // --- Status & escalations ---

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ReconcilerStatus {
        let tracked_entities = self
            .world
            .lock()
            .map(|w| w.model().entities.len())
            .unwrap_or(0);
        let status = if self.is_running() { "running" } else { "stopped" };
        ReconcilerStatus {
            status: status.to_string(),
            config: self.config.clone(),
            registered_intents: self.intents.len(),
            tracked_entities,
            pending_escalations: self.pending_escalations().len(),
        }
    }

    pub fn pending_escalations(&self) -> Vec<Escalation> {
        self.escalations
            .iter()
            .filter(|e| e.status == EscalationStatus::Pending)
            .cloned()
            .collect()
    }

    /// Resolve a pending escalation. Human resolution is also what clears a
    /// tripped circuit breaker for the affected entity.
    pub fn resolve_escalation(
        &mut self,
        escalation_id: &str,
        resolution: &str,
        resolver: &str,
        now: DateTime<Utc>,
    ) -> KernelResult<Escalation> {
        let Some(escalation) = self
            .escalations
            .iter_mut()
            .find(|e| e.id == escalation_id && e.status == EscalationStatus::Pending)
        else {
            return Err(KernelError::EscalationNotFound(escalation_id.to_string()));
        };

        escalation.status = EscalationStatus::Resolved;
        escalation.resolution = Some(resolution.to_string());
        escalation.resolved_by = Some(resolver.to_string());
        escalation.resolved_at = Some(now);
        let resolved = escalation.clone();

        if let Some(state) = self.dampening.get_mut(&resolved.entity_id) {
            state.circuit_broken = false;
            state.consecutive_failures = 0;
            log::info!(
                "[Reconciler] Circuit breaker cleared for {} by {}",
                resolved.entity_id,
                resolver
            );
        }
        Ok(resolved)
    }

    pub fn dampening_state(&self, entity_id: &str) -> Option<&DampeningState> {
        self.dampening.get(entity_id)
    }

    // --- Reconciliation ---

    /// Run a single reconciliation tick. Per-entity failures are reported in
    /// the results without aborting the tick.
    pub fn reconcile_once(&mut self, now: DateTime<Utc>) -> Vec<CycleReport> {
        let intents = self.intents();
        let entities: Vec<EntityState> = match self.world.lock() {
            Ok(world) => world.model().entities.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };

        let mut results = Vec::new();
        for entity in &entities {
            if self.is_dampened(&entity.entity_id, now) {
                continue;
            }

            let drift_events: Vec<DriftEvent> = self
                .drift_rules
                .iter()
                .filter_map(|rule| rule.check(entity, &intents, now))
                .collect();

            for drift in drift_events {
                match self.handle_drift(&drift, &intents, now) {
                    Ok(report) => results.push(report),
                    Err(e) => {
                        log::error!(
                            "[Reconciler] Cycle for {} failed: {}",
                            drift.entity_id,
                            e
                        );
                        results.push(CycleReport {
                            drift,
                            cycle_id: None,
                            lineage_id: None,
                            verdict: None,
                            attempts: 0,
                            escalated: false,
                            execution_success: false,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        }

        if let Ok(mut world) = self.world.lock() {
            world.mark_reconciled();
        }
        results
    }

    fn handle_drift(
        &mut self,
        drift: &DriftEvent,
        intents: &[Intent],
        now: DateTime<Utc>,
    ) -> KernelResult<CycleReport> {
        let Some(intent) = self.intents.get(&drift.intent_id).cloned() else {
            return Ok(CycleReport {
                drift: drift.clone(),
                cycle_id: None,
                lineage_id: None,
                verdict: None,
                attempts: 0,
                escalated: false,
                execution_success: false,
                error: Some("Intent not found".to_string()),
            });
        };

        log::info!(
            "[Reconciler] Drift on {} (severity {}): {}",
            drift.entity_id,
            drift.severity,
            drift.description
        );

        // The whole cycle runs inside the world-model serialization boundary,
        // and the record reaches durable storage before the lock is released:
        // no reader ever observes executed entity state without its lineage.
        let cycle_id = fresh_id("cycle");
        let (outcome, record) = {
            let mut world = self
                .world
                .lock()
                .map_err(|_| KernelError::Internal("world model lock poisoned".to_string()))?;
            let cycle = AutonomyLoop::new(
                &self.governance,
                &self.dispatcher,
                self.strategy.as_ref(),
                self.config.max_retry_budget,
            );
            let outcome = cycle.run(&intent, drift, &mut world, intents, now)?;
            let record = outcome.build_lineage_record(&cycle_id, world.snapshot(), now);
            let record = self.ledger.append(record)?;
            world.record_drift(drift.clone());
            (outcome, record)
        };

        self.update_dampening(&drift.entity_id, outcome.escalated(), now);

        // Operational learning is fire-and-forget; its failure never affects
        // the cycle that just happened.
        if let Ok(mut learning) = self.learning.lock() {
            learning.learn_from_lineage(&record);
        }

        if outcome.escalated() {
            let escalation = Escalation {
                id: fresh_id("esc"),
                cycle_id: cycle_id.clone(),
                lineage_id: record.id.clone(),
                intent_id: intent.id.clone(),
                entity_id: drift.entity_id.clone(),
                drift_description: drift.description.clone(),
                proposals_tried: outcome.proposals.len(),
                rejection_reasons: outcome
                    .decisions
                    .iter()
                    .filter_map(|d| d.rejection_reason.clone())
                    .collect(),
                status: EscalationStatus::Pending,
                created_at: now,
                resolution: None,
                resolved_by: None,
                resolved_at: None,
            };
            log::warn!(
                "[Reconciler] Escalation {} queued for {} ({} proposals tried)",
                escalation.id,
                drift.entity_id,
                escalation.proposals_tried
            );
            self.escalations.push(escalation);
        }

        Ok(CycleReport {
            drift: drift.clone(),
            cycle_id: Some(cycle_id),
            lineage_id: Some(record.id.clone()),
            verdict: Some(outcome.verdict),
            attempts: outcome.total_attempts,
            escalated: outcome.escalated(),
            execution_success: outcome.execution_success(),
            error: None,
        })
    }

    // --- Dampening ---

    fn is_dampened(&self, entity_id: &str, now: DateTime<Utc>) -> bool {
        let Some(state) = self.dampening.get(entity_id) else {
            return false;
        };
        if state.circuit_broken {
            return true;
        }
        matches!(state.cooldown_until, Some(until) if now < until)
    }

    fn update_dampening(&mut self, entity_id: &EntityId, failed: bool, now: DateTime<Utc>) {
        let state = self
            .dampening
            .entry(entity_id.clone())
            .or_insert_with(|| DampeningState {
                entity_id: entity_id.clone(),
                last_intervention_at: now,
                consecutive_failures: 0,
                cooldown_until: None,
                circuit_broken: false,
            });

        state.last_intervention_at = now;
        state.cooldown_until = Some(now + chrono::Duration::seconds(self.config.cooldown_seconds as i64));

        if failed {
            state.consecutive_failures += 1;
            if state.consecutive_failures >= self.config.circuit_breaker_threshold {
                state.circuit_broken = true;
                log::warn!("[Reconciler] Circuit breaker opened for {}", entity_id);
            }
        } else {
            state.consecutive_failures = 0;
        }
    }

    /// Drive the heartbeat loop until the stop signal fires. An in-flight
    /// tick runs to completion; the signal is honored between ticks.
    pub async fn run(handle: Arc<Mutex<Reconciler>>, mut stop: watch::Receiver<bool>) {
        let running = {
            let guard = handle.lock().expect("reconciler lock poisoned");
            guard.running.clone()
        };
        running.store(true, Ordering::SeqCst);
        log::info!("[Reconciler] Heartbeat loop started");

        loop {
            let heartbeat = {
                let mut guard = handle.lock().expect("reconciler lock poisoned");
                guard.reconcile_once(Utc::now());
                Duration::from_secs(guard.config.heartbeat_interval_seconds.max(1))
            };

            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(heartbeat) => {}
            }
        }

        running.store(false, Ordering::SeqCst);
        log::info!("[Reconciler] Heartbeat loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::RuleLadderGenerator;
    use crate::types::Constraint;
    use serde_json::json;

    fn build_reconciler(config: ReconcilerConfig) -> Reconciler {
        let world = Arc::new(Mutex::new(WorldModelStore::new()));
        Reconciler::new(
            world,
            Arc::new(GovernanceKernel::new()),
            Arc::new(ExecutionDispatcher::new()),
            Arc::new(LineageLedger::in_memory().unwrap()),
            Arc::new(Mutex::new(LearningEngine::new())),
            Arc::new(RuleLadderGenerator::new()),
            config,
        )
    }

    fn sla_intent() -> Intent {
        Intent {
            id: "lead_response_sla".to_string(),
            objective: "Respond to high-value leads within 10 minutes".to_string(),
            priority: 80,
            hard_constraints: vec![Constraint::hard(
                "gdpr_consent_required",
                "Must verify GDPR consent before any direct outreach to EU leads",
            )],
            soft_constraints: vec![],
            cost_ceiling: None,
            created_by: "operator".to_string(),
            created_at: Utc::now(),
            active: true,
        }
    }

    fn waiting_lead(id: &str, minutes_waiting: i64, consent: bool) -> EntityState {
        let created = Utc::now() - chrono::Duration::minutes(minutes_waiting);
        let mut properties = HashMap::new();
        properties.insert("geo".to_string(), json!("EU"));
        properties.insert("gdpr_consent".to_string(), json!(consent));
        properties.insert("local_hour".to_string(), json!(14));
        properties.insert("created_at".to_string(), json!(created.to_rfc3339()));
        EntityState {
            entity_type: "lead".to_string(),
            entity_id: id.to_string(),
            properties,
            last_updated: Utc::now(),
            source: "crm_webhook".to_string(),
            confidence: 1.0,
            obligations: vec!["lead_response_sla".to_string()],
        }
    }

    #[test]
    fn sla_rule_detects_waiting_entity() {
        let rule = SlaDriftRule::new();
        let intents = vec![sla_intent()];
        let drift = rule.check(&waiting_lead("lead_4821", 8, false), &intents, Utc::now());
        let drift = drift.expect("8 of 10 minutes consumed should drift");
        assert!(drift.severity >= 9);
        assert!(drift.sla_remaining_minutes.unwrap() <= 2.0 + 1e-6);
    }

    #[test]
    fn sla_rule_ignores_fresh_and_contacted_entities() {
        let rule = SlaDriftRule::new();
        let intents = vec![sla_intent()];
        assert!(rule
            .check(&waiting_lead("lead_1", 2, false), &intents, Utc::now())
            .is_none());

        let mut contacted = waiting_lead("lead_2", 9, false);
        contacted
            .properties
            .insert("last_contacted".to_string(), json!("2026-02-20T10:00:00Z"));
        assert!(rule.check(&contacted, &intents, Utc::now()).is_none());
    }

    #[test]
    fn sla_rule_reads_hour_windows() {
        let rule = SlaDriftRule::new();
        assert_eq!(rule.extract_sla_minutes("respond within 2 hours"), Some(120.0));
        assert_eq!(rule.extract_sla_minutes("respond within 10 minutes"), Some(10.0));
        assert_eq!(rule.extract_sla_minutes("respond eventually"), None);
    }

    #[test]
    fn tick_runs_cycle_and_appends_lineage() {
        let mut reconciler = build_reconciler(ReconcilerConfig {
            cooldown_seconds: 0,
            ..Default::default()
        });
        reconciler.register_intent(sla_intent());
        reconciler
            .world
            .lock()
            .unwrap()
            .upsert(waiting_lead("lead_4821", 8, false));

        let results = reconciler.reconcile_once(Utc::now());
        assert_eq!(results.len(), 1);
        let report = &results[0];
        assert_eq!(report.verdict, Some(LoopVerdict::Approved));
        assert_eq!(report.attempts, 3);
        assert!(report.execution_success);
        assert_eq!(reconciler.ledger.count().unwrap(), 1);

        // The approved handoff marked the entity contacted, so the next tick
        // sees no drift.
        let again = reconciler.reconcile_once(Utc::now());
        assert!(again.is_empty());
    }

    #[test]
    fn cooldown_limits_cycles_per_entity() {
        // Budget of 2 keeps every cycle short of the approvable rung, so the
        // lead stays uncontacted and the drift persists across ticks.
        let mut reconciler = build_reconciler(ReconcilerConfig {
            max_retry_budget: 2,
            ..Default::default()
        });
        let mut lead = waiting_lead("lead_4821", 8, false);
        lead.properties.insert("local_hour".to_string(), json!(23));
        let mut intent = sla_intent();
        intent.hard_constraints.push(Constraint::hard(
            "no_contact_outside_hours",
            "No automated outreach between 10PM-7AM lead local time",
        ));
        reconciler.register_intent(intent);
        reconciler.world.lock().unwrap().upsert(lead);

        let now = Utc::now();
        let first = reconciler.reconcile_once(now);
        assert_eq!(first.len(), 1);

        // Within the cooldown window the entity is skipped entirely.
        let second = reconciler.reconcile_once(now + chrono::Duration::seconds(10));
        assert!(second.is_empty());

        // After the window it is eligible again.
        let third = reconciler.reconcile_once(now + chrono::Duration::seconds(301));
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn circuit_breaker_opens_and_clears_on_human_resolution() {
        let mut reconciler = build_reconciler(ReconcilerConfig {
            cooldown_seconds: 0,
            circuit_breaker_threshold: 2,
            max_retry_budget: 2,
            ..Default::default()
        });
        let mut intent = sla_intent();
        intent.hard_constraints.push(Constraint::hard(
            "no_contact_outside_hours",
            "No automated outreach between 10PM-7AM lead local time",
        ));
        reconciler.register_intent(intent);
        let mut lead = waiting_lead("lead_4821", 8, false);
        lead.properties.insert("local_hour".to_string(), json!(23));
        reconciler.world.lock().unwrap().upsert(lead);

        let now = Utc::now();
        // With budget 2 the ladder never reaches the approvable human
        // handoff, so every cycle ends in escalation.
        reconciler.reconcile_once(now);
        reconciler.reconcile_once(now + chrono::Duration::seconds(1));

        let state = reconciler.dampening_state("lead_4821").unwrap();
        assert!(state.circuit_broken);
        assert_eq!(state.consecutive_failures, 2);

        // Circuit broken: entity skipped even outside the cooldown window.
        let skipped = reconciler.reconcile_once(now + chrono::Duration::seconds(400));
        assert!(skipped.is_empty());

        // Only human resolution clears the breaker.
        let pending = reconciler.pending_escalations();
        assert_eq!(pending.len(), 2);
        reconciler
            .resolve_escalation(&pending[0].id, "consent captured by rep", "oncall", Utc::now())
            .unwrap();
        let state = reconciler.dampening_state("lead_4821").unwrap();
        assert!(!state.circuit_broken);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn resolving_unknown_escalation_fails() {
        let mut reconciler = build_reconciler(ReconcilerConfig::default());
        let err = reconciler
            .resolve_escalation("esc_missing", "n/a", "oncall", Utc::now())
            .unwrap_err();
        assert!(matches!(err, KernelError::EscalationNotFound(_)));
    }

    #[test]
    fn missing_intent_is_reported_not_fatal() {
        let mut reconciler = build_reconciler(ReconcilerConfig {
            cooldown_seconds: 0,
            ..Default::default()
        });
        let drift = DriftEvent {
            entity_id: "lead_1".to_string(),
            intent_id: "ghost_intent".to_string(),
            description: "drift".to_string(),
            severity: 5,
            sla_remaining_minutes: None,
            detected_at: Utc::now(),
        };
        let report = reconciler.handle_drift(&drift, &[], Utc::now()).unwrap();
        assert_eq!(report.error.as_deref(), Some("Intent not found"));
    }

    #[tokio::test]
    async fn heartbeat_loop_honors_stop_signal() {
        let reconciler = Arc::new(Mutex::new(build_reconciler(ReconcilerConfig {
            heartbeat_interval_seconds: 1,
            ..Default::default()
        })));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(Reconciler::run(reconciler.clone(), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(reconciler.lock().unwrap().is_running());

        tx.send(true).unwrap();
        task.await.unwrap();
        assert!(!reconciler.lock().unwrap().is_running());
    }
}
