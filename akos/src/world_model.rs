//! World Model Store: the structured representation of operational reality.
//!
//! Updated by execution outcomes and external ingest; queried by the
//! reconciler and the strategy layer. All operations are single-entity
//! atomic; no ordering is guaranteed across keys. The store is authoritative
//! within one process.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;

use crate::types::{DriftEvent, EntityId, EntityState, IntentId, WorldModel};

/// In-memory entity store plus a journal of detected drift.
#[derive(Debug)]
pub struct WorldModelStore {
    model: WorldModel,
}

impl WorldModelStore {
    pub fn new() -> Self {
        Self {
            model: WorldModel {
                entities: HashMap::new(),
                last_reconciled: Utc::now(),
                drift_events: Vec::new(),
            },
        }
    }

    /// The current world model.
    pub fn model(&self) -> &WorldModel {
        &self.model
    }

    /// Insert or replace an entity.
    pub fn upsert(&mut self, entity: EntityState) {
        self.model.entities.insert(entity.entity_id.clone(), entity);
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityState> {
        self.model.entities.get(entity_id)
    }

    /// Remove an entity. Returns whether it existed.
    pub fn remove(&mut self, entity_id: &str) -> bool {
        self.model.entities.remove(entity_id).is_some()
    }

    pub fn by_type(&self, entity_type: &str) -> Vec<&EntityState> {
        self.model
            .entities
            .values()
            .filter(|e| e.entity_type == entity_type)
            .collect()
    }

    /// All entities obligated by a specific intent.
    pub fn by_obligation(&self, intent_id: &IntentId) -> Vec<&EntityState> {
        self.model
            .entities
            .values()
            .filter(|e| e.obligations.contains(intent_id))
            .collect()
    }

    pub fn record_drift(&mut self, event: DriftEvent) {
        self.model.drift_events.push(event);
    }

    pub fn recent_drift_events(&self, limit: usize) -> &[DriftEvent] {
        let len = self.model.drift_events.len();
        &self.model.drift_events[len.saturating_sub(limit)..]
    }

    pub fn mark_reconciled(&mut self) {
        self.model.last_reconciled = Utc::now();
    }

    /// Serializable snapshot of the current world state.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(&self.model).unwrap_or(Value::Null)
    }

    /// Apply execution-result updates to an entity's properties.
    pub fn apply_execution(&mut self, entity_id: &EntityId, updates: HashMap<String, Value>) {
        if let Some(entity) = self.model.entities.get_mut(entity_id) {
            entity.properties.extend(updates);
            entity.last_updated = Utc::now();
        }
    }

    /// Mutable access for the executor's state-change application.
    pub(crate) fn entity_mut(&mut self, entity_id: &str) -> Option<&mut EntityState> {
        self.model.entities.get_mut(entity_id)
    }
}

impl Default for WorldModelStore {
    fn default() -> Self {
        Self::new()
    }
}
