//! Decision Lineage Ledger: append-only, cryptographically chained audit
//! record. One record per reconciliation cycle.
//!
//! Behavioral contract:
//! - Append-only. No record is ever modified or deleted.
//! - Each record is signed and chained to its predecessor's signature
//!   (tamper-evident ledger).
//! - Every record answers: what intent? what drift? what was proposed?
//!   what did governance decide, and why? what executed?
//! - Queryable by cycle, intent, entity, escalation status, and recency.
//!
//! Storage is a single SQLite table. `record_json` holds the canonical
//! serialized record and is the source of truth; the scalar columns are
//! projections for query paths. Appends serialize on the connection lock so
//! the hash chain observes a total order.

pub mod canonical;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{KernelError, KernelResult};
use crate::types::LineageRecord;

pub use canonical::{canonical_json, canonical_unsigned_json, compute_signature};

/// Newtype wrapping `Connection` in a `Mutex` so the ledger is both `Send`
/// and `Sync` (`rusqlite::Connection` is `Send` but not `Sync`).
struct DbConn(Mutex<Connection>);

impl std::fmt::Debug for DbConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DbConn(<sqlite>)")
    }
}

/// DDL for the `lineage` table and its indices. The scalar columns mirror
/// the fields used by query paths; everything else lives in `record_json`.
const CREATE_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS lineage (
    id                          TEXT PRIMARY KEY,
    cycle_id                    TEXT NOT NULL,
    intent_id                   TEXT NOT NULL,
    drift_detected              TEXT NOT NULL,
    drift_severity              INTEGER NOT NULL,
    total_attempts              INTEGER NOT NULL,
    escalated_to_human          INTEGER NOT NULL DEFAULT 0,
    execution_success           INTEGER NOT NULL DEFAULT 0,
    final_approved_proposal     TEXT,
    resolved_at                 TEXT,
    resolution_duration_seconds REAL,
    priority_override_applied   INTEGER NOT NULL DEFAULT 0,
    deprioritized_intent        TEXT,
    signature                   TEXT NOT NULL,
    prior_record_hash           TEXT,
    record_json                 TEXT NOT NULL,
    created_at                  TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_lineage_cycle_id  ON lineage(cycle_id);
CREATE INDEX IF NOT EXISTS idx_lineage_intent_id ON lineage(intent_id);
CREATE INDEX IF NOT EXISTS idx_lineage_escalated ON lineage(escalated_to_human);
";

/// Append-only decision lineage store backed by SQLite.
#[derive(Debug)]
pub struct LineageLedger {
    conn: DbConn,
}

impl LineageLedger {
    /// Pure in-memory ledger (the default; nothing survives the process).
    pub fn in_memory() -> KernelResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    /// Open (or create) a file-backed ledger at `path`.
    pub fn open(path: &Path) -> KernelResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KernelError::Ledger(format!("failed to create ledger dir: {}", e)))?;
        }
        let conn = Connection::open(path)?;
        // WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        log::info!("[LineageLedger] Opened ledger at {}", path.display());
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> KernelResult<Self> {
        conn.execute_batch(CREATE_SCHEMA_SQL)?;
        Ok(Self {
            conn: DbConn(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> KernelResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .0
            .lock()
            .map_err(|e| KernelError::Ledger(format!("failed to acquire ledger lock: {}", e)))
    }

    /// Append a record: chain it to the latest signature, sign it, persist
    /// it. The connection lock is held for the whole operation so concurrent
    /// appends keep a total order.
    pub fn append(&self, mut record: LineageRecord) -> KernelResult<LineageRecord> {
        let conn = self.lock()?;

        record.prior_record_hash = latest_signature(&conn)?;
        record.signature = compute_signature(&record)?;
        let record_json = canonical_json(&record)?;

        conn.execute(
            "INSERT INTO lineage (
                id, cycle_id, intent_id, drift_detected, drift_severity,
                total_attempts, escalated_to_human, execution_success,
                final_approved_proposal, resolved_at, resolution_duration_seconds,
                priority_override_applied, deprioritized_intent,
                signature, prior_record_hash, record_json
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                record.id,
                record.cycle_id,
                record.intent.id,
                record.drift_detected,
                record.drift_severity as i64,
                record.total_attempts as i64,
                record.escalated_to_human as i64,
                record.execution_success as i64,
                record.final_approved_proposal.as_deref(),
                record.resolved_at.map(|t| t.to_rfc3339()),
                record.resolution_duration_seconds,
                record.priority_override_applied as i64,
                record.deprioritized_intent.as_deref(),
                record.signature,
                record.prior_record_hash.as_deref(),
                record_json,
            ],
        )?;

        log::debug!(
            "[LineageLedger] Appended record {} (cycle {})",
            record.id,
            record.cycle_id
        );
        Ok(record)
    }

    pub fn get_by_id(&self, record_id: &str) -> KernelResult<Option<LineageRecord>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM lineage WHERE id = ?1",
                [record_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(KernelError::from))
            .transpose()
    }

    /// All records for a given reconciliation cycle.
    pub fn get_by_cycle(&self, cycle_id: &str) -> KernelResult<Vec<LineageRecord>> {
        self.select_records(
            "SELECT record_json FROM lineage WHERE cycle_id = ?1 ORDER BY rowid",
            [cycle_id],
        )
    }

    /// All reconciliation cycles for a given intent.
    pub fn query_by_intent(&self, intent_id: &str) -> KernelResult<Vec<LineageRecord>> {
        self.select_records(
            "SELECT record_json FROM lineage WHERE intent_id = ?1 ORDER BY rowid",
            [intent_id],
        )
    }

    /// All decisions affecting a specific entity, found by reference in the
    /// serialized record.
    pub fn query_by_entity(&self, entity_id: &str) -> KernelResult<Vec<LineageRecord>> {
        self.select_records(
            "SELECT record_json FROM lineage WHERE record_json LIKE ?1 ORDER BY rowid",
            [format!("%{}%", entity_id)],
        )
    }

    /// All cycles that required human escalation, optionally since a cutoff.
    pub fn query_escalations(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> KernelResult<Vec<LineageRecord>> {
        match since {
            Some(cutoff) => self.select_records(
                "SELECT record_json FROM lineage WHERE escalated_to_human = 1 \
                 AND created_at >= ?1 ORDER BY rowid",
                [cutoff.to_rfc3339()],
            ),
            None => self.select_records(
                "SELECT record_json FROM lineage WHERE escalated_to_human = 1 ORDER BY rowid",
                [],
            ),
        }
    }

    /// The most recent records, in chronological order.
    pub fn query_recent(&self, limit: usize) -> KernelResult<Vec<LineageRecord>> {
        let mut records = self.select_records(
            "SELECT record_json FROM lineage ORDER BY rowid DESC LIMIT ?1",
            [limit as i64],
        )?;
        records.reverse();
        Ok(records)
    }

    pub fn count(&self) -> KernelResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM lineage", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Walk the whole chain: recompute every signature from `record_json`
    /// and check every link against its predecessor. Returns false on any
    /// mismatch, including records that no longer parse.
    pub fn verify_chain_integrity(&self) -> KernelResult<bool> {
        let rows: Vec<(String, String, Option<String>)> = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT record_json, signature, prior_record_hash FROM lineage ORDER BY rowid",
            )?;
            let mapped = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, Option<String>>(2)?))
            })?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };

        let mut prior_signature: Option<String> = None;
        for (record_json, stored_signature, _) in rows {
            let record: LineageRecord = match serde_json::from_str(&record_json) {
                Ok(r) => r,
                Err(_) => return Ok(false),
            };

            let expected = compute_signature(&record)?;
            if record.signature != expected || stored_signature != expected {
                return Ok(false);
            }

            if record.prior_record_hash != prior_signature {
                return Ok(false);
            }
            prior_signature = Some(stored_signature);
        }
        Ok(true)
    }

    /// [`verify_chain_integrity`] that fails loudly, for startup checks.
    pub fn ensure_chain_integrity(&self) -> KernelResult<()> {
        if self.verify_chain_integrity()? {
            Ok(())
        } else {
            Err(KernelError::IntegrityFailure(
                "broken signature or chain link in lineage ledger".to_string(),
            ))
        }
    }

    fn select_records<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> KernelResult<Vec<LineageRecord>> {
        let jsons: Vec<String> = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(sql)?;
            let mapped = stmt.query_map(params, |row| row.get::<_, String>(0))?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };
        jsons
            .into_iter()
            .map(|j| serde_json::from_str(&j).map_err(KernelError::from))
            .collect()
    }
}

/// Signature of the most recent record, if any.
fn latest_signature(conn: &Connection) -> KernelResult<Option<String>> {
    conn.query_row(
        "SELECT signature FROM lineage ORDER BY rowid DESC LIMIT 1",
        [],
        |row| row.get(0),
    )
    .optional()
    .map_err(KernelError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{fresh_id, Intent};
    use chrono::Utc;

    fn record(intent_id: &str, escalated: bool) -> LineageRecord {
        LineageRecord {
            id: fresh_id("lin"),
            cycle_id: fresh_id("cycle"),
            intent: Intent {
                id: intent_id.to_string(),
                objective: "Respond to leads within 10 minutes".to_string(),
                priority: 80,
                hard_constraints: vec![],
                soft_constraints: vec![],
                cost_ceiling: None,
                created_by: "operator".to_string(),
                created_at: Utc::now(),
                active: true,
            },
            drift_detected: "entity lead_4821 waiting".to_string(),
            drift_severity: 9,
            world_state_snapshot: serde_json::json!({"entities": {}}),
            proposals: vec![],
            governance_decisions: vec![],
            final_approved_proposal: None,
            execution_result: None,
            execution_success: !escalated,
            total_attempts: 3,
            escalated_to_human: escalated,
            human_authorization_token: None,
            resolved_at: Some(Utc::now()),
            resolution_duration_seconds: Some(1.2),
            conflicting_intents: None,
            priority_override_applied: false,
            deprioritized_intent: None,
            deprioritization_rationale: None,
            uncertainty: None,
            artifact_provenance: None,
            signature: String::new(),
            prior_record_hash: None,
        }
    }

    #[test]
    fn append_signs_and_chains() {
        let ledger = LineageLedger::in_memory().unwrap();
        let first = ledger.append(record("intent_a", false)).unwrap();
        assert!(first.prior_record_hash.is_none());
        assert_eq!(first.signature.len(), 64);

        let second = ledger.append(record("intent_a", false)).unwrap();
        assert_eq!(second.prior_record_hash.as_deref(), Some(first.signature.as_str()));
        assert!(ledger.verify_chain_integrity().unwrap());
        assert_eq!(ledger.count().unwrap(), 2);
    }

    #[test]
    fn queries_project_correctly() {
        let ledger = LineageLedger::in_memory().unwrap();
        let a = ledger.append(record("intent_a", false)).unwrap();
        let _b = ledger.append(record("intent_b", true)).unwrap();

        assert_eq!(ledger.query_by_intent("intent_a").unwrap().len(), 1);
        assert_eq!(ledger.query_escalations(None).unwrap().len(), 1);
        assert_eq!(ledger.get_by_cycle(&a.cycle_id).unwrap().len(), 1);
        assert_eq!(ledger.query_by_entity("lead_4821").unwrap().len(), 2);
        assert_eq!(
            ledger.get_by_id(&a.id).unwrap().unwrap().cycle_id,
            a.cycle_id
        );
        assert!(ledger.get_by_id("lin_missing").unwrap().is_none());
    }

    #[test]
    fn recent_is_chronological() {
        let ledger = LineageLedger::in_memory().unwrap();
        let a = ledger.append(record("intent_a", false)).unwrap();
        let b = ledger.append(record("intent_a", false)).unwrap();
        let c = ledger.append(record("intent_a", false)).unwrap();

        let recent = ledger.query_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, b.id);
        assert_eq!(recent[1].id, c.id);
        assert_ne!(recent[0].id, a.id);
    }

    #[test]
    fn tampering_with_stored_json_breaks_verification() {
        let ledger = LineageLedger::in_memory().unwrap();
        let appended = ledger.append(record("intent_a", false)).unwrap();
        assert!(ledger.verify_chain_integrity().unwrap());

        {
            let conn = ledger.lock().unwrap();
            conn.execute(
                "UPDATE lineage SET record_json = replace(record_json, '\"drift_severity\":9', '\"drift_severity\":2') WHERE id = ?1",
                [appended.id.as_str()],
            )
            .unwrap();
        }
        assert!(!ledger.verify_chain_integrity().unwrap());
        assert!(ledger.ensure_chain_integrity().is_err());
    }

    #[test]
    fn empty_ledger_verifies() {
        let ledger = LineageLedger::in_memory().unwrap();
        assert!(ledger.verify_chain_integrity().unwrap());
        assert_eq!(ledger.count().unwrap(), 0);
    }
}
