// 🗄️ Run Store - SQLite persistence for alignment runs
//
// Tables:
//   runs             one row per run (unique run_id)
//   correspondences  one row per (run_id, code)
//   events           audit trail: run lifecycle + per-entry failures
//
// Recording the same run twice is a no-op (unique keys, constraint
// violations counted as duplicates).

use crate::alignment::{AlignmentRun, CategoryRef, Correspondence, CorrespondenceSet, EntryRef, MatchType};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Event for audit trail ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// A stored run, without its correspondences
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub method: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fingerprint: String,
    pub processed: usize,
    pub matched: usize,
    pub failed: usize,
    pub mean_confidence: f64,
}

/// Open (or create) a store at `path`
pub fn open_store<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path.as_ref())
        .with_context(|| format!("Failed to open run store: {:?}", path.as_ref()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Runs Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            method TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            processed INTEGER NOT NULL,
            matched INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            mean_confidence REAL NOT NULL,
            distribution TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Correspondences Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS correspondences (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES runs(run_id),
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            definition TEXT NOT NULL,
            uri TEXT NOT NULL,
            category_id TEXT NOT NULL,
            category_name_de TEXT NOT NULL,
            category_path_de TEXT NOT NULL,
            match_type TEXT NOT NULL,
            confidence REAL NOT NULL,
            rationale TEXT NOT NULL,
            method TEXT NOT NULL,
            proposed_match_type TEXT,
            position INTEGER NOT NULL,
            UNIQUE(run_id, code)
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_corr_run ON correspondences(run_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_corr_category ON correspondences(category_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Record a run with its correspondences and failure events.
/// Returns the number of correspondences inserted (0 when the run is already stored).
pub fn insert_run(conn: &Connection, run: &AlignmentRun) -> Result<usize> {
    let distribution = serde_json::to_string(&run.stats.distribution)?;

    let result = conn.execute(
        "INSERT INTO runs (
            run_id, method, started_at, finished_at, fingerprint,
            processed, matched, failed, mean_confidence, distribution
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            run.run_id,
            run.method,
            run.started_at.to_rfc3339(),
            run.finished_at.to_rfc3339(),
            run.correspondences.fingerprint(),
            run.stats.processed as i64,
            run.stats.matched as i64,
            run.stats.failed as i64,
            run.stats.mean_confidence,
            distribution,
        ],
    );

    match result {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            info!(run_id = %run.run_id, "run already stored, skipping");
            return Ok(0);
        }
        Err(e) => return Err(e).context("Failed to insert run"),
    }

    let mut inserted = 0;
    let mut duplicates = 0;
    for (position, c) in run.correspondences.iter().enumerate() {
        let result = conn.execute(
            "INSERT INTO correspondences (
                run_id, code, name, definition, uri,
                category_id, category_name_de, category_path_de,
                match_type, confidence, rationale, method, proposed_match_type, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                run.run_id,
                c.entry().code,
                c.entry().name,
                c.entry().definition,
                c.entry().uri,
                c.category().id,
                c.category().native_label,
                c.category().native_path,
                c.match_type().as_str(),
                c.confidence(),
                c.rationale(),
                c.method(),
                c.proposed_band().map(|b| b.as_str()),
                position as i64,
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(e) if is_constraint_violation(&e) => duplicates += 1,
            Err(e) => return Err(e).context("Failed to insert correspondence"),
        }
    }

    for failure in &run.failures {
        let event = Event::new(
            "match_failed",
            "run",
            &run.run_id,
            serde_json::json!({ "code": failure.code, "reason": failure.reason }),
            &run.method,
        );
        insert_event(conn, &event)?;
    }

    let event = Event::new(
        "run_recorded",
        "run",
        &run.run_id,
        serde_json::json!({
            "matched": run.stats.matched,
            "failed": run.stats.failed,
            "duplicates": duplicates,
        }),
        &run.method,
    );
    insert_event(conn, &event)?;

    debug!(run_id = %run.run_id, inserted, duplicates, "run stored");
    Ok(inserted)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

fn parse_time(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(conn: &Connection, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_time(1, row.get(1)?)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// All stored runs, most recent first
pub fn get_runs(conn: &Connection) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, method, started_at, finished_at, fingerprint,
                processed, matched, failed, mean_confidence
         FROM runs
         ORDER BY started_at DESC, id DESC",
    )?;

    let runs = stmt
        .query_map([], |row| {
            Ok(RunRecord {
                run_id: row.get(0)?,
                method: row.get(1)?,
                started_at: parse_time(2, row.get(2)?)?,
                finished_at: parse_time(3, row.get(3)?)?,
                fingerprint: row.get(4)?,
                processed: row.get::<_, i64>(5)? as usize,
                matched: row.get::<_, i64>(6)? as usize,
                failed: row.get::<_, i64>(7)? as usize,
                mean_confidence: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

/// Correspondences of one run, in their original order
pub fn get_correspondences(conn: &Connection, run_id: &str) -> Result<CorrespondenceSet> {
    let mut stmt = conn.prepare(
        "SELECT code, name, definition, uri,
                category_id, category_name_de, category_path_de,
                confidence, rationale, method, proposed_match_type
         FROM correspondences
         WHERE run_id = ?1
         ORDER BY position ASC",
    )?;

    let rows = stmt
        .query_map(params![run_id], |row| {
            let entry = EntryRef {
                code: row.get(0)?,
                name: row.get(1)?,
                definition: row.get(2)?,
                uri: row.get(3)?,
            };
            let category = CategoryRef {
                id: row.get(4)?,
                native_label: row.get(5)?,
                native_path: row.get(6)?,
            };
            let confidence: f64 = row.get(7)?;
            let rationale: String = row.get(8)?;
            let method: String = row.get(9)?;
            let proposed: Option<String> = row.get(10)?;
            Ok((entry, category, confidence, rationale, method, proposed))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(entry, category, confidence, rationale, method, proposed)| {
            let code = entry.code.clone();
            let proposed = proposed.as_deref().and_then(MatchType::from_skos_label);
            Correspondence::restore(entry, category, confidence, rationale, method, proposed)
                .with_context(|| format!("Corrupt correspondence for {} in run {}", code, run_id))
        })
        .collect()
}

pub fn count_correspondences(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM correspondences", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::AlignmentEngine;
    use crate::error::MatchError;
    use crate::matcher::StubMatcher;
    use crate::retrieval::LexicalRetriever;
    use crate::source::ExternalEntry;
    use crate::taxonomy::CategoryTree;

    fn sample_run() -> AlignmentRun {
        let mut tree = CategoryTree::new();
        tree.insert("A", "Alpha", None).unwrap();
        tree.insert("A.1", "Alpha Eins", Some("A")).unwrap();

        let entries: Vec<ExternalEntry> = ["C1", "C2", "C3"]
            .iter()
            .map(|code| ExternalEntry::new(code, "Alpha thing", "", "https://example.org/etim", None).unwrap())
            .collect();
        let stub = StubMatcher::table(&[("C1", "A.1", 0.95), ("C2", "Z.9", 0.9), ("C3", "A", 0.3)])
            .proposing(MatchType::Close);
        let result = AlignmentEngine::new(&tree, Box::new(LexicalRetriever::new()), Box::new(stub)).run(&entries);
        result
    }

    #[test]
    fn test_run_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let run = sample_run();

        assert_eq!(insert_run(&conn, &run).unwrap(), 2);

        let loaded = get_correspondences(&conn, &run.run_id).unwrap();
        assert_eq!(loaded, run.correspondences);

        let runs = get_runs(&conn).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].fingerprint, run.correspondences.fingerprint());
        assert_eq!(runs[0].failed, 1);
    }

    #[test]
    fn test_idempotency_insert_twice() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let run = sample_run();

        assert_eq!(insert_run(&conn, &run).unwrap(), 2);
        assert_eq!(insert_run(&conn, &run).unwrap(), 0);
        assert_eq!(count_correspondences(&conn).unwrap(), 2);
        assert_eq!(get_events_for_entity(&conn, "run", &run.run_id).unwrap().len(), 2);
    }

    #[test]
    fn test_failure_events() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let run = sample_run();
        insert_run(&conn, &run).unwrap();

        let events = get_events_for_entity(&conn, "run", &run.run_id).unwrap();
        assert_eq!(events[0].event_type, "match_failed");
        assert_eq!(events[0].data["code"], "C2");
        assert_eq!(
            events[0].data["reason"],
            MatchError::UnknownCandidate { selected: "Z.9".to_string() }.to_string()
        );
        assert_eq!(events[1].event_type, "run_recorded");
        assert_eq!(events[1].actor, "stub");
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.db");
        let run = sample_run();

        {
            let conn = open_store(&path).unwrap();
            insert_run(&conn, &run).unwrap();
        }

        let conn = open_store(&path).unwrap();
        assert_eq!(get_runs(&conn).unwrap()[0].run_id, run.run_id);
    }
}
