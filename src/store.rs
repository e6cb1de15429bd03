use itertools::Itertools;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::error::PersistenceError;
use crate::result::{ResultId, TestResult};

/// Persistence collaborator for finished results.
pub trait ResultStore {
    fn save(&mut self, result: &TestResult) -> Result<ResultId, PersistenceError>;
    fn load_by_id(&self, id: ResultId) -> Result<TestResult, PersistenceError>;
    /// Most recent results first.
    fn recent(&self, limit: usize) -> Result<Vec<TestResult>, PersistenceError>;
}

/// Results stored as JSON documents in SQLite, one row per session.
#[derive(Debug)]
pub struct SqliteResultStore {
    conn: Connection,
}

impl SqliteResultStore {
    /// Open the store at the default state location.
    pub fn new() -> Result<Self, PersistenceError> {
        let db_path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("proctor_results.db"));
        Self::open(db_path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS test_results (
                id TEXT PRIMARY KEY,
                module TEXT NOT NULL,
                score INTEGER NOT NULL,
                ended_at TEXT NOT NULL,
                record TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_test_results_module ON test_results(module)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_test_results_ended_at ON test_results(ended_at)",
            [],
        )?;

        Ok(Self { conn })
    }

    /// Decode a stored row. Unparseable documents degrade to an empty record.
    fn decode(id: &str, record: &str) -> TestResult {
        let fallback = id.parse().unwrap_or_else(|_| ResultId::new());
        let value = serde_json::from_str::<Value>(record).unwrap_or_else(|e| {
            tracing::warn!("result {id} has an unreadable record: {e}");
            Value::Null
        });
        TestResult::from_stored_json(&value, fallback)
    }

    pub fn count(&self) -> Result<usize, PersistenceError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM test_results", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl ResultStore for SqliteResultStore {
    fn save(&mut self, result: &TestResult) -> Result<ResultId, PersistenceError> {
        let record = serde_json::to_string(result)?;
        self.conn.execute(
            r#"
            INSERT INTO test_results (id, module, score, ended_at, record)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                result.result_id.to_string(),
                result.module_or_subject,
                result.score_percent,
                result.timing_details.ended_at.to_rfc3339(),
                record,
            ],
        )?;
        tracing::info!(
            "saved result {} ({} {}%)",
            result.result_id,
            result.module_or_subject,
            result.score_percent
        );
        Ok(result.result_id)
    }

    fn load_by_id(&self, id: ResultId) -> Result<TestResult, PersistenceError> {
        let record: Option<String> = self
            .conn
            .query_row(
                "SELECT record FROM test_results WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match record {
            Some(record) => Ok(Self::decode(&id.to_string(), &record)),
            None => Err(PersistenceError::NotFound(id)),
        }
    }

    fn recent(&self, limit: usize) -> Result<Vec<TestResult>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, record
            FROM test_results
            ORDER BY ended_at DESC, created_at DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, record) = row?;
            results.push(Self::decode(&id, &record));
        }
        Ok(results)
    }
}

/// Per-module aggregate over stored results, using display scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSummary {
    pub module: String,
    pub attempts: usize,
    pub best_score: u32,
    pub average_score: f64,
    pub passes: usize,
}

pub fn summarize(results: &[TestResult]) -> Vec<ModuleSummary> {
    results
        .iter()
        .into_group_map_by(|r| r.module_or_subject.clone())
        .into_iter()
        .map(|(module, group)| {
            let scores: Vec<u32> = group.iter().map(|r| r.display_score()).collect();
            ModuleSummary {
                module,
                attempts: group.len(),
                best_score: scores.iter().copied().max().unwrap_or(0),
                average_score: scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64,
                passes: group.iter().filter(|r| r.display_passed()).count(),
            }
        })
        .sorted_by(|a, b| a.module.cmp(&b.module))
        .collect()
}
