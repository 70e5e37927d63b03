//! Fix Ledger - SQLite-backed durable record of analyses and feedback
//!
//! Stores every analysis result, the feedback users send after running a
//! fix script, and per-issue counters (times detected, times fixed) for
//! reporting.
//!
//! Schema:
//! - analyses:    fix_id, created_at, issues_found, issue_ids, result_json
//! - feedback:    fix_id, success, remaining_issues, recorded_at
//! - issue_stats: issue_id, times_detected, times_fixed
//!
//! Ledger writes are best effort from the doctor's point of view; callers log
//! failures instead of failing a diagnosis.

use crate::analysis::{AnalysisResult, Feedback};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Default ledger database path
pub const LEDGER_DB_PATH: &str = "/var/lib/clawmedic/ledger.db";

/// Per-issue counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueStats {
    pub issue_id: String,
    pub times_detected: u64,
    pub times_fixed: u64,
}

/// Durable persistence boundary
pub trait FixLedger: Send + Sync {
    /// Record a new analysis; re-recording the same fix id is a no-op
    fn record_analysis(&self, result: &AnalysisResult) -> Result<()>;

    /// Record feedback for a fix. Returns `false` when the fix id is unknown.
    fn record_feedback(&self, fix_id: &str, feedback: &Feedback) -> Result<bool>;

    fn find_analysis(&self, fix_id: &str) -> Result<Option<AnalysisResult>>;

    /// Counters for every issue ever detected, most frequent first
    fn issue_stats(&self) -> Result<Vec<IssueStats>>;
}

/// SQLite ledger
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open or create the ledger at `path`
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path_ref)
            .with_context(|| format!("Failed to open ledger at {}", path_ref.display()))?;
        Self::init(conn)
    }

    /// In-memory ledger
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS analyses (
                fix_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                issues_found INTEGER NOT NULL,
                issue_ids TEXT NOT NULL,
                result_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fix_id TEXT NOT NULL REFERENCES analyses(fix_id),
                success INTEGER NOT NULL,
                remaining_issues INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_feedback_fix ON feedback(fix_id);

            CREATE TABLE IF NOT EXISTS issue_stats (
                issue_id TEXT PRIMARY KEY,
                times_detected INTEGER NOT NULL DEFAULT 0,
                times_fixed INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("ledger connection poisoned"))
    }
}

impl FixLedger for SqliteLedger {
    fn record_analysis(&self, result: &AnalysisResult) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let issue_ids = result.issue_ids();
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO analyses (fix_id, created_at, issues_found, issue_ids, result_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &result.fix_id,
                result.timestamp.to_rfc3339(),
                result.issues_found as i64,
                issue_ids.join(","),
                serde_json::to_string(result)?,
            ],
        )?;

        if inserted == 1 {
            let mut stmt = tx.prepare(
                "INSERT INTO issue_stats (issue_id, times_detected, times_fixed) VALUES (?1, 1, 0)
                 ON CONFLICT(issue_id) DO UPDATE SET times_detected = times_detected + 1",
            )?;
            for id in &issue_ids {
                stmt.execute(params![id])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn record_feedback(&self, fix_id: &str, feedback: &Feedback) -> Result<bool> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let issue_ids: Option<String> = tx
            .query_row(
                "SELECT issue_ids FROM analyses WHERE fix_id = ?1",
                params![fix_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(issue_ids) = issue_ids else {
            return Ok(false);
        };

        let already_fixed: i64 = tx.query_row(
            "SELECT COUNT(*) FROM feedback WHERE fix_id = ?1 AND success = 1",
            params![fix_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO feedback (fix_id, success, remaining_issues, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                fix_id,
                feedback.success,
                feedback.remaining_issues,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;

        // Only the first successful report counts toward times_fixed
        if feedback.success && already_fixed == 0 {
            let mut stmt = tx.prepare(
                "UPDATE issue_stats SET times_fixed = times_fixed + 1 WHERE issue_id = ?1",
            )?;
            for id in issue_ids.split(',').filter(|s| !s.is_empty()) {
                stmt.execute(params![id])?;
            }
        }

        tx.commit()?;
        Ok(true)
    }

    fn find_analysis(&self, fix_id: &str) -> Result<Option<AnalysisResult>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT result_json FROM analyses WHERE fix_id = ?1",
                params![fix_id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| serde_json::from_str(&j).context("Corrupt analysis record"))
            .transpose()
    }

    fn issue_stats(&self) -> Result<Vec<IssueStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT issue_id, times_detected, times_fixed FROM issue_stats
             ORDER BY times_detected DESC, issue_id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(IssueStats {
                issue_id: row.get(0)?,
                times_detected: row.get::<_, i64>(1)? as u64,
                times_fixed: row.get::<_, i64>(2)? as u64,
            })
        })?;

        let stats = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::KnownIssue;
    use crate::catalog::Severity;
    use tempfile::TempDir;

    fn analysis(fix_id: &str, ids: &[&str]) -> AnalysisResult {
        AnalysisResult {
            fix_id: fix_id.to_string(),
            timestamp: chrono::Utc::now(),
            issues_found: ids.len(),
            known_issues: ids
                .iter()
                .map(|id| KnownIssue {
                    id: id.to_string(),
                    severity: Severity::High,
                    title: "t".into(),
                    description: "d".into(),
                })
                .collect(),
            ai_issues: vec![],
            analysis: "summary".into(),
            fix_script: "#!/usr/bin/env bash\necho hi\n".into(),
            ai_insights: None,
            partial: false,
        }
    }

    #[test]
    fn test_record_and_find_analysis() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let a = analysis("fix-1", &["port-conflict"]);
        ledger.record_analysis(&a).unwrap();

        let found = ledger.find_analysis("fix-1").unwrap().unwrap();
        assert_eq!(found.fix_script, a.fix_script);
        assert!(ledger.find_analysis("missing").unwrap().is_none());
    }

    #[test]
    fn test_detection_counters() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.record_analysis(&analysis("a", &["port-conflict", "missing-soul"])).unwrap();
        ledger.record_analysis(&analysis("b", &["port-conflict"])).unwrap();
        // Same id again does not double count
        ledger.record_analysis(&analysis("b", &["port-conflict"])).unwrap();

        let stats = ledger.issue_stats().unwrap();
        assert_eq!(stats[0].issue_id, "port-conflict");
        assert_eq!(stats[0].times_detected, 2);
        assert_eq!(stats[1].issue_id, "missing-soul");
        assert_eq!(stats[1].times_detected, 1);
    }

    #[test]
    fn test_feedback_counts_first_success_only() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.record_analysis(&analysis("a", &["disk-low"])).unwrap();

        let fail = Feedback { success: false, remaining_issues: 1 };
        let ok = Feedback { success: true, remaining_issues: 0 };
        assert!(ledger.record_feedback("a", &fail).unwrap());
        assert!(ledger.record_feedback("a", &ok).unwrap());
        assert!(ledger.record_feedback("a", &ok).unwrap());

        let stats = ledger.issue_stats().unwrap();
        assert_eq!(stats[0].times_fixed, 1);
    }

    #[test]
    fn test_feedback_for_unknown_fix() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let ok = Feedback { success: true, remaining_issues: 0 };
        assert!(!ledger.record_feedback("nope", &ok).unwrap());
    }

    #[test]
    fn test_ledger_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger.db");
        {
            let ledger = SqliteLedger::open_at(&path).unwrap();
            ledger.record_analysis(&analysis("persist", &["missing-memory"])).unwrap();
        }
        let ledger = SqliteLedger::open_at(&path).unwrap();
        assert!(ledger.find_analysis("persist").unwrap().is_some());
        assert_eq!(ledger.issue_stats().unwrap()[0].times_detected, 1);
    }
}
