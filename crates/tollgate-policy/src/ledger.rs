//! Audit/ledger store: append-only policy decisions and completed
//! payments, backed by SQLite.
//!
//! The connection sits behind a `Mutex` so concurrent writers
//! serialize; lost updates on the spending history would silently
//! loosen the caps.

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use tollgate::now_secs;

use crate::error::PolicyError;

/// Longest window any spending cap covers (31 days). Records older
/// than this can never influence a decision and are pruned.
pub const MAX_WINDOW_SECS: u64 = 31 * 24 * 60 * 60;

/// One completed, policy-approved payment. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendingRecord {
    pub ts: u64,
    pub recipient: String,
    pub amount: u128,
    pub execution_id: String,
}

/// One policy evaluation outcome, success or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub ts: u64,
    pub gate: String,
    pub recipient: String,
    pub allowed: bool,
    pub reason: String,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS spending (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts INTEGER NOT NULL,
    recipient TEXT NOT NULL,
    amount TEXT NOT NULL,
    execution_id TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_spending_ts ON spending(ts);
CREATE INDEX IF NOT EXISTS idx_spending_recipient ON spending(recipient);

CREATE TABLE IF NOT EXISTS audit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts INTEGER NOT NULL,
    gate TEXT NOT NULL,
    recipient TEXT NOT NULL,
    allowed INTEGER NOT NULL,
    reason TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_ts ON audit(ts);
"#;

/// The audit/ledger store.
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory ledger; history is lost on drop. Useful for tests and
    /// for clients that opt out of persistent spending history.
    pub fn open_in_memory() -> Result<Self, PolicyError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PolicyError> {
        self.conn.lock().map_err(|_| {
            PolicyError::Ledger(rusqlite::Error::InvalidParameterName(
                "lock poisoned".into(),
            ))
        })
    }

    /// Record a completed payment at the current time.
    ///
    /// Only call this after the policy gate allowed the exact
    /// recipient/amount pair AND the executor confirmed execution.
    /// Speculative records corrupt every later spending check.
    pub fn record_spending(
        &self,
        recipient: &str,
        amount: u128,
        execution_id: &str,
    ) -> Result<(), PolicyError> {
        self.record_spending_at(now_secs(), recipient, amount, execution_id)
    }

    /// Record a completed payment with an explicit timestamp (history
    /// imports, tests).
    pub fn record_spending_at(
        &self,
        ts: u64,
        recipient: &str,
        amount: u128,
        execution_id: &str,
    ) -> Result<(), PolicyError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO spending (ts, recipient, amount, execution_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                ts as i64,
                recipient.to_lowercase(),
                amount.to_string(),
                execution_id
            ],
        )?;
        Ok(())
    }

    /// Sum spending amounts, optionally filtered by recipient
    /// (case-insensitive exact match) and by a window start. `None`
    /// since means all time.
    ///
    /// Amounts are summed in Rust as u128; SQLite's SUM would go
    /// through i64/f64 and lose exactness.
    pub fn window_sum(
        &self,
        recipient: Option<&str>,
        since: Option<u64>,
    ) -> Result<u128, PolicyError> {
        let conn = self.lock()?;
        let since = since.unwrap_or(0) as i64;

        let mut total: u128 = 0;
        let mut add = |amount_str: String| {
            let amount: u128 = amount_str.parse().unwrap_or(0);
            total = total.saturating_add(amount);
        };

        match recipient {
            Some(r) => {
                let mut stmt =
                    conn.prepare("SELECT amount FROM spending WHERE ts >= ?1 AND recipient = ?2")?;
                let rows = stmt.query_map(params![since, r.to_lowercase()], |row| {
                    row.get::<_, String>(0)
                })?;
                for row in rows {
                    add(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare("SELECT amount FROM spending WHERE ts >= ?1")?;
                let rows = stmt.query_map(params![since], |row| row.get::<_, String>(0))?;
                for row in rows {
                    add(row?);
                }
            }
        }
        Ok(total)
    }

    /// Delete spending records older than `max_age_secs`. Returns the
    /// number removed.
    ///
    /// This is an explicit maintenance operation, intended to run on a
    /// schedule, so write latency stays flat. Audit rows are kept.
    pub fn prune_spending(&self, max_age_secs: u64) -> Result<usize, PolicyError> {
        let cutoff = now_secs().saturating_sub(max_age_secs) as i64;
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM spending WHERE ts < ?1", params![cutoff])?;
        if removed > 0 {
            tracing::debug!(removed, "pruned aged spending records");
        }
        Ok(removed)
    }

    /// Most recent completed payments, newest first.
    pub fn recent_spending(&self, limit: u32) -> Result<Vec<SpendingRecord>, PolicyError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ts, recipient, amount, execution_id FROM spending ORDER BY id DESC LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        // Amounts are stored as TEXT; parse back outside the query so a
        // corrupt row surfaces as an error instead of a silent zero.
        records
            .into_iter()
            .map(|(ts, recipient, amount, execution_id)| {
                let amount = amount.parse::<u128>().map_err(|_| {
                    PolicyError::Ledger(rusqlite::Error::InvalidParameterName(format!(
                        "non-numeric amount '{amount}' in spending row"
                    )))
                })?;
                Ok(SpendingRecord {
                    ts: ts as u64,
                    recipient,
                    amount,
                    execution_id,
                })
            })
            .collect()
    }

    /// Append a policy decision to the audit log.
    pub fn append_audit(
        &self,
        gate: &str,
        recipient: &str,
        allowed: bool,
        reason: &str,
    ) -> Result<(), PolicyError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO audit (ts, gate, recipient, allowed, reason) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                now_secs() as i64,
                gate,
                recipient.to_lowercase(),
                allowed,
                reason
            ],
        )?;
        Ok(())
    }

    /// Most recent audit entries, newest first.
    pub fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEntry>, PolicyError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ts, gate, recipient, allowed, reason FROM audit ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditEntry {
                    ts: row.get::<_, i64>(0)? as u64,
                    gate: row.get(1)?,
                    recipient: row.get(2)?,
                    allowed: row.get(3)?,
                    reason: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_sum() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.record_spending("0xAAA", 100, "tx-1").unwrap();
        ledger.record_spending("0xBBB", 250, "tx-2").unwrap();
        assert_eq!(ledger.window_sum(None, None).unwrap(), 350);
        assert_eq!(ledger.window_sum(Some("0xaaa"), None).unwrap(), 100);
    }

    #[test]
    fn test_recipient_match_is_case_insensitive() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.record_spending("0xAbCd", 42, "tx-1").unwrap();
        assert_eq!(ledger.window_sum(Some("0XABCD"), None).unwrap(), 42);
        assert_eq!(ledger.window_sum(Some("0xabcd"), None).unwrap(), 42);
        assert_eq!(ledger.window_sum(Some("0xother"), None).unwrap(), 0);
    }

    #[test]
    fn test_window_filter() {
        let ledger = Ledger::open_in_memory().unwrap();
        let now = now_secs();
        ledger
            .record_spending_at(now - 100_000, "0xaaa", 500, "tx-old")
            .unwrap();
        ledger
            .record_spending_at(now - 10, "0xaaa", 30, "tx-new")
            .unwrap();
        // 24h window only sees the recent record
        assert_eq!(
            ledger
                .window_sum(Some("0xaaa"), Some(now - 86_400))
                .unwrap(),
            30
        );
        assert_eq!(ledger.window_sum(Some("0xaaa"), None).unwrap(), 530);
    }

    #[test]
    fn test_prune_removes_only_aged_records() {
        let ledger = Ledger::open_in_memory().unwrap();
        let now = now_secs();
        ledger
            .record_spending_at(now - MAX_WINDOW_SECS - 100, "0xaaa", 500, "tx-old")
            .unwrap();
        ledger.record_spending("0xaaa", 30, "tx-new").unwrap();
        let removed = ledger.prune_spending(MAX_WINDOW_SECS).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(ledger.window_sum(None, None).unwrap(), 30);
    }

    #[test]
    fn test_recent_spending_newest_first() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.record_spending("0xAAA", 100, "tx-1").unwrap();
        ledger.record_spending("0xbbb", 250, "tx-2").unwrap();
        ledger.record_spending("0xccc", 7, "tx-3").unwrap();
        let records = ledger.recent_spending(2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].execution_id, "tx-3");
        assert_eq!(records[0].amount, 7);
        assert_eq!(records[1].execution_id, "tx-2");
        // Recipients come back as stored, lowercased
        let all = ledger.recent_spending(10).unwrap();
        assert_eq!(all[2].recipient, "0xaaa");
        assert_eq!(all[2].amount, 100);
    }

    #[test]
    fn test_large_amounts_sum_exactly() {
        let ledger = Ledger::open_in_memory().unwrap();
        let big: u128 = u64::MAX as u128 + 1;
        ledger.record_spending("0xaaa", big, "tx-1").unwrap();
        ledger.record_spending("0xaaa", big, "tx-2").unwrap();
        assert_eq!(ledger.window_sum(None, None).unwrap(), big * 2);
    }

    #[test]
    fn test_audit_append_and_read() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger
            .append_audit("trust", "0xAAA", false, "score 100 below minimum 600")
            .unwrap();
        ledger.append_audit("spending", "0xaaa", true, "ok").unwrap();
        let entries = ledger.recent_audit(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].gate, "spending");
        assert!(entries[0].allowed);
        assert_eq!(entries[1].gate, "trust");
        assert_eq!(entries[1].recipient, "0xaaa");
        assert!(!entries[1].allowed);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.record_spending("0xaaa", 7, "tx-1").unwrap();
        }
        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.window_sum(None, None).unwrap(), 7);
    }
}
