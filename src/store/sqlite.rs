//! SQLite-backed state store

use super::StateStore;
use crate::model::ExtractionState;
use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open or create a state database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Opening state database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sync_state (
                unit_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_runs (
                unit_id TEXT PRIMARY KEY,
                current_start TEXT,
                last_successful_start TEXT
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Storage("state database lock poisoned".to_string()))
    }
}

fn parse_marker(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SyncError::Storage(format!("Invalid run marker '{}': {}", v, e)))
        })
        .transpose()
}

impl StateStore for SqliteStateStore {
    fn load(&self, unit_id: &str) -> Result<Option<ExtractionState>> {
        let json: Option<String> = self
            .conn()?
            .query_row(
                "SELECT state FROM sync_state WHERE unit_id = ?",
                params![unit_id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, unit_id: &str, state: &ExtractionState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO sync_state (unit_id, state, updated_at) VALUES (?, ?, ?)",
            params![unit_id, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn clear(&self, unit_id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM sync_state WHERE unit_id = ?", params![unit_id])?;
        tx.execute("DELETE FROM sync_runs WHERE unit_id = ?", params![unit_id])?;
        tx.commit()?;
        Ok(())
    }

    fn begin_run(&self, unit_id: &str, started_at: DateTime<Utc>) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO sync_runs (unit_id, current_start) VALUES (?1, ?2)
            ON CONFLICT(unit_id) DO UPDATE SET current_start = ?2
            "#,
            params![unit_id, started_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn complete_run(&self, unit_id: &str) -> Result<()> {
        self.conn()?.execute(
            r#"
            UPDATE sync_runs
            SET last_successful_start = current_start, current_start = NULL
            WHERE unit_id = ? AND current_start IS NOT NULL
            "#,
            params![unit_id],
        )?;
        Ok(())
    }

    fn last_successful_start(&self, unit_id: &str) -> Result<Option<DateTime<Utc>>> {
        let value: Option<Option<String>> = self
            .conn()?
            .query_row(
                "SELECT last_successful_start FROM sync_runs WHERE unit_id = ?",
                params![unit_id],
                |row| row.get(0),
            )
            .optional()?;
        parse_marker(value.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_state_roundtrip_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.db");

        let mut state = ExtractionState::new();
        state.users.completed = true;
        state.cards.cursor = Some("5f5e1000aaaaaaaaaaaaaaa1".into());
        state.cards.pushed = 10;

        {
            let store = SqliteStateStore::open(&path).unwrap();
            store.save("board-1", &state).unwrap();
        }

        let store = SqliteStateStore::open(&path).unwrap();
        assert_eq!(store.load("board-1").unwrap(), Some(state));
        assert!(store.load("board-2").unwrap().is_none());
    }

    #[test]
    fn test_run_markers() {
        let store = SqliteStateStore::in_memory().unwrap();
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        assert!(store.last_successful_start("b").unwrap().is_none());

        store.begin_run("b", first).unwrap();
        assert!(store.last_successful_start("b").unwrap().is_none());
        store.complete_run("b").unwrap();
        assert_eq!(store.last_successful_start("b").unwrap(), Some(first));

        // An unfinished run leaves the previous marker in place
        store.begin_run("b", second).unwrap();
        assert_eq!(store.last_successful_start("b").unwrap(), Some(first));

        store.complete_run("b").unwrap();
        assert_eq!(store.last_successful_start("b").unwrap(), Some(second));

        // Completing twice does not erase the marker
        store.complete_run("b").unwrap();
        assert_eq!(store.last_successful_start("b").unwrap(), Some(second));
    }

    #[test]
    fn test_clear() {
        let store = SqliteStateStore::in_memory().unwrap();
        store.save("b", &ExtractionState::new()).unwrap();
        store
            .begin_run("b", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .unwrap();
        store.complete_run("b").unwrap();

        store.clear("b").unwrap();
        assert!(store.load("b").unwrap().is_none());
        assert!(store.last_successful_start("b").unwrap().is_none());
    }
}
