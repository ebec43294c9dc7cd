//! SQLite-backed store.
//!
//! One connection per store, guarded by a mutex so a single handle can be
//! shared (via `Arc`) between the interactive session and the batch
//! worker pool. The lock is only held for the duration of one statement;
//! callers never hold it across an `.await`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use super::action::{ActionKind, ActionOutcome, ActionRequest, Row};
use super::ingest::{NewCompany, NewIncentive};
use super::schema::{SCHEMA_SQL, SCHEMA_VERSION, SEARCH_COMPANIES_SQL};
use super::{ActionStore, CandidateStore};
use crate::core::{Company, Incentive, ScoredCompany};
use crate::error::StorageError;

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of company rows.
    pub companies: usize,
    /// Number of incentive rows.
    pub incentives: usize,
    /// Schema version recorded in the database.
    pub schema_version: u32,
}

/// SQLite implementation of [`ActionStore`] and [`CandidateStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) a database file.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        debug!(path = %path.display(), "opened database");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        })
    }

    /// Path of the backing file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Creates tables, indexes and full-text triggers.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub fn init(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// Returns `true` if the schema has been created.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    pub fn is_initialized(&self) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('companies', 'incentives', 'companies_fts')",
            [],
            |row| row.get(0),
        )?;
        Ok(count == 3)
    }

    /// Returns row counts per table.
    ///
    /// # Errors
    ///
    /// Returns an error if a count query fails.
    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<usize, StorageError> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        };
        let schema_version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        Ok(StoreStats {
            companies: count("companies")?,
            incentives: count("incentives")?,
            schema_version,
        })
    }

    /// Replaces all companies with `companies` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error (and rolls back) if any insert fails.
    pub fn replace_companies(&self, companies: &[NewCompany]) -> Result<usize, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM companies", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO companies \
                 (company_name, cae_primary_label, trade_description_native, website) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for c in companies {
                stmt.execute(params![
                    c.company_name,
                    c.cae_primary_label,
                    c.trade_description_native,
                    c.website
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = companies.len(), "replaced companies");
        Ok(companies.len())
    }

    /// Replaces all incentives with `incentives` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error (and rolls back) if any insert fails.
    pub fn replace_incentives(&self, incentives: &[NewIncentive]) -> Result<usize, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM incentives", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO incentives \
                 (title, description, ai_description, document_urls, publication_date, \
                  start_date, end_date, total_budget, source_link) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for i in incentives {
                stmt.execute(params![
                    i.title,
                    i.description,
                    i.ai_description,
                    i.document_urls,
                    i.publication_date,
                    i.start_date,
                    i.end_date,
                    i.total_budget,
                    i.source_link
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = incentives.len(), "replaced incentives");
        Ok(incentives.len())
    }

    /// Fetches one company by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_company(&self, id: i64) -> Result<Option<Company>, StorageError> {
        let conn = self.lock()?;
        let company = conn
            .query_row(
                "SELECT id, company_name, cae_primary_label, trade_description_native, \
                 website, created_at, updated_at FROM companies WHERE id = ?1",
                [id],
                company_from_row,
            )
            .optional()?;
        Ok(company)
    }

    fn run_read(conn: &Connection, sql: &str) -> Result<Vec<Row>, StorageError> {
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (idx, name) in names.iter().enumerate() {
                record.insert(name.clone(), json_value(row.get_ref(idx)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn run_write(conn: &Connection, sql: &str) -> Result<usize, StorageError> {
        let tx = conn.unchecked_transaction()?;
        let affected = tx.execute(sql, [])?;
        tx.commit()?;
        Ok(affected)
    }
}

impl ActionStore for SqliteStore {
    fn execute(&self, request: &ActionRequest) -> Result<ActionOutcome, StorageError> {
        let conn = self.lock()?;
        match request.kind() {
            ActionKind::Read => Self::run_read(&conn, &request.text).map(ActionOutcome::Rows),
            ActionKind::Write => Self::run_write(&conn, &request.text).map(ActionOutcome::Affected),
        }
    }
}

impl CandidateStore for SqliteStore {
    fn search_candidates(
        &self,
        match_query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCompany>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(SEARCH_COMPANIES_SQL)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![match_query, limit], |row| {
            Ok(ScoredCompany {
                company: company_from_row(row)?,
                relevance_score: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    fn list_incentives(&self) -> Result<Vec<Incentive>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT incentive_id, title, description, ai_description, document_urls, \
             publication_date, start_date, end_date, total_budget, source_link \
             FROM incentives ORDER BY incentive_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Incentive {
                incentive_id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                ai_description: row.get(3)?,
                document_urls: row.get(4)?,
                publication_date: row.get(5)?,
                start_date: row.get(6)?,
                end_date: row.get(7)?,
                total_budget: row.get(8)?,
                source_link: row.get(9)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn company_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        id: row.get(0)?,
        company_name: row.get(1)?,
        cae_primary_label: row.get(2)?,
        trade_description_native: row.get(3)?,
        website: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Converts a SQLite value to JSON for row previews.
fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn company(name: &str, label: &str, description: &str) -> NewCompany {
        NewCompany {
            company_name: name.to_string(),
            cae_primary_label: Some(label.to_string()),
            trade_description_native: Some(description.to_string()),
            website: None,
        }
    }

    fn setup_store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap_or_else(|e| panic!("in_memory failed: {e}"));
        store.init().unwrap_or_else(|e| panic!("init failed: {e}"));
        store
            .replace_companies(&[
                company("Transportes Silva", "Transporte rodoviário", "Logística e transporte de mercadorias"),
                company("Padaria Central", "Panificação", "Fabrico de pão"),
                company("Frio Norte", "Armazenagem frigorífica", "Logística de frio"),
            ])
            .unwrap_or_else(|e| panic!("replace_companies failed: {e}"));
        store
    }

    #[test]
    fn test_init_is_idempotent() {
        let store = setup_store();
        store.init().unwrap_or_else(|e| panic!("second init failed: {e}"));
        assert!(store.is_initialized().unwrap_or(false));
        let stats = store.stats().unwrap_or_default();
        assert_eq!(stats.companies, 3);
        assert_eq!(stats.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_uninitialized_store() {
        let store = SqliteStore::in_memory().unwrap_or_else(|e| panic!("in_memory failed: {e}"));
        assert!(!store.is_initialized().unwrap_or(true));
    }

    #[test]
    fn test_execute_read_preserves_column_order() {
        let store = setup_store();
        let outcome = store
            .execute(&ActionRequest::new(
                "SELECT company_name, id FROM companies ORDER BY id",
            ))
            .unwrap_or_else(|e| panic!("select failed: {e}"));
        let ActionOutcome::Rows(rows) = outcome else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 3);
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, ["company_name", "id"]);
        assert_eq!(rows[0]["company_name"], "Transportes Silva");
    }

    #[test]
    fn test_execute_write_commits() {
        let store = setup_store();
        let outcome = store
            .execute(&ActionRequest::new(
                "UPDATE companies SET website = 'https://frio.pt' WHERE company_name = 'Frio Norte'",
            ))
            .unwrap_or_else(|e| panic!("update failed: {e}"));
        assert_eq!(outcome, ActionOutcome::Affected(1));

        let company = store
            .get_company(3)
            .unwrap_or_else(|e| panic!("get failed: {e}"))
            .unwrap_or_else(|| panic!("company missing"));
        assert_eq!(company.website.as_deref(), Some("https://frio.pt"));
    }

    #[test]
    fn test_execute_invalid_sql_is_error() {
        let store = setup_store();
        let result = store.execute(&ActionRequest::new("SELECT * FROM nonexistent"));
        assert!(result.is_err());
        let msg = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(msg.contains("no such table"), "got: {msg}");
    }

    #[test]
    fn test_search_candidates_ranked() {
        let store = setup_store();
        let results = store
            .search_candidates("\"logistica\" OR \"frio\"", 10)
            .unwrap_or_else(|e| panic!("search failed: {e}"));
        let names: Vec<&str> = results.iter().map(|c| c.company.company_name.as_str()).collect();
        assert_eq!(results.len(), 2);
        assert!(names.contains(&"Frio Norte"));
        assert!(names.contains(&"Transportes Silva"));
        assert!(results[0].relevance_score >= results[1].relevance_score);
        assert!(results.iter().all(|c| c.relevance_score > 0.0));
    }

    #[test]
    fn test_search_candidates_respects_limit() {
        let store = setup_store();
        let results = store
            .search_candidates("\"logística\"", 1)
            .unwrap_or_else(|e| panic!("search failed: {e}"));
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_fts_tracks_updates() {
        let store = setup_store();
        let _ = store
            .execute(&ActionRequest::new(
                "UPDATE companies SET trade_description_native = 'Pastelaria fina' \
                 WHERE company_name = 'Padaria Central'",
            ))
            .unwrap_or_else(|e| panic!("update failed: {e}"));
        let results = store
            .search_candidates("\"pastelaria\"", 5)
            .unwrap_or_else(|e| panic!("search failed: {e}"));
        assert_eq!(results.len(), 1);
        let stale = store
            .search_candidates("\"fabrico\"", 5)
            .unwrap_or_else(|e| panic!("search failed: {e}"));
        assert!(stale.is_empty());
    }

    #[test]
    fn test_list_incentives_ordered() {
        let store = setup_store();
        let incentives = vec![
            NewIncentive {
                title: Some("Apoio à logística".to_string()),
                ..NewIncentive::default()
            },
            NewIncentive {
                title: Some("Inovação alimentar".to_string()),
                total_budget: Some(1_000_000.0),
                ..NewIncentive::default()
            },
        ];
        store
            .replace_incentives(&incentives)
            .unwrap_or_else(|e| panic!("replace failed: {e}"));
        let listed = store
            .list_incentives()
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        assert_eq!(listed.len(), 2);
        assert!(listed[0].incentive_id < listed[1].incentive_id);
        assert_eq!(listed[1].total_budget, Some(1_000_000.0));
    }

    #[test]
    fn test_open_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let path = dir.path().join("nested").join("store.db");
        let store = SqliteStore::open(&path).unwrap_or_else(|e| panic!("open failed: {e}"));
        store.init().unwrap_or_else(|e| panic!("init failed: {e}"));
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
