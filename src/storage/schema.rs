//! Database schema.
//!
//! Company text is indexed by an external-content FTS5 table kept in sync
//! by triggers. The `unicode61` tokenizer with diacritic folding makes
//! `logistica` and `logística` match the same rows.

/// Schema version written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: u32 = 1;

/// DDL executed by [`SqliteStore::init`](super::SqliteStore::init).
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS companies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_name TEXT NOT NULL,
    cae_primary_label TEXT,
    trade_description_native TEXT,
    website TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS incentives (
    incentive_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    description TEXT,
    ai_description TEXT,
    document_urls TEXT,
    publication_date TEXT,
    start_date TEXT,
    end_date TEXT,
    total_budget REAL,
    source_link TEXT
);

CREATE INDEX IF NOT EXISTS idx_companies_name ON companies(company_name);
CREATE INDEX IF NOT EXISTS idx_incentives_title ON incentives(title);
CREATE INDEX IF NOT EXISTS idx_incentives_publication_date ON incentives(publication_date);
CREATE INDEX IF NOT EXISTS idx_incentives_start_date ON incentives(start_date);
CREATE INDEX IF NOT EXISTS idx_incentives_end_date ON incentives(end_date);

CREATE VIRTUAL TABLE IF NOT EXISTS companies_fts USING fts5(
    company_name,
    cae_primary_label,
    trade_description_native,
    content='companies',
    content_rowid='id',
    tokenize='unicode61 remove_diacritics 2'
);

CREATE TRIGGER IF NOT EXISTS companies_fts_insert AFTER INSERT ON companies BEGIN
    INSERT INTO companies_fts(rowid, company_name, cae_primary_label, trade_description_native)
    VALUES (new.id, new.company_name, new.cae_primary_label, new.trade_description_native);
END;

CREATE TRIGGER IF NOT EXISTS companies_fts_delete AFTER DELETE ON companies BEGIN
    INSERT INTO companies_fts(companies_fts, rowid, company_name, cae_primary_label, trade_description_native)
    VALUES ('delete', old.id, old.company_name, old.cae_primary_label, old.trade_description_native);
END;

CREATE TRIGGER IF NOT EXISTS companies_fts_update AFTER UPDATE ON companies BEGIN
    INSERT INTO companies_fts(companies_fts, rowid, company_name, cae_primary_label, trade_description_native)
    VALUES ('delete', old.id, old.company_name, old.cae_primary_label, old.trade_description_native);
    INSERT INTO companies_fts(rowid, company_name, cae_primary_label, trade_description_native)
    VALUES (new.id, new.company_name, new.cae_primary_label, new.trade_description_native);
END;
";

/// Ranked full-text search over companies.
///
/// `bm25()` is lower for better matches, so it is negated to give a
/// higher-is-better relevance score.
pub const SEARCH_COMPANIES_SQL: &str = r"
SELECT c.id, c.company_name, c.cae_primary_label, c.trade_description_native,
       c.website, c.created_at, c.updated_at,
       -bm25(companies_fts) AS relevance_score
FROM companies_fts
JOIN companies c ON c.id = companies_fts.rowid
WHERE companies_fts MATCH ?1
ORDER BY relevance_score DESC, c.company_name ASC
LIMIT ?2
";
