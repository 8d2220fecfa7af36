//! Quote cache: a [`Source`] wrapping another one.
//!
//! Quotes younger than the expiry are answered from a DuckDB table; only
//! missing or stale symbols reach the wrapped source. History calls pass
//! straight through. A broken cache never fails a request: errors are
//! logged and the wrapped source answers instead.

use crate::errors::Result as SourceResult;
use crate::models::{DividendHist, Hist, Quote, Quotes};
use crate::source::Source;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Schema ────────────────────────────────────────────────────────────────────

const SCHEMA_VERSION: i32 = 2;

const VERSION_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

// One row per provider: a quote cached from one source never answers
// for another.
const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS quotes (
    symbol      VARCHAR   NOT NULL,
    source      VARCHAR   NOT NULL,
    fetched_at  TIMESTAMP NOT NULL,
    payload     VARCHAR   NOT NULL,
    PRIMARY KEY (symbol, source)
);
"#;

/// Oldest `fetched_at` still fresh under `expiry`. Saturates instead of
/// overflowing for absurd expiries.
pub fn fresh_since(expiry: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(expiry).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_sub_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct QuoteRepository {
    conn: Mutex<Connection>,
}

impl QuoteRepository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.run_migrations()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self> {
        let repo = Self { conn: Mutex::new(Connection::open_in_memory()?) };
        repo.run_migrations()?;
        Ok(repo)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("quote cache connection poisoned"))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(VERSION_DDL).context("DDL failed")?;

        let current: Option<i32> = conn
            .prepare("SELECT MAX(version) FROM schema_version")?
            .query_row([], |r| r.get(0))?;
        if current.unwrap_or(0) < SCHEMA_VERSION {
            // Cached quotes are disposable; older layouts are rebuilt.
            conn.execute_batch("DROP TABLE IF EXISTS quotes;")?;
        }

        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![SCHEMA_VERSION, Utc::now().naive_utc()],
        )?;
        debug!("Quote cache schema v{} ready", SCHEMA_VERSION);
        Ok(())
    }

    /// Upsert quotes. Freshness is judged on each quote's `updated` stamp,
    /// which every adapter sets to the fetch time.
    pub fn store(&self, source: &str, quotes: &Quotes) -> Result<usize> {
        if quotes.is_empty() {
            return Ok(0);
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        for (symbol, q) in quotes {
            let payload = q.to_json().with_context(|| format!("serialize quote {symbol}"))?;
            tx.execute(
                r#"INSERT INTO quotes (symbol, source, fetched_at, payload)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT (symbol, source) DO UPDATE SET
                       fetched_at = excluded.fetched_at,
                       payload    = excluded.payload"#,
                params![symbol, source, q.updated.naive_utc(), payload],
            )
            .with_context(|| format!("upsert quote {symbol}"))?;
        }
        tx.commit()?;
        Ok(quotes.len())
    }

    /// Quotes `source` stored for `symbols` at or after `fresh_since`.
    pub fn load_fresh(
        &self,
        source: &str,
        symbols: &[String],
        fresh_since: DateTime<Utc>,
    ) -> Result<Quotes> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM quotes WHERE symbol = ? AND source = ? AND fetched_at >= ?",
        )?;

        let mut out = Quotes::new();
        for symbol in symbols {
            let payload: Option<String> = stmt
                .query_row(params![symbol, source, fresh_since.naive_utc()], |r| r.get(0))
                .optional()?;
            let Some(payload) = payload else { continue };
            match Quote::from_json(&payload) {
                Ok(q) => {
                    out.insert(symbol.clone(), q);
                }
                Err(e) => warn!("{}: unreadable cached quote: {}", symbol, e),
            }
        }
        Ok(out)
    }

    pub fn quote_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT COUNT(*) FROM quotes")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    /// Drop quotes older than `before`; returns how many went.
    pub fn purge_older_than(&self, before: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM quotes WHERE fetched_at < ?",
            params![before.naive_utc()],
        )?;
        Ok(n)
    }
}

// ── Decorator ─────────────────────────────────────────────────────────────────

pub struct CachedSource<S> {
    inner: S,
    repo: QuoteRepository,
    quote_expiry: Duration,
    name: String,
}

impl<S: Source> CachedSource<S> {
    pub fn new(inner: S, repo: QuoteRepository, quote_expiry: Duration) -> Self {
        let name = format!("cached({})", inner.name());
        Self {
            inner,
            repo,
            quote_expiry,
            name,
        }
    }
}

#[async_trait]
impl<S: Source> Source for CachedSource<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote(&self, symbols: &[String]) -> SourceResult<Quotes> {
        let symbols = crate::source::unique_symbols(symbols);

        let mut quotes = self
            .repo
            .load_fresh(self.inner.name(), &symbols, fresh_since(self.quote_expiry))
            .unwrap_or_else(|e| {
                warn!("Quote cache read failed, using {}: {:#}", self.inner.name(), e);
                Quotes::new()
            });

        let missing: Vec<String> = symbols
            .iter()
            .filter(|s| !quotes.contains_key(*s))
            .cloned()
            .collect();
        info!("Quote cache: {} hit(s), {} miss(es)", quotes.len(), missing.len());

        if missing.is_empty() {
            return Ok(quotes);
        }

        let fetched = self.inner.quote(&missing).await?;
        if let Err(e) = self.repo.store(self.inner.name(), &fetched) {
            warn!("Quote cache write failed: {:#}", e);
        }
        quotes.extend(fetched);
        Ok(quotes)
    }

    async fn hist(&self, symbols: &[String]) -> SourceResult<Hist> {
        self.inner.hist(symbols).await
    }

    async fn hist_limit(
        &self,
        symbols: &[String],
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    ) -> SourceResult<Hist> {
        self.inner.hist_limit(symbols, start, end).await
    }

    async fn dividend_hist(&self, symbols: &[String]) -> SourceResult<DividendHist> {
        self.inner.dividend_hist(symbols).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
