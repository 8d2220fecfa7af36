//! Yahoo Finance flat-file downloads: `quotes.csv` and `table.csv`.

use super::cleaner::{raw_hist_row_to_entry, raw_quote_row_to_quote};
use super::http_client::HttpClient;
use super::{Source, ensure_range, requested_key, unique_symbols};
use crate::config::SourceConfig;
use crate::errors::{Error, Operation, Result};
use crate::models::{DividendHist, Hist, HistEntry, Quotes, RawHistRow, RawQuoteRow};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, info, warn};
use url::Url;

pub const NAME: &str = "yahoo_csv";

/// `f=` tags, one per [`RawQuoteRow`] field in declaration order.
pub const QUOTE_FIELDS: &str = "snxbaopl1c1p2ghjkm3m4va2redyq";

// ── Parsing ───────────────────────────────────────────────────────────────────

fn parse_quotes_csv(body: &str) -> Result<Vec<RawQuoteRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| Error::fetch(NAME, format!("quotes.csv row {}: {e}", i + 1)))?;
        let field = |n: usize| record.get(n).map(|s| s.to_string());

        rows.push(RawQuoteRow {
            symbol: field(0),
            name: field(1),
            exchange: field(2),
            bid: field(3),
            ask: field(4),
            open: field(5),
            previous_close: field(6),
            last_trade: field(7),
            change: field(8),
            change_pct: field(9),
            day_low: field(10),
            day_high: field(11),
            year_low: field(12),
            year_high: field(13),
            ma50: field(14),
            ma200: field(15),
            volume: field(16),
            avg_volume: field(17),
            pe_ratio: field(18),
            eps: field(19),
            dividend_per_share: field(20),
            dividend_yield: field(21),
            ex_dividend_date: field(22),
        });
    }
    Ok(rows)
}

/// Quotes keyed by the requested spelling of their symbol. Rows come back in
/// request order, so a row without an echoed symbol takes its position's.
fn key_quote_rows(symbols: &[String], rows: &[RawQuoteRow], now: DateTime<Utc>) -> Quotes {
    let mut quotes = Quotes::new();
    for (i, raw) in rows.iter().enumerate() {
        let echoed = raw.symbol.as_deref().map(str::trim).unwrap_or_default();
        let key = if echoed.is_empty() {
            symbols.get(i).map(String::as_str)
        } else {
            requested_key(symbols, echoed)
        };
        let Some(key) = key else {
            warn!("{} returned unrequested symbol {:?}", NAME, echoed);
            continue;
        };

        match raw_quote_row_to_quote(key, raw, now) {
            Some(q) => {
                quotes.insert(key.to_string(), q);
            }
            None => debug!("{}: not resolved by {}", key, NAME),
        }
    }
    quotes
}

/// Date, Open, High, Low, Close, Volume, Adj Close (with a header line).
fn parse_hist_csv(symbol: &str, body: &str) -> Result<Vec<HistEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut entries = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: table.csv row {}: {}", symbol, i + 1, e);
                continue;
            }
        };
        let field = |n: usize| record.get(n).map(|s| s.to_string());

        let raw = RawHistRow {
            date: field(0),
            open: field(1),
            high: field(2),
            low: field(3),
            close: field(4),
            volume: field(5),
            adj_close: field(6),
        };
        if let Some(entry) = raw_hist_row_to_entry(symbol, &raw) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

// ── Source ────────────────────────────────────────────────────────────────────

pub struct YahooCsv {
    client: HttpClient,
    quotes_url: String,
    hist_url: String,
}

impl YahooCsv {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(NAME, config)?,
            quotes_url: config.csv_quotes_url.clone(),
            hist_url: config.csv_hist_url.clone(),
        })
    }

    fn quotes_url(&self, symbols: &[String]) -> Result<Url> {
        let joined = symbols.join(",");
        Url::parse_with_params(
            &self.quotes_url,
            &[("s", joined.as_str()), ("f", QUOTE_FIELDS), ("e", ".csv")],
        )
        .map_err(|e| Error::fetch(NAME, format!("bad quotes url {}: {e}", self.quotes_url)))
    }

    /// Months are zero-based in this API. Without a range the whole history
    /// is returned.
    fn hist_url(&self, symbol: &str, range: Option<(NaiveDate, NaiveDate)>) -> Result<Url> {
        let mut params = vec![("s", symbol.to_string())];
        if let Some((start, end)) = range {
            params.extend([
                ("a", start.month0().to_string()),
                ("b", start.day().to_string()),
                ("c", start.year().to_string()),
                ("d", end.month0().to_string()),
                ("e", end.day().to_string()),
                ("f", end.year().to_string()),
            ]);
        }
        params.extend([("g", "d".to_string()), ("ignore", ".csv".to_string())]);

        Url::parse_with_params(&self.hist_url, &params)
            .map_err(|e| Error::fetch(NAME, format!("bad history url {}: {e}", self.hist_url)))
    }

    async fn fetch_hist(&self, symbols: &[String], range: Option<(NaiveDate, NaiveDate)>) -> Result<Hist> {
        let symbols = unique_symbols(symbols);
        let mut hist = Hist::new();

        for symbol in &symbols {
            let Some(body) = self.client.get_text_opt(&self.hist_url(symbol, range)?).await? else {
                debug!("{}: no history (404)", symbol);
                continue;
            };
            let entries = parse_hist_csv(symbol, &body)?;
            debug!("{}: {} history rows", symbol, entries.len());
            hist.insert(symbol.clone(), entries);
        }

        info!("{}: history for {}/{} symbols", NAME, hist.len(), symbols.len());
        Ok(hist)
    }
}

#[async_trait]
impl Source for YahooCsv {
    fn name(&self) -> &str {
        NAME
    }

    async fn quote(&self, symbols: &[String]) -> Result<Quotes> {
        let symbols = unique_symbols(symbols);
        if symbols.is_empty() {
            return Ok(Quotes::new());
        }

        let body = self.client.get_text(&self.quotes_url(&symbols)?).await?;
        let quotes = key_quote_rows(&symbols, &parse_quotes_csv(&body)?, Utc::now());

        info!("{}: {}/{} quotes resolved", NAME, quotes.len(), symbols.len());
        Ok(quotes)
    }

    async fn hist(&self, symbols: &[String]) -> Result<Hist> {
        self.fetch_hist(symbols, None).await
    }

    async fn hist_limit(&self, symbols: &[String], start: NaiveDate, end: NaiveDate)
        -> Result<Hist> {
        ensure_range(start, end)?;
        self.fetch_hist(symbols, Some((start, end))).await
    }

    async fn dividend_hist(&self, _symbols: &[String]) -> Result<DividendHist> {
        Err(Error::unsupported(NAME, Operation::DividendHist))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
