//! Yahoo Finance through the YQL public query endpoint.
//!
//! Every value in a YQL answer is a string (or null), and a result set with
//! a single row comes back as an object instead of an array.

use super::cleaner::{num, parse_date, parse_date_near, pct, text, volume, yield_fraction};
use super::http_client::HttpClient;
use super::{Source, ensure_range, requested_key, unique_symbols};
use crate::config::SourceConfig;
use crate::errors::{Error, Result};
use crate::models::{DividendEntry, DividendHist, Hist, HistEntry, Quote, Quotes, YearMonthDay};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

pub const NAME: &str = "yahoo_yql";

const DATATABLES_ENV: &str = "store://datatables.org/alltableswithkeys";

/// `hist` asks for everything from here on.
fn earliest() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct YqlResponse<T> {
    query: Option<YqlQuery<T>>,
    error: Option<YqlError>,
}

#[derive(Debug, Deserialize)]
struct YqlError {
    description: String,
}

#[derive(Debug, Deserialize)]
struct YqlQuery<T> {
    #[serde(default)]
    count: u32,
    results: Option<YqlResults<T>>,
}

#[derive(Debug, Deserialize)]
struct YqlResults<T> {
    quote: OneOrMany<T>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(x) => vec![x],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YqlQuote {
    #[serde(rename = "Symbol")]
    symbol: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "StockExchange")]
    stock_exchange: Option<String>,
    #[serde(rename = "Ask")]
    ask: Option<String>,
    #[serde(rename = "Bid")]
    bid: Option<String>,
    #[serde(rename = "Open")]
    open: Option<String>,
    #[serde(rename = "PreviousClose")]
    previous_close: Option<String>,
    #[serde(rename = "LastTradePriceOnly")]
    last_trade_price_only: Option<String>,
    #[serde(rename = "Change")]
    change: Option<String>,
    #[serde(rename = "ChangeinPercent")]
    change_in_percent: Option<String>,
    #[serde(rename = "DaysLow")]
    days_low: Option<String>,
    #[serde(rename = "DaysHigh")]
    days_high: Option<String>,
    #[serde(rename = "YearLow")]
    year_low: Option<String>,
    #[serde(rename = "YearHigh")]
    year_high: Option<String>,
    #[serde(rename = "FiftydayMovingAverage")]
    fifty_day_moving_average: Option<String>,
    #[serde(rename = "TwoHundreddayMovingAverage")]
    two_hundred_day_moving_average: Option<String>,
    #[serde(rename = "Volume")]
    volume: Option<String>,
    #[serde(rename = "AverageDailyVolume")]
    average_daily_volume: Option<String>,
    #[serde(rename = "PERatio")]
    pe_ratio: Option<String>,
    #[serde(rename = "EarningsShare")]
    earnings_share: Option<String>,
    #[serde(rename = "DividendShare")]
    dividend_share: Option<String>,
    #[serde(rename = "DividendYield")]
    dividend_yield: Option<String>,
    #[serde(rename = "ExDividendDate")]
    ex_dividend_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YqlHistRow {
    #[serde(rename = "Symbol")]
    symbol: Option<String>,
    #[serde(rename = "Date")]
    date: Option<String>,
    #[serde(rename = "Open")]
    open: Option<String>,
    #[serde(rename = "High")]
    high: Option<String>,
    #[serde(rename = "Low")]
    low: Option<String>,
    #[serde(rename = "Close")]
    close: Option<String>,
    #[serde(rename = "Volume")]
    volume: Option<String>,
    #[serde(rename = "Adj_Close")]
    adj_close: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YqlDividendRow {
    #[serde(rename = "Date")]
    date: Option<String>,
    #[serde(rename = "Dividends")]
    dividends: Option<String>,
}

/// Rows of a YQL answer; an empty result set is not an error.
fn decode_rows<T: DeserializeOwned>(body: &str) -> Result<Vec<T>> {
    let resp: YqlResponse<T> =
        serde_json::from_str(body).map_err(|e| Error::fetch(NAME, format!("malformed response: {e}")))?;

    if let Some(err) = resp.error {
        return Err(Error::fetch(NAME, err.description));
    }
    let query = resp
        .query
        .ok_or_else(|| Error::fetch(NAME, "response has neither query nor error"))?;

    debug!("YQL returned {} rows", query.count);
    Ok(query.results.map(|r| r.quote.into_vec()).unwrap_or_default())
}

// ── Normalisation ─────────────────────────────────────────────────────────────

fn yql_quote_to_quote(symbol: &str, raw: &YqlQuote, now: DateTime<Utc>) -> Option<Quote> {
    let name = text(raw.name.as_deref());
    let last = num(raw.last_trade_price_only.as_deref());
    if name.is_empty() && last == 0.0 {
        return None;
    }

    Some(Quote {
        symbol: symbol.to_string(),
        name,
        exchange: text(raw.stock_exchange.as_deref()),
        updated: now,
        volume: volume(raw.volume.as_deref()),
        avg_daily_volume: volume(raw.average_daily_volume.as_deref()),
        pe_ratio: num(raw.pe_ratio.as_deref()),
        earnings_per_share: num(raw.earnings_share.as_deref()),
        dividend_per_share: num(raw.dividend_share.as_deref()),
        dividend_yield: yield_fraction(raw.dividend_yield.as_deref()),
        dividend_ex_date: raw
            .ex_dividend_date
            .as_deref()
            .and_then(|s| parse_date_near(s, now.date_naive()))
            .map(YearMonthDay::from),
        bid: num(raw.bid.as_deref()),
        ask: num(raw.ask.as_deref()),
        open: num(raw.open.as_deref()),
        previous_close: num(raw.previous_close.as_deref()),
        last_trade_price: last,
        change: num(raw.change.as_deref()),
        change_percent: pct(raw.change_in_percent.as_deref()),
        day_low: num(raw.days_low.as_deref()),
        day_high: num(raw.days_high.as_deref()),
        year_low: num(raw.year_low.as_deref()),
        year_high: num(raw.year_high.as_deref()),
        ma50: num(raw.fifty_day_moving_average.as_deref()),
        ma200: num(raw.two_hundred_day_moving_average.as_deref()),
    })
}

fn yql_hist_row_to_entry(raw: &YqlHistRow) -> Option<HistEntry> {
    let date = parse_date(raw.date.as_deref()?)?;
    Some(HistEntry {
        date: date.into(),
        open: num(raw.open.as_deref()),
        close: num(raw.close.as_deref()),
        adj_close: num(raw.adj_close.as_deref()),
        high: num(raw.high.as_deref()),
        low: num(raw.low.as_deref()),
        volume: volume(raw.volume.as_deref()),
    })
}

/// History rows keyed by the requested spelling of their symbol. Rows for
/// symbols nobody asked for are dropped.
fn group_hist_rows(symbols: &[String], rows: &[YqlHistRow]) -> Hist {
    let mut hist = Hist::new();
    for raw in rows {
        let returned = raw.symbol.as_deref().unwrap_or_default();
        // A single-symbol query does not always echo the symbol.
        let key = match requested_key(symbols, returned) {
            Some(k) => k,
            None if symbols.len() == 1 && returned.trim().is_empty() => symbols[0].as_str(),
            None => {
                debug!("YQL history row for unrequested symbol {:?}", returned);
                continue;
            }
        };
        if let Some(entry) = yql_hist_row_to_entry(raw) {
            hist.entry(key.to_string()).or_default().push(entry);
        }
    }
    hist
}

fn yql_dividend_row_to_entry(raw: &YqlDividendRow) -> Option<DividendEntry> {
    Some(DividendEntry {
        date: parse_date(raw.date.as_deref()?)?.into(),
        dividends_per_share: num(raw.dividends.as_deref()),
    })
}

// ── Statements ────────────────────────────────────────────────────────────────

fn quoted_list(symbols: &[String]) -> String {
    symbols
        .iter()
        .map(|s| format!("\"{}\"", s.replace('"', "")))
        .collect::<Vec<_>>()
        .join(",")
}

fn quotes_statement(symbols: &[String]) -> String {
    format!("select * from yahoo.finance.quotes where symbol in ({})", quoted_list(symbols))
}

fn hist_statement(symbols: &[String], start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "select * from yahoo.finance.historicaldata where symbol in ({}) and startDate = \"{}\" and endDate = \"{}\"",
        quoted_list(symbols),
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
    )
}

fn dividend_statement(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "select * from yahoo.finance.dividendhistory where symbol = \"{}\" and startDate = \"{}\" and endDate = \"{}\"",
        symbol.replace('"', ""),
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
    )
}

// ── Source ────────────────────────────────────────────────────────────────────

pub struct YahooYql {
    client: HttpClient,
    base_url: String,
}

impl YahooYql {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(NAME, config)?,
            base_url: config.yql_url.trim_end_matches('/').to_string(),
        })
    }

    fn query_url(&self, statement: &str) -> Result<Url> {
        Url::parse_with_params(
            &self.base_url,
            &[
                ("q", statement),
                ("format", "json"),
                ("env", DATATABLES_ENV),
                ("diagnostics", "false"),
            ],
        )
        .map_err(|e| Error::fetch(NAME, format!("bad base url {}: {e}", self.base_url)))
    }

    async fn run<T: DeserializeOwned>(&self, statement: &str) -> Result<Vec<T>> {
        debug!("YQL: {}", statement);
        let body = self.client.get_text(&self.query_url(statement)?).await?;
        decode_rows(&body)
    }
}

#[async_trait]
impl Source for YahooYql {
    fn name(&self) -> &str {
        NAME
    }

    async fn quote(&self, symbols: &[String]) -> Result<Quotes> {
        let symbols = unique_symbols(symbols);
        if symbols.is_empty() {
            return Ok(Quotes::new());
        }

        let rows: Vec<YqlQuote> = self.run(&quotes_statement(&symbols)).await?;
        let now = Utc::now();
        let mut quotes = Quotes::new();

        for raw in &rows {
            let returned = raw.symbol.as_deref().unwrap_or_default();
            let Some(key) = requested_key(&symbols, returned) else {
                warn!("YQL returned unrequested symbol {:?}", returned);
                continue;
            };
            match yql_quote_to_quote(key, raw, now) {
                Some(q) => {
                    quotes.insert(key.to_string(), q);
                }
                None => debug!("{}: not resolved by YQL", key),
            }
        }

        info!("{}: {}/{} quotes resolved", NAME, quotes.len(), symbols.len());
        Ok(quotes)
    }

    async fn hist(&self, symbols: &[String]) -> Result<Hist> {
        self.hist_limit(symbols, earliest(), Utc::now().date_naive()).await
    }

    async fn hist_limit(&self, symbols: &[String], start: NaiveDate, end: NaiveDate)
        -> Result<Hist> {
        ensure_range(start, end)?;
        let symbols = unique_symbols(symbols);
        if symbols.is_empty() {
            return Ok(Hist::new());
        }

        let rows: Vec<YqlHistRow> = self.run(&hist_statement(&symbols, start, end)).await?;
        let hist = group_hist_rows(&symbols, &rows);

        info!("{}: history for {}/{} symbols", NAME, hist.len(), symbols.len());
        Ok(hist)
    }

    async fn dividend_hist(&self, symbols: &[String]) -> Result<DividendHist> {
        let symbols = unique_symbols(symbols);
        let (start, end) = (earliest(), Utc::now().date_naive());
        let mut out = DividendHist::new();

        // Dividend rows carry no symbol, so one statement per symbol.
        for symbol in &symbols {
            let rows: Vec<YqlDividendRow> = self.run(&dividend_statement(symbol, start, end)).await?;
            let entries: Vec<DividendEntry> = rows.iter().filter_map(yql_dividend_row_to_entry).collect();
            if entries.is_empty() {
                debug!("{}: no dividend history", symbol);
                continue;
            }
            out.insert(symbol.clone(), entries);
        }

        Ok(out)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
