//! Bloomberg quote pages, scraped one symbol at a time.
//!
//! Only quotes are available this way; every history operation fails with
//! [`Error::UnsupportedOperation`].

use super::cleaner::{num, parse_volume_shorthand, pct, yield_fraction};
use super::http_client::HttpClient;
use super::{Source, ensure_range, unique_symbols};
use crate::config::SourceConfig;
use crate::errors::{Error, Operation, Result};
use crate::models::{DividendHist, Hist, Quote, Quotes};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

pub const NAME: &str = "bloomberg";

// ── Symbols ───────────────────────────────────────────────────────────────────

/// Yahoo-style exchange suffix → Bloomberg exchange code.
fn exchange_code(suffix: &str) -> Option<&'static str> {
    Some(match suffix.to_ascii_uppercase().as_str() {
        "AS" => "NA",
        "BR" => "BB",
        "PA" => "FP",
        "F" | "DE" => "GR",
        "L" => "LN",
        "MI" => "IM",
        "MC" => "SM",
        "SW" => "SW",
        "TO" => "CN",
        _ => return None,
    })
}

/// `VEUR.AS` → `VEUR:NA`, `AAPL` → `AAPL:US`, `EURUSD=X` → `EURUSD:CUR`
pub fn bloomberg_ticker(symbol: &str) -> String {
    let symbol = symbol.trim().to_ascii_uppercase();
    if let Some(pair) = symbol.strip_suffix("=X") {
        return format!("{pair}:CUR");
    }
    match symbol.rsplit_once('.') {
        Some((base, suffix)) => match exchange_code(suffix) {
            Some(code) => format!("{base}:{code}"),
            None => format!("{base}:{suffix}"),
        },
        None => format!("{symbol}:US"),
    }
}

// ── Page parsing ──────────────────────────────────────────────────────────────

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        doc.select(&sel)
            .map(element_text)
            .find(|t| !t.is_empty())
    })
}

/// Label/value pairs from the page's data tables, in whichever layout the
/// page uses: `dt`/`dd`, `.cell__label`/`.cell__value`, or two-cell rows.
fn labelled_values(doc: &Html) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    let layouts = [("dt", "dd"), (".cell__label", ".cell__value")];
    for (label_sel, value_sel) in layouts {
        let (Ok(ls), Ok(vs)) = (Selector::parse(label_sel), Selector::parse(value_sel)) else {
            continue;
        };
        let labels = doc.select(&ls).map(element_text);
        let values = doc.select(&vs).map(element_text);
        pairs.extend(labels.zip(values));
    }

    if let (Ok(tr), Ok(cell)) = (Selector::parse("tr"), Selector::parse("th, td")) {
        for row in doc.select(&tr) {
            let cells: Vec<String> = row.select(&cell).map(element_text).collect();
            if let [label, value] = cells.as_slice() {
                pairs.push((label.clone(), value.clone()));
            }
        }
    }

    pairs
        .into_iter()
        .map(|(l, v)| (l.to_lowercase(), v))
        .collect()
}

/// "27.31 - 27.61" → (27.31, 27.61)
fn parse_range(s: &str) -> (f64, f64) {
    match s.split_once(" - ").or_else(|| s.split_once('-')) {
        Some((lo, hi)) => (num(Some(lo)), num(Some(hi))),
        None => (0.0, 0.0),
    }
}

fn parse_quote_page(symbol: &str, ticker: &str, html: &str, now: DateTime<Utc>) -> Option<Quote> {
    let doc = Html::parse_document(html);

    let name = first_text(&doc, &["h1.companyName", "h1.name", "[class*=companyName]", "h1"])
        .unwrap_or_default();
    let price = num(first_text(&doc, &[".priceText", "[class*=priceText]", ".price"]).as_deref());
    if price == 0.0 {
        return None;
    }

    let mut q = Quote {
        symbol: symbol.to_string(),
        name,
        exchange: ticker.rsplit(':').next().unwrap_or_default().to_string(),
        updated: now,
        last_trade_price: price,
        change: num(first_text(&doc, &["[class*=changeAbsolute]", ".change"]).as_deref()),
        change_percent: pct(first_text(&doc, &["[class*=changePercent]", ".change-percent"]).as_deref()),
        ..Default::default()
    };

    for (label, value) in labelled_values(&doc) {
        let v = Some(value.as_str());
        match label.as_str() {
            "open" => q.open = num(v),
            "prev close" | "previous close" => q.previous_close = num(v),
            "bid" => q.bid = num(v),
            "ask" => q.ask = num(v),
            "volume" => q.volume = parse_volume_shorthand(&value).unwrap_or(0),
            l if l.starts_with("average volume") => {
                q.avg_daily_volume = parse_volume_shorthand(&value).unwrap_or(0)
            }
            l if l.starts_with("day range") => {
                (q.day_low, q.day_high) = parse_range(&value);
            }
            l if l.starts_with("52wk range") || l.starts_with("52 week range") => {
                (q.year_low, q.year_high) = parse_range(&value);
            }
            l if l.starts_with("p/e") || l.starts_with("price/earnings") => q.pe_ratio = num(v),
            l if l.starts_with("earnings per share") || l.starts_with("eps") => {
                q.earnings_per_share = num(v)
            }
            l if l.contains("yield") => q.dividend_yield = yield_fraction(v),
            l if l.starts_with("dividend") || l.starts_with("last dividend") => {
                q.dividend_per_share = num(v)
            }
            l if l.starts_with("50d") || l.starts_with("50-day") => q.ma50 = num(v),
            l if l.starts_with("200d") || l.starts_with("200-day") => q.ma200 = num(v),
            _ => {}
        }
    }

    Some(q)
}

// ── Source ────────────────────────────────────────────────────────────────────

pub struct Bloomberg {
    client: HttpClient,
    base_url: String,
}

impl Bloomberg {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(NAME, config)?,
            base_url: config.bloomberg_url.trim_end_matches('/').to_string(),
        })
    }

    fn quote_url(&self, ticker: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, ticker);
        Url::parse(&raw).map_err(|e| Error::fetch(NAME, format!("bad quote url {raw}: {e}")))
    }
}

#[async_trait]
impl Source for Bloomberg {
    fn name(&self) -> &str {
        NAME
    }

    async fn quote(&self, symbols: &[String]) -> Result<Quotes> {
        let symbols = unique_symbols(symbols);
        let mut quotes = Quotes::new();

        for symbol in &symbols {
            let ticker = bloomberg_ticker(symbol);
            let Some(html) = self.client.get_text_opt(&self.quote_url(&ticker)?).await? else {
                debug!("{} ({}): no quote page", symbol, ticker);
                continue;
            };
            match parse_quote_page(symbol, &ticker, &html, Utc::now()) {
                Some(q) => {
                    quotes.insert(symbol.clone(), q);
                }
                None => debug!("{} ({}): no price on page", symbol, ticker),
            }
        }

        info!("{}: {}/{} quotes resolved", NAME, quotes.len(), symbols.len());
        Ok(quotes)
    }

    async fn hist(&self, _symbols: &[String]) -> Result<Hist> {
        Err(Error::unsupported(NAME, Operation::Hist))
    }

    async fn hist_limit(&self, _symbols: &[String], start: NaiveDate, end: NaiveDate)
        -> Result<Hist> {
        ensure_range(start, end)?;
        Err(Error::unsupported(NAME, Operation::HistLimit))
    }

    async fn dividend_hist(&self, _symbols: &[String]) -> Result<DividendHist> {
        Err(Error::unsupported(NAME, Operation::DividendHist))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
