pub mod bloomberg;
pub mod chart;
pub mod cleaner;
pub mod http_client;
pub mod yahoo_csv;
pub mod yahoo_yql;

#[cfg(test)]
pub mod stub;

use crate::config::SourceConfig;
use crate::errors::{Error, Result};
use crate::models::{DividendHist, Hist, Quotes};
use async_trait::async_trait;
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use self::bloomberg::Bloomberg;
use self::yahoo_csv::YahooCsv;
use self::yahoo_yql::YahooYql;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Uniform contract over every market data provider.
///
/// Symbols are free-form and order-insensitive. A symbol the provider cannot
/// resolve is left out of the result map; only a failure of the retrieval
/// itself fails the whole call.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    async fn quote(&self, symbols: &[String]) -> Result<Quotes>;

    /// Full available history.
    async fn hist(&self, symbols: &[String]) -> Result<Hist>;

    /// History between `start` and `end`, both inclusive. Fails with
    /// [`Error::InvalidRange`] before fetching if `start > end`.
    async fn hist_limit(&self, symbols: &[String], start: NaiveDate, end: NaiveDate)
        -> Result<Hist>;

    async fn dividend_hist(&self, symbols: &[String]) -> Result<DividendHist>;
}

#[async_trait]
impl<S: Source + ?Sized> Source for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn quote(&self, symbols: &[String]) -> Result<Quotes> {
        (**self).quote(symbols).await
    }

    async fn hist(&self, symbols: &[String]) -> Result<Hist> {
        (**self).hist(symbols).await
    }

    async fn hist_limit(&self, symbols: &[String], start: NaiveDate, end: NaiveDate)
        -> Result<Hist> {
        (**self).hist_limit(symbols, start, end).await
    }

    async fn dividend_hist(&self, symbols: &[String]) -> Result<DividendHist> {
        (**self).dividend_hist(symbols).await
    }
}

pub fn ensure_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(Error::InvalidRange { start, end });
    }
    Ok(())
}

/// Trimmed, non-empty, first occurrence kept.
pub fn unique_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}

/// Provider echoes may differ in case from what was asked for; results are
/// keyed by the caller's spelling.
pub fn requested_key<'a>(requested: &'a [String], returned: &str) -> Option<&'a str> {
    requested
        .iter()
        .find(|s| s.eq_ignore_ascii_case(returned.trim()))
        .map(String::as_str)
}

// ── Source selection ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[value(name = "bloomberg")]
    Bloomberg,
    #[value(name = "yahoo_yql")]
    YahooYql,
    #[value(name = "yahoo_csv")]
    YahooCsv,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Bloomberg, SourceKind::YahooYql, SourceKind::YahooCsv];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Bloomberg => "bloomberg",
            SourceKind::YahooYql => "yahoo_yql",
            SourceKind::YahooCsv => "yahoo_csv",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown source '{0}', expected one of: bloomberg, yahoo_yql, yahoo_csv")]
pub struct UnknownSource(String);

impl FromStr for SourceKind {
    type Err = UnknownSource;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

/// Resolve a provider name to its implementation.
pub fn build_source(kind: SourceKind, config: &SourceConfig) -> Result<Box<dyn Source>> {
    Ok(match kind {
        SourceKind::Bloomberg => Box::new(Bloomberg::new(config)?),
        SourceKind::YahooYql => Box::new(YahooYql::new(config)?),
        SourceKind::YahooCsv => Box::new(YahooCsv::new(config)?),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("bloomberg".parse::<SourceKind>().unwrap(), SourceKind::Bloomberg);
        assert_eq!("yahoo_yql".parse::<SourceKind>().unwrap(), SourceKind::YahooYql);
        assert_eq!(" yahoo_csv ".parse::<SourceKind>().unwrap(), SourceKind::YahooCsv);
        assert!("reuters".parse::<SourceKind>().is_err());
        assert!("yahoo-yql".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_source_kind_names_round_trip() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.to_string().parse::<SourceKind>().unwrap(), kind);
            assert_eq!(
                <SourceKind as ValueEnum>::from_str(kind.as_str(), false).ok(),
                Some(kind),
                "clap name for {kind}"
            );
        }
    }

    #[test]
    fn test_ensure_range() {
        let a = NaiveDate::from_ymd_opt(2009, 11, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2011, 11, 1).unwrap();
        assert!(ensure_range(a, b).is_ok());
        assert!(ensure_range(a, a).is_ok());
        assert!(matches!(ensure_range(b, a), Err(Error::InvalidRange { .. })));
    }

    #[test]
    fn test_unique_symbols() {
        let input: Vec<String> = ["AAPL", " VEUR.AS", "AAPL", "", "KBC.BR"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(unique_symbols(&input), vec!["AAPL", "VEUR.AS", "KBC.BR"]);
    }

    #[test]
    fn test_requested_key_matches_case_insensitively() {
        let req = vec!["veur.as".to_string(), "AAPL".to_string()];
        assert_eq!(requested_key(&req, "VEUR.AS"), Some("veur.as"));
        assert_eq!(requested_key(&req, "MSFT"), None);
    }

    #[tokio::test]
    async fn test_every_source_rejects_inverted_range_before_fetching() {
        let cfg = SourceConfig {
            // Unroutable: a fetch attempt would fail with Fetch, not InvalidRange.
            yql_url: "http://127.0.0.1:9/yql".into(),
            csv_quotes_url: "http://127.0.0.1:9/quotes.csv".into(),
            csv_hist_url: "http://127.0.0.1:9/table.csv".into(),
            bloomberg_url: "http://127.0.0.1:9/quote".into(),
            ..SourceConfig::default()
        };
        let start = NaiveDate::from_ymd_opt(2011, 11, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2009, 11, 1).unwrap();
        let symbols = vec!["AAPL".to_string()];

        for kind in SourceKind::ALL {
            let src = build_source(kind, &cfg).unwrap();
            let err = src.hist_limit(&symbols, start, end).await.unwrap_err();
            assert!(matches!(err, Error::InvalidRange { .. }), "{kind}: {err}");
        }
    }
}
