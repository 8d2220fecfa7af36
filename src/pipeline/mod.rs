//! Pipeline orchestrator: ties a source to the metrics engine.
//!
//! Each command runs the same three steps:
//!   1. Ask the configured [`Source`] for the symbols
//!   2. Derive metrics (analyses for quotes, moving averages for history)
//!   3. Hand the result to the report renderer or the JSON dump
//!
//! Symbols the source could not resolve are reported, not treated as errors.

use crate::metrics::{AnalysisParams, QuoteAnalysis, moving_average};
use crate::models::{DividendEntry, HistEntry, Quote};
use crate::source::{Source, unique_symbols};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

pub struct Pipeline {
    source: Box<dyn Source>,
    params: AnalysisParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysedQuote {
    pub quote: Quote,
    pub analysis: QuoteAnalysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolHist {
    pub symbol: String,
    pub entries: Vec<HistEntry>,
    pub moving_average: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolDividends {
    pub symbol: String,
    pub entries: Vec<DividendEntry>,
}

/// Output of one run, in request order.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub found: Vec<T>,
    pub missing: Vec<String>,
}

impl<T> Outcome<T> {
    fn log(&self, what: &str) {
        info!("{}: {} found, {} missing", what, self.found.len(), self.missing.len());
        if !self.missing.is_empty() {
            warn!("No {} for: {}", what, self.missing.join(", "));
        }
    }
}

impl Pipeline {
    pub fn new(source: Box<dyn Source>, params: AnalysisParams) -> Self {
        Self { source, params }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub async fn quotes(&self, symbols: &[String]) -> Result<Outcome<AnalysedQuote>> {
        let symbols = unique_symbols(symbols);
        info!("Requesting {} quote(s) from {}", symbols.len(), self.source.name());

        let mut quotes = self
            .source
            .quote(&symbols)
            .await
            .with_context(|| format!("quote lookup via {}", self.source.name()))?;

        let mut outcome = Outcome { found: Vec::new(), missing: Vec::new() };
        for symbol in symbols {
            let Some(quote) = quotes.remove(&symbol) else {
                outcome.missing.push(symbol);
                continue;
            };
            let analysis = QuoteAnalysis::from_quote(&quote, &self.params)
                .with_context(|| format!("analysing {symbol}"))?;
            outcome.found.push(AnalysedQuote { quote, analysis });
        }

        outcome.log("quotes");
        Ok(outcome)
    }

    /// Full history, or the inclusive `[start, end]` window when given.
    pub async fn hist(
        &self,
        symbols: &[String],
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Outcome<SymbolHist>> {
        let symbols = unique_symbols(symbols);
        let mut hist = match range {
            Some((start, end)) => {
                info!("Requesting history {} → {} from {}", start, end, self.source.name());
                self.source.hist_limit(&symbols, start, end).await
            }
            None => {
                info!("Requesting full history from {}", self.source.name());
                self.source.hist(&symbols).await
            }
        }
        .with_context(|| format!("history lookup via {}", self.source.name()))?;

        let mut outcome = Outcome { found: Vec::new(), missing: Vec::new() };
        for symbol in symbols {
            match hist.remove(&symbol) {
                Some(entries) => {
                    let moving_average = moving_average(&entries);
                    outcome.found.push(SymbolHist { symbol, entries, moving_average });
                }
                None => outcome.missing.push(symbol),
            }
        }

        outcome.log("history");
        Ok(outcome)
    }

    pub async fn dividends(&self, symbols: &[String]) -> Result<Outcome<SymbolDividends>> {
        let symbols = unique_symbols(symbols);
        info!("Requesting dividend history from {}", self.source.name());

        let mut divs = self
            .source
            .dividend_hist(&symbols)
            .await
            .with_context(|| format!("dividend lookup via {}", self.source.name()))?;

        let mut outcome = Outcome { found: Vec::new(), missing: Vec::new() };
        for symbol in symbols {
            match divs.remove(&symbol) {
                Some(entries) => outcome.found.push(SymbolDividends { symbol, entries }),
                None => outcome.missing.push(symbol),
            }
        }

        outcome.log("dividends");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::metrics::{TrendSignal, ValuationTier};
    use crate::models::{Hist, YearMonthDay};
    use crate::source::stub::StubSource;

    fn symbols(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    fn aapl() -> Quote {
        Quote {
            name: "Apple Inc.".into(),
            ask: 150.0,
            last_trade_price: 148.0,
            previous_close: 145.0,
            ma200: 0.0,
            pe_ratio: 0.0,
            ..Quote::new("AAPL")
        }
    }

    fn entry(y: i32, m: u32, d: u32, close: f64) -> HistEntry {
        HistEntry {
            date: YearMonthDay::new(y, m, d).unwrap(),
            open: close,
            close,
            adj_close: close,
            high: close,
            low: close,
            volume: 1_000,
        }
    }

    #[tokio::test]
    async fn test_quote_end_to_end() {
        let pipeline = Pipeline::new(
            Box::new(StubSource::with_quotes([aapl()])),
            AnalysisParams::default(),
        );

        let out = pipeline.quotes(&symbols(&["AAPL", "NOPE"])).await.unwrap();
        assert_eq!(out.missing, vec!["NOPE".to_string()]);
        assert_eq!(out.found.len(), 1);

        let a = &out.found[0].analysis;
        assert_eq!(a.symbol, "AAPL");
        assert_eq!(a.price, 150.0);
        assert_eq!(a.variation, 3.0);
        assert!(a.is_increasing);
        assert_eq!(a.valuation_tier, ValuationTier::NotApplicable);
        assert_eq!(a.trend_signal, TrendSignal::NotApplicable);
        assert_eq!(a.bid_ask_spread, None);
    }

    #[tokio::test]
    async fn test_unpriced_quote_does_not_sink_the_batch() {
        let pipeline = Pipeline::new(
            Box::new(StubSource::with_quotes([
                Quote { ask: 10.0, ..Quote::new("GOOD") },
                Quote { name: "Bad Feed".into(), ask: -1.0, ..Quote::new("BAD") },
            ])),
            AnalysisParams::default(),
        );

        let out = pipeline.quotes(&symbols(&["GOOD", "BAD"])).await.unwrap();
        assert!(out.missing.is_empty());
        assert_eq!(out.found.len(), 2);
        assert!(out.found[0].analysis.shares_to_buy.is_some());
        assert_eq!(out.found[1].quote.symbol, "BAD");
        assert_eq!(out.found[1].analysis.shares_to_buy, None);
    }

    #[tokio::test]
    async fn test_quotes_keep_request_order() {
        let pipeline = Pipeline::new(
            Box::new(StubSource::with_quotes([aapl(), Quote { ask: 10.0, ..Quote::new("ABI.BR") }])),
            AnalysisParams::default(),
        );
        let out = pipeline.quotes(&symbols(&["ABI.BR", "AAPL", "ABI.BR"])).await.unwrap();
        let order: Vec<_> = out.found.iter().map(|q| q.quote.symbol.as_str()).collect();
        assert_eq!(order, ["ABI.BR", "AAPL"]);
    }

    #[tokio::test]
    async fn test_hist_with_moving_average() {
        let mut stub = StubSource::default();
        stub.hist = Hist::from([(
            "AAPL".to_string(),
            vec![entry(2011, 10, 28, 10.0), entry(2011, 10, 31, 20.0), entry(2011, 11, 30, 90.0)],
        )]);
        let pipeline = Pipeline::new(Box::new(stub), AnalysisParams::default());

        let all = pipeline.hist(&symbols(&["AAPL"]), None).await.unwrap();
        assert_eq!(all.found[0].entries.len(), 3);
        assert_eq!(all.found[0].moving_average, 40.0);

        let start = NaiveDate::from_ymd_opt(2011, 10, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2011, 10, 31).unwrap();
        let october = pipeline.hist(&symbols(&["AAPL"]), Some((start, end))).await.unwrap();
        assert_eq!(october.found[0].entries.len(), 2);
        assert_eq!(october.found[0].moving_average, 15.0);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let pipeline = Pipeline::new(Box::new(StubSource::default()), AnalysisParams::default());
        let start = NaiveDate::from_ymd_opt(2012, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2011, 1, 1).unwrap();

        let err = pipeline.hist(&symbols(&["AAPL"]), Some((start, end))).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_unsupported_dividends_surface_as_error() {
        let pipeline = Pipeline::new(Box::new(StubSource::default()), AnalysisParams::default());
        let err = pipeline.dividends(&symbols(&["BELG.BR"])).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnsupportedOperation { .. })));
    }
}
