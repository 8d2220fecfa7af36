//! In-memory [`Source`] for tests.

use super::{Source, ensure_range, unique_symbols};
use crate::errors::{Error, Operation, Result};
use crate::models::{DividendHist, Hist, Quote, Quotes};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Mutex;

#[derive(Default)]
pub struct StubSource {
    pub quotes: Quotes,
    pub hist: Hist,
    pub dividends: Option<DividendHist>,
    /// Symbols asked for by each `quote` call.
    pub quote_calls: Mutex<Vec<Vec<String>>>,
}

impl StubSource {
    pub fn with_quotes(quotes: impl IntoIterator<Item = Quote>) -> Self {
        Self {
            quotes: quotes.into_iter().map(|q| (q.symbol.clone(), q)).collect(),
            ..Default::default()
        }
    }

    pub fn quote_call_count(&self) -> usize {
        self.quote_calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Source for StubSource {
    fn name(&self) -> &str {
        "stub"
    }

    async fn quote(&self, symbols: &[String]) -> Result<Quotes> {
        let symbols = unique_symbols(symbols);
        if let Ok(mut calls) = self.quote_calls.lock() {
            calls.push(symbols.clone());
        }
        Ok(symbols
            .iter()
            .filter_map(|s| self.quotes.get(s).map(|q| (s.clone(), q.clone())))
            .collect())
    }

    async fn hist(&self, symbols: &[String]) -> Result<Hist> {
        Ok(unique_symbols(symbols)
            .into_iter()
            .filter_map(|s| self.hist.get(&s).cloned().map(|h| (s, h)))
            .collect())
    }

    async fn hist_limit(&self, symbols: &[String], start: NaiveDate, end: NaiveDate)
        -> Result<Hist> {
        ensure_range(start, end)?;
        let mut hist = self.hist(symbols).await?;
        for entries in hist.values_mut() {
            entries.retain(|e| (start..=end).contains(&e.date.as_naive()));
        }
        Ok(hist)
    }

    async fn dividend_hist(&self, symbols: &[String]) -> Result<DividendHist> {
        let Some(dividends) = &self.dividends else {
            return Err(Error::unsupported("stub", Operation::DividendHist));
        };
        Ok(unique_symbols(symbols)
            .into_iter()
            .filter_map(|s| dividends.get(&s).cloned().map(|d| (s, d)))
            .collect())
    }
}
