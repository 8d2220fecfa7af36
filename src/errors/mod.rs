//! Failure values surfaced by sources and the metrics engine.
//!
//! Nothing in the crate retries. A batch where only some symbols resolved is
//! not an error; the missing symbols are simply absent from the result map.

use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// [`crate::source::Source`] operations a provider may lack. Every
/// provider serves quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Hist,
    HistLimit,
    DividendHist,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Hist => "hist",
            Operation::HistLimit => "hist_limit",
            Operation::DividendHist => "dividend_hist",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Transport or parse failure. The whole batch is lost.
    #[error("{provider}: fetch failed: {message}")]
    Fetch { provider: String, message: String },

    /// The provider cannot do this at all. Never degraded to empty data.
    #[error("source '{provider}' does not support action '{operation}'")]
    UnsupportedOperation {
        provider: String,
        operation: Operation,
    },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// A metric invoked outside its domain.
    #[error("cannot compute {metric}: {reason}")]
    Computation { metric: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn fetch(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Fetch {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn unsupported(provider: impl Into<String>, operation: Operation) -> Self {
        Error::UnsupportedOperation {
            provider: provider.into(),
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message_names_source_and_action() {
        let e = Error::unsupported("yahoo_csv", Operation::DividendHist);
        assert_eq!(
            e.to_string(),
            "source 'yahoo_csv' does not support action 'dividend_hist'"
        );
    }

    #[test]
    fn test_invalid_range_message() {
        let e = Error::InvalidRange {
            start: NaiveDate::from_ymd_opt(2011, 11, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2009, 11, 1).unwrap(),
        };
        assert_eq!(
            e.to_string(),
            "invalid date range: start 2011-11-01 is after end 2009-11-01"
        );
    }
}
