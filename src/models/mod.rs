use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ── Calendar date ─────────────────────────────────────────────────────────────

/// A date with only year, month and day.
///
/// Providers report dates in their own timezone (or none at all), so two
/// sources comparing the same ex-dividend day must not disagree because of
/// a time component. Serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonthDay(NaiveDate);

impl YearMonthDay {
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// Formats with a chrono format string, e.g. `%d/%m/%Y`.
    pub fn format(&self, fmt: &str) -> String {
        self.0.format(fmt).to_string()
    }
}

impl From<NaiveDate> for YearMonthDay {
    fn from(d: NaiveDate) -> Self {
        Self(d)
    }
}

/// Drops the time of day (taken in UTC).
impl From<DateTime<Utc>> for YearMonthDay {
    fn from(t: DateTime<Utc>) -> Self {
        Self(t.date_naive())
    }
}

impl fmt::Display for YearMonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Serialize for YearMonthDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonthDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

// ── Quote ─────────────────────────────────────────────────────────────────────

/// Point-in-time snapshot of one symbol.
///
/// Every `f64` field uses `0.0` for "not reported by the provider". That is
/// never a real price; consumers go through [`crate::metrics`] which treats
/// it as absence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub symbol: String, // e.g. VEUR.AS, Vanguard dev. europe on Amsterdam
    pub name: String,
    pub exchange: String,

    pub updated: DateTime<Utc>,

    pub volume: i64,
    pub avg_daily_volume: i64,

    pub pe_ratio: f64,
    pub earnings_per_share: f64,
    pub dividend_per_share: f64,
    /// Fraction, not percent: 0.031 is 3.1 %.
    pub dividend_yield: f64,
    pub dividend_ex_date: Option<YearMonthDay>,

    pub bid: f64,
    pub ask: f64,
    pub open: f64,
    pub previous_close: f64,
    pub last_trade_price: f64,
    pub change: f64,
    pub change_percent: f64,

    pub day_low: f64,
    pub day_high: f64,
    pub year_low: f64,
    pub year_high: f64,

    pub ma50: f64,
    pub ma200: f64,
}

impl Quote {
    /// Empty quote for `symbol`, stamped now. Adapters fill in the rest.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            updated: Utc::now(),
            ..Default::default()
        }
    }

    /// Canonical structured representation.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

// ── History ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HistEntry {
    pub date: YearMonthDay,
    pub open: f64,
    pub close: f64,
    pub adj_close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DividendEntry {
    pub date: YearMonthDay,
    pub dividends_per_share: f64,
}

/// Keyed by the symbols a provider resolved; unresolved ones are absent.
pub type Quotes = BTreeMap<String, Quote>;
pub type Hist = BTreeMap<String, Vec<HistEntry>>;
pub type DividendHist = BTreeMap<String, Vec<DividendEntry>>;

// ── Raw CSV rows ──────────────────────────────────────────────────────────────

/// Yahoo `quotes.csv` row, in the order of [`crate::source::yahoo_csv::QUOTE_FIELDS`].
#[derive(Debug, Clone, Default)]
pub struct RawQuoteRow {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub bid: Option<String>,
    pub ask: Option<String>,
    pub open: Option<String>,
    pub previous_close: Option<String>,
    pub last_trade: Option<String>,
    pub change: Option<String>,
    pub change_pct: Option<String>,
    pub day_low: Option<String>,
    pub day_high: Option<String>,
    pub year_low: Option<String>,
    pub year_high: Option<String>,
    pub ma50: Option<String>,
    pub ma200: Option<String>,
    pub volume: Option<String>,
    pub avg_volume: Option<String>,
    pub pe_ratio: Option<String>,
    pub eps: Option<String>,
    pub dividend_per_share: Option<String>,
    pub dividend_yield: Option<String>,
    pub ex_dividend_date: Option<String>,
}

/// Yahoo `table.csv` row: Date, Open, High, Low, Close, Volume, Adj Close
#[derive(Debug, Clone, Default)]
pub struct RawHistRow {
    pub date: Option<String>,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
    pub volume: Option<String>,
    pub adj_close: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_quote() -> Quote {
        Quote {
            symbol: "VEUR.AS".into(),
            name: "Vanguard FTSE Developed Europe".into(),
            exchange: "AMS".into(),
            updated: Utc.with_ymd_and_hms(2014, 3, 7, 15, 4, 5).unwrap(),
            volume: 12_345,
            avg_daily_volume: 9_876,
            pe_ratio: 17.3,
            earnings_per_share: 1.0 / 3.0,
            dividend_per_share: 0.912,
            dividend_yield: 0.0312,
            dividend_ex_date: YearMonthDay::new(2014, 3, 19),
            bid: 27.53,
            ask: 27.56,
            open: 27.4,
            previous_close: 27.38,
            last_trade_price: 27.55,
            change: 0.17,
            change_percent: 0.62,
            day_low: 27.31,
            day_high: 27.61,
            year_low: 22.105,
            year_high: 28.0,
            ma50: 27.1,
            ma200: 26.05,
        }
    }

    #[test]
    fn test_quote_json_round_trip() {
        let q = sample_quote();
        let json = q.to_json().unwrap();
        let back = Quote::from_json(&json).unwrap();

        assert_eq!(back, q);
        assert_eq!(back.earnings_per_share.to_bits(), q.earnings_per_share.to_bits());
        assert_eq!(back.year_low.to_bits(), q.year_low.to_bits());
        assert_eq!(back.dividend_ex_date, q.dividend_ex_date);
    }

    #[test]
    fn test_quote_json_uses_field_names() {
        let json = sample_quote().to_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["symbol"], "VEUR.AS");
        assert_eq!(v["dividend_ex_date"], "2014-03-19");
        assert_eq!(v["last_trade_price"], 27.55);
    }

    #[test]
    fn test_year_month_day_ignores_time_of_day() {
        let morning: YearMonthDay = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 1).unwrap().into();
        let evening: YearMonthDay = Utc.with_ymd_and_hms(2020, 6, 1, 23, 59, 59).unwrap().into();
        assert_eq!(morning, evening);
        assert_eq!(morning, YearMonthDay::new(2020, 6, 1).unwrap());
        assert_ne!(morning, YearMonthDay::new(2020, 6, 2).unwrap());
    }

    #[test]
    fn test_year_month_day_rejects_garbage() {
        let bad: Result<YearMonthDay, _> = serde_json::from_str("\"2020-13-01\"");
        assert!(bad.is_err());
        let ok: YearMonthDay = serde_json::from_str("\"2020-02-29\"").unwrap();
        assert_eq!((ok.year(), ok.month(), ok.day()), (2020, 2, 29));
    }
}
