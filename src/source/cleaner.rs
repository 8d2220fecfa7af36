use crate::models::{HistEntry, Quote, RawHistRow, RawQuoteRow, YearMonthDay};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::warn;

// ── Parsers ───────────────────────────────────────────────────────────────────

fn is_missing(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("n/a") || s == "-" || s == "—" || s == "--"
}

/// Parse a number: strip everything except digits, dot, minus.
/// "EUR 1,234.56" → 1234.56 | "+0.17" → 0.17 | "N/A" → None
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim().trim_matches('"');
    if is_missing(s) {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// Absent or unparsable values become the `0.0` sentinel.
pub fn num(s: Option<&str>) -> f64 {
    s.and_then(parse_number).unwrap_or(0.0)
}

/// Parse volume with K/M/B suffixes.
/// "1.2M" → 1,200,000 | "345K" → 345,000 | "12,345" → 12345
pub fn parse_volume_shorthand(s: &str) -> Option<i64> {
    let s = s.trim().to_uppercase().replace(',', "");

    if is_missing(&s) {
        return None;
    }

    let (num_str, multiplier) = if s.ends_with('B') {
        (s.trim_end_matches('B'), 1_000_000_000.0)
    } else if s.ends_with('M') {
        (s.trim_end_matches('M'), 1_000_000.0)
    } else if s.ends_with('K') {
        (s.trim_end_matches('K'), 1_000.0)
    } else {
        let cleaned: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
        return cleaned.parse().ok();
    };

    let num: f64 = num_str.trim().parse().ok()?;
    Some((num * multiplier) as i64)
}

pub fn volume(s: Option<&str>) -> i64 {
    s.and_then(parse_volume_shorthand).unwrap_or(0)
}

/// "+1.23%" → 1.23
pub fn parse_pct(s: &str) -> Option<f64> {
    let s = s.trim().replace(['%', ',', '+'], "");
    if is_missing(&s) {
        return None;
    }
    s.parse().ok()
}

pub fn pct(s: Option<&str>) -> f64 {
    s.and_then(parse_pct).unwrap_or(0.0)
}

/// Providers quote yields in percent; the model stores a fraction.
pub fn yield_fraction(s: Option<&str>) -> f64 {
    pct(s) / 100.0
}

/// Dates with a year. US month-first layouts are tried before day-first,
/// so "03/04/2014" is March 4th.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim().trim_matches('"');
    if is_missing(s) {
        return None;
    }

    const FORMATS: [&str; 6] = ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%b %d, %Y", "%d %b %Y", "%b %d %Y"];
    FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

/// Like [`parse_date`], but also accepts a yearless "Mar 19", placed in the
/// most recent year that does not put it after `today`.
pub fn parse_date_near(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(d) = parse_date(s) {
        return Some(d);
    }

    let s = s.trim().trim_matches('"');
    let this_year = NaiveDate::parse_from_str(&format!("{s} {}", today.year()), "%b %d %Y")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{s} {}", today.year()), "%d %b %Y"))
        .ok()?;

    if this_year > today {
        this_year.with_year(today.year() - 1)
    } else {
        Some(this_year)
    }
}

pub fn text(s: Option<&str>) -> String {
    s.map(|s| s.trim().trim_matches('"'))
        .filter(|s| !is_missing(s))
        .unwrap_or_default()
        .to_string()
}

// ── quotes.csv row → Quote ────────────────────────────────────────────────────

/// `None` when the provider did not recognise the symbol (no name and no
/// last trade).
pub fn raw_quote_row_to_quote(
    symbol: &str,
    row: &RawQuoteRow,
    now: DateTime<Utc>,
) -> Option<Quote> {
    let name = text(row.name.as_deref());
    let last = num(row.last_trade.as_deref());
    if name.is_empty() && last == 0.0 {
        return None;
    }

    Some(Quote {
        symbol: symbol.to_string(),
        name,
        exchange: text(row.exchange.as_deref()),
        updated: now,
        volume: volume(row.volume.as_deref()),
        avg_daily_volume: volume(row.avg_volume.as_deref()),
        pe_ratio: num(row.pe_ratio.as_deref()),
        earnings_per_share: num(row.eps.as_deref()),
        dividend_per_share: num(row.dividend_per_share.as_deref()),
        dividend_yield: yield_fraction(row.dividend_yield.as_deref()),
        dividend_ex_date: row
            .ex_dividend_date
            .as_deref()
            .and_then(|s| parse_date_near(s, now.date_naive()))
            .map(YearMonthDay::from),
        bid: num(row.bid.as_deref()),
        ask: num(row.ask.as_deref()),
        open: num(row.open.as_deref()),
        previous_close: num(row.previous_close.as_deref()),
        last_trade_price: last,
        change: num(row.change.as_deref()),
        change_percent: pct(row.change_pct.as_deref()),
        day_low: num(row.day_low.as_deref()),
        day_high: num(row.day_high.as_deref()),
        year_low: num(row.year_low.as_deref()),
        year_high: num(row.year_high.as_deref()),
        ma50: num(row.ma50.as_deref()),
        ma200: num(row.ma200.as_deref()),
    })
}

// ── table.csv row → HistEntry ─────────────────────────────────────────────────

pub fn raw_hist_row_to_entry(symbol: &str, row: &RawHistRow) -> Option<HistEntry> {
    let date = parse_date(row.date.as_deref()?)?;
    let close = parse_number(row.close.as_deref()?)?;

    if close <= 0.0 {
        warn!("Invalid close {} for {} on {}", close, symbol, date);
        return None;
    }

    Some(HistEntry {
        date: date.into(),
        open: num(row.open.as_deref()),
        close,
        adj_close: num(row.adj_close.as_deref()),
        high: num(row.high.as_deref()),
        low: num(row.low.as_deref()),
        volume: volume(row.volume.as_deref()),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("EUR 1,234.56"), Some(1234.56));
        assert_eq!(parse_number("+0.17"), Some(0.17));
        assert_eq!(parse_number("-2.5"), Some(-2.5));
        assert_eq!(parse_number("\"27.55\""), Some(27.55));
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(num(None), 0.0);
        assert_eq!(num(Some("n/a")), 0.0);
    }

    #[test]
    fn test_parse_volume_shorthand() {
        assert_eq!(parse_volume_shorthand("1.2M"), Some(1_200_000));
        assert_eq!(parse_volume_shorthand("345K"), Some(345_000));
        assert_eq!(parse_volume_shorthand("1.5B"), Some(1_500_000_000));
        assert_eq!(parse_volume_shorthand("12,345"), Some(12345));
        assert_eq!(volume(Some("N/A")), 0);
    }

    #[test]
    fn test_pct_and_yield() {
        assert_eq!(parse_pct("+1.23%"), Some(1.23));
        assert_eq!(parse_pct("-0.5%"), Some(-0.5));
        assert_eq!(yield_fraction(Some("3.12")), 3.12 / 100.0);
        assert_eq!(yield_fraction(Some("N/A")), 0.0);
    }

    #[test]
    fn test_parse_date_formats() {
        let d = NaiveDate::from_ymd_opt(2014, 3, 4).unwrap();
        assert_eq!(parse_date("2014-03-04"), Some(d));
        assert_eq!(parse_date("3/4/2014"), Some(d));
        assert_eq!(parse_date("Mar 4, 2014"), Some(d));
        assert_eq!(parse_date("4 Mar 2014"), Some(d));
        assert_eq!(parse_date("25/03/2014"), NaiveDate::from_ymd_opt(2014, 3, 25));
        assert_eq!(parse_date("N/A"), None);
    }

    #[test]
    fn test_parse_yearless_date() {
        let today = NaiveDate::from_ymd_opt(2014, 6, 1).unwrap();
        assert_eq!(parse_date_near("Mar 19", today), NaiveDate::from_ymd_opt(2014, 3, 19));
        assert_eq!(parse_date_near("Dec 19", today), NaiveDate::from_ymd_opt(2013, 12, 19));
        assert_eq!(parse_date_near("2012-01-05", today), NaiveDate::from_ymd_opt(2012, 1, 5));
        assert_eq!(parse_date_near("soon", today), None);
    }

    #[test]
    fn test_unknown_symbol_row_is_dropped() {
        let now = Utc.with_ymd_and_hms(2014, 6, 1, 12, 0, 0).unwrap();
        let row = RawQuoteRow {
            symbol: Some("NOPE".into()),
            name: Some("N/A".into()),
            last_trade: Some("0.00".into()),
            ..Default::default()
        };
        assert!(raw_quote_row_to_quote("NOPE", &row, now).is_none());
    }

    #[test]
    fn test_quote_row_normalisation() {
        let now = Utc.with_ymd_and_hms(2014, 6, 1, 12, 0, 0).unwrap();
        let row = RawQuoteRow {
            symbol: Some("ABI.BR".into()),
            name: Some("ANHEUSER-BUSCH IN".into()),
            exchange: Some("Brussels".into()),
            ask: Some("N/A".into()),
            last_trade: Some("79.50".into()),
            previous_close: Some("78.90".into()),
            change_pct: Some("+0.76%".into()),
            dividend_yield: Some("2.57".into()),
            ex_dividend_date: Some("May  2".into()),
            volume: Some("1,234,567".into()),
            ..Default::default()
        };
        let q = raw_quote_row_to_quote("ABI.BR", &row, now).unwrap();
        assert_eq!(q.symbol, "ABI.BR");
        assert_eq!(q.ask, 0.0);
        assert_eq!(q.last_trade_price, 79.5);
        assert_eq!(q.change_percent, 0.76);
        assert_eq!(q.dividend_yield, 2.57 / 100.0);
        assert_eq!(q.volume, 1_234_567);
        assert_eq!(q.bid, 0.0);
        assert_eq!(q.dividend_ex_date, YearMonthDay::new(2014, 5, 2));
        assert_eq!(q.updated, now);
    }

    #[test]
    fn test_hist_row() {
        let row = RawHistRow {
            date: Some("2014-03-07".into()),
            open: Some("27.40".into()),
            high: Some("27.61".into()),
            low: Some("27.31".into()),
            close: Some("27.55".into()),
            volume: Some("12300".into()),
            adj_close: Some("27.01".into()),
        };
        let e = raw_hist_row_to_entry("VEUR.AS", &row).unwrap();
        assert_eq!(e.date, YearMonthDay::new(2014, 3, 7).unwrap());
        assert_eq!(e.close, 27.55);
        assert_eq!(e.adj_close, 27.01);
        assert_eq!(e.volume, 12300);

        let bad = RawHistRow { close: Some("0".into()), ..row };
        assert!(raw_hist_row_to_entry("VEUR.AS", &bad).is_none());
    }
}
