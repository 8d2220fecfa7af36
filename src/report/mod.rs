//! Plain-text rendering of pipeline output.

use crate::pipeline::{AnalysedQuote, SymbolDividends, SymbolHist};
use crate::source::chart::{ChartPeriod, chart_url};
use crate::utils::fmt_number;
use std::fmt;

pub const SEPARATOR: &str = "======================";

fn arrow(up: bool) -> &'static str {
    if up { "↑" } else { "↓" }
}

pub fn write_quote(
    out: &mut impl fmt::Write,
    item: &AnalysedQuote,
    chart: ChartPeriod,
    desired_tx_cost_fraction: f64,
) -> fmt::Result {
    let q = &item.quote;
    let a = &item.analysis;

    writeln!(
        out,
        "name: {} ({}), {:+.2} {:+.2}% {} (chart: {})",
        q.name,
        q.symbol,
        a.variation,
        a.variation_percent,
        arrow(a.is_increasing),
        chart_url(&q.symbol, chart),
    )?;

    if let (Some(spread), Some(pct)) = (a.bid_ask_spread, a.bid_ask_spread_percent) {
        writeln!(
            out,
            "bid/ask: {:.2}/{:.2}, spread: {:.2} ({:.2}%)",
            q.bid,
            q.ask,
            spread,
            pct * 100.0
        )?;
        match (a.spread_acceptable, a.limit_order_price) {
            (Some(true), Some(limit)) => writeln!(
                out,
                "if you want to buy this stock, place a limit order at about {limit:.4}"
            )?,
            _ => writeln!(out, "CAUTION: the spread of this stock is rather high")?,
        }
    }

    writeln!(
        out,
        "prev_close/open/last_trade: {:.2}/{:.2}/{:.2}",
        q.previous_close, q.open, q.last_trade_price
    )?;
    writeln!(out, "day low/high: {:.2}/{:.2} ({:.2})", q.day_low, q.day_high, a.day_range)?;
    writeln!(
        out,
        "year low/high: {:.2}/{:.2} ({:.2})",
        q.year_low, q.year_high, a.year_range
    )?;
    writeln!(out, "moving avg. 50/200: {:.2}/{:.2}", q.ma50, q.ma200)?;
    writeln!(
        out,
        "volume: {} (avg. {})",
        fmt_number(q.volume),
        fmt_number(q.avg_daily_volume)
    )?;

    let ex_date = q
        .dividend_ex_date
        .map(|d| d.format("%d/%m"))
        .unwrap_or_else(|| "-".to_string());
    writeln!(
        out,
        "last ex-dividend: {}, div. per share: {:.2}, div. yield: {:.2}%{}",
        ex_date,
        q.dividend_per_share,
        q.dividend_yield * 100.0,
        if a.attractive_yield { " (attractive)" } else { "" },
    )?;
    writeln!(
        out,
        "earnings per share: {:.2}, dividend payout ratio: {:.2}",
        q.earnings_per_share, a.dividend_payout_ratio
    )?;

    if let (Some(n), Some(cost)) = (a.shares_to_buy, a.shares_cost) {
        writeln!(
            out,
            "You would need to buy {} (€ {:.2}) shares of this stock to reach a transaction cost below {}%",
            n,
            cost,
            desired_tx_cost_fraction * 100.0
        )?;
    }

    if q.pe_ratio != 0.0 {
        writeln!(
            out,
            "The P/E-ratio is {:.2}, {}",
            q.pe_ratio,
            a.valuation_tier.description()
        )?;
    }

    if q.ma200 != 0.0 {
        writeln!(out, "trend (prev. close vs MA200): {}", a.trend_signal)?;
    }

    writeln!(out, "{SEPARATOR}")
}

pub fn write_hist(out: &mut impl fmt::Write, h: &SymbolHist) -> fmt::Result {
    writeln!(out, "{}\n{}", h.symbol, SEPARATOR)?;
    writeln!(out, "Length: {}", h.entries.len())?;
    for e in &h.entries {
        writeln!(
            out,
            "{}: {:.2} (open {:.2}, high {:.2}, low {:.2}, volume {})",
            e.date.format("%d/%m/%Y"),
            e.close,
            e.open,
            e.high,
            e.low,
            fmt_number(e.volume)
        )?;
    }
    writeln!(out, "Moving average: {:.4}", h.moving_average)
}

pub fn write_dividends(out: &mut impl fmt::Write, d: &SymbolDividends) -> fmt::Result {
    writeln!(out, "{}\n{}", d.symbol, SEPARATOR)?;
    writeln!(out, "Length: {}", d.entries.len())?;
    for e in &d.entries {
        writeln!(out, "{} {}", e.date.format("%d-%m-%Y"), e.dividends_per_share)?;
    }
    Ok(())
}

pub fn write_missing(out: &mut impl fmt::Write, missing: &[String]) -> fmt::Result {
    if missing.is_empty() {
        return Ok(());
    }
    writeln!(out, "not resolved: {}", missing.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{AnalysisParams, QuoteAnalysis};
    use crate::models::{DividendEntry, HistEntry, Quote, YearMonthDay};

    fn analysed(q: Quote) -> AnalysedQuote {
        let analysis = QuoteAnalysis::from_quote(&q, &AnalysisParams::default()).unwrap();
        AnalysedQuote { quote: q, analysis }
    }

    fn render(write: impl FnOnce(&mut String) -> fmt::Result) -> String {
        let mut out = String::new();
        write(&mut out).unwrap();
        out
    }

    fn render_quote(item: &AnalysedQuote) -> String {
        render(|out| write_quote(out, item, ChartPeriod::Year2, 0.01))
    }

    #[test]
    fn test_quote_report_full() {
        let q = Quote {
            name: "KBC GROEP".into(),
            bid: 44.10,
            ask: 44.12,
            previous_close: 43.72,
            last_trade_price: 44.12,
            pe_ratio: 12.3,
            ma200: 40.01,
            volume: 1_234_567,
            dividend_ex_date: YearMonthDay::new(2024, 5, 6),
            ..Quote::new("KBC.BR")
        };
        let text = render_quote(&analysed(q));

        assert!(text.starts_with("name: KBC GROEP (KBC.BR), +0.40 +0.91% ↑"), "{text}");
        assert!(text.contains("chart: https://chart.finance.yahoo.com/z?s=KBC.BR&t=2y"));
        assert!(text.contains("bid/ask: 44.10/44.12, spread: 0.02"));
        assert!(text.contains("place a limit order at about 44.1100"));
        assert!(text.contains("volume: 1,234,567"));
        assert!(text.contains("last ex-dividend: 06/05"));
        assert!(text.contains("The P/E-ratio is 12.30, fair value"));
        assert!(text.contains("BUY position"));
        assert!(text.trim_end().ends_with(SEPARATOR));
    }

    #[test]
    fn test_quote_report_skips_absent_blocks() {
        let q = Quote {
            name: "Apple Inc.".into(),
            ask: 150.0,
            last_trade_price: 140.0,
            previous_close: 145.0,
            ..Quote::new("AAPL")
        };
        let text = render_quote(&analysed(q));

        assert!(text.contains("-5.00 -3.45% ↓"), "{text}");
        assert!(!text.contains("bid/ask"));
        assert!(!text.contains("P/E-ratio"));
        assert!(!text.contains("trend"));
        assert!(text.contains("last ex-dividend: -"));
        assert!(text.contains("You would need to buy"));
    }

    #[test]
    fn test_wide_spread_gets_caution() {
        let q = Quote { bid: 10.0, ask: 11.0, ..Quote::new("X") };
        let text = render_quote(&analysed(q));
        assert!(text.contains("CAUTION"));
        assert!(!text.contains("limit order"));
    }

    #[test]
    fn test_hist_and_dividend_rows() {
        let h = SymbolHist {
            symbol: "AAPL".into(),
            entries: vec![HistEntry {
                date: YearMonthDay::new(2011, 10, 31).unwrap(),
                open: 402.42,
                close: 404.78,
                adj_close: 55.42,
                high: 409.33,
                low: 401.05,
                volume: 13_762_000,
            }],
            moving_average: 404.78,
        };
        let text = render(|out| write_hist(out, &h));
        assert!(text.contains("31/10/2011: 404.78"));
        assert!(text.contains("volume 13,762,000"));
        assert!(text.contains("Moving average: 404.7800"));

        let d = SymbolDividends {
            symbol: "BELG.BR".into(),
            entries: vec![DividendEntry {
                date: YearMonthDay::new(2013, 4, 29).unwrap(),
                dividends_per_share: 2.1,
            }],
        };
        assert!(render(|out| write_dividends(out, &d)).contains("29-04-2013 2.1"));
    }

    #[test]
    fn test_chart_period_in_link() {
        let item = analysed(Quote::new("VEUR.AS"));
        let text = render(|out| write_quote(out, &item, ChartPeriod::Max, 0.01));
        assert!(text.contains("s=VEUR.AS&t=my"), "{text}");
    }

    #[test]
    fn test_missing_line() {
        assert_eq!(render(|out| write_missing(out, &[])), "");
        assert_eq!(
            render(|out| write_missing(out, &["NOPE".to_string(), "GONE".to_string()])),
            "not resolved: NOPE, GONE\n"
        );
    }
}
