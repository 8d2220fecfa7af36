//! Links to Yahoo's chart images, shown next to each quote in the report.

use clap::ValueEnum;
use std::fmt;
use url::Url;

const CHART_BASE: &str = "https://chart.finance.yahoo.com/z";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ChartPeriod {
    #[value(name = "1d")]
    Day1,
    #[value(name = "5d")]
    Day5,
    #[value(name = "3m")]
    Month3,
    #[value(name = "6m")]
    Month6,
    #[value(name = "1y")]
    Year1,
    #[default]
    #[value(name = "2y")]
    Year2,
    #[value(name = "5y")]
    Year5,
    /// Yahoo's code for the full history is `my`.
    #[value(name = "max")]
    Max,
}

impl ChartPeriod {
    fn code(&self) -> &'static str {
        match self {
            ChartPeriod::Day1 => "1d",
            ChartPeriod::Day5 => "5d",
            ChartPeriod::Month3 => "3m",
            ChartPeriod::Month6 => "6m",
            ChartPeriod::Year1 => "1y",
            ChartPeriod::Year2 => "2y",
            ChartPeriod::Year5 => "5y",
            ChartPeriod::Max => "my",
        }
    }
}

impl fmt::Display for ChartPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Line chart with the 50/200 day moving averages overlaid.
pub fn chart_url(symbol: &str, period: ChartPeriod) -> String {
    let params = [
        ("s", symbol),
        ("t", period.code()),
        ("q", "l"),
        ("l", "on"),
        ("z", "l"),
        ("p", "m50,m200"),
    ];
    match Url::parse_with_params(CHART_BASE, &params) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{CHART_BASE}?s={symbol}&t={period}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_url() {
        let url = chart_url("VEUR.AS", ChartPeriod::Year2);
        assert!(url.starts_with("https://chart.finance.yahoo.com/z?s=VEUR.AS&t=2y"));
        assert!(url.contains("p=m50%2Cm200"));
    }

    #[test]
    fn test_every_period_has_a_code() {
        let codes: Vec<String> = ChartPeriod::value_variants()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(codes, ["1d", "5d", "3m", "6m", "1y", "2y", "5y", "my"]);
        assert_eq!(ChartPeriod::default(), ChartPeriod::Year2);
        assert_eq!(ChartPeriod::from_str("max", false), Ok(ChartPeriod::Max));
    }

    #[test]
    fn test_chart_url_escapes_symbol() {
        let url = chart_url("EURUSD=X", ChartPeriod::Day5);
        assert!(url.contains("s=EURUSD%3DX"));
        assert!(url.contains("t=5d"));
    }
}
