//! Derived metrics over the normalized model.
//!
//! Everything here is pure. Zero-valued quote fields mean "not reported",
//! so each metric that would divide by one of them has a fixed answer for
//! that case instead of producing NaN or infinity:
//!
//! | metric                   | absent input          | result            |
//! |--------------------------|-----------------------|-------------------|
//! | `variation_percent`      | `previous_close == 0` | `0.0`             |
//! | `bid_ask_spread_percent` | `bid == 0 or ask == 0` | `None`           |
//! | `dividend_payout_ratio`  | `dps == 0 or eps == 0` | `0.0`            |
//! | `moving_average`         | no entries            | `0.0`             |
//! | `valuation_tier`         | `pe_ratio == 0`       | `NotApplicable`   |
//! | `trend_signal`           | `ma200 == 0`          | `NotApplicable`   |
//! | `shares_to_buy`          | `price <= 0`          | `Error::Computation` |

use crate::errors::{Error, Result};
use crate::models::{HistEntry, Quote};
use serde::Serialize;
use std::fmt;

// ── Quote metrics ─────────────────────────────────────────────────────────────

impl Quote {
    /// Realistic buy price: the ask, falling back to the last trade.
    pub fn price(&self) -> f64 {
        nvl(&[self.ask, self.last_trade_price])
    }

    pub fn is_increasing(&self) -> bool {
        self.last_trade_price >= self.previous_close
    }

    pub fn variation(&self) -> f64 {
        self.last_trade_price - self.previous_close
    }

    /// `0.0` when there is no previous close.
    pub fn variation_percent(&self) -> f64 {
        if self.previous_close == 0.0 {
            return 0.0;
        }
        self.variation() / self.previous_close * 100.0
    }

    pub fn bid_ask_spread(&self) -> Option<f64> {
        self.has_bid_ask().then(|| self.ask - self.bid)
    }

    /// Spread relative to the bid, as a fraction (0.01 is 1 %).
    pub fn bid_ask_spread_percent(&self) -> Option<f64> {
        self.has_bid_ask().then(|| (self.ask - self.bid) / self.bid)
    }

    /// Midpoint between bid and ask.
    pub fn limit_order_price(&self) -> Option<f64> {
        self.has_bid_ask().then(|| (self.ask + self.bid) / 2.0)
    }

    fn has_bid_ask(&self) -> bool {
        self.bid != 0.0 && self.ask != 0.0
    }

    /// DPS / EPS, or `0.0` if either is unknown.
    pub fn dividend_payout_ratio(&self) -> f64 {
        if self.dividend_per_share != 0.0 && self.earnings_per_share != 0.0 {
            return self.dividend_per_share / self.earnings_per_share;
        }
        0.0
    }

    pub fn day_range(&self) -> f64 {
        self.day_high - self.day_low
    }

    pub fn year_range(&self) -> f64 {
        self.year_high - self.year_low
    }

    pub fn valuation_tier(&self) -> ValuationTier {
        valuation_tier(self.pe_ratio)
    }

    pub fn trend_signal(&self) -> TrendSignal {
        if self.ma200 == 0.0 {
            return TrendSignal::NotApplicable;
        }
        if self.previous_close > self.ma200 {
            TrendSignal::Buy
        } else {
            TrendSignal::Sell
        }
    }

    /// [`shares_to_buy`] at this quote's [`price`](Quote::price).
    pub fn shares_to_buy(&self, fixed_tx_cost: f64, desired_tx_cost_fraction: f64) -> Result<u64> {
        shares_to_buy(self.price(), fixed_tx_cost, desired_tx_cost_fraction)
    }
}

/// First non-zero value, or `0.0`.
fn nvl(xs: &[f64]) -> f64 {
    xs.iter().copied().find(|x| *x != 0.0).unwrap_or(0.0)
}

// ── Free functions ────────────────────────────────────────────────────────────

/// Number of shares to buy so that a fixed transaction cost stays below
/// `desired_tx_cost_fraction` of the order (0.005 is fantastic, 0.01 is ok).
///
/// `ceil((cost - fraction * cost) / (fraction * price))`. A fraction of one
/// or more needs no minimum and yields `0`.
pub fn shares_to_buy(price: f64, fixed_tx_cost: f64, desired_tx_cost_fraction: f64) -> Result<u64> {
    const METRIC: &str = "shares to buy";

    if !(price.is_finite() && fixed_tx_cost.is_finite() && desired_tx_cost_fraction.is_finite()) {
        return Err(Error::Computation {
            metric: METRIC,
            reason: "inputs must be finite".into(),
        });
    }
    if price <= 0.0 {
        return Err(Error::Computation {
            metric: METRIC,
            reason: format!("price must be positive, got {price}"),
        });
    }
    if desired_tx_cost_fraction <= 0.0 {
        return Err(Error::Computation {
            metric: METRIC,
            reason: format!("desired transaction cost fraction must be positive, got {desired_tx_cost_fraction}"),
        });
    }

    let n = ((fixed_tx_cost - desired_tx_cost_fraction * fixed_tx_cost)
        / (desired_tx_cost_fraction * price))
        .ceil();

    // `as` saturates: negative results become 0.
    Ok(n as u64)
}

/// Arithmetic mean of the closes, `0.0` for no entries.
///
/// Quotes already carry the 50- and 200-day averages; this is for any other
/// window, e.g. a history bounded with `hist_limit`.
pub fn moving_average(entries: &[HistEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    let sum: f64 = entries.iter().map(|e| e.close).sum();
    sum / entries.len() as f64
}

// ── Valuation tier ────────────────────────────────────────────────────────────

/// P/E classification. Buckets are `(0,11)`, `[11,18)`, `[18,26)` and
/// `[26,∞)`, which is the integer ranges 0-10, 11-17, 18-25 and 26+ with
/// fractions kept in the bucket of their integer part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationTier {
    Low,
    FairValue,
    Overvalued,
    High,
    NotApplicable,
}

impl ValuationTier {
    pub fn description(&self) -> &'static str {
        match self {
            ValuationTier::Low => {
                "low: possible undervaluation, or expected earnings decline, or historically high earnings"
            }
            ValuationTier::FairValue => "fair value",
            ValuationTier::Overvalued => "possible overvaluation or growth stock",
            ValuationTier::High => {
                "high: possible bubble, or very high expected earnings, or abnormally low recent earnings"
            }
            ValuationTier::NotApplicable => "not applicable",
        }
    }
}

impl fmt::Display for ValuationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// `NotApplicable` for 0 (not reported), negative and non-finite ratios.
pub fn valuation_tier(pe_ratio: f64) -> ValuationTier {
    if pe_ratio == 0.0 || pe_ratio < 0.0 || !pe_ratio.is_finite() {
        return ValuationTier::NotApplicable;
    }
    // Half-open so the integer gaps (10.5, 17.9) stay with the lower bucket.
    if pe_ratio < 11.0 {
        ValuationTier::Low
    } else if pe_ratio < 18.0 {
        ValuationTier::FairValue
    } else if pe_ratio < 26.0 {
        ValuationTier::Overvalued
    } else {
        ValuationTier::High
    }
}

// ── Trend signal ──────────────────────────────────────────────────────────────

/// Previous close against the 200-day moving average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendSignal {
    Buy,
    Sell,
    NotApplicable,
}

impl fmt::Display for TrendSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendSignal::Buy => "BUY position",
            TrendSignal::Sell => "SELL position",
            TrendSignal::NotApplicable => "not applicable",
        };
        f.write_str(s)
    }
}

// ── Analysis bundle ───────────────────────────────────────────────────────────

/// Thresholds the heuristics are judged against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisParams {
    pub fixed_tx_cost: f64,
    pub desired_tx_cost_fraction: f64,
    pub max_bid_ask_spread: f64,
    pub min_dividend_yield: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            fixed_tx_cost: 9.75,
            desired_tx_cost_fraction: 0.01,
            max_bid_ask_spread: 0.01,
            min_dividend_yield: 0.025,
        }
    }
}

/// Every derived value for one quote, ready for a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteAnalysis {
    pub symbol: String,
    pub price: f64,
    pub is_increasing: bool,
    pub variation: f64,
    pub variation_percent: f64,
    pub bid_ask_spread: Option<f64>,
    pub bid_ask_spread_percent: Option<f64>,
    pub limit_order_price: Option<f64>,
    /// `None` when the spread is not applicable.
    pub spread_acceptable: Option<bool>,
    pub attractive_yield: bool,
    pub dividend_payout_ratio: f64,
    pub day_range: f64,
    pub year_range: f64,
    /// `None` when the price is missing, negative or not finite.
    pub shares_to_buy: Option<u64>,
    pub shares_cost: Option<f64>,
    pub valuation_tier: ValuationTier,
    pub trend_signal: TrendSignal,
}

impl QuoteAnalysis {
    pub fn from_quote(q: &Quote, params: &AnalysisParams) -> Result<Self> {
        let price = q.price();
        // A quote without a usable price has no order size; bad thresholds
        // are still an error.
        let shares_to_buy = if price > 0.0 && price.is_finite() {
            Some(q.shares_to_buy(params.fixed_tx_cost, params.desired_tx_cost_fraction)?)
        } else {
            None
        };
        let spread_pct = q.bid_ask_spread_percent();

        Ok(Self {
            symbol: q.symbol.clone(),
            price,
            is_increasing: q.is_increasing(),
            variation: q.variation(),
            variation_percent: q.variation_percent(),
            bid_ask_spread: q.bid_ask_spread(),
            bid_ask_spread_percent: spread_pct,
            limit_order_price: q.limit_order_price(),
            spread_acceptable: spread_pct.map(|s| s < params.max_bid_ask_spread),
            attractive_yield: q.dividend_yield > params.min_dividend_yield,
            dividend_payout_ratio: q.dividend_payout_ratio(),
            day_range: q.day_range(),
            year_range: q.year_range(),
            shares_to_buy,
            shares_cost: shares_to_buy.map(|n| n as f64 * price),
            valuation_tier: q.valuation_tier(),
            trend_signal: q.trend_signal(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
