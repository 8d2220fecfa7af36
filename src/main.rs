mod cache;
mod config;
mod errors;
mod metrics;
mod models;
mod pipeline;
mod report;
mod source;
mod utils;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cache::{CachedSource, QuoteRepository};
use crate::config::AppConfig;
use crate::metrics::AnalysisParams;
use crate::pipeline::Pipeline;
use crate::source::chart::ChartPeriod;
use crate::source::{Source, SourceKind, build_source};

#[derive(Parser)]
#[command(name = "finquote", about = "Stock quotes, history and buy heuristics", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data provider (defaults to `source.default_source` from the config)
    #[arg(long, value_enum, global = true)]
    source: Option<SourceKind>,

    /// Print JSON instead of the text report
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Args)]
struct Symbols {
    /// One or more symbols, e.g. VEUR.AS KBC.BR AAPL
    #[arg(short, long = "symbols", num_args = 1.., required = true)]
    symbols: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Current quotes with derived metrics
    Quote {
        #[command(flatten)]
        symbols: Symbols,

        /// Period of the linked chart
        #[arg(long, value_enum, default_value_t = ChartPeriod::default())]
        chart: ChartPeriod,
    },

    /// Daily price history and its moving average
    Hist {
        #[command(flatten)]
        symbols: Symbols,

        /// First day, YYYY-MM-DD (requires --end)
        #[arg(long, value_parser = utils::parse_date_arg)]
        start: Option<NaiveDate>,

        /// Last day, YYYY-MM-DD (requires --start)
        #[arg(long, value_parser = utils::parse_date_arg)]
        end: Option<NaiveDate>,
    },

    /// Dividend history
    Dividends {
        #[command(flatten)]
        symbols: Symbols,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "finquote=info,warn",
        1 => "finquote=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;
    let kind = cli.source.unwrap_or(config.source.default_source);
    let params = AnalysisParams::from(&config.analysis);
    let pipeline = Pipeline::new(open_source(kind, &config)?, params);

    match cli.command {
        Command::Quote { symbols, chart } => {
            let _t = utils::Timer::start(format!("quote via {}", pipeline.source_name()));
            let out = pipeline.quotes(&symbols.symbols).await?;
            if cli.json {
                return print_json(&out);
            }
            let mut text = String::new();
            for item in &out.found {
                report::write_quote(&mut text, item, chart, params.desired_tx_cost_fraction)?;
                text.push('\n');
            }
            report::write_missing(&mut text, &out.missing)?;
            print!("{text}");
        }

        Command::Hist { symbols, start, end } => {
            let range = match (start, end) {
                (Some(s), Some(e)) => Some((s, e)),
                (None, None) => None,
                _ => bail!("--start and --end must be given together"),
            };
            let _t = utils::Timer::start(format!("hist via {}", pipeline.source_name()));
            let out = pipeline.hist(&symbols.symbols, range).await?;
            if cli.json {
                return print_json(&out);
            }
            let mut text = String::new();
            for h in &out.found {
                report::write_hist(&mut text, h)?;
                text.push('\n');
            }
            report::write_missing(&mut text, &out.missing)?;
            print!("{text}");
        }

        Command::Dividends { symbols } => {
            let _t = utils::Timer::start(format!("dividends via {}", pipeline.source_name()));
            let out = pipeline.dividends(&symbols.symbols).await?;
            if cli.json {
                return print_json(&out);
            }
            let mut text = String::new();
            for d in &out.found {
                report::write_dividends(&mut text, d)?;
                text.push('\n');
            }
            report::write_missing(&mut text, &out.missing)?;
            print!("{text}");
        }
    }

    Ok(())
}

/// The selected adapter, wrapped in the quote cache when enabled. A cache
/// that cannot be opened is skipped with a warning.
fn open_source(kind: SourceKind, config: &AppConfig) -> Result<Box<dyn Source>> {
    let source = build_source(kind, &config.source)
        .with_context(|| format!("Failed to build source '{kind}'"))?;

    if !config.cache.enabled {
        return Ok(source);
    }

    let path = config.cache.resolved_db_path();
    match QuoteRepository::open(&path) {
        Ok(repo) => {
            let expiry = config.cache.quote_expiry();
            match repo.purge_older_than(cache::fresh_since(expiry)) {
                Ok(n) if n > 0 => info!("Dropped {} stale cached quote(s)", n),
                Ok(_) => {}
                Err(e) => warn!("Quote cache purge failed: {:#}", e),
            }
            info!(
                "Quote cache at {:?}: {} quote(s), expiry {:?}",
                path,
                repo.quote_count().unwrap_or(0),
                expiry
            );
            let cached: Box<dyn Source> = Box::new(CachedSource::new(source, repo, expiry));
            Ok(cached)
        }
        Err(e) => {
            warn!("Could not initialize cache ({:#}), using pure source", e);
            Ok(source)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("JSON encoding failed")?);
    Ok(())
}
