//! Demo binary for the click pipeline and code allocator.
//!
//! # Usage
//!
//! ```bash
//! # Create short links
//! cargo run -- shorten https://example.com https://rust-lang.org
//!
//! # Simulate concurrent redirects, then print per-link click totals
//! cargo run -- simulate --links 10 --visits 1000 --publishers 10
//! ```
//!
//! Press Ctrl-C during a simulation to stop publishing early; clicks already
//! accepted are still drained before the totals are printed.

use url_shortener_core::bootstrap;
use url_shortener_core::config::{self, Config};
use url_shortener_core::domain::entities::Link;
use url_shortener_core::state::AppState;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Click accounting and short code allocation demo.
#[derive(Parser)]
#[command(name = "shortener")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a short link for each URL
    Shorten {
        /// URLs to shorten
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Create links, replay redirect traffic and report click totals
    Simulate {
        /// Number of links to create
        #[arg(long, default_value_t = 10)]
        links: usize,

        /// Total redirects to simulate
        #[arg(long, default_value_t = 1000)]
        visits: u64,

        /// Concurrent publishing tasks
        #[arg(long, default_value_t = 10)]
        publishers: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let config = config::load_from_env().context("Failed to load configuration")?;
    init_tracing(&config)?;
    config.print_summary();

    let state = bootstrap::start(&config)?;

    let result = match cli.command {
        Commands::Shorten { urls } => shorten(&state, urls).await,
        Commands::Simulate {
            links,
            visits,
            publishers,
        } => simulate(&state, links, visits, publishers).await,
    };

    state.shutdown().await;

    if result.is_ok() {
        print_report(&state);
    }

    result
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("Invalid log filter '{}'", config.log_level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

async fn shorten(state: &AppState, urls: Vec<String>) -> Result<()> {
    println!("{}", "🔗 Shorten URLs".bright_blue().bold());
    println!();

    for url in urls {
        let link = state
            .link_service
            .create_short_link(url.clone())
            .await
            .with_context(|| format!("Failed to shorten {url}"))?;

        println!(
            "  {} {} {}",
            link.code.bright_yellow().bold(),
            "→".bright_black(),
            link.url.cyan()
        );
    }

    println!();
    Ok(())
}

async fn simulate(state: &AppState, links: usize, visits: u64, publishers: usize) -> Result<()> {
    println!("{}", "🚦 Simulate redirect traffic".bright_blue().bold());
    println!();

    let mut created = Vec::with_capacity(links);
    for i in 0..links.max(1) {
        let link = state
            .link_service
            .create_short_link(format!("https://example.com/page/{i}"))
            .await
            .context("Failed to create link")?;
        created.push(link);
    }
    let created: Arc<Vec<Link>> = Arc::new(created);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping publishers");
            interrupt.cancel();
        }
    });

    let next_visit = Arc::new(AtomicU64::new(0));
    let mut tasks = Vec::with_capacity(publishers.max(1));
    for _ in 0..publishers.max(1) {
        let service = state.link_service.clone();
        let created = created.clone();
        let next_visit = next_visit.clone();
        let cancel = cancel.clone();

        tasks.push(tokio::spawn(async move {
            let mut published = 0u64;
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let visit = next_visit.fetch_add(1, Ordering::Relaxed);
                if visit >= visits {
                    break;
                }
                let link = &created[(visit % created.len() as u64) as usize];
                match service.resolve_for_redirect(&link.code).await {
                    Ok(_) => published += 1,
                    Err(e) => tracing::error!(code = %link.code, error = %e, "Redirect failed"),
                }
                tokio::task::yield_now().await;
            }
            published
        }));
    }

    let mut published = 0;
    for task in tasks {
        published += task.await.context("Publisher task failed")?;
    }

    println!(
        "  Published {} visits across {} links",
        published.to_string().bright_white().bold(),
        created.len().to_string().bright_white().bold()
    );
    println!();

    Ok(())
}

fn print_report(state: &AppState) {
    let totals = state.clicks.totals();

    if !totals.is_empty() {
        println!("{}", "📊 Click totals".bright_blue().bold());
        println!();
        println!(
            "  {:<8} {:<12} {:>8}",
            "ID".bright_white().bold(),
            "Code".bright_white().bold(),
            "Clicks".bright_white().bold()
        );
        println!("  {}", "─".repeat(30).bright_black());

        let mut ids: Vec<_> = totals.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let code = state
                .links
                .find_by_id(id)
                .map(|link| link.code)
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<8} {:<12} {:>8}", id, code.cyan(), totals[&id]);
        }
        println!();
    }

    let stats = state.aggregator.stats();
    println!("{}", "Aggregator:".bright_white().bold());
    println!("  Received:   {}", stats.received);
    println!("  Persisted:  {}", stats.persisted.to_string().green());
    let dropped = stats.dropped();
    let dropped = if dropped == 0 {
        dropped.to_string().green()
    } else {
        dropped.to_string().red()
    };
    println!(
        "  Dropped:    {} (overflow {}, failed {}, abandoned {})",
        dropped, stats.dropped_overflow, stats.dropped_failed, stats.abandoned
    );
    println!();
}
