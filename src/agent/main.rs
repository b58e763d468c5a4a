//! gatewarden-agent — the device-side scope enforcer.
//!
//! Sits between the browser and the network on one device. Navigation
//! URLs arrive one per line on stdin (the hook point for whatever does
//! the actual interception); for each one the agent answers on stdout:
//!
//!   ALLOW <url>            navigation may proceed
//!   BLOCK <url> <message>  navigation stays blocked
//!
//! For a conditional domain with no matching local scope the agent asks
//! the user for a reason, submits the request to the gatewarden daemon,
//! and on approval remembers the returned scope locally and re-issues
//! the navigation after a short delay so the resolver cache can catch up.
//!
//! The local table is a hint, never authority: it expires on its own
//! clock and is never refreshed from the server.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use gatewarden::client::ScopeCache;
use gatewarden::scope::{split_url, ScopePattern};
use gatewarden::service::ServiceClient;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-device path enforcement for gatewarden grants.
#[derive(Parser)]
#[command(name = "gatewarden-agent", version, about = "Device-side scope enforcement for gatewarden")]
struct Cli {
    /// Address of the gatewarden daemon
    #[arg(long, default_value = "127.0.0.1:8377", env = "GATEWARDEN_ADDR")]
    server: String,

    /// Delay before re-issuing an approved navigation, so the resolver
    /// cache can pick up the unblock (milliseconds)
    #[arg(long, default_value_t = 2000)]
    propagation_delay_ms: u64,

    /// How often expired local scopes are swept (seconds)
    #[arg(long, default_value_t = 60)]
    sweep_interval_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gatewarden=warn".parse().unwrap()),
        )
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("  {} {}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cache = Arc::new(Mutex::new(ScopeCache::new()));

    // Advisory sweep: the server already re-blocked expired grants; this
    // just keeps the local table from growing.
    let sweeper = cache.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(cli.sweep_interval_secs.max(1)));
        loop {
            interval.tick().await;
            let removed = sweeper.lock().unwrap().sweep(Utc::now());
            if removed > 0 {
                tracing::debug!(removed, "Swept expired local scopes");
            }
        }
    });

    // Stdin is interactive: navigations and reason prompts share it, so
    // the loop reads it on a blocking thread one line at a time.
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    eprintln!(
        "  {} connected to {} — paste a URL per line",
        "gatewarden-agent".bold(),
        cli.server.cyan()
    );

    while let Some(line) = lines.next() {
        let url = line?.trim().to_string();
        if url.is_empty() {
            continue;
        }

        let (domain, path) = match split_url(&url) {
            Some(parts) => parts,
            None => {
                println!("BLOCK {} not a parseable URL", url);
                continue;
            }
        };

        if cache.lock().unwrap().check(&domain, &path, Utc::now()) {
            println!("ALLOW {}", url);
            continue;
        }

        // Deferred: ask the user why they need it.
        eprint!("  {} access to {} is blocked. Reason (empty to cancel): ", "▸".yellow(), domain.bold());
        std::io::stderr().flush()?;
        let reason = match lines.next() {
            Some(line) => line?.trim().to_string(),
            None => break,
        };
        if reason.is_empty() {
            println!("BLOCK {} request cancelled", url);
            continue;
        }

        let outcome = {
            // The reasoning round trip can take a while; keep it off the
            // async runtime's worker thread.
            let server = cli.server.clone();
            let url = url.clone();
            tokio::task::spawn_blocking(move || {
                ServiceClient::new(server).request_access(&url, &reason)
            })
            .await?
        };

        match outcome {
            Ok(outcome) if outcome.approved => {
                let scope = ScopePattern::parse(outcome.scope.as_deref());
                let minutes = outcome.duration_minutes.unwrap_or(15);
                cache
                    .lock()
                    .unwrap()
                    .insert(&outcome.domain, scope.clone(), minutes, Utc::now());
                eprintln!(
                    "  {} approved for {} minutes (scope {})",
                    "✓".green().bold(),
                    minutes,
                    scope
                );

                // Give the resolver a moment to reload before retrying.
                tokio::time::sleep(Duration::from_millis(cli.propagation_delay_ms)).await;
                if cache.lock().unwrap().check(&domain, &path, Utc::now()) {
                    println!("ALLOW {}", url);
                } else {
                    println!("BLOCK {} approved scope does not cover this path", url);
                }
            }
            Ok(outcome) => {
                eprintln!("  {} {}", "✗".red().bold(), outcome.message);
                println!("BLOCK {} {}", url, outcome.message);
            }
            Err(e) => {
                eprintln!("  {} {}", "✗".red().bold(), e);
                println!("BLOCK {} request failed", url);
            }
        }
    }

    Ok(())
}
