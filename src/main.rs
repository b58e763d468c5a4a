//! Gatewarden — LLM-gated web access control
//!
//! A central daemon owns a dnsmasq blocklist; requests for temporary
//! access go through an LLM gatekeeper; approvals unblock a domain for a
//! limited time and path scope.
//!
//! Quick start:
//!   gatewarden serve              # run the daemon
//!   gatewarden status             # what's currently unblocked
//!   gatewarden history            # today's decisions
//!
//! For more info: gatewarden --help

use clap::{Parser, Subcommand};
use colored::Colorize;
use gatewarden::blocklist::{reload_signal_for, BlocklistStore};
use gatewarden::config::Config;
use gatewarden::context::{HomeAssistant, NoRooms, RoomProvider};
use gatewarden::gatekeeper::ClaudeGatekeeper;
use gatewarden::history::RequestLog;
use gatewarden::registry::GrantRegistry;
use gatewarden::service::{GrantService, ServiceClient, ServiceResponse, ServiceServer};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_SERVER: &str = "127.0.0.1:8377";

/// Gatewarden — temporary, LLM-approved exceptions to a domain blocklist.
#[derive(Parser)]
#[command(
    name = "gatewarden",
    version,
    about = "LLM-gated domain blocklist with temporary access grants"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (blocklist owner + grant service)
    Serve {
        /// Path to the config file
        #[arg(short, long, default_value = "gatewarden.yaml")]
        config: PathBuf,
    },

    /// Show live grants and force-blocked devices
    Status {
        #[arg(long, default_value = DEFAULT_SERVER, env = "GATEWARDEN_ADDR")]
        server: String,
    },

    /// Immediately re-block a domain
    Revoke {
        domain: String,
        #[arg(long, default_value = DEFAULT_SERVER, env = "GATEWARDEN_ADDR")]
        server: String,
    },

    /// Immediately re-block all domains
    RevokeAll {
        #[arg(long, default_value = DEFAULT_SERVER, env = "GATEWARDEN_ADDR")]
        server: String,
    },

    /// Show today's request history
    History {
        /// Max entries to show
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long, default_value = DEFAULT_SERVER, env = "GATEWARDEN_ADDR")]
        server: String,
    },

    /// Validate a config file
    Check {
        #[arg(default_value = "gatewarden.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gatewarden=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config } => run_serve(&config).await,
        Commands::Status { server } => run_status(&server),
        Commands::Revoke { domain, server } => run_revoke(&server, Some(&domain)),
        Commands::RevokeAll { server } => run_revoke(&server, None),
        Commands::History { limit, server } => run_history(&server, limit),
        Commands::Check { config } => run_check(&config),
    };

    if let Err(e) = result {
        eprintln!();
        eprintln!("  {} {}", "✗".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".dimmed(), cause);
        }
        eprintln!();
        std::process::exit(1);
    }
}

/// Build everything from config and run the daemon until interrupted.
/// Shutdown re-blocks all domains so no grant outlives the process.
async fn run_serve(config_path: &std::path::Path) -> anyhow::Result<()> {
    let config = Arc::new(Config::load(config_path)?);

    let signal = reload_signal_for(config.dnsmasq.reload_command.clone());
    let store = BlocklistStore::new(&config.dnsmasq.blocked_hosts_path, signal);
    let registry = GrantRegistry::new(config.domain_sets(), store);
    registry.initialize().await?;

    let gatekeeper = Arc::new(ClaudeGatekeeper::new(
        &config.anthropic,
        config.schedule.clone(),
    )?);

    let rooms: Arc<dyn RoomProvider> = match &config.homeassistant {
        Some(ha) => Arc::new(HomeAssistant::new(ha, config.devices.clone())?),
        None => Arc::new(NoRooms),
    };

    let history = Arc::new(RequestLog::new(config.history_dir()?)?);

    let service = Arc::new(GrantService::new(
        config.clone(),
        registry.clone(),
        gatekeeper,
        rooms,
        history,
    ));

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let server = ServiceServer::new(addr, service);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down, re-blocking all domains");
            registry.revoke_all().await?;
        }
    }
    Ok(())
}

fn run_status(server: &str) -> anyhow::Result<()> {
    let response = ServiceClient::new(server).status()?;
    let ServiceResponse::Status {
        active,
        force_blocked_devices,
    } = response
    else {
        anyhow::bail!("Unexpected response from daemon");
    };

    println!();
    if active.is_empty() {
        println!("  {} no live grants — everything is blocked", "●".green());
    } else {
        println!("  {} live grants:", active.len());
        for grant in &active {
            let remaining_min = grant.remaining_secs / 60;
            println!(
                "  {} {} for {} — {}m left, scope {}",
                "●".yellow(),
                grant.domain.bold(),
                grant.device_name.as_deref().unwrap_or(&grant.device_ip),
                remaining_min,
                grant.scope.as_deref().unwrap_or("/*").cyan()
            );
        }
    }
    if !force_blocked_devices.is_empty() {
        println!();
        println!(
            "  {} force-blocked devices: {}",
            "✗".red(),
            force_blocked_devices.join(", ")
        );
    }
    println!();
    Ok(())
}

fn run_revoke(server: &str, domain: Option<&str>) -> anyhow::Result<()> {
    let client = ServiceClient::new(server);
    let response = match domain {
        Some(d) => client.revoke(d)?,
        None => client.revoke_all()?,
    };
    match response {
        ServiceResponse::Revoked { domain: Some(d) } => {
            println!("  {} {} re-blocked", "✓".green().bold(), d.bold());
        }
        ServiceResponse::Revoked { domain: None } => {
            println!("  {} all domains re-blocked", "✓".green().bold());
        }
        ServiceResponse::Error { message } => anyhow::bail!(message),
        other => anyhow::bail!("Unexpected response: {:?}", other),
    }
    Ok(())
}

fn run_history(server: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let response = ServiceClient::new(server).history()?;
    let ServiceResponse::History { requests } = response else {
        anyhow::bail!("Unexpected response from daemon");
    };

    println!();
    if requests.is_empty() {
        println!("  no requests today");
    }
    for record in requests.iter().take(limit.unwrap_or(usize::MAX)) {
        let verdict = if record.approved {
            "APPROVED".green().to_string()
        } else {
            "DENIED".red().to_string()
        };
        println!(
            "  [{}] {} {} — \"{}\"",
            record.timestamp.format("%H:%M:%S").to_string().dimmed(),
            verdict,
            record.url,
            record.reason
        );
    }
    println!();
    Ok(())
}

fn run_check(config_path: &std::path::Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    println!();
    println!("  {} Config is valid!", "✓".green().bold());
    println!(
        "  Conditional domains:    {}",
        config.domains.conditional.len()
    );
    println!(
        "  Always-blocked domains: {}",
        config.domains.always_blocked.len()
    );
    println!("  Devices:                {}", config.devices.len());
    println!(
        "  Hosts file:             {}",
        config
            .dnsmasq
            .blocked_hosts_path
            .display()
            .to_string()
            .dimmed()
    );
    println!();
    Ok(())
}
