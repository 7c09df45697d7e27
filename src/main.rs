use anyhow::Result;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use netmedic::config::NetmedicConfig;

#[derive(Parser)]
#[command(
    name = "netmedic",
    about = "Self-healing network monitor: anomaly detection and automated issue remediation",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (monitor + resolution engine + API server)
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },

    /// List active issues
    Issues {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List resolution history
    History {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        /// Show only the most recent N entries
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Manually resolve an active issue
    Resolve {
        /// Issue id
        #[arg(long)]
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => NetmedicConfig::load(std::path::Path::new(path))?,
        None => NetmedicConfig::load_or_default(),
    };

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(%bind, "Starting NetMedic daemon");
            netmedic::serve(&bind, config).await?;
        }
        Commands::Issues { json } => {
            let resolver = netmedic::build_resolver(&config)?;
            let issues = resolver.active_issues().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&issues)?);
            } else if issues.is_empty() {
                println!("No active issues.");
            } else {
                println!(
                    "{:<36} | {:<10} | {:<8} | Title",
                    "Id", "Status", "Attempts"
                );
                println!("{:-<36}-|-{:-<10}-|-{:-<8}-|-{:-<40}", "", "", "", "");
                for issue in &issues {
                    println!(
                        "{:<36} | {:<10} | {:<8} | {}",
                        issue.id, issue.status, issue.resolution_attempts, issue.title
                    );
                }
            }
        }
        Commands::History { json, limit } => {
            let resolver = netmedic::build_resolver(&config)?;
            let history = resolver.history().await;
            let recent = &history[history.len().saturating_sub(limit)..];
            if json {
                println!("{}", serde_json::to_string_pretty(&recent)?);
            } else if recent.is_empty() {
                println!("No resolution history.");
            } else {
                println!(
                    "{:<36} | {:<16} | {:<8} | Resolved at",
                    "Issue", "Kind", "Success"
                );
                println!("{:-<36}-|-{:-<16}-|-{:-<8}-|-{:-<25}", "", "", "", "");
                for entry in recent {
                    let resolved_at = entry
                        .resolved_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<36} | {:<16} | {:<8} | {}",
                        entry.issue_id, entry.anomaly_kind, entry.resolution_success, resolved_at
                    );
                }
            }
        }
        Commands::Resolve { id } => {
            let resolver = netmedic::build_resolver(&config)?;
            let outcome = resolver.resolve_issue(id).await;
            if outcome.success {
                println!("Resolution succeeded: {}", outcome.message);
            } else {
                println!("Resolution failed: {}", outcome.message);
            }
        }
    }

    Ok(())
}
