use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tradelens::loader::LoaderConfig;
use tradelens::TradeLens;

#[derive(Parser, Debug)]
#[command(
    name = "tradelens",
    about = "TradeLens - fetch trade and macro series from public APIs and forecast them"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tradelens.toml")]
    config: String,

    /// Keep running and refresh on the configured interval
    #[arg(short, long)]
    watch: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = LoaderConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;
    let app = TradeLens::from_config(config).context("Failed to build pipeline")?;

    if cli.watch {
        return watch(&app, cli.pretty).await;
    }

    let snapshot = app
        .snapshot(&CancellationToken::new())
        .await
        .context("Refresh failed")?;
    println!("{}", render(&snapshot, cli.pretty)?);

    Ok(())
}

async fn watch(app: &TradeLens, pretty: bool) -> Result<()> {
    let daemon = app.daemon();
    let cancel = daemon.cancel_token();
    let mut reports = daemon.subscribe();

    // Handle shutdown signals
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        cancel.cancel();
    });

    // Print each refresh summary as it lands
    tokio::spawn(async move {
        while reports.changed().await.is_ok() {
            let latest = reports.borrow_and_update().clone();
            if let Some(report) = latest {
                let summary = tradelens::Summary::of(&report);
                match render(&summary, pretty) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "Failed to render summary"),
                }
            }
        }
    });

    daemon
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Daemon error: {e}"))
}

fn render<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}
