use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use scoreline_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use scoreline_server::{Pipeline, create_remote_cache, metrics, observability};

/// Scoring pipeline and leaderboard cache service.
#[derive(Debug, Parser)]
#[command(name = "scoreline-server", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "SCORELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Override logging.level from the configuration file
    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();
    let cli = Cli::parse();

    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let mut cfg = match load_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    if let Some(level) = cli.log_level {
        cfg.logging.level = level;
    }
    if cli.print_config {
        let rendered = toml::to_string_pretty(&cfg).context("failed to render configuration")?;
        println!("{rendered}");
        return Ok(());
    }
    observability::apply_logging_level(&cfg.logging.level);
    tracing::info!(
        path = config_path.as_deref().unwrap_or(DEFAULT_CONFIG_PATH),
        redis = cfg.redis.enabled,
        "Configuration loaded"
    );

    metrics::init_metrics();

    let repos = scoreline_db_memory::create_repositories();
    let remote = create_remote_cache(&cfg.redis).await;
    let pipeline = Pipeline::build(cfg, repos, remote, scoreline_core::system_clock());
    pipeline.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    match pipeline.cache_report_json() {
        Ok(report) => tracing::info!(report = %report, "Final cache report"),
        Err(e) => tracing::warn!(error = %e, "Failed to render cache report"),
    }
    pipeline.shutdown().await;
    Ok(())
}
