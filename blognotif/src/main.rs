/*
blognotif - main.rs
Runs a single polling pass over the configured blogs and exits. Scheduling is left to cron
or a systemd timer.
*/

use anyhow::Result;
use clap::Parser;
use common::{init_db_pool, Config};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use blognotif::fetcher::Fetcher;
use blognotif::notifier::TelegramNotifier;
use blognotif::repository::BlogRepository;
use blognotif::run::{run_pass, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "blognotif", about = "Notify a Telegram chat when watched blogs publish a new post")]
struct Args {
    /// Config file layered over config.default.toml; repeat to add more layers.
    /// Defaults to config.toml when present.
    #[arg(long, value_name = "FILE")]
    config: Vec<PathBuf>,

    /// Detect new posts without sending notifications or saving state
    #[arg(long)]
    dry_run: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let layers = Config::resolve_layers(Path::new("."), &args.config)?;
    let config = match Config::load_layered(&layers).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load configuration: {:#}", e);
            return Err(e);
        }
    };
    info!(layers = ?layers, "configuration loaded");

    let pool = match init_db_pool(&config.database.path).await {
        Ok(p) => p,
        Err(e) => {
            error!(db_path = %config.database.path, "failed to open database: {:#}", e);
            return Err(e);
        }
    };
    let repo = BlogRepository::new(pool);

    let result = run(&repo, &config, RunOptions { dry_run: args.dry_run }).await;

    repo.pool().close().await;
    info!("database closed");

    result
}

async fn run(repo: &BlogRepository, config: &Config, options: RunOptions) -> Result<()> {
    repo.ensure_schema().await?;

    let fetcher = Fetcher::from_config(&config.fetch)?;
    let notifier = TelegramNotifier::new(
        config.telegram.api_url(),
        config.telegram.resolve_bot_token()?,
        config.telegram.chat_id.clone(),
        config.telegram.timeout_seconds.unwrap_or(config.fetch.timeout_seconds()),
    )?;

    run_pass(repo, &fetcher, &notifier, options).await?;
    Ok(())
}
