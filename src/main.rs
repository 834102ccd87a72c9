use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use factgate::admin::{load_extra_truths, MemoryCleaner};
use factgate::config::Config;
use factgate::gateway::{routes, ChannelGateway};
use factgate::provider::ModelClient;
use factgate::security::TruthTable;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "factgate", version, about = "Trust-enforcement gateway for a personal AI secretary")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "factgate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (default).
    Serve,
    /// Offline memory maintenance: remove poisoned/noise facts,
    /// repair preferences, append core truths.
    Clean {
        /// Apply changes (default is a dry run).
        #[arg(long)]
        execute: bool,
        /// Append a core truth: --add-truth <KEY> <STATEMENT>
        #[arg(long, num_args = 2, value_names = ["KEY", "STATEMENT"])]
        add_truth: Option<Vec<String>>,
    },
    /// Show store counts and model connectivity.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Clean { execute, add_truth } => clean(config, execute, add_truth),
        Command::Status => status(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let dir = config.memory.resolve_dir();
    // Truth extras are read once here; the pipeline never reloads or
    // mutates them.
    let truths = Arc::new(TruthTable::with_extras(load_extra_truths(&dir)));
    let gateway = Arc::new(ChannelGateway::new(&config, truths)?);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(
        addr = %addr,
        memory_dir = %dir.display(),
        model = %config.model.url,
        "factgate listening"
    );

    axum::serve(listener, routes::router(gateway))
        .await
        .context("Gateway server failed")
}

fn clean(config: Config, execute: bool, add_truth: Option<Vec<String>>) -> Result<()> {
    let dir = config.memory.resolve_dir();
    let cleaner = MemoryCleaner::new(dir, config.owner, config.memory.duplicate_threshold);

    if let Some(parts) = add_truth {
        // clap guarantees exactly two values.
        cleaner.add_truth(&parts[0], &parts[1], !execute)?;
    }

    let report = cleaner.clean(!execute)?;
    println!(
        "{}: removed {} fact(s), {} remaining{}",
        if report.dry_run { "dry run" } else { "cleaned" },
        report.removed,
        report.remaining,
        if report.role_repaired {
            " (owner role repaired)"
        } else {
            ""
        }
    );
    if report.dry_run {
        println!("run again with --execute to apply");
    }
    Ok(())
}

async fn status(config: Config) -> Result<()> {
    let dir = config.memory.resolve_dir();
    let truths = Arc::new(TruthTable::with_extras(load_extra_truths(&dir)));
    let gateway = ChannelGateway::new(&config, truths.clone())?;
    let session = gateway.memory().session().snapshot();

    println!("memory dir:     {}", dir.display());
    println!("core truths:    {}", truths.truths().len());
    println!("facts:          {}", gateway.memory().facts().len());
    println!("quarantined:    {}", gateway.memory().quarantine().len());
    println!("nodes:          {}", gateway.nodes().len());
    println!("audit entries:  {}", gateway.audit_log().len());
    println!("session msgs:   {}", session.message_count);
    println!("alerts:         {}", session.security_alerts);

    let model = ModelClient::from_config(&config.model);
    println!(
        "model:          {} ({})",
        config.model.url,
        if model.check_connection().await {
            "connected"
        } else {
            "unreachable"
        }
    );
    Ok(())
}
