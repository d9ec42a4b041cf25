use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gatehouse_server::boot;
use gatehouse_server::config::AppConfig;

/// Gatehouse - multi-tenant access-control backend
#[derive(Parser)]
#[command(name = "gatehouse-server")]
#[command(about = "Gatehouse - multi-tenant access-control backend")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
    /// Delete stale provisional organizations (crash recovery)
    Sweep {
        /// Only rows older than this many hours are removed
        #[arg(long, default_value_t = 24)]
        older_than_hours: i64,
    },
}

fn init_logging(config: &AppConfig, verbose: u8) {
    let default_filter = match verbose {
        0 => config.logging.filter.clone(),
        1 => "debug".to_owned(),
        _ => "trace".to_owned(),
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(ref path) = cli.config {
        if !path.is_file() {
            anyhow::bail!("config file does not exist: {}", path.display());
        }
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);

    if cli.print_config {
        println!("{}", config.to_pretty()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => {
            println!("Configuration is valid");
            println!("{}", config.to_pretty()?);
            Ok(())
        }
        Commands::Sweep { older_than_hours } => sweep(config, older_than_hours).await,
    }
}

async fn run_server(config: AppConfig) -> Result<()> {
    tracing::info!("Gatehouse server starting");
    let app = boot::start(&config).await?;
    for failure in &app.boot_report.failed {
        tracing::warn!(module = %failure.module, error = %failure.error, "module excluded from boot");
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!(addr = %config.server.bind_addr, "listening");

    let cancel = app.cancel.clone();
    axum::serve(listener, app.router.clone())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {
                    tracing::info!("shutdown: signal received");
                }
                () = cancel.cancelled() => {}
            }
        })
        .await?;

    app.shutdown().await;
    Ok(())
}

async fn sweep(config: AppConfig, older_than_hours: i64) -> Result<()> {
    let app = boot::start(&config).await?;
    let swept = app
        .directory
        .sweep_stale_provisional(chrono::Duration::hours(older_than_hours))
        .await?;
    println!("Removed {swept} stale provisional organization(s)");
    app.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler failed");
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "SIGTERM handler failed"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
