use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexer_config::{Config, ConfigLoader};
use indexer_core::IndexerBuilder;
use indexer_service::server;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agentmesh-indexer")]
#[command(about = "AgentMesh task indexer", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	/// Overrides `indexer.log_level` from the config file.
	#[arg(long, env = "INDEXER_LOG_LEVEL")]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the indexer
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

	let log_level = cli
		.log_level
		.clone()
		.unwrap_or_else(|| config.indexer.log_level.clone());
	setup_tracing(&log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_indexer(config).await,
		Some(Commands::Validate) => validate_config(&cli, &config),
	}
}

async fn start_indexer(config: Config) -> Result<()> {
	info!(
		name = %config.indexer.name,
		host = %config.api.host,
		port = config.api.port,
		storage = %config.storage.backend,
		"Starting AgentMesh indexer"
	);

	let engine = Arc::new(
		IndexerBuilder::new(config.clone())
			.build()
			.context("Failed to build indexer")?,
	);
	let shutdown = engine.shutdown_token();

	let engine_handle = {
		let engine = engine.clone();
		tokio::spawn(async move { engine.run().await })
	};

	let server_handle = {
		let tasks = engine.tasks();
		let shutdown = shutdown.clone();
		tokio::spawn(async move { server::start_server(&config, tasks, shutdown).await })
	};

	tokio::select! {
		_ = shutdown_signal() => info!("Shutdown signal received, stopping indexer"),
		_ = shutdown.cancelled() => {}
	}
	engine.shutdown();

	match server_handle.await {
		Ok(Ok(())) => {}
		Ok(Err(e)) => error!(error = %e, "API server failed"),
		Err(e) => error!(error = %e, "API server task panicked"),
	}
	match engine_handle.await {
		Ok(Ok(())) => {}
		Ok(Err(e)) => error!(error = %e, "Indexer engine failed"),
		Err(e) => error!(error = %e, "Indexer engine task panicked"),
	}

	info!("AgentMesh indexer stopped");
	Ok(())
}

fn validate_config(cli: &Cli, config: &Config) -> Result<()> {
	info!("Configuration {} is valid", cli.config.display());
	info!("Indexer name: {}", config.indexer.name);
	info!("Fee: {} bps", config.indexer.fee_bps);
	info!("Storage backend: {}", config.storage.backend);

	for chain in config.supported_chains() {
		let watched = config
			.watched_chains()
			.any(|watched| watched.chain_id == chain.chain_id);
		info!(
			"  Chain {}: settlement={} min_confirmations={} watched={}",
			chain.chain_id, chain.settlement_contract, chain.min_confirmations, watched
		);
	}

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
		.context("Invalid log level")?;

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!(error = %e, "Failed to listen for Ctrl+C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				warn!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
