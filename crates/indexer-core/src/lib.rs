//! Wires storage, intake and chain watchers into one running indexer.

use alloy_primitives::Address;
use indexer_config::Config;
use indexer_discovery::implementations::onchain::alloy::AlloyConnector;
use indexer_discovery::{ChainConnector, DiscoveryService, WatcherConfig};
use indexer_storage::{StorageError, StorageInterface, TaskStore};
use indexer_task::{TaskService, TaskValidator};
use indexer_types::{AuditEvent, EventBus, IndexerEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_BUS_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum IndexerError {
	#[error("Configuration error: {0}")]
	Config(String),
}

pub struct IndexerEngine {
	config: Config,
	tasks: Arc<TaskService>,
	discovery: Arc<DiscoveryService>,
	event_bus: EventBus,
	shutdown: CancellationToken,
}

impl IndexerEngine {
	/// Starts every chain watcher and follows the event bus until shutdown.
	pub async fn run(&self) -> Result<(), IndexerError> {
		let mut events = self.event_bus.subscribe();
		self.discovery.start_all(&self.shutdown).await;
		info!(
			watchers = self.discovery.chains().len(),
			"Indexer engine started"
		);

		loop {
			tokio::select! {
				_ = self.shutdown.cancelled() => break,
				event = events.recv() => match event {
					Ok(event) => self.observe(&event),
					Err(RecvError::Lagged(skipped)) => {
						warn!(skipped, "Event observer lagged behind the bus");
					}
					Err(RecvError::Closed) => break,
				},
			}
		}

		info!("Stopping chain watchers");
		self.discovery.join_all().await;
		Ok(())
	}

	fn observe(&self, event: &IndexerEvent) {
		match event {
			IndexerEvent::Audit(AuditEvent::UnmatchedCreate { chain_id, .. }) => {
				debug!(chain_id, "Unmatched on-chain create recorded");
			}
			other => debug!(event = ?other, "Indexer event"),
		}
	}

	pub fn tasks(&self) -> Arc<TaskService> {
		self.tasks.clone()
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Token cancelled when the indexer shuts down.
	pub fn shutdown_token(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	pub fn shutdown(&self) {
		self.shutdown.cancel();
	}
}

type StorageFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send>;

pub struct IndexerBuilder {
	config: Config,
	storage_factory: Option<StorageFactory>,
	connector: Option<Arc<dyn ChainConnector>>,
}

impl IndexerBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factory: None,
			connector: None,
		}
	}

	/// Overrides the backend named in `[storage]`.
	pub fn with_storage_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send + 'static,
	{
		self.storage_factory = Some(Box::new(factory));
		self
	}

	/// Replaces the default alloy connector used by the chain watchers.
	pub fn with_connector(mut self, connector: Arc<dyn ChainConnector>) -> Self {
		self.connector = Some(connector);
		self
	}

	pub fn build(self) -> Result<IndexerEngine, IndexerError> {
		let storage_config = &self.config.storage;
		let backend = match &self.storage_factory {
			Some(factory) => factory(&storage_config.config),
			None => {
				let factory = indexer_storage::storage_factory(&storage_config.backend)
					.ok_or_else(|| {
						IndexerError::Config(format!(
							"Unknown storage backend: {}",
							storage_config.backend
						))
					})?;
				factory(&storage_config.config)
			}
		}
		.map_err(|e| IndexerError::Config(format!("Storage backend: {}", e)))?;
		let store = Arc::new(TaskStore::new(backend));

		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

		let validator = TaskValidator::new(self.config.supported_chains());
		let tasks = Arc::new(TaskService::new(
			store.clone(),
			validator,
			self.config.indexer.fee_bps,
			event_bus.clone(),
		));

		let watchers = watcher_configs(&self.config)?;
		let connector = self
			.connector
			.unwrap_or_else(|| Arc::new(AlloyConnector));
		let discovery = Arc::new(DiscoveryService::new(
			connector,
			store,
			event_bus.clone(),
			watchers,
		));

		Ok(IndexerEngine {
			config: self.config,
			tasks,
			discovery,
			event_bus,
			shutdown: CancellationToken::new(),
		})
	}
}

fn watcher_configs(config: &Config) -> Result<Vec<WatcherConfig>, IndexerError> {
	config
		.watched_chains()
		.filter_map(|chain| chain.rpc_url.as_ref().map(|url| (chain, url)))
		.map(|(chain, rpc_url)| {
			let contract: Address = chain.settlement_contract.parse().map_err(|e| {
				IndexerError::Config(format!(
					"chain {}: invalid settlement_contract: {}",
					chain.chain_id, e
				))
			})?;

			let mut watcher = WatcherConfig::new(chain.chain_id, contract, rpc_url.clone());
			watcher.min_confirmations = chain.min_confirmations;
			watcher.poll_interval = chain.poll_interval();
			watcher.reconnect_backoff = chain.reconnect_backoff();
			watcher.rpc_timeout = chain.rpc_timeout();
			Ok(watcher)
		})
		.collect()
}
