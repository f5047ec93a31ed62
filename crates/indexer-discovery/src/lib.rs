//! On-chain settlement discovery.
//!
//! One [`ChainWatcher`] runs per configured chain. It obtains a [`LogSource`]
//! from a [`ChainConnector`], streams or polls the settlement contract's logs
//! and mirrors the decoded events into the task store.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use indexer_storage::TaskStore;
use indexer_types::EventBus;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod events;
pub mod watcher;

pub mod implementations {
	pub mod onchain {
		pub mod alloy;
	}
}

pub use events::SettlementEvent;
pub use watcher::{ChainWatcher, WatcherConfig};

#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("Connection error: {0}")]
	Connection(String),
	#[error("Subscription unavailable: {0}")]
	SubscriptionUnavailable(String),
	#[error("Subscription closed")]
	SubscriptionClosed,
	#[error("RPC error: {0}")]
	Rpc(String),
	#[error("RPC call timed out after {0:?}")]
	Timeout(std::time::Duration),
	#[error("Decode error: {0}")]
	Decode(String),
}

/// A contract log as seen by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLog {
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
	pub block_number: Option<u64>,
	pub tx_hash: Option<B256>,
	pub removed: bool,
}

impl ChainLog {
	pub fn topic0(&self) -> Option<&B256> {
		self.topics.first()
	}

	/// Transaction hash as `0x` hex, empty when the node did not report one.
	pub fn tx_hash_hex(&self) -> String {
		self.tx_hash
			.map(|hash| format!("0x{}", hex::encode(hash)))
			.unwrap_or_default()
	}
}

impl From<alloy_rpc_types::Log> for ChainLog {
	fn from(log: alloy_rpc_types::Log) -> Self {
		Self {
			address: log.address(),
			topics: log.topics().to_vec(),
			data: log.data().data.clone(),
			block_number: log.block_number,
			tx_hash: log.transaction_hash,
			removed: log.removed,
		}
	}
}

pub type LogStream = BoxStream<'static, Result<ChainLog, DiscoveryError>>;

/// A live connection to one chain's RPC endpoint, scoped to the settlement
/// contract it was opened for.
#[async_trait]
pub trait LogSource: Send + Sync {
	async fn block_number(&self) -> Result<u64, DiscoveryError>;

	async fn get_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<ChainLog>, DiscoveryError>;

	/// Opens a push subscription. Endpoints without one return
	/// [`DiscoveryError::SubscriptionUnavailable`].
	async fn subscribe(&self) -> Result<LogStream, DiscoveryError>;
}

#[async_trait]
pub trait ChainConnector: Send + Sync {
	async fn connect(&self, config: &WatcherConfig) -> Result<Box<dyn LogSource>, DiscoveryError>;
}

/// Supervises the per-chain watchers.
pub struct DiscoveryService {
	connector: Arc<dyn ChainConnector>,
	store: Arc<TaskStore>,
	event_bus: EventBus,
	chains: Vec<WatcherConfig>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DiscoveryService {
	pub fn new(
		connector: Arc<dyn ChainConnector>,
		store: Arc<TaskStore>,
		event_bus: EventBus,
		chains: Vec<WatcherConfig>,
	) -> Self {
		Self {
			connector,
			store,
			event_bus,
			chains,
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn chains(&self) -> &[WatcherConfig] {
		&self.chains
	}

	/// Spawns one watcher task per chain. Each stops when `cancel` fires.
	pub async fn start_all(&self, cancel: &CancellationToken) {
		let mut handles = self.handles.lock().await;
		for config in &self.chains {
			info!(
				chain_id = config.chain_id,
				contract = %config.settlement_contract,
				min_confirmations = config.min_confirmations,
				"Starting chain watcher"
			);
			let watcher = ChainWatcher::new(
				config.clone(),
				self.connector.clone(),
				self.store.clone(),
				self.event_bus.clone(),
			);
			let token = cancel.child_token();
			handles.push(tokio::spawn(async move { watcher.run(token).await }));
		}
	}

	/// Waits for every spawned watcher to exit.
	pub async fn join_all(&self) {
		let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
		for handle in handles {
			if let Err(e) = handle.await {
				warn!(error = %e, "Chain watcher task ended abnormally");
			}
		}
	}
}
