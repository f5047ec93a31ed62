//! Per-chain settlement watcher.
//!
//! The watcher connects, prefers a push subscription and falls back to
//! polling confirmed block windows. Any transport failure drops the
//! connection and reconnects after a fixed backoff. Individual logs are
//! applied at most once: a log that fails to decode or to persist is logged
//! and dropped.

use crate::{ChainConnector, ChainLog, DiscoveryError, LogSource, LogStream, SettlementEvent};
use alloy_primitives::Address;
use chrono::Utc;
use futures::StreamExt;
use indexer_storage::{StorageError, StoredTransition, TaskStore};
use indexer_types::{AuditEvent, ChainEvent, EventBus, IndexerEvent, TransitionOutcome};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(10);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct WatcherConfig {
	pub chain_id: u64,
	pub settlement_contract: Address,
	pub min_confirmations: u64,
	pub rpc_url: String,
	pub poll_interval: Duration,
	pub reconnect_backoff: Duration,
	pub rpc_timeout: Duration,
}

impl WatcherConfig {
	pub fn new(chain_id: u64, settlement_contract: Address, rpc_url: impl Into<String>) -> Self {
		Self {
			chain_id,
			settlement_contract,
			min_confirmations: 0,
			rpc_url: rpc_url.into(),
			poll_interval: DEFAULT_POLL_INTERVAL,
			reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
			rpc_timeout: DEFAULT_RPC_TIMEOUT,
		}
	}
}

pub struct ChainWatcher {
	config: WatcherConfig,
	connector: Arc<dyn ChainConnector>,
	store: Arc<TaskStore>,
	event_bus: EventBus,
	/// Last block fully processed in poll mode. Survives reconnects.
	cursor: Option<u64>,
}

impl ChainWatcher {
	pub fn new(
		config: WatcherConfig,
		connector: Arc<dyn ChainConnector>,
		store: Arc<TaskStore>,
		event_bus: EventBus,
	) -> Self {
		Self {
			config,
			connector,
			store,
			event_bus,
			cursor: None,
		}
	}

	/// Runs until `cancel` fires. Never returns an error.
	pub async fn run(mut self, cancel: CancellationToken) {
		let chain_id = self.config.chain_id;

		while !cancel.is_cancelled() {
			if let Err(e) = self.run_once(&cancel).await {
				warn!(
					chain_id,
					error = %e,
					backoff = ?self.config.reconnect_backoff,
					"Chain watcher disconnected, reconnecting"
				);
			}

			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = tokio::time::sleep(self.config.reconnect_backoff) => {}
			}
		}

		info!(chain_id, "Chain watcher stopped");
	}

	async fn run_once(&mut self, cancel: &CancellationToken) -> Result<(), DiscoveryError> {
		let timeout = self.config.rpc_timeout;

		let source = tokio::select! {
			_ = cancel.cancelled() => return Ok(()),
			source = bounded(timeout, self.connector.connect(&self.config)) => source?,
		};

		let subscription = tokio::select! {
			_ = cancel.cancelled() => return Ok(()),
			sub = bounded(timeout, source.subscribe()) => sub,
		};

		match subscription {
			Ok(stream) => {
				info!(
					chain_id = self.config.chain_id,
					contract = %self.config.settlement_contract,
					"Subscribed to settlement logs"
				);
				self.stream_logs(source.as_ref(), stream, cancel).await
			}
			Err(e) => {
				info!(
					chain_id = self.config.chain_id,
					reason = %e,
					"Subscription not available, falling back to polling"
				);
				self.poll_logs(source.as_ref(), cancel).await
			}
		}
	}

	async fn stream_logs(
		&self,
		source: &dyn LogSource,
		mut stream: LogStream,
		cancel: &CancellationToken,
	) -> Result<(), DiscoveryError> {
		loop {
			let next = tokio::select! {
				_ = cancel.cancelled() => return Ok(()),
				next = stream.next() => next,
			};

			match next {
				Some(Ok(log)) => self.handle_log(source, log, None).await?,
				Some(Err(e)) => return Err(e),
				None => return Err(DiscoveryError::SubscriptionClosed),
			}
		}
	}

	async fn poll_logs(
		&mut self,
		source: &dyn LogSource,
		cancel: &CancellationToken,
	) -> Result<(), DiscoveryError> {
		let timeout = self.config.rpc_timeout;

		let mut cursor = match self.cursor {
			Some(cursor) => cursor,
			None => {
				let head = bounded(timeout, source.block_number()).await?;
				let start = self.confirmed_head(head);
				self.cursor = Some(start);
				start
			}
		};

		let mut ticker = tokio::time::interval(self.config.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		ticker.tick().await;

		loop {
			tokio::select! {
				_ = cancel.cancelled() => return Ok(()),
				_ = ticker.tick() => {}
			}

			let head = bounded(timeout, source.block_number()).await?;
			let to_block = self.confirmed_head(head);
			if to_block <= cursor {
				debug!(
					chain_id = self.config.chain_id,
					cursor,
					head,
					"Waiting for new confirmed blocks"
				);
				continue;
			}

			let logs = bounded(timeout, source.get_logs(cursor + 1, to_block)).await?;
			debug!(
				chain_id = self.config.chain_id,
				from_block = cursor + 1,
				to_block,
				count = logs.len(),
				"Polled settlement logs"
			);
			for log in logs {
				self.handle_log(source, log, Some(head)).await?;
			}

			cursor = to_block;
			self.cursor = Some(cursor);
		}
	}

	fn confirmed_head(&self, head: u64) -> u64 {
		head.saturating_sub(self.config.min_confirmations)
	}

	/// Applies one log. `known_head` skips the head lookup when the caller
	/// already has it.
	///
	/// Only a failure to read the head is returned; everything else is
	/// logged and the log dropped.
	pub(crate) async fn handle_log(
		&self,
		source: &dyn LogSource,
		log: ChainLog,
		known_head: Option<u64>,
	) -> Result<(), DiscoveryError> {
		let chain_id = self.config.chain_id;
		let tx_hash = log.tx_hash_hex();

		if log.removed {
			debug!(chain_id, tx_hash = %tx_hash, "Skipping removed log");
			return Ok(());
		}

		let min_confirmations = self.config.min_confirmations;
		if min_confirmations > 0 {
			let Some(block) = log.block_number else {
				debug!(chain_id, tx_hash = %tx_hash, "Deferring log without block number");
				return Ok(());
			};
			let head = match known_head {
				Some(head) => head,
				None => bounded(self.config.rpc_timeout, source.block_number()).await?,
			};
			if head < block.saturating_add(min_confirmations) {
				debug!(
					chain_id,
					tx_hash = %tx_hash,
					block,
					head,
					min_confirmations,
					"Deferring unconfirmed log"
				);
				return Ok(());
			}
		}

		match SettlementEvent::decode(&log) {
			Ok(Some(event)) => self.apply_event(event, &tx_hash, log.block_number).await,
			Ok(None) => {}
			Err(e) => warn!(chain_id, tx_hash = %tx_hash, error = %e, "Dropping undecodable log"),
		}
		Ok(())
	}

	async fn apply_event(&self, event: SettlementEvent, tx_hash: &str, block_number: Option<u64>) {
		let chain_id = self.config.chain_id;
		let now = Utc::now();

		let result = match &event {
			SettlementEvent::Created { task_hash, .. } => {
				match self.store.get_task_by_hash(task_hash).await {
					Ok(task) => {
						self.store
							.update_onchain_created(&task.task_id, tx_hash, now)
							.await
					}
					Err(StorageError::NotFound(_)) => {
						self.audit_unmatched_create(task_hash, tx_hash, block_number);
						return;
					}
					Err(e) => Err(e),
				}
			}
			SettlementEvent::WorkerSet { task_hash, worker } => {
				self.store
					.update_onchain_worker_set(task_hash, worker, tx_hash)
					.await
			}
			SettlementEvent::Released { task_hash } => {
				self.store
					.update_onchain_released(task_hash, tx_hash, now)
					.await
			}
			SettlementEvent::Refunded { task_hash } => {
				self.store
					.update_onchain_refunded(task_hash, tx_hash, now)
					.await
			}
		};

		match result {
			Ok(StoredTransition {
				task,
				outcome: TransitionOutcome::Applied,
			}) => {
				info!(
					chain_id,
					task_id = %task.task_id,
					task_hash = %task.task_hash,
					tx_hash = %tx_hash,
					status = %task.status,
					"{} applied",
					event.name()
				);
				self.event_bus
					.publish(IndexerEvent::Chain(ChainEvent::TransitionApplied {
						chain_id,
						task_id: task.task_id,
						status: task.status,
						tx_hash: tx_hash.to_string(),
					}))
					.ok();
			}
			Ok(StoredTransition { task, outcome }) => {
				debug!(
					chain_id,
					task_id = %task.task_id,
					tx_hash = %tx_hash,
					outcome = ?outcome,
					status = %task.status,
					"{} left task unchanged",
					event.name()
				);
			}
			Err(e) => {
				warn!(
					chain_id,
					task_hash = %event.task_hash(),
					tx_hash = %tx_hash,
					error = %e,
					"Failed to apply {}",
					event.name()
				);
			}
		}
	}

	fn audit_unmatched_create(&self, task_hash: &str, tx_hash: &str, block_number: Option<u64>) {
		warn!(
			target: "audit",
			chain_id = self.config.chain_id,
			task_hash = %task_hash,
			tx_hash = %tx_hash,
			block_number = ?block_number,
			"unexpected_onchain_create"
		);
		self.event_bus
			.publish(IndexerEvent::Audit(AuditEvent::UnmatchedCreate {
				chain_id: self.config.chain_id,
				task_hash: task_hash.to_string(),
				tx_hash: tx_hash.to_string(),
				block_number,
			}))
			.ok();
	}
}

async fn bounded<T>(
	timeout: Duration,
	call: impl Future<Output = Result<T, DiscoveryError>>,
) -> Result<T, DiscoveryError> {
	tokio::time::timeout(timeout, call)
		.await
		.map_err(|_| DiscoveryError::Timeout(timeout))?
}
