//! Alloy-backed chain connection.
//!
//! `ws://` and `wss://` endpoints get a push subscription; HTTP endpoints
//! only support polling.

use crate::{ChainConnector, ChainLog, DiscoveryError, LogSource, LogStream, WatcherConfig};
use alloy_primitives::Address;
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types::Filter;
use alloy_transport::BoxTransport;
use async_trait::async_trait;
use futures::StreamExt;

#[derive(Debug, Default, Clone, Copy)]
pub struct AlloyConnector;

#[async_trait]
impl ChainConnector for AlloyConnector {
	async fn connect(&self, config: &WatcherConfig) -> Result<Box<dyn LogSource>, DiscoveryError> {
		let provider = ProviderBuilder::new()
			.on_builtin(&config.rpc_url)
			.await
			.map_err(|e| DiscoveryError::Connection(format!("{}: {}", config.rpc_url, e)))?;

		Ok(Box::new(AlloyLogSource {
			provider,
			contract: config.settlement_contract,
			pubsub: supports_pubsub(&config.rpc_url),
		}))
	}
}

pub struct AlloyLogSource {
	provider: RootProvider<BoxTransport>,
	contract: Address,
	pubsub: bool,
}

#[async_trait]
impl LogSource for AlloyLogSource {
	async fn block_number(&self) -> Result<u64, DiscoveryError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| DiscoveryError::Rpc(format!("eth_blockNumber: {}", e)))
	}

	async fn get_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<ChainLog>, DiscoveryError> {
		let filter = Filter::new()
			.address(self.contract)
			.from_block(from_block)
			.to_block(to_block);

		let logs = self
			.provider
			.get_logs(&filter)
			.await
			.map_err(|e| DiscoveryError::Rpc(format!("eth_getLogs: {}", e)))?;

		Ok(logs.into_iter().map(ChainLog::from).collect())
	}

	async fn subscribe(&self) -> Result<LogStream, DiscoveryError> {
		if !self.pubsub {
			return Err(DiscoveryError::SubscriptionUnavailable(
				"endpoint is not a websocket".to_string(),
			));
		}

		let subscription = self
			.provider
			.subscribe_logs(&Filter::new().address(self.contract))
			.await
			.map_err(|e| DiscoveryError::SubscriptionUnavailable(e.to_string()))?;

		Ok(subscription
			.into_stream()
			.map(|log| Ok(ChainLog::from(log)))
			.boxed())
	}
}

fn supports_pubsub(rpc_url: &str) -> bool {
	let url = rpc_url.to_ascii_lowercase();
	url.starts_with("ws://") || url.starts_with("wss://")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_pubsub_detection() {
		assert!(supports_pubsub("wss://base.example/ws"));
		assert!(supports_pubsub("WS://localhost:8546"));
		assert!(!supports_pubsub("https://base.example"));
		assert!(!supports_pubsub("http://localhost:8545"));
	}

	#[tokio::test]
	async fn test_connect_rejects_unparseable_url() {
		let config = WatcherConfig::new(1, Address::ZERO, "not a url");
		assert!(matches!(
			AlloyConnector.connect(&config).await,
			Err(DiscoveryError::Connection(_))
		));
	}
}
