//! HTTP client cache for optimized connection management
//!
//! Provides per-endpoint client instances with connection pooling and
//! keep-alive, expired and recreated on a TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rebalancer_types::{AdapterError, AdapterResult};
use reqwest::{Client, ClientBuilder};
use tracing::{debug, warn};

/// Configuration for creating optimized HTTP clients
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientConfig {
	pub base_url: String,
	pub timeout_ms: u64,
	/// Additional headers (auth, content negotiation)
	pub headers: Vec<(String, String)>,
}

impl ClientConfig {
	pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Self {
		Self {
			base_url: base_url.into(),
			timeout_ms,
			headers: vec![
				("Accept".to_string(), "application/json".to_string()),
				("User-Agent".to_string(), "rebalancer/0.1".to_string()),
			],
		}
	}

	pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((key.into(), value.into()));
		self
	}

	/// Attach an API key header when one is configured
	pub fn with_api_key(self, header: &str, key: Option<&str>) -> Self {
		match key {
			Some(key) => self.with_header(header, key),
			None => self,
		}
	}
}

#[derive(Debug, Clone)]
struct CachedClient {
	client: Arc<Client>,
	created_at: Instant,
}

impl CachedClient {
	fn is_expired(&self, ttl: Duration) -> bool {
		self.created_at.elapsed() > ttl
	}
}

/// Thread-safe cache of HTTP clients keyed by endpoint configuration
#[derive(Clone, Debug)]
pub struct ClientCache {
	clients: Arc<DashMap<ClientConfig, CachedClient>>,
	ttl: Duration,
}

impl ClientCache {
	/// Create a new client cache with the default 30-minute TTL
	pub fn new() -> Self {
		Self::with_ttl(Duration::from_secs(30 * 60))
	}

	pub fn with_ttl(ttl: Duration) -> Self {
		Self {
			clients: Arc::new(DashMap::new()),
			ttl,
		}
	}

	/// Get or create a pooled client for the given configuration
	pub fn get_client(&self, config: &ClientConfig) -> AdapterResult<Arc<Client>> {
		self.clients.remove_if(config, |_, cached| {
			let expired = cached.is_expired(self.ttl);
			if expired {
				warn!(
					endpoint = %config.base_url,
					age = ?cached.created_at.elapsed(),
					"client cache entry expired, recreating"
				);
			}
			expired
		});

		if let Some(cached) = self.clients.get(config) {
			return Ok(cached.client.clone());
		}

		debug!(endpoint = %config.base_url, "creating new pooled client");
		let client = Arc::new(Self::build_client(config)?);

		use dashmap::mapref::entry::Entry;
		match self.clients.entry(config.clone()) {
			// Another task won the race; use its client
			Entry::Occupied(entry) => Ok(entry.get().client.clone()),
			Entry::Vacant(entry) => {
				entry.insert(CachedClient {
					client: client.clone(),
					created_at: Instant::now(),
				});
				Ok(client)
			},
		}
	}

	fn build_client(config: &ClientConfig) -> AdapterResult<Client> {
		let mut header_map = reqwest::header::HeaderMap::new();
		for (key, value) in &config.headers {
			if let (Ok(name), Ok(value)) = (
				reqwest::header::HeaderName::from_bytes(key.as_bytes()),
				reqwest::header::HeaderValue::from_str(value),
			) {
				header_map.insert(name, value);
			}
		}

		ClientBuilder::new()
			.default_headers(header_map)
			.timeout(Duration::from_millis(config.timeout_ms))
			.pool_max_idle_per_host(10)
			.tcp_keepalive(Duration::from_secs(60))
			.build()
			.map_err(|e| AdapterError::Http(e.to_string()))
	}

	pub fn ttl(&self) -> Duration {
		self.ttl
	}
}

impl Default for ClientCache {
	fn default() -> Self {
		Self::new()
	}
}

lazy_static::lazy_static! {
	static ref GLOBAL_CLIENT_CACHE: ClientCache = ClientCache::new();
}

/// Shared process-wide client cache for adapter implementations
pub fn adapter_client_cache() -> ClientCache {
	GLOBAL_CLIENT_CACHE.clone()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn cache_reuses_clients_per_config() {
		let cache = ClientCache::new();
		let config = ClientConfig::new("https://quotes.example", 5_000);

		let a = cache.get_client(&config).unwrap();
		let b = cache.get_client(&config).unwrap();
		assert!(Arc::ptr_eq(&a, &b));

		let other = config.clone().with_header("X-Api-Key", "k");
		let c = cache.get_client(&other).unwrap();
		assert!(!Arc::ptr_eq(&a, &c));
	}

	#[tokio::test]
	async fn cache_recreates_after_ttl() {
		let cache = ClientCache::with_ttl(Duration::from_millis(20));
		let config = ClientConfig::new("https://ttl.example", 5_000);

		let a = cache.get_client(&config).unwrap();
		tokio::time::sleep(Duration::from_millis(50)).await;
		let b = cache.get_client(&config).unwrap();
		assert!(!Arc::ptr_eq(&a, &b));
	}
}
