//! Explicit value cache with per-entry expiry
//!
//! Named collaborator replacing cross-cutting caching decorators: callers go
//! through `get_or_refresh` with an explicit TTL and loader.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rebalancer_types::AdapterResult;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry<V> {
	value: V,
	expires_at: Instant,
}

/// Keyed cache of `{value, expires_at}` entries
///
/// A failed load is never cached; the next call retries the loader.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
	entries: Arc<DashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
	pub fn new() -> Self {
		Self {
			entries: Arc::new(DashMap::new()),
		}
	}

	/// Return the cached value for `key`, or run `loader` and cache its
	/// result for `ttl`
	pub async fn get_or_refresh<F, Fut>(
		&self,
		key: &str,
		ttl: Duration,
		loader: F,
	) -> AdapterResult<V>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = AdapterResult<V>>,
	{
		if let Some(entry) = self.entries.get(key) {
			if entry.expires_at > Instant::now() {
				return Ok(entry.value.clone());
			}
		}

		debug!(key, "cache miss, refreshing");
		let value = loader().await?;
		self.entries.insert(
			key.to_string(),
			Entry {
				value: value.clone(),
				expires_at: Instant::now() + ttl,
			},
		);
		Ok(value)
	}

	/// Drop one entry, forcing the next call to reload
	pub fn invalidate(&self, key: &str) {
		self.entries.remove(key);
	}

	pub fn clear(&self) {
		self.entries.clear();
	}
}

impl<V: Clone> Default for TtlCache<V> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[tokio::test]
	async fn loader_runs_once_within_ttl() {
		let cache: TtlCache<u32> = TtlCache::new();
		let loads = AtomicU32::new(0);

		for _ in 0..3 {
			let value = cache
				.get_or_refresh("domains", Duration::from_secs(60), || async {
					loads.fetch_add(1, Ordering::SeqCst);
					Ok(7)
				})
				.await
				.unwrap();
			assert_eq!(value, 7);
		}
		assert_eq!(loads.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn expired_entries_reload() {
		let cache: TtlCache<u32> = TtlCache::new();
		let loads = AtomicU32::new(0);

		let load = || async {
			Ok(loads.fetch_add(1, Ordering::SeqCst))
		};
		let first = cache
			.get_or_refresh("k", Duration::from_millis(10), load)
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(30)).await;
		let second = cache
			.get_or_refresh("k", Duration::from_millis(10), load)
			.await
			.unwrap();
		assert_ne!(first, second);
	}

	#[tokio::test]
	async fn failed_loads_are_not_cached() {
		let cache: TtlCache<u32> = TtlCache::new();
		let result = cache
			.get_or_refresh("k", Duration::from_secs(60), || async {
				Err(rebalancer_types::AdapterError::Http("down".into()))
			})
			.await;
		assert!(result.is_err());

		let value = cache
			.get_or_refresh("k", Duration::from_secs(60), || async { Ok(3) })
			.await
			.unwrap();
		assert_eq!(value, 3);
	}
}
