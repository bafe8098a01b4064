use crate::single_flight::SingleFlight;
use crate::{CacheEntry, PayloadRef};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

fn cache_key(track_id: &str) -> String {
	format!("tunefetch:track:{track_id}")
}

/// Raw key-value backend behind the track cache. Values are serialized
/// `CacheEntry` JSON; the trait stays at the string level so backends do
/// not need to know the entry shape.
#[async_trait]
pub trait PayloadStore: Send + Sync {
	async fn get(&self, key: &str) -> Option<String>;
	async fn put(&self, key: &str, raw: String, ttl: Duration);
}

pub struct RedisStore {
	conn: ConnectionManager,
}

impl RedisStore {
	/// # Errors
	/// Returns the underlying redis error if the URL is invalid or the
	/// initial connection cannot be established.
	pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
		let client = redis::Client::open(url)?;
		let conn = client.get_connection_manager().await?;
		Ok(Self { conn })
	}
}

#[async_trait]
impl PayloadStore for RedisStore {
	async fn get(&self, key: &str) -> Option<String> {
		let mut conn = self.conn.clone();
		match conn.get::<_, Option<String>>(key).await {
			Ok(raw) => raw,
			Err(error) => {
				debug!(%error, key, "cache read failed, treating as miss");
				None
			}
		}
	}

	async fn put(&self, key: &str, raw: String, ttl: Duration) {
		let mut conn = self.conn.clone();
		let result: Result<(), redis::RedisError> = conn.set_ex(key, raw, ttl.as_secs()).await;
		if let Err(error) = result {
			warn!(%error, key, "cache write failed, payload will not be reused");
		}
	}
}

/// In-memory backend, mainly for tests and single-instance deployments
/// without redis at hand.
#[derive(Default)]
pub struct MemoryStore {
	entries: DashMap<String, (String, Instant, Duration)>,
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl PayloadStore for MemoryStore {
	async fn get(&self, key: &str) -> Option<String> {
		let entry = self.entries.get(key)?;
		let (raw, inserted, ttl) = entry.value();
		if inserted.elapsed() > *ttl {
			let raw_key = key.to_string();
			drop(entry);
			self.entries.remove(&raw_key);
			return None;
		}
		Some(raw.clone())
	}

	async fn put(&self, key: &str, raw: String, ttl: Duration) {
		self.entries.insert(key.to_string(), (raw, Instant::now(), ttl));
	}
}

/// Track payload cache with a miss-then-populate policy and an in-process
/// single-flight guarantee: at most one fetch runs per track id, concurrent
/// requesters share its result.
///
/// A missing or unreachable store degrades to direct fetching; store trouble
/// never fails a request.
pub struct TrackCache<E>
where
	E: Clone + Send + Sync + 'static,
{
	store: Option<Arc<dyn PayloadStore>>,
	ttl: Duration,
	flights: SingleFlight<PayloadRef, E>,
}

impl<E> TrackCache<E>
where
	E: Clone + Send + Sync + 'static,
{
	/// Connects to redis when a URL is configured. A missing URL or a failed
	/// connection both yield a cache that fetches directly.
	pub async fn connect(redis_url: Option<&str>, ttl: Duration) -> Self {
		let store: Option<Arc<dyn PayloadStore>> = match redis_url {
			None => {
				info!("no cache store configured, downloads will not be cached");
				None
			}
			Some(url) => match RedisStore::connect(url).await {
				Ok(store) => {
					info!("connected to cache store");
					Some(Arc::new(store))
				}
				Err(error) => {
					warn!(%error, "cache store unreachable, continuing without caching");
					None
				}
			},
		};

		Self {
			store,
			ttl,
			flights: SingleFlight::new(),
		}
	}

	/// Builds a cache over an explicit backend.
	#[must_use]
	pub fn with_store(store: Arc<dyn PayloadStore>, ttl: Duration) -> Self {
		Self {
			store: Some(store),
			ttl,
			flights: SingleFlight::new(),
		}
	}

	/// A cache that never stores anything.
	#[must_use]
	pub fn disabled() -> Self {
		Self {
			store: None,
			ttl: Duration::ZERO,
			flights: SingleFlight::new(),
		}
	}

	#[must_use]
	pub fn is_enabled(&self) -> bool {
		self.store.is_some()
	}

	/// Looks up the payload reference for a track id.
	pub async fn get(&self, track_id: &str) -> Option<PayloadRef> {
		let store = self.store.as_ref()?;
		let raw = store.get(&cache_key(track_id)).await?;
		match serde_json::from_str::<CacheEntry>(&raw) {
			Ok(entry) => Some(entry.value),
			Err(error) => {
				warn!(%error, track_id, "discarding undecodable cache entry");
				None
			}
		}
	}

	/// Records a payload reference for a track id with the configured TTL.
	pub async fn put(&self, track_id: &str, payload: &PayloadRef) {
		let Some(store) = self.store.as_ref() else { return };
		let entry = CacheEntry::new(track_id.to_string(), payload.clone());
		match serde_json::to_string(&entry) {
			Ok(raw) => store.put(&cache_key(track_id), raw, self.ttl).await,
			Err(error) => warn!(%error, track_id, "failed to encode cache entry"),
		}
	}

	/// Returns the cached payload for `track_id`, or runs `fetch_fn` to
	/// produce and cache it. Concurrent calls for the same id share one
	/// `fetch_fn` invocation. A cached reference whose file has vanished
	/// counts as a miss.
	///
	/// # Errors
	/// Propagates the (shared) error from `fetch_fn`. Store failures are
	/// logged and degrade to direct fetching instead of erroring.
	pub async fn get_or_fetch<F, Fut>(&self, track_id: &str, fetch_fn: F) -> Result<PayloadRef, E>
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = Result<PayloadRef, E>> + Send + 'static,
	{
		if let Some(hit) = self.get(track_id).await {
			if tokio::fs::try_exists(&hit.path).await.unwrap_or(false) {
				debug!(track_id, "cache hit");
				return Ok(hit);
			}
			debug!(track_id, "cached payload file is gone, refetching");
		}

		let store = self.store.clone();
		let ttl = self.ttl;
		let owned_id = track_id.to_string();
		self
			.flights
			.run(track_id, move || async move {
				let payload = fetch_fn().await?;
				if let Some(store) = store {
					let entry = CacheEntry::new(owned_id.clone(), payload.clone());
					match serde_json::to_string(&entry) {
						Ok(raw) => store.put(&cache_key(&owned_id), raw, ttl).await,
						Err(error) => warn!(%error, track_id = %owned_id, "failed to encode cache entry"),
					}
				}
				Ok(payload)
			})
			.await
	}
}
