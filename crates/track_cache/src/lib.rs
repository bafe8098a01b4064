pub mod single_flight;
pub mod store;
pub mod ttl;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use single_flight::SingleFlight;
pub use store::{MemoryStore, PayloadStore, RedisStore, TrackCache};
pub use ttl::TtlCache;

/// Reference to a delivery-ready audio payload on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRef {
	pub path: PathBuf,
}

impl PayloadRef {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}
}

/// What actually lives in the store, keyed by track id. Never mutated;
/// eviction is the store's own TTL policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
	pub key: String,
	pub value: PayloadRef,
	pub created_at: DateTime<Utc>,
}

impl CacheEntry {
	#[must_use]
	pub fn new(key: String, value: PayloadRef) -> Self {
		Self {
			key,
			value,
			created_at: Utc::now(),
		}
	}
}
