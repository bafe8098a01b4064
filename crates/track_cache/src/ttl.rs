use dashmap::DashMap;
use std::time::{Duration, Instant};

struct TtlEntry<V> {
	value: V,
	inserted: Instant,
}

/// Small in-memory map whose entries expire after a fixed TTL. Expired
/// entries are dropped lazily on access.
pub struct TtlCache<V>
where
	V: Clone,
{
	ttl: Duration,
	entries: DashMap<String, TtlEntry<V>>,
}

impl<V> TtlCache<V>
where
	V: Clone,
{
	#[must_use]
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, entries: DashMap::new() }
	}

	#[must_use]
	pub fn get(&self, key: &str) -> Option<V> {
		let entry = self.entries.get(key)?;
		if entry.inserted.elapsed() > self.ttl {
			drop(entry);
			self.entries.remove(key);
			return None;
		}
		Some(entry.value.clone())
	}

	pub fn insert(&self, key: &str, value: V) {
		self.entries.insert(key.to_string(), TtlEntry { value, inserted: Instant::now() });
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
