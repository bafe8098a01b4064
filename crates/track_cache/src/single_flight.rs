use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// Coalesces concurrent work per key: the first caller runs the work, late
/// arrivals attach to the in-flight result instead of re-running it. The
/// entry is removed once the work completes, so later calls start fresh.
///
/// Both the value and the error must be `Clone` because every waiter gets
/// its own copy of the shared outcome.
pub struct SingleFlight<T, E>
where
	T: Clone + Send + Sync + 'static,
	E: Clone + Send + Sync + 'static,
{
	inflight: Arc<DashMap<String, Shared<BoxFuture<'static, Result<T, E>>>>>,
}

impl<T, E> SingleFlight<T, E>
where
	T: Clone + Send + Sync + 'static,
	E: Clone + Send + Sync + 'static,
{
	#[must_use]
	pub fn new() -> Self {
		Self { inflight: Arc::new(DashMap::new()) }
	}

	/// Number of keys currently in flight.
	#[must_use]
	pub fn len(&self) -> usize {
		self.inflight.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.inflight.is_empty()
	}

	/// Runs `work` for `key`, or awaits the already in-flight run for that key.
	///
	/// # Errors
	/// Propagates the (shared) error produced by `work`.
	pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>> + Send + 'static,
	{
		let shared = match self.inflight.entry(key.to_string()) {
			Entry::Occupied(entry) => entry.get().clone(),
			Entry::Vacant(entry) => {
				let inflight = Arc::clone(&self.inflight);
				let owned_key = key.to_string();
				let fut = work();
				let shared = async move {
					let result = fut.await;
					inflight.remove(&owned_key);
					result
				}
				.boxed()
				.shared();
				entry.insert(shared.clone());
				shared
			}
		};

		shared.await
	}
}

impl<T, E> Default for SingleFlight<T, E>
where
	T: Clone + Send + Sync + 'static,
	E: Clone + Send + Sync + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}
