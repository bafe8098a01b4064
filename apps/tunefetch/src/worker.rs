use crate::deeplink;
use crate::error::RequestError;
use crate::gateway::DeliveryGateway;
use crate::messages;
use crate::orchestrator::{fail_request, CatalogApi, DownloadJob, Request, RequestState};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use track_cache::TrackCache;
use track_fetcher::{FetchError, FetchSource};
use tracing::{error, info};

/// One member of the download pool. Workers share the job receiver and the
/// track cache; the cache's single-flight keeps two workers from fetching
/// the same track at once.
pub struct DownloadWorker<C, F, G>
where
	C: CatalogApi,
	F: FetchSource + 'static,
	G: DeliveryGateway,
{
	id: usize,
	catalog: Arc<C>,
	fetcher: Arc<F>,
	cache: Arc<TrackCache<FetchError>>,
	gateway: Arc<G>,
	jobs: Arc<Mutex<mpsc::Receiver<DownloadJob>>>,
	bot_username: String,
	cancel: CancellationToken,
}

impl<C, F, G> DownloadWorker<C, F, G>
where
	C: CatalogApi,
	F: FetchSource + 'static,
	G: DeliveryGateway,
{
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		id: usize,
		catalog: Arc<C>,
		fetcher: Arc<F>,
		cache: Arc<TrackCache<FetchError>>,
		gateway: Arc<G>,
		jobs: Arc<Mutex<mpsc::Receiver<DownloadJob>>>,
		bot_username: String,
		cancel: CancellationToken,
	) -> Self {
		Self {
			id,
			catalog,
			fetcher,
			cache,
			gateway,
			jobs,
			bot_username,
			cancel,
		}
	}

	pub async fn run(self) {
		info!(worker = self.id, "download worker started");
		loop {
			let job = tokio::select! {
				() = self.cancel.cancelled() => break,
				job = async { self.jobs.lock().await.recv().await } => match job {
					Some(job) => job,
					None => break,
				},
			};
			self.process(job).await;
		}
		info!(worker = self.id, "download worker stopped");
	}

	/// Drives one job through `Fetching → Delivering → Done`, translating
	/// failures into user messages. Never returns an error: every outcome is
	/// terminal for the job only.
	pub(crate) async fn process(&self, job: DownloadJob) -> RequestState {
		let mut request = Request::download(job.chat_id, job.user_id);

		let track = match self.catalog.track(&job.track_id).await {
			Ok(track) => track,
			Err(catalog_error) => return fail_request(self.gateway.as_ref(), &mut request, &catalog_error.into()).await,
		};

		let fetcher = Arc::clone(&self.fetcher);
		let fetch_track = track.clone();
		let result = self.cache.get_or_fetch(&track.id, move || async move { fetcher.fetch(&fetch_track).await }).await;

		let payload = match result {
			Ok(payload) => payload,
			Err(fetch_error) => return fail_request(self.gateway.as_ref(), &mut request, &fetch_error.into()).await,
		};

		request.advance(RequestState::Delivering);
		let caption = messages::share_caption(&deeplink::share_link(&self.bot_username, &track.id));

		match self.gateway.send_audio(job.chat_id, payload.path(), &caption).await {
			Ok(()) => {
				info!(worker = self.id, chat_id = job.chat_id.0, track_id = %track.id, "track delivered");
				request.advance(RequestState::Done);
				RequestState::Done
			}
			Err(delivery_error) => {
				// DeliveryFailed: logged and dropped, no further messaging.
				error!(worker = self.id, chat_id = job.chat_id.0, error = %RequestError::from(delivery_error), "delivery failed, dropping request");
				request.advance(RequestState::Failed);
				RequestState::Failed
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::orchestrator::test_support::{sample_track, MockCatalog, MockGateway, Sent};
	use async_trait::async_trait;
	use spotify_catalog::Track;
	use std::io::Write;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;
	use teloxide::types::ChatId;
	use track_cache::{MemoryStore, PayloadRef};

	const CHAT: ChatId = ChatId(55);

	struct MockFetcher {
		payload: Result<PayloadRef, FetchError>,
		calls: AtomicUsize,
	}

	impl MockFetcher {
		fn ok(payload: PayloadRef) -> Self {
			Self {
				payload: Ok(payload),
				calls: AtomicUsize::new(0),
			}
		}

		fn failing(error: FetchError) -> Self {
			Self {
				payload: Err(error),
				calls: AtomicUsize::new(0),
			}
		}
	}

	#[async_trait]
	impl FetchSource for MockFetcher {
		async fn fetch(&self, _track: &Track) -> Result<PayloadRef, FetchError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.payload.clone()
		}
	}

	fn payload_in(dir: &tempfile::TempDir) -> PayloadRef {
		let path = dir.path().join("song.mp3");
		let mut file = std::fs::File::create(&path).unwrap();
		file.write_all(b"mp3").unwrap();
		PayloadRef::new(path)
	}

	fn worker(catalog: MockCatalog, fetcher: Arc<MockFetcher>, gateway: Arc<MockGateway>, cache: Arc<TrackCache<FetchError>>) -> DownloadWorker<MockCatalog, MockFetcher, MockGateway> {
		let (_tx, rx) = mpsc::channel(1);
		DownloadWorker::new(
			0,
			Arc::new(catalog),
			fetcher,
			cache,
			gateway,
			Arc::new(Mutex::new(rx)),
			"tunefetch_bot".to_string(),
			CancellationToken::new(),
		)
	}

	fn job(track_id: &str) -> DownloadJob {
		DownloadJob {
			chat_id: CHAT,
			user_id: 1,
			track_id: track_id.to_string(),
		}
	}

	#[tokio::test]
	async fn successful_job_ends_done_with_audio_delivered() {
		let dir = tempfile::tempdir().unwrap();
		let payload = payload_in(&dir);
		let gateway = Arc::new(MockGateway::new());
		let fetcher = Arc::new(MockFetcher::ok(payload.clone()));
		let catalog = MockCatalog::with_tracks(vec![sample_track("t1", "Imagine", "John Lennon")]);
		let cache = Arc::new(TrackCache::disabled());

		let state = worker(catalog, fetcher, Arc::clone(&gateway), cache).process(job("t1")).await;

		assert_eq!(state, RequestState::Done);
		let sent = gateway.sent.lock().await;
		let Sent::Audio(chat, path, caption) = &sent[0] else {
			panic!("expected audio, got {sent:?}");
		};
		assert_eq!(*chat, CHAT);
		assert_eq!(*path, payload.path);
		assert!(caption.contains("t.me/tunefetch_bot?start="));
	}

	#[tokio::test]
	async fn cached_track_skips_the_fetcher() {
		let dir = tempfile::tempdir().unwrap();
		let payload = payload_in(&dir);
		let gateway = Arc::new(MockGateway::new());
		let fetcher = Arc::new(MockFetcher::ok(payload.clone()));
		let catalog = MockCatalog::with_tracks(vec![sample_track("t1", "Imagine", "John Lennon")]);
		let cache = Arc::new(TrackCache::with_store(Arc::new(MemoryStore::new()), Duration::from_secs(60)));
		cache.put("t1", &payload).await;

		let state = worker(catalog, Arc::clone(&fetcher), Arc::clone(&gateway), cache).process(job("t1")).await;

		assert_eq!(state, RequestState::Done);
		assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn missing_source_fails_with_unavailable_message() {
		let gateway = Arc::new(MockGateway::new());
		let fetcher = Arc::new(MockFetcher::failing(FetchError::SourceNotFound {
			track_id: "t1".to_string(),
			detail: "nothing".to_string(),
		}));
		let catalog = MockCatalog::with_tracks(vec![sample_track("t1", "Imagine", "John Lennon")]);
		let cache = Arc::new(TrackCache::disabled());

		let state = worker(catalog, fetcher, Arc::clone(&gateway), cache).process(job("t1")).await;

		assert_eq!(state, RequestState::Failed);
		assert_eq!(gateway.texts().await, vec![messages::TRACK_UNAVAILABLE.to_string()]);
	}

	#[tokio::test]
	async fn transcode_failure_fails_with_processing_message() {
		let gateway = Arc::new(MockGateway::new());
		let fetcher = Arc::new(MockFetcher::failing(FetchError::TranscodeFailed {
			track_id: "t1".to_string(),
			detail: "exit 1".to_string(),
		}));
		let catalog = MockCatalog::with_tracks(vec![sample_track("t1", "Imagine", "John Lennon")]);
		let cache = Arc::new(TrackCache::disabled());

		let state = worker(catalog, fetcher, Arc::clone(&gateway), cache).process(job("t1")).await;

		assert_eq!(state, RequestState::Failed);
		assert_eq!(gateway.texts().await, vec![messages::PROCESSING_FAILED.to_string()]);
	}

	#[tokio::test]
	async fn unknown_track_fails_with_search_message() {
		let gateway = Arc::new(MockGateway::new());
		let fetcher = Arc::new(MockFetcher::failing(FetchError::Io("unused".to_string())));
		let catalog = MockCatalog::failing();
		let cache = Arc::new(TrackCache::disabled());

		let state = worker(catalog, fetcher, Arc::clone(&gateway), cache).process(job("t1")).await;

		assert_eq!(state, RequestState::Failed);
		assert_eq!(gateway.texts().await, vec![messages::SEARCH_FAILED.to_string()]);
	}

	#[tokio::test]
	async fn run_drains_jobs_and_stops_on_cancel() {
		let dir = tempfile::tempdir().unwrap();
		let payload = payload_in(&dir);
		let gateway = Arc::new(MockGateway::new());
		let fetcher = Arc::new(MockFetcher::ok(payload));
		let catalog = MockCatalog::with_tracks(vec![sample_track("t1", "Imagine", "John Lennon")]);
		let cache = Arc::new(TrackCache::disabled());

		let (tx, rx) = mpsc::channel(4);
		let cancel = CancellationToken::new();
		let worker = DownloadWorker::new(
			0,
			Arc::new(catalog),
			fetcher,
			cache,
			Arc::clone(&gateway),
			Arc::new(Mutex::new(rx)),
			"tunefetch_bot".to_string(),
			cancel.clone(),
		);
		let handle = tokio::spawn(worker.run());

		tx.send(job("t1")).await.unwrap();
		for _ in 0..100 {
			if !gateway.sent.lock().await.is_empty() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert!(!gateway.sent.lock().await.is_empty(), "queued job was never delivered");

		cancel.cancel();
		handle.await.unwrap();
	}

	#[tokio::test]
	async fn run_stops_when_queue_closes() {
		let gateway = Arc::new(MockGateway::new());
		let fetcher = Arc::new(MockFetcher::failing(FetchError::Io("unused".to_string())));
		let catalog = MockCatalog::with_tracks(Vec::new());
		let cache = Arc::new(TrackCache::disabled());

		let (tx, rx) = mpsc::channel::<DownloadJob>(1);
		let worker = DownloadWorker::new(
			0,
			Arc::new(catalog),
			fetcher,
			cache,
			gateway,
			Arc::new(Mutex::new(rx)),
			"tunefetch_bot".to_string(),
			CancellationToken::new(),
		);
		let handle = tokio::spawn(worker.run());

		drop(tx);
		handle.await.unwrap();
	}

	#[tokio::test]
	async fn delivery_failure_is_dropped_without_user_message() {
		let dir = tempfile::tempdir().unwrap();
		let payload = payload_in(&dir);
		let gateway = Arc::new(MockGateway::failing());
		let fetcher = Arc::new(MockFetcher::ok(payload));
		let catalog = MockCatalog::with_tracks(vec![sample_track("t1", "Imagine", "John Lennon")]);
		let cache = Arc::new(TrackCache::disabled());

		let state = worker(catalog, fetcher, Arc::clone(&gateway), cache).process(job("t1")).await;

		assert_eq!(state, RequestState::Failed);
		assert!(gateway.texts().await.is_empty());
	}
}
