use crate::error::RequestError;
use crate::gateway::{Choice, DeliveryGateway};
use crate::messages;
use async_trait::async_trait;
use spotify_catalog::{parse_track_url, CatalogError, SpotifyClient, Track};
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use track_cache::TtlCache;
use tracing::{debug, error, info, warn};

/// Lifecycle of one user interaction. `Failed` is reachable from any
/// non-terminal state; `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
	Searching,
	Selecting,
	Fetching,
	Delivering,
	Done,
	Failed,
}

/// Per-interaction context. Created per inbound update, dropped after
/// delivery or failure; never persisted and never shared between requests.
#[derive(Debug)]
pub struct Request {
	pub chat_id: ChatId,
	pub user_id: u64,
	state: RequestState,
}

impl Request {
	/// A request entering the search phase.
	#[must_use]
	pub fn search(chat_id: ChatId, user_id: u64) -> Self {
		Self {
			chat_id,
			user_id,
			state: RequestState::Searching,
		}
	}

	/// A request entering the download phase (selection or deep link).
	#[must_use]
	pub fn download(chat_id: ChatId, user_id: u64) -> Self {
		Self {
			chat_id,
			user_id,
			state: RequestState::Fetching,
		}
	}

	#[must_use]
	pub fn state(&self) -> RequestState {
		self.state
	}

	#[must_use]
	pub fn is_terminal(&self) -> bool {
		matches!(self.state, RequestState::Done | RequestState::Failed)
	}

	pub fn advance(&mut self, next: RequestState) {
		debug_assert!(!self.is_terminal(), "no transitions out of a terminal state");
		debug!(chat_id = self.chat_id.0, from = ?self.state, to = ?next, "request transition");
		self.state = next;
	}
}

/// A queued download: everything a worker needs to finish the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
	pub chat_id: ChatId,
	pub user_id: u64,
	pub track_id: String,
}

/// Catalog seam so the control flow can be exercised without the network.
#[async_trait]
pub trait CatalogApi: Send + Sync {
	async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError>;
	async fn track(&self, id: &str) -> Result<Track, CatalogError>;
}

#[async_trait]
impl CatalogApi for SpotifyClient {
	async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError> {
		Self::search(self, query, limit).await
	}

	async fn track(&self, id: &str) -> Result<Track, CatalogError> {
		Self::track(self, id).await
	}
}

/// Sends the user-visible failure message and moves the request to `Failed`.
/// A send_text failure here is only logged; there is nobody left to tell.
pub(crate) async fn fail_request<G: DeliveryGateway + ?Sized>(gateway: &G, request: &mut Request, error: &RequestError) -> RequestState {
	error!(chat_id = request.chat_id.0, user_id = request.user_id, %error, "request failed");
	if let Err(delivery) = gateway.send_text(request.chat_id, error.user_message()).await {
		warn!(chat_id = request.chat_id.0, %delivery, "could not deliver failure message");
	}
	request.advance(RequestState::Failed);
	RequestState::Failed
}

/// Thin control flow per inbound update: search, present candidates, and
/// hand selections to the download queue. Holds no per-request state.
pub struct Orchestrator<C, G>
where
	C: CatalogApi,
	G: DeliveryGateway,
{
	catalog: Arc<C>,
	gateway: Arc<G>,
	queue: mpsc::Sender<DownloadJob>,
	search_cache: TtlCache<Vec<Track>>,
	search_limit: usize,
	search_timeout: Duration,
}

impl<C, G> Orchestrator<C, G>
where
	C: CatalogApi,
	G: DeliveryGateway,
{
	pub fn new(catalog: Arc<C>, gateway: Arc<G>, queue: mpsc::Sender<DownloadJob>, search_limit: usize, search_timeout: Duration, search_cache_ttl: Duration) -> Self {
		Self {
			catalog,
			gateway,
			queue,
			search_cache: TtlCache::new(search_cache_ttl),
			search_limit,
			search_timeout,
		}
	}

	pub async fn send_welcome(&self, chat_id: ChatId) {
		if let Err(error) = self.gateway.send_text(chat_id, messages::SEND_SONG).await {
			warn!(chat_id = chat_id.0, %error, "could not deliver welcome message");
		}
	}

	/// Handles a free-text message: a Spotify track link becomes an immediate
	/// selection, anything else is searched and presented as a keyboard.
	pub async fn handle_query(&self, chat_id: ChatId, user_id: u64, text: &str) -> RequestState {
		if let Some(track_id) = parse_track_url(text) {
			return self.handle_selection(chat_id, user_id, &track_id).await;
		}

		let mut request = Request::search(chat_id, user_id);

		let cache_key = format!("{user_id}:{text}");
		let tracks = if let Some(hit) = self.search_cache.get(&cache_key) {
			hit
		} else {
			match timeout(self.search_timeout, self.catalog.search(text, self.search_limit)).await {
				Err(_) => return fail_request(self.gateway.as_ref(), &mut request, &RequestError::SearchTimedOut).await,
				Ok(Err(error)) => return fail_request(self.gateway.as_ref(), &mut request, &error.into()).await,
				Ok(Ok(tracks)) => {
					self.search_cache.insert(&cache_key, tracks.clone());
					tracks
				}
			}
		};

		if tracks.is_empty() {
			info!(chat_id = chat_id.0, query = text, "no search results");
			if let Err(error) = self.gateway.send_text(chat_id, messages::NO_RESULTS).await {
				warn!(chat_id = chat_id.0, %error, "could not deliver empty-result message");
			}
			request.advance(RequestState::Done);
			return RequestState::Done;
		}

		let choices: Vec<Choice> = tracks
			.iter()
			.map(|track| Choice {
				label: format!("\u{1f3b5} {}", track.label()),
				data: track.id.clone(),
			})
			.collect();

		request.advance(RequestState::Selecting);
		if let Err(error) = self.gateway.send_choices(chat_id, messages::CHOOSE_TRACK, &choices).await {
			return fail_request(self.gateway.as_ref(), &mut request, &error.into()).await;
		}
		RequestState::Selecting
	}

	/// Serves an inline-mode search, sharing the per-user cache with chat
	/// queries. Inline mode has no chat to report failures into, so a failed
	/// or timed-out search simply yields no results.
	pub async fn handle_inline(&self, user_id: u64, query: &str) -> Vec<Track> {
		let cache_key = format!("{user_id}:{query}");
		if let Some(hit) = self.search_cache.get(&cache_key) {
			return hit;
		}

		match timeout(self.search_timeout, self.catalog.search(query, self.search_limit)).await {
			Ok(Ok(tracks)) => {
				self.search_cache.insert(&cache_key, tracks.clone());
				tracks
			}
			Ok(Err(error)) => {
				warn!(user_id, %error, "inline search failed");
				Vec::new()
			}
			Err(_) => {
				warn!(user_id, "inline search timed out");
				Vec::new()
			}
		}
	}

	/// Handles a track selection (keyboard callback or deep link) by queueing
	/// a download job. A full queue rejects the request with a user message.
	pub async fn handle_selection(&self, chat_id: ChatId, user_id: u64, track_id: &str) -> RequestState {
		let job = DownloadJob {
			chat_id,
			user_id,
			track_id: track_id.to_string(),
		};

		match self.queue.try_send(job) {
			Ok(()) => {
				debug!(chat_id = chat_id.0, track_id, "download queued");
				if let Err(error) = self.gateway.send_text(chat_id, messages::DOWNLOAD_STARTED).await {
					warn!(chat_id = chat_id.0, %error, "could not deliver queue confirmation");
				}
				RequestState::Fetching
			}
			Err(TrySendError::Full(_)) => {
				info!(chat_id = chat_id.0, track_id, "download queue full, rejecting");
				if let Err(error) = self.gateway.send_text(chat_id, messages::TOO_MANY_DOWNLOADS).await {
					warn!(chat_id = chat_id.0, %error, "could not deliver rejection message");
				}
				RequestState::Failed
			}
			Err(TrySendError::Closed(_)) => {
				error!(chat_id = chat_id.0, "download queue closed");
				RequestState::Failed
			}
		}
	}
}
