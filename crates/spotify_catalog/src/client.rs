use crate::error::CatalogError;
use crate::model::{self, Track};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const ACCOUNTS_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const HTTP_TIMEOUT: Duration = Duration::from_secs(20);
/// Treat tokens as expired this long before they actually are.
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	expires_in: u64,
}

#[derive(Debug)]
struct BearerToken {
	access_token: String,
	fetched_at: Instant,
	expires_in: Duration,
}

impl BearerToken {
	fn is_expired(&self) -> bool {
		self.fetched_at.elapsed() > self.expires_in.saturating_sub(TOKEN_EXPIRY_BUFFER)
	}
}

/// Spotify Web API client using the client-credentials grant.
///
/// Each API call is a single attempt; retry policy belongs to the caller.
pub struct SpotifyClient {
	http: reqwest::Client,
	client_id: String,
	client_secret: String,
	token: Mutex<Option<BearerToken>>,
}

impl SpotifyClient {
	/// # Errors
	/// Returns `CatalogError::UpstreamUnavailable` if the HTTP client cannot be built.
	pub fn new(client_id: String, client_secret: String) -> Result<Self, CatalogError> {
		let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
		Ok(Self {
			http,
			client_id,
			client_secret,
			token: Mutex::new(None),
		})
	}

	/// Searches the catalog for tracks matching `query`, best matches first.
	///
	/// Zero matches is an empty vec, not an error.
	///
	/// # Errors
	/// `CatalogError::UpstreamUnavailable` on network or auth failure,
	/// `CatalogError::InvalidResponse` on an unexpected body.
	pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError> {
		let token = self.bearer().await?;
		let limit = limit.to_string();
		let response = self
			.http
			.get(format!("{API_BASE}/search"))
			.bearer_auth(token)
			.query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			return Err(CatalogError::UpstreamUnavailable(format!("search returned {status}")));
		}

		let body = response.text().await?;
		let tracks = model::parse_search(&body)?;
		debug!(query, results = tracks.len(), "catalog search");
		Ok(tracks)
	}

	/// Fetches a single track by its stable id.
	///
	/// # Errors
	/// `CatalogError::TrackNotFound` for unknown ids,
	/// `CatalogError::UpstreamUnavailable` on network or auth failure.
	pub async fn track(&self, id: &str) -> Result<Track, CatalogError> {
		let token = self.bearer().await?;
		let response = self.http.get(format!("{API_BASE}/tracks/{id}")).bearer_auth(token).send().await?;

		let status = response.status();
		if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
			return Err(CatalogError::TrackNotFound(id.to_string()));
		}
		if !status.is_success() {
			return Err(CatalogError::UpstreamUnavailable(format!("track lookup returned {status}")));
		}

		let body = response.text().await?;
		model::parse_track(&body)
	}

	/// Returns a valid access token, refreshing it when missing or stale.
	async fn bearer(&self) -> Result<String, CatalogError> {
		let mut guard = self.token.lock().await;
		if let Some(token) = guard.as_ref() {
			if !token.is_expired() {
				return Ok(token.access_token.clone());
			}
		}

		let response = self
			.http
			.post(ACCOUNTS_TOKEN_URL)
			.basic_auth(&self.client_id, Some(&self.client_secret))
			.form(&[("grant_type", "client_credentials")])
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			return Err(CatalogError::UpstreamUnavailable(format!("token endpoint returned {status}")));
		}

		let token: TokenResponse = response.json().await?;
		debug!(expires_in = token.expires_in, "refreshed catalog access token");

		let access = token.access_token.clone();
		*guard = Some(BearerToken {
			access_token: token.access_token,
			fetched_at: Instant::now(),
			expires_in: Duration::from_secs(token.expires_in),
		});
		Ok(access)
	}
}
