use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("Spotify API unavailable: {0}")]
	UpstreamUnavailable(String),

	#[error("No track found for id: {0}")]
	TrackNotFound(String),

	#[error("Unexpected Spotify response: {0}")]
	InvalidResponse(String),
}

impl From<reqwest::Error> for CatalogError {
	fn from(error: reqwest::Error) -> Self {
		Self::UpstreamUnavailable(error.to_string())
	}
}

impl From<serde_json::Error> for CatalogError {
	fn from(error: serde_json::Error) -> Self {
		Self::InvalidResponse(error.to_string())
	}
}
