use crate::gateway::DeliveryError;
use crate::messages;
use spotify_catalog::CatalogError;
use thiserror::Error;
use track_fetcher::FetchError;

/// Everything that can end a single request. Caught at the orchestrator
/// boundary and translated to a chat message; never crashes the process.
#[derive(Debug, Error)]
pub enum RequestError {
	#[error(transparent)]
	Catalog(#[from] CatalogError),

	#[error(transparent)]
	Fetch(#[from] FetchError),

	#[error(transparent)]
	Delivery(#[from] DeliveryError),

	#[error("search timed out")]
	SearchTimedOut,
}

impl RequestError {
	/// The message the user sees for this failure.
	#[must_use]
	pub fn user_message(&self) -> &'static str {
		match self {
			Self::Catalog(_) | Self::SearchTimedOut => messages::SEARCH_FAILED,
			Self::Fetch(FetchError::SourceNotFound { .. }) => messages::TRACK_UNAVAILABLE,
			Self::Fetch(FetchError::TranscodeFailed { .. }) => messages::PROCESSING_FAILED,
			Self::Fetch(_) | Self::Delivery(_) => messages::DOWNLOAD_FAILED,
		}
	}
}
