use thiserror::Error;

/// Fetch pipeline failures. Terminal for the single request, never fatal to
/// the process. `Clone` with plain-string payloads so single-flight waiters
/// on the same track can each receive the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
	#[error("no playable source for track {track_id}: {detail}")]
	SourceNotFound { track_id: String, detail: String },

	#[error("transcode failed for track {track_id}: {detail}")]
	TranscodeFailed { track_id: String, detail: String },

	#[error("fetch timed out for track {track_id}")]
	TimedOut { track_id: String },

	#[error("i/o failure during fetch: {0}")]
	Io(String),
}

impl From<std::io::Error> for FetchError {
	fn from(error: std::io::Error) -> Self {
		Self::Io(error.to_string())
	}
}
