//! Chat-facing strings, kept in one place so handlers stay free of copy.

pub const SEND_SONG: &str = "Send me a song name or Spotify link.";
pub const CHOOSE_TRACK: &str = "Choose a track:";
pub const DOWNLOAD_BUTTON: &str = "\u{2b07} Download";
pub const NO_RESULTS: &str = "No tracks found, try a different search.";
pub const DOWNLOAD_STARTED: &str = "Download started, please wait...";
pub const TOO_MANY_DOWNLOADS: &str = "Too many downloads in progress, please try later.";
pub const SEARCH_FAILED: &str = "Search failed, please try again.";
pub const TRACK_UNAVAILABLE: &str = "This track is unavailable.";
pub const PROCESSING_FAILED: &str = "Could not process this track.";
pub const DOWNLOAD_FAILED: &str = "Download failed.";

#[must_use]
pub fn share_caption(link: &str) -> String {
	format!("Share: {link}")
}
