use crate::error::CatalogError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Matches `open.spotify.com/track/<id>` links and `spotify:track:<id>` URIs.
static TRACK_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:open\.spotify\.com/track/|spotify:track:)([A-Za-z0-9]+)").unwrap());

/// A single track as returned by the catalog. Immutable once retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
	/// Stable Spotify track id.
	pub id: String,
	pub title: String,
	/// Joined artist list, e.g. "Artist A, Artist B".
	pub artist: String,
	pub duration: Duration,
	/// Public `open.spotify.com` link.
	pub url: String,
	/// Album art URL, when the album carries one.
	pub thumb: Option<String>,
}

impl Track {
	/// Human-readable one-line label used in chat keyboards.
	#[must_use]
	pub fn label(&self) -> String {
		format!("{} – {}", self.title, self.artist)
	}

	/// Free-text phrase used to locate a playable source for this track.
	#[must_use]
	pub fn search_phrase(&self) -> String {
		format!("{} {}", self.artist, self.title)
	}
}

/// Extracts a track id from a Spotify track link or URI, if the text contains one.
#[must_use]
pub fn parse_track_url(text: &str) -> Option<String> {
	TRACK_URL_RE.captures(text).and_then(|caps| caps.get(1)).map(|id| id.as_str().to_string())
}

// Wire shapes for the two endpoints we call. Only the fields we read.

#[derive(Debug, Deserialize)]
struct SearchResponse {
	tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
	items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackItem {
	id: String,
	name: String,
	duration_ms: u64,
	artists: Vec<ArtistItem>,
	#[serde(default)]
	album: Option<AlbumItem>,
	external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
	name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumItem {
	#[serde(default)]
	images: Vec<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
	url: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
	#[serde(default)]
	spotify: Option<String>,
}

impl From<TrackItem> for Track {
	fn from(item: TrackItem) -> Self {
		let artist = item.artists.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ");
		let url = item.external_urls.spotify.unwrap_or_else(|| format!("https://open.spotify.com/track/{}", item.id));
		let thumb = item.album.and_then(|album| album.images.into_iter().next()).map(|image| image.url);

		Self {
			id: item.id,
			title: item.name,
			artist,
			duration: Duration::from_millis(item.duration_ms),
			url,
			thumb,
		}
	}
}

/// Parses a `/v1/search?type=track` response body into tracks, preserving order.
///
/// # Errors
/// Returns `CatalogError::InvalidResponse` if the body does not match the
/// documented search shape.
pub(crate) fn parse_search(body: &str) -> Result<Vec<Track>, CatalogError> {
	let response: SearchResponse = serde_json::from_str(body)?;
	Ok(response.tracks.items.into_iter().map(Track::from).collect())
}

/// Parses a `/v1/tracks/{id}` response body.
///
/// # Errors
/// Returns `CatalogError::InvalidResponse` on an unexpected body shape.
pub(crate) fn parse_track(body: &str) -> Result<Track, CatalogError> {
	let item: TrackItem = serde_json::from_str(body)?;
	Ok(item.into())
}
