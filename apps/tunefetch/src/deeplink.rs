//! Deep-link tokens: a track id wrapped in URL-safe unpadded base64 so it
//! survives inside a `t.me/<bot>?start=<token>` link.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

#[must_use]
pub fn encode_token(track_id: &str) -> String {
	URL_SAFE_NO_PAD.encode(track_id.as_bytes())
}

#[must_use]
pub fn decode_token(token: &str) -> Option<String> {
	let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
	String::from_utf8(bytes).ok()
}

#[must_use]
pub fn share_link(bot_username: &str, track_id: &str) -> String {
	format!("https://t.me/{bot_username}?start={}", encode_token(track_id))
}
