pub mod client;
pub mod error;
pub mod model;

pub use client::SpotifyClient;
pub use error::CatalogError;
pub use model::{parse_track_url, Track};
