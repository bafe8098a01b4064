use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "tunefetch")]
#[command(about = "Telegram bot that searches Spotify and delivers downloaded tracks", long_about = None)]
pub struct Config {
	/// Telegram bot token
	#[arg(long, env = "BOT_TOKEN")]
	pub bot_token: String,

	/// Spotify client id (client-credentials grant)
	#[arg(long, env = "SPOTIPY_CLIENT_ID")]
	pub spotify_client_id: String,

	/// Spotify client secret
	#[arg(long, env = "SPOTIPY_CLIENT_SECRET")]
	pub spotify_client_secret: String,

	/// Cache store connection URL; caching is disabled when absent
	#[arg(long, env = "REDIS_URL")]
	pub redis_url: Option<String>,

	/// Directory downloaded audio lands in
	#[arg(long, env = "DOWNLOAD_DIR", default_value = "./downloads")]
	pub download_dir: PathBuf,

	/// Port for the health endpoint
	#[arg(long, env = "HEALTH_PORT", default_value = "8080")]
	pub health_port: u16,

	/// Maximum queued downloads before new requests are rejected
	#[arg(long, env = "QUEUE_CAPACITY", default_value = "3")]
	pub queue_capacity: usize,

	/// Number of download workers
	#[arg(long, env = "WORKER_COUNT", default_value = "3")]
	pub worker_count: usize,

	/// Number of search candidates presented per query
	#[arg(long, env = "SEARCH_LIMIT", default_value = "10")]
	pub search_limit: usize,

	/// TTL for cached search results, in seconds
	#[arg(long, env = "SEARCH_CACHE_TTL_SECS", default_value = "300")]
	pub search_cache_ttl_secs: u64,

	/// TTL for cached download payload references, in seconds
	#[arg(long, env = "DOWNLOAD_CACHE_TTL_SECS", default_value = "86400")]
	pub download_cache_ttl_secs: u64,

	/// Budget for one catalog search, in seconds
	#[arg(long, env = "SEARCH_TIMEOUT_SECS", default_value = "15")]
	pub search_timeout_secs: u64,

	/// Budget for one fetch/transcode pipeline, in seconds
	#[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "300")]
	pub fetch_timeout_secs: u64,

	/// Source resolver binary
	#[arg(long, env = "YT_DLP_BIN", default_value = "yt-dlp")]
	pub yt_dlp_bin: String,

	/// Transcoder binary
	#[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg")]
	pub ffmpeg_bin: String,
}

impl Config {
	/// Validate configuration values
	pub fn validate(&self) -> Result<(), String> {
		if self.queue_capacity == 0 {
			return Err("queue_capacity must be at least 1".to_string());
		}

		if self.worker_count == 0 {
			return Err("worker_count must be at least 1".to_string());
		}

		if self.search_limit == 0 || self.search_limit > 50 {
			return Err("search_limit must be between 1 and 50".to_string());
		}

		if self.search_timeout_secs == 0 || self.fetch_timeout_secs == 0 {
			return Err("timeouts must be greater than 0".to_string());
		}

		Ok(())
	}
}
