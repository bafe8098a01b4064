mod config;
mod deeplink;
mod error;
mod gateway;
mod health;
mod messages;
mod orchestrator;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use gateway::TelegramGateway;
use orchestrator::{DownloadJob, Orchestrator};
use spotify_catalog::SpotifyClient;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InlineQuery, InlineQueryResult, InlineQueryResultArticle, InputMessageContent, InputMessageContentText};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use track_cache::TrackCache;
use track_fetcher::{FetchError, Fetcher};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

use config::Config;
use worker::DownloadWorker;

type BotOrchestrator = Arc<Orchestrator<SpotifyClient, TelegramGateway>>;

/// The bot's own username, injected into handlers that build deep links.
#[derive(Clone)]
struct BotName(String);

#[tokio::main]
async fn main() -> Result<()> {
	// Load environment variables
	dotenvy::dotenv().ok();

	// Parse CLI arguments; missing credentials are fatal here, before any
	// connection is attempted.
	let config = Config::parse();
	config.validate().map_err(|e| anyhow::anyhow!(e))?;

	tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

	info!(download_dir = %config.download_dir.display(), "🎧 Starting tunefetch bot");

	let catalog = Arc::new(SpotifyClient::new(config.spotify_client_id.clone(), config.spotify_client_secret.clone()).context("building Spotify client")?);

	let cache: Arc<TrackCache<FetchError>> = Arc::new(TrackCache::connect(config.redis_url.as_deref(), Duration::from_secs(config.download_cache_ttl_secs)).await);

	let fetcher = Arc::new(Fetcher::new(
		config.download_dir.clone(),
		config.yt_dlp_bin.clone(),
		config.ffmpeg_bin.clone(),
		Duration::from_secs(config.fetch_timeout_secs),
	));

	let bot = Bot::new(config.bot_token.clone());
	let me = bot.get_me().await.context("contacting Telegram")?;
	let bot_username = me.username().to_string();
	info!(bot = %bot_username, "connected to Telegram");

	let gateway = Arc::new(TelegramGateway::new(bot.clone()));
	let cancel = CancellationToken::new();

	// Health endpoint
	{
		let cancel = cancel.clone();
		let port = config.health_port;
		tokio::spawn(async move {
			if let Err(e) = health::serve(port, cancel).await {
				error!(error = %e, "health endpoint exited");
			}
		});
	}

	// Download queue and worker pool. Workers share one receiver; the track
	// cache's single-flight keeps duplicate fetches out.
	let (job_tx, job_rx) = mpsc::channel::<DownloadJob>(config.queue_capacity);
	let jobs = Arc::new(Mutex::new(job_rx));
	for id in 0..config.worker_count {
		let worker = DownloadWorker::new(
			id,
			Arc::clone(&catalog),
			Arc::clone(&fetcher),
			Arc::clone(&cache),
			Arc::clone(&gateway),
			Arc::clone(&jobs),
			bot_username.clone(),
			cancel.child_token(),
		);
		tokio::spawn(worker.run());
	}

	let orchestrator: BotOrchestrator = Arc::new(Orchestrator::new(
		catalog,
		gateway,
		job_tx,
		config.search_limit,
		Duration::from_secs(config.search_timeout_secs),
		Duration::from_secs(config.search_cache_ttl_secs),
	));

	let handler = dptree::entry()
		.branch(Update::filter_message().endpoint(on_message))
		.branch(Update::filter_callback_query().endpoint(on_callback))
		.branch(Update::filter_inline_query().endpoint(on_inline_query));

	Dispatcher::builder(bot, handler)
		.dependencies(dptree::deps![orchestrator, BotName(bot_username)])
		.enable_ctrlc_handler()
		.build()
		.dispatch()
		.await;

	info!("🛑 dispatcher stopped, shutting down workers");
	cancel.cancel();
	Ok(())
}

async fn on_message(_bot: Bot, msg: Message, orchestrator: BotOrchestrator) -> ResponseResult<()> {
	let Some(text) = msg.text() else { return Ok(()) };
	let Some(user) = msg.from() else { return Ok(()) };
	let user_id = user.id.0;

	if let Some(token) = start_payload(text) {
		if token.is_empty() {
			orchestrator.send_welcome(msg.chat.id).await;
		} else if let Some(track_id) = deeplink::decode_token(token) {
			orchestrator.handle_selection(msg.chat.id, user_id, &track_id).await;
		} else {
			orchestrator.send_welcome(msg.chat.id).await;
		}
		return Ok(());
	}

	// Other commands are not ours to answer.
	if text.starts_with('/') {
		return Ok(());
	}

	orchestrator.handle_query(msg.chat.id, user_id, text).await;
	Ok(())
}

async fn on_callback(bot: Bot, q: CallbackQuery, orchestrator: BotOrchestrator) -> ResponseResult<()> {
	bot.answer_callback_query(q.id.clone()).await?;

	let Some(track_id) = q.data else { return Ok(()) };
	let Some(message) = q.message else { return Ok(()) };

	orchestrator.handle_selection(message.chat.id, q.from.id.0, &track_id).await;
	Ok(())
}

/// Inline mode: search from any chat, answer with articles whose only
/// button deep-links into a private chat where the download can run.
async fn on_inline_query(bot: Bot, q: InlineQuery, orchestrator: BotOrchestrator, bot_name: BotName) -> ResponseResult<()> {
	let query = q.query.trim();
	if query.is_empty() {
		return Ok(());
	}

	let tracks = orchestrator.handle_inline(q.from.id.0, query).await;
	let results: Vec<InlineQueryResult> = tracks
		.iter()
		.filter_map(|track| {
			let link = Url::parse(&deeplink::share_link(&bot_name.0, &track.id)).ok()?;
			let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(messages::DOWNLOAD_BUTTON, link)]]);
			let content = InputMessageContent::Text(InputMessageContentText::new(track.label()));
			let mut article = InlineQueryResultArticle::new(track.id.clone(), track.title.clone(), content)
				.description(track.artist.clone())
				.reply_markup(keyboard);
			if let Some(thumb) = track.thumb.as_deref().and_then(|thumb| Url::parse(thumb).ok()) {
				article = article.thumb_url(thumb);
			}
			Some(InlineQueryResult::Article(article))
		})
		.collect();

	bot.answer_inline_query(q.id, results).await?;
	Ok(())
}

/// Splits the `/start` command from its optional deep-link payload.
/// `/startabc` is some other command, not a payload.
fn start_payload(text: &str) -> Option<&str> {
	let rest = text.strip_prefix("/start")?;
	if rest.is_empty() {
		return Some("");
	}
	rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

#[cfg(test)]
mod tests {
	use super::start_payload;

	#[test]
	fn start_command_payloads() {
		assert_eq!(start_payload("/start"), Some(""));
		assert_eq!(start_payload("/start  dDEyMw"), Some("dDEyMw"));
		assert_eq!(start_payload("/startxyz"), None);
		assert_eq!(start_payload("/stop"), None);
		assert_eq!(start_payload("imagine"), None);
	}
}
