use crate::error::FetchError;
use async_trait::async_trait;
use spotify_catalog::Track;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tokio::time::timeout;
use track_cache::PayloadRef;
use tracing::{debug, info};

const STDERR_DETAIL_LIMIT: usize = 200;

/// Resolves and transcodes tracks. The source side is abstracted so the
/// download workers can be exercised without spawning subprocesses.
#[async_trait]
pub trait FetchSource: Send + Sync {
	/// Produces a delivery-ready payload for `track`.
	///
	/// # Errors
	/// `FetchError::SourceNotFound` when no playable source exists,
	/// `FetchError::TranscodeFailed` when normalization fails,
	/// `FetchError::TimedOut` when the pipeline exceeds its budget.
	async fn fetch(&self, track: &Track) -> Result<PayloadRef, FetchError>;
}

/// Subprocess-backed fetcher: `yt-dlp` locates and downloads the best audio
/// source for a track, `ffmpeg` normalizes it to MP3 in the download dir.
pub struct Fetcher {
	download_dir: PathBuf,
	yt_dlp_bin: String,
	ffmpeg_bin: String,
	timeout: Duration,
}

impl Fetcher {
	#[must_use]
	pub fn new(download_dir: PathBuf, yt_dlp_bin: String, ffmpeg_bin: String, timeout: Duration) -> Self {
		Self {
			download_dir,
			yt_dlp_bin,
			ffmpeg_bin,
			timeout,
		}
	}

	async fn fetch_inner(&self, track: &Track) -> Result<PayloadRef, FetchError> {
		fs::create_dir_all(&self.download_dir).await?;
		let scratch = tempfile::tempdir_in(&self.download_dir).map_err(FetchError::from)?;

		let source = self.resolve_source(track, scratch.path()).await?;
		let target = self.download_dir.join(target_file_name(track));
		self.transcode(track, &source, &target).await?;

		info!(track_id = %track.id, path = %target.display(), "track fetched");
		Ok(PayloadRef::new(target))
	}

	/// Downloads the best audio source into `scratch` via `yt-dlp`'s
	/// `ytsearch1:` resolver and returns the produced file.
	async fn resolve_source(&self, track: &Track, scratch: &Path) -> Result<PathBuf, FetchError> {
		let phrase = track.search_phrase();
		debug!(track_id = %track.id, phrase, "resolving audio source");

		let output = Command::new(&self.yt_dlp_bin)
			.arg("--no-playlist")
			.arg("--quiet")
			.arg("-f")
			.arg("bestaudio")
			.arg("-o")
			.arg(scratch.join("source.%(ext)s"))
			.arg(format!("ytsearch1:{phrase}"))
			.kill_on_drop(true)
			.output()
			.await?;

		if !output.status.success() {
			return Err(FetchError::SourceNotFound {
				track_id: track.id.clone(),
				detail: stderr_detail(&output.stderr),
			});
		}

		let mut entries = fs::read_dir(scratch).await?;
		while let Some(entry) = entries.next_entry().await? {
			if entry.file_name().to_string_lossy().starts_with("source.") {
				return Ok(entry.path());
			}
		}

		Err(FetchError::SourceNotFound {
			track_id: track.id.clone(),
			detail: "resolver produced no file".to_string(),
		})
	}

	async fn transcode(&self, track: &Track, source: &Path, target: &Path) -> Result<(), FetchError> {
		let output = Command::new(&self.ffmpeg_bin)
			.arg("-y")
			.arg("-i")
			.arg(source)
			.arg("-vn")
			.arg("-acodec")
			.arg("libmp3lame")
			.arg("-b:a")
			.arg("192k")
			.arg(target)
			.kill_on_drop(true)
			.output()
			.await?;

		if !output.status.success() {
			return Err(FetchError::TranscodeFailed {
				track_id: track.id.clone(),
				detail: stderr_detail(&output.stderr),
			});
		}
		Ok(())
	}
}

#[async_trait]
impl FetchSource for Fetcher {
	async fn fetch(&self, track: &Track) -> Result<PayloadRef, FetchError> {
		match timeout(self.timeout, self.fetch_inner(track)).await {
			Ok(result) => result,
			Err(_) => Err(FetchError::TimedOut { track_id: track.id.clone() }),
		}
	}
}

/// Output file name for a track. The track id is part of the name so two
/// releases sharing an artist and title never overwrite each other.
fn target_file_name(track: &Track) -> String {
	format!("{}.mp3", sanitize_file_name(&format!("{} - {} [{}]", track.artist, track.title, track.id)))
}

/// Keeps file names portable: alphanumerics and a few separators survive,
/// everything else becomes an underscore.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
	name
		.chars()
		.map(|c| if c.is_alphanumeric() || " -_.()[]&,'".contains(c) { c } else { '_' })
		.collect::<String>()
		.trim()
		.to_string()
}

fn stderr_detail(stderr: &[u8]) -> String {
	let text = String::from_utf8_lossy(stderr);
	let trimmed = text.trim();
	if trimmed.is_empty() {
		return "process exited with failure".to_string();
	}
	trimmed.chars().take(STDERR_DETAIL_LIMIT).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn track(id: &str, title: &str, artist: &str) -> Track {
		Track {
			id: id.to_string(),
			title: title.to_string(),
			artist: artist.to_string(),
			duration: Duration::from_secs(180),
			url: format!("https://open.spotify.com/track/{id}"),
			thumb: None,
		}
	}

	#[test]
	fn sanitizes_hostile_names() {
		assert_eq!(sanitize_file_name("AC/DC - Back In Black"), "AC_DC - Back In Black");
		assert_eq!(sanitize_file_name("a:b*c?d"), "a_b_c_d");
		assert_eq!(sanitize_file_name("  plain name  "), "plain name");
	}

	#[test]
	fn same_artist_and_title_get_distinct_file_names() {
		let album_cut = track("2TpxZ7JUBn3uw46aR7qd6V", "In the End", "Linkin Park");
		let single_cut = track("60a0Rd6pjrkxjPbaKzXjfq", "In the End", "Linkin Park");

		let a = target_file_name(&album_cut);
		let b = target_file_name(&single_cut);

		assert_ne!(a, b);
		assert!(a.contains("2TpxZ7JUBn3uw46aR7qd6V"));
		assert!(b.contains("60a0Rd6pjrkxjPbaKzXjfq"));
	}

	#[cfg(unix)]
	mod subprocess {
		use super::*;
		use std::os::unix::fs::PermissionsExt;

		fn write_script(dir: &Path, name: &str, body: &str) -> String {
			let path = dir.join(name);
			std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
			std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
			path.to_string_lossy().into_owned()
		}

		// Honors the -o template the way yt-dlp would, writing a .webm file.
		const FAKE_YT_DLP: &str = r#"out=""
prev=""
for arg; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
target=$(printf '%s' "$out" | sed 's/%(ext)s/webm/')
printf 'source-bytes' > "$target""#;

		// Writes its last argument, like ffmpeg writing the output file.
		const FAKE_FFMPEG: &str = r#"for arg; do last="$arg"; done
printf 'mp3-bytes' > "$last""#;

		#[tokio::test]
		async fn fetch_produces_mp3_in_download_dir() {
			let bins = tempfile::tempdir().unwrap();
			let downloads = tempfile::tempdir().unwrap();
			let yt_dlp = write_script(bins.path(), "yt-dlp", FAKE_YT_DLP);
			let ffmpeg = write_script(bins.path(), "ffmpeg", FAKE_FFMPEG);

			let fetcher = Fetcher::new(downloads.path().to_path_buf(), yt_dlp, ffmpeg, Duration::from_secs(10));
			let payload = fetcher.fetch(&track("t-1", "Imagine", "John Lennon")).await.unwrap();

			assert_eq!(payload.path, downloads.path().join("John Lennon - Imagine [t-1].mp3"));
			assert_eq!(std::fs::read(&payload.path).unwrap(), b"mp3-bytes");
		}

		#[tokio::test]
		async fn resolver_failure_is_source_not_found() {
			let bins = tempfile::tempdir().unwrap();
			let downloads = tempfile::tempdir().unwrap();
			let yt_dlp = write_script(bins.path(), "yt-dlp", "echo 'no results' >&2\nexit 1");
			let ffmpeg = write_script(bins.path(), "ffmpeg", FAKE_FFMPEG);

			let fetcher = Fetcher::new(downloads.path().to_path_buf(), yt_dlp, ffmpeg, Duration::from_secs(10));
			let err = fetcher.fetch(&track("t-1", "Nothing", "Nobody")).await.unwrap_err();

			assert!(matches!(err, FetchError::SourceNotFound { ref detail, .. } if detail.contains("no results")));
		}

		#[tokio::test]
		async fn transcoder_failure_is_transcode_failed() {
			let bins = tempfile::tempdir().unwrap();
			let downloads = tempfile::tempdir().unwrap();
			let yt_dlp = write_script(bins.path(), "yt-dlp", FAKE_YT_DLP);
			let ffmpeg = write_script(bins.path(), "ffmpeg", "echo 'codec exploded' >&2\nexit 1");

			let fetcher = Fetcher::new(downloads.path().to_path_buf(), yt_dlp, ffmpeg, Duration::from_secs(10));
			let err = fetcher.fetch(&track("t-1", "Imagine", "John Lennon")).await.unwrap_err();

			assert!(matches!(err, FetchError::TranscodeFailed { ref detail, .. } if detail.contains("codec exploded")));
		}

		#[tokio::test]
		async fn slow_pipeline_times_out() {
			let bins = tempfile::tempdir().unwrap();
			let downloads = tempfile::tempdir().unwrap();
			let yt_dlp = write_script(bins.path(), "yt-dlp", "sleep 5");
			let ffmpeg = write_script(bins.path(), "ffmpeg", FAKE_FFMPEG);

			let fetcher = Fetcher::new(downloads.path().to_path_buf(), yt_dlp, ffmpeg, Duration::from_millis(100));
			let err = fetcher.fetch(&track("t-1", "Imagine", "John Lennon")).await.unwrap_err();

			assert_eq!(err, FetchError::TimedOut { track_id: "t-1".to_string() });
		}

		#[tokio::test]
		async fn timed_out_resolver_does_not_outlive_the_request() {
			let bins = tempfile::tempdir().unwrap();
			let downloads = tempfile::tempdir().unwrap();
			let marker = downloads.path().join("late-write");
			let yt_dlp = write_script(bins.path(), "yt-dlp", &format!("sleep 1\nprintf x > '{}'", marker.display()));
			let ffmpeg = write_script(bins.path(), "ffmpeg", FAKE_FFMPEG);

			let fetcher = Fetcher::new(downloads.path().to_path_buf(), yt_dlp, ffmpeg, Duration::from_millis(100));
			let err = fetcher.fetch(&track("t-1", "Imagine", "John Lennon")).await.unwrap_err();
			assert_eq!(err, FetchError::TimedOut { track_id: "t-1".to_string() });

			// The resolver is killed when the request is abandoned, so its
			// deferred write never lands.
			tokio::time::sleep(Duration::from_millis(1500)).await;
			assert!(!marker.exists());
		}
	}
}
