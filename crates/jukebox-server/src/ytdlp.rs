//! yt-dlp backed asset fetcher.
//!
//! Each fetch runs one `yt-dlp` child that extracts audio into the download
//! directory under a chat-prefixed, collision-free base name.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jukebox_core::{AssetFetcher, ChatId, FetchError, MediaQuery};
use tokio::process::Command;

use crate::config::YtDlpSettings;

/// Extensions probed after a download, in order.
const OUTPUT_EXTENSIONS: [&str; 4] = ["m4a", "mp3", "webm", "opus"];
const STDERR_TAIL_LINES: usize = 3;
const STDERR_TAIL_CHARS: usize = 400;

pub struct YtDlpFetcher {
    download_dir: PathBuf,
    settings: YtDlpSettings,
}

impl YtDlpFetcher {
    pub fn new(download_dir: PathBuf, settings: YtDlpSettings) -> Self {
        Self {
            download_dir,
            settings,
        }
    }

    /// Output path without extension, e.g. `downloads/-100_1718000000000_1a2b3c4d`.
    fn output_base(&self, chat_id: ChatId) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let tag = uuid::Uuid::new_v4().simple().to_string();
        self.download_dir
            .join(format!("{chat_id}_{millis}_{}", &tag[..8]))
    }

    fn command(&self, base: &Path, target: &str) -> Command {
        let mut template = base.as_os_str().to_owned();
        template.push(".%(ext)s");
        let mut cmd = Command::new(&self.settings.bin);
        cmd.args([
            "-x",
            "--audio-format",
            self.settings.audio_format.as_str(),
            "--no-playlist",
            "--no-progress",
            "--quiet",
            "-o",
        ])
        .arg(template)
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AssetFetcher for YtDlpFetcher {
    async fn fetch(&self, chat_id: ChatId, query: &MediaQuery) -> Result<PathBuf, FetchError> {
        let base = self.output_base(chat_id);
        let target = query.target();
        tracing::debug!(
            chat_id = %chat_id,
            target = %target,
            output = %base.display(),
            "spawning yt-dlp"
        );

        let output = self
            .command(&base, &target)
            .output()
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => FetchError::Unavailable(format!(
                    "{} not found",
                    self.settings.bin.display()
                )),
                _ => FetchError::Io(err),
            })?;

        if !output.status.success() {
            return Err(FetchError::Downloader {
                status: output.status.to_string(),
                stderr: stderr_tail(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        match find_downloaded(&base, &self.settings.audio_format) {
            Some(path) => {
                tracing::info!(chat_id = %chat_id, path = %path.display(), "download finished");
                Ok(path)
            }
            // A search with no hits exits cleanly without writing anything.
            None if matches!(query, MediaQuery::Search(_)) => Err(FetchError::NotFound),
            None => Err(FetchError::MissingOutput),
        }
    }
}

/// First existing `<base>.<ext>`, trying the requested format before the
/// usual yt-dlp audio containers.
pub(crate) fn find_downloaded(base: &Path, preferred: &str) -> Option<PathBuf> {
    std::iter::once(preferred)
        .chain(OUTPUT_EXTENSIONS.iter().copied().filter(|ext| *ext != preferred))
        .map(|ext| with_extension_suffix(base, ext))
        .find(|candidate| candidate.is_file())
}

// Base names may contain dots, so append instead of `set_extension`.
fn with_extension_suffix(base: &Path, ext: &str) -> PathBuf {
    let mut raw: OsString = base.as_os_str().to_owned();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

/// Last few non-empty stderr lines, capped for log and reply use.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join(" | ");
    if tail.chars().count() > STDERR_TAIL_CHARS {
        let cut: String = tail.chars().take(STDERR_TAIL_CHARS).collect();
        format!("{cut}...")
    } else {
        tail
    }
}
