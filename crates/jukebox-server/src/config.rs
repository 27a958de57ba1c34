//! Configuration loading and parsing.
//!
//! Defines the server config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 15;
const DEFAULT_STARTUP_GRACE_MS: u64 = 300;
const CHAT_ID_PLACEHOLDER: &str = "{chat_id}";

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Directory where fetched assets are stored.
    pub download_dir: Option<String>,
    /// Asset fetcher settings.
    pub fetch: Option<FetchConfig>,
    /// Streaming session settings.
    pub session: Option<SessionConfig>,
}

/// yt-dlp fetcher config from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct FetchConfig {
    /// yt-dlp executable (defaults to `yt-dlp` on PATH).
    pub ytdlp_bin: Option<String>,
    /// Audio container requested from yt-dlp (default: m4a).
    pub audio_format: Option<String>,
    /// Upper bound for a single download, in seconds.
    pub timeout_secs: Option<u64>,
}

/// ffmpeg session config from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// ffmpeg executable (defaults to `ffmpeg` on PATH).
    pub ffmpeg_bin: Option<String>,
    /// Output URL template; must contain `{chat_id}`.
    pub output_url: Option<String>,
    /// Audio codec passed to `-c:a` (default: aac).
    pub audio_codec: Option<String>,
    /// Audio bitrate passed to `-b:a` (default: 128k).
    pub audio_bitrate: Option<String>,
    /// Container passed to `-f` (default: flv).
    pub format: Option<String>,
    /// Upper bound for start/replace/end calls, in seconds.
    pub timeout_secs: Option<u64>,
    /// How long a freshly spawned stream must survive to count as started.
    pub startup_grace_ms: Option<u64>,
}

/// Resolved yt-dlp settings.
#[derive(Debug, Clone)]
pub struct YtDlpSettings {
    pub bin: PathBuf,
    pub audio_format: String,
}

/// Resolved ffmpeg settings.
#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    pub bin: PathBuf,
    pub output_url: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub format: String,
    pub startup_grace: Duration,
}

impl FfmpegSettings {
    /// Output URL for a chat's stream.
    pub fn output_url_for(&self, chat_id: i64) -> String {
        self.output_url
            .replace(CHAT_ID_PLACEHOLDER, &chat_id.to_string())
    }
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Parse the bind address from config, falling back to the default.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<SocketAddr> {
    let bind = cfg.bind.as_deref().unwrap_or(DEFAULT_BIND);
    bind.parse().with_context(|| format!("parse bind {bind}"))
}

/// Download directory from config, falling back to `downloads`.
pub fn download_dir_from_config(cfg: &ServerConfig) -> PathBuf {
    cfg.download_dir
        .as_deref()
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR))
}

/// Bounded fetch timeout.
pub fn fetch_timeout(cfg: &ServerConfig) -> Result<Duration> {
    let secs = cfg
        .fetch
        .as_ref()
        .and_then(|fetch| fetch.timeout_secs)
        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
    positive_secs(secs, "fetch.timeout_secs")
}

/// Bounded session call timeout.
pub fn session_timeout(cfg: &ServerConfig) -> Result<Duration> {
    let secs = cfg
        .session
        .as_ref()
        .and_then(|session| session.timeout_secs)
        .unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS);
    positive_secs(secs, "session.timeout_secs")
}

fn positive_secs(secs: u64, key: &str) -> Result<Duration> {
    if secs == 0 {
        return Err(anyhow::anyhow!("{key} must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

pub fn ytdlp_settings(cfg: &ServerConfig) -> YtDlpSettings {
    let fetch = cfg.fetch.as_ref();
    YtDlpSettings {
        bin: non_empty(fetch.and_then(|f| f.ytdlp_bin.as_deref()))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("yt-dlp")),
        audio_format: non_empty(fetch.and_then(|f| f.audio_format.as_deref()))
            .unwrap_or("m4a")
            .to_string(),
    }
}

pub fn ffmpeg_settings(cfg: &ServerConfig) -> Result<FfmpegSettings> {
    let session = cfg.session.as_ref();
    let output_url = non_empty(session.and_then(|s| s.output_url.as_deref()))
        .unwrap_or("rtmp://localhost/live/{chat_id}")
        .to_string();
    if !output_url.contains(CHAT_ID_PLACEHOLDER) {
        return Err(anyhow::anyhow!(
            "session.output_url must contain {CHAT_ID_PLACEHOLDER}: {output_url}"
        ));
    }
    let startup_grace = Duration::from_millis(
        session
            .and_then(|s| s.startup_grace_ms)
            .unwrap_or(DEFAULT_STARTUP_GRACE_MS),
    );
    let timeout = session_timeout(cfg)?;
    if startup_grace >= timeout {
        return Err(anyhow::anyhow!(
            "session.startup_grace_ms ({}ms) must be shorter than session.timeout_secs ({}s)",
            startup_grace.as_millis(),
            timeout.as_secs()
        ));
    }
    Ok(FfmpegSettings {
        bin: non_empty(session.and_then(|s| s.ffmpeg_bin.as_deref()))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffmpeg")),
        output_url,
        audio_codec: non_empty(session.and_then(|s| s.audio_codec.as_deref()))
            .unwrap_or("aac")
            .to_string(),
        audio_bitrate: non_empty(session.and_then(|s| s.audio_bitrate.as_deref()))
            .unwrap_or("128k")
            .to_string(),
        format: non_empty(session.and_then(|s| s.format.as_deref()))
            .unwrap_or("flv")
            .to_string(),
        startup_grace,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_config() {
        let cfg = ServerConfig::default();
        assert_eq!(bind_from_config(&cfg).unwrap(), DEFAULT_BIND.parse().unwrap());
        assert_eq!(download_dir_from_config(&cfg), PathBuf::from("downloads"));
        assert_eq!(fetch_timeout(&cfg).unwrap(), Duration::from_secs(300));
        assert_eq!(session_timeout(&cfg).unwrap(), Duration::from_secs(15));
        assert_eq!(ytdlp_settings(&cfg).audio_format, "m4a");
        let ffmpeg = ffmpeg_settings(&cfg).unwrap();
        assert_eq!(ffmpeg.output_url_for(-42), "rtmp://localhost/live/-42");
    }

    #[test]
    fn parses_full_toml() {
        let cfg: ServerConfig = toml::from_str(
            r#"
            bind = "0.0.0.0:9000"
            download_dir = "/var/lib/jukebox"

            [fetch]
            ytdlp_bin = "/usr/local/bin/yt-dlp"
            timeout_secs = 60

            [session]
            output_url = "icecast://src:pw@radio:8000/chat-{chat_id}.mp3"
            audio_codec = "libmp3lame"
            format = "mp3"
            startup_grace_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(bind_from_config(&cfg).unwrap(), "0.0.0.0:9000".parse().unwrap());
        assert_eq!(download_dir_from_config(&cfg), PathBuf::from("/var/lib/jukebox"));
        assert_eq!(fetch_timeout(&cfg).unwrap(), Duration::from_secs(60));
        assert_eq!(ytdlp_settings(&cfg).bin, PathBuf::from("/usr/local/bin/yt-dlp"));
        let ffmpeg = ffmpeg_settings(&cfg).unwrap();
        assert_eq!(ffmpeg.audio_codec, "libmp3lame");
        assert_eq!(ffmpeg.audio_bitrate, "128k");
        assert_eq!(ffmpeg.startup_grace, Duration::ZERO);
        assert_eq!(
            ffmpeg.output_url_for(7),
            "icecast://src:pw@radio:8000/chat-7.mp3"
        );
    }

    #[test]
    fn output_url_requires_chat_placeholder() {
        let cfg = ServerConfig {
            session: Some(SessionConfig {
                output_url: Some("rtmp://127.0.0.1/live/shared".to_string()),
                ..SessionConfig::default()
            }),
            ..ServerConfig::default()
        };
        assert!(ffmpeg_settings(&cfg).is_err());
    }

    #[test]
    fn startup_grace_must_fit_inside_session_timeout() {
        let session = |grace_ms, timeout_secs| ServerConfig {
            session: Some(SessionConfig {
                startup_grace_ms: Some(grace_ms),
                timeout_secs: Some(timeout_secs),
                ..SessionConfig::default()
            }),
            ..ServerConfig::default()
        };

        assert!(ffmpeg_settings(&session(2_000, 2)).is_err());
        assert!(ffmpeg_settings(&session(5_000, 2)).is_err());
        let ok = ffmpeg_settings(&session(1_999, 2)).unwrap();
        assert_eq!(ok.startup_grace, Duration::from_millis(1_999));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let cfg = ServerConfig {
            fetch: Some(FetchConfig {
                timeout_secs: Some(0),
                ..FetchConfig::default()
            }),
            ..ServerConfig::default()
        };
        assert!(fetch_timeout(&cfg).is_err());
    }

    #[test]
    fn invalid_bind_reports_error() {
        let cfg = ServerConfig {
            bind: Some("not-an-address".to_string()),
            ..ServerConfig::default()
        };
        assert!(bind_from_config(&cfg).is_err());
    }
}
