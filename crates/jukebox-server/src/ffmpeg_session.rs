//! ffmpeg-backed streaming sessions.
//!
//! A chat's session is one long-lived entry; its content is one ffmpeg child
//! pushing the current asset to the chat's output URL in real time. Replacing
//! content swaps the child, ending the session kills it and drops the entry.
//! When a child exits on its own, a [`SessionEvent::Ended`] is emitted so the
//! coordinator can advance.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jukebox_core::{ChatId, SessionBackend, SessionError, SessionEvent, SessionEventSender};
use jukebox_types::PlaybackEndReason;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::FfmpegSettings;

type SessionMap = Arc<Mutex<HashMap<ChatId, ChatSession>>>;

/// Attached session; `stream` is `None` once the current child has exited.
#[derive(Default)]
struct ChatSession {
    stream: Option<ActiveStream>,
}

struct ActiveStream {
    generation: u64,
    asset: PathBuf,
    kill_tx: Option<oneshot::Sender<()>>,
    watcher: Option<JoinHandle<()>>,
}

pub struct FfmpegSessionBackend {
    settings: FfmpegSettings,
    sessions: SessionMap,
    generation: AtomicU64,
    events: SessionEventSender,
}

impl FfmpegSessionBackend {
    pub fn new(settings: FfmpegSettings, events: SessionEventSender) -> Self {
        Self {
            settings,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            events,
        }
    }

    fn has_session(&self, chat_id: ChatId) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .contains_key(&chat_id)
    }

    fn take_stream(&self, chat_id: ChatId) -> Option<ActiveStream> {
        self.sessions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get_mut(&chat_id)
            .and_then(|session| session.stream.take())
    }

    fn install(&self, chat_id: ChatId, stream: Option<ActiveStream>) {
        self.sessions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .entry(chat_id)
            .or_default()
            .stream = stream;
    }

    fn args(&self, chat_id: ChatId, asset: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-re", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(asset.as_os_str().to_owned());
        for arg in [
            "-vn",
            "-c:a",
            self.settings.audio_codec.as_str(),
            "-b:a",
            self.settings.audio_bitrate.as_str(),
            "-f",
            self.settings.format.as_str(),
        ] {
            args.push(arg.into());
        }
        args.push(self.settings.output_url_for(chat_id.0).into());
        args
    }

    /// Spawn a child for `asset` and wait out the startup grace period.
    ///
    /// Returns `Ok(None)` when the child already finished cleanly; the Eof
    /// event has been emitted in that case.
    async fn spawn_stream(
        &self,
        chat_id: ChatId,
        asset: &Path,
    ) -> Result<Option<ActiveStream>, String> {
        ensure_asset(asset).await?;

        let mut child = Command::new(&self.settings.bin)
            .args(self.args(chat_id, asset))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| format!("spawn {}: {err}", self.settings.bin.display()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(chat_id, stderr));
        }

        if !self.settings.startup_grace.is_zero() {
            match tokio::time::timeout(self.settings.startup_grace, child.wait()).await {
                Err(_) => {}
                Ok(Ok(status)) if status.success() => {
                    tracing::debug!(chat_id = %chat_id, asset = %asset.display(), "stream finished during startup");
                    let _ = self.events.send(SessionEvent::Ended {
                        chat_id,
                        asset_path: asset.to_path_buf(),
                        reason: PlaybackEndReason::Eof,
                    });
                    return Ok(None);
                }
                Ok(Ok(status)) => return Err(format!("ffmpeg exited during startup: {status}")),
                Ok(Err(err)) => return Err(format!("wait for ffmpeg: {err}")),
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (kill_tx, kill_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_stream(
            child,
            kill_rx,
            StreamTag {
                chat_id,
                asset: asset.to_path_buf(),
                generation,
            },
            self.sessions.clone(),
            self.events.clone(),
        ));
        tracing::info!(
            chat_id = %chat_id,
            asset = %asset.display(),
            generation,
            "stream started"
        );
        Ok(Some(ActiveStream {
            generation,
            asset: asset.to_path_buf(),
            kill_tx: Some(kill_tx),
            watcher: Some(watcher),
        }))
    }
}

#[async_trait]
impl SessionBackend for FfmpegSessionBackend {
    async fn start_session(&self, chat_id: ChatId, asset: &Path) -> Result<(), SessionError> {
        if let Some(previous) = self.take_stream(chat_id) {
            tracing::warn!(chat_id = %chat_id, "start on attached session; replacing stream");
            stop_stream(previous).await;
        }
        let stream = self
            .spawn_stream(chat_id, asset)
            .await
            .map_err(|reason| SessionError::Start { chat_id, reason })?;
        self.install(chat_id, stream);
        Ok(())
    }

    async fn replace_session_content(
        &self,
        chat_id: ChatId,
        asset: &Path,
    ) -> Result<(), SessionError> {
        if !self.has_session(chat_id) {
            return Err(SessionError::Replace {
                chat_id,
                reason: "no active session".to_string(),
            });
        }
        if let Some(previous) = self.take_stream(chat_id) {
            tracing::debug!(chat_id = %chat_id, asset = %previous.asset.display(), "replacing stream");
            stop_stream(previous).await;
        }
        let stream = self
            .spawn_stream(chat_id, asset)
            .await
            .map_err(|reason| SessionError::Replace { chat_id, reason })?;
        self.install(chat_id, stream);
        Ok(())
    }

    async fn end_session(&self, chat_id: ChatId) -> Result<(), SessionError> {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(&chat_id);
        match removed {
            Some(session) => {
                if let Some(stream) = session.stream {
                    stop_stream(stream).await;
                }
                tracing::info!(chat_id = %chat_id, "session ended");
            }
            None => tracing::debug!(chat_id = %chat_id, "end for chat without session"),
        }
        Ok(())
    }
}

struct StreamTag {
    chat_id: ChatId,
    asset: PathBuf,
    generation: u64,
}

async fn ensure_asset(asset: &Path) -> Result<(), String> {
    match tokio::fs::metadata(asset).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(format!("{} is not a file", asset.display())),
        Err(err) => Err(format!("asset {}: {err}", asset.display())),
    }
}

/// Kill the child (if still running) and wait for its watcher.
async fn stop_stream(mut stream: ActiveStream) {
    if let Some(kill_tx) = stream.kill_tx.take() {
        let _ = kill_tx.send(());
    }
    if let Some(watcher) = stream.watcher.take() {
        if let Err(err) = watcher.await {
            tracing::debug!(generation = stream.generation, error = %err, "stream watcher aborted");
        }
    }
}

async fn watch_stream(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    tag: StreamTag,
    sessions: SessionMap,
    events: SessionEventSender,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(err) = child.kill().await {
                tracing::warn!(chat_id = %tag.chat_id, error = %err, "failed to kill ffmpeg");
            }
            return;
        }
    };

    let reason = match status {
        Ok(status) if status.success() => PlaybackEndReason::Eof,
        Ok(status) => {
            tracing::warn!(chat_id = %tag.chat_id, asset = %tag.asset.display(), %status, "ffmpeg exited with failure");
            PlaybackEndReason::Error
        }
        Err(err) => {
            tracing::warn!(chat_id = %tag.chat_id, error = %err, "wait for ffmpeg failed");
            PlaybackEndReason::Error
        }
    };

    let current = {
        let mut sessions = sessions.lock().unwrap_or_else(|err| err.into_inner());
        match sessions.get_mut(&tag.chat_id) {
            Some(session)
                if session
                    .stream
                    .as_ref()
                    .is_some_and(|stream| stream.generation == tag.generation) =>
            {
                session.stream = None;
                true
            }
            _ => false,
        }
    };
    if !current {
        return;
    }
    tracing::info!(chat_id = %tag.chat_id, asset = %tag.asset.display(), ?reason, "stream ended");
    let _ = events.send(SessionEvent::Ended {
        chat_id: tag.chat_id,
        asset_path: tag.asset,
        reason,
    });
}

async fn log_stderr(chat_id: ChatId, stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            tracing::warn!(chat_id = %chat_id, line = %line, "ffmpeg");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use jukebox_core::session_events;

    fn temp_asset(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("jukebox-ffmpeg-{name}-{nanos}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("song.m4a");
        std::fs::write(&path, b"not really audio").unwrap();
        path
    }

    fn settings(bin: &str) -> FfmpegSettings {
        FfmpegSettings {
            bin: PathBuf::from(bin),
            output_url: "rtmp://127.0.0.1/live/{chat_id}".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            format: "flv".to_string(),
            startup_grace: Duration::from_millis(500),
        }
    }

    #[test]
    fn args_target_chat_output() {
        let (tx, _rx) = session_events();
        let backend = FfmpegSessionBackend::new(settings("ffmpeg"), tx);

        let args = backend.args(ChatId(-5), Path::new("/tmp/a.m4a"));
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        assert_eq!(args.first().map(String::as_str), Some("-hide_banner"));
        assert!(args.windows(2).any(|w| w == ["-i", "/tmp/a.m4a"]));
        assert!(args.windows(2).any(|w| w == ["-f", "flv"]));
        assert!(args.contains(&"-re".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("rtmp://127.0.0.1/live/-5")
        );
    }

    #[actix_web::test]
    async fn replace_without_session_fails() {
        let (tx, _rx) = session_events();
        let backend = FfmpegSessionBackend::new(settings("ffmpeg"), tx);
        let asset = temp_asset("replace");

        let err = backend
            .replace_session_content(ChatId(1), &asset)
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Replace { .. }));
    }

    #[actix_web::test]
    async fn start_with_missing_asset_fails() {
        let (tx, _rx) = session_events();
        let backend = FfmpegSessionBackend::new(settings("ffmpeg"), tx);

        let err = backend
            .start_session(ChatId(1), Path::new("/nonexistent/jukebox/a.m4a"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Start { .. }));
        assert!(!backend.has_session(ChatId(1)));
    }

    #[actix_web::test]
    async fn start_with_missing_binary_fails() {
        let (tx, _rx) = session_events();
        let backend = FfmpegSessionBackend::new(settings("/nonexistent/jukebox/ffmpeg"), tx);
        let asset = temp_asset("nobin");

        let err = backend.start_session(ChatId(1), &asset).await.unwrap_err();

        assert!(matches!(err, SessionError::Start { .. }), "{err}");
    }

    #[actix_web::test]
    async fn end_is_idempotent() {
        let (tx, _rx) = session_events();
        let backend = FfmpegSessionBackend::new(settings("ffmpeg"), tx);

        backend.end_session(ChatId(9)).await.unwrap();
        backend.end_session(ChatId(9)).await.unwrap();
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn failing_process_is_a_start_error() {
        let (tx, _rx) = session_events();
        let backend = FfmpegSessionBackend::new(settings("false"), tx);
        let asset = temp_asset("false");

        let err = backend.start_session(ChatId(2), &asset).await.unwrap_err();

        assert!(matches!(err, SessionError::Start { .. }), "{err}");
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn instant_clean_exit_keeps_session_and_reports_eof() {
        let (tx, mut rx) = session_events();
        let backend = FfmpegSessionBackend::new(settings("true"), tx);
        let asset = temp_asset("true");

        backend.start_session(ChatId(3), &asset).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            SessionEvent::Ended {
                chat_id: ChatId(3),
                asset_path: asset.clone(),
                reason: PlaybackEndReason::Eof,
            }
        );
        assert!(backend.has_session(ChatId(3)));

        backend.replace_session_content(ChatId(3), &asset).await.unwrap();
        backend.end_session(ChatId(3)).await.unwrap();
        assert!(!backend.has_session(ChatId(3)));
    }
}
