//! Streaming session backend abstraction.
//!
//! Implementations attach a chat's live audio transport to a local asset,
//! swap what it plays, or tear it down.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jukebox_types::PlaybackEndReason;
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::model::ChatId;

#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Attach a new session for the chat and start streaming `asset`.
    async fn start_session(&self, chat_id: ChatId, asset: &Path) -> Result<(), SessionError>;
    /// Swap the content of the chat's attached session for `asset`.
    async fn replace_session_content(
        &self,
        chat_id: ChatId,
        asset: &Path,
    ) -> Result<(), SessionError>;
    /// Tear the chat's session down. Ending a missing session is not an error.
    async fn end_session(&self, chat_id: ChatId) -> Result<(), SessionError>;
}

/// Notification emitted by a backend when a stream stops on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Ended {
        chat_id: ChatId,
        asset_path: PathBuf,
        reason: PlaybackEndReason,
    },
}

pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;
pub type SessionEventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Create the channel a backend uses to report stream completion.
pub fn session_events() -> (SessionEventSender, SessionEventReceiver) {
    mpsc::unbounded_channel()
}
