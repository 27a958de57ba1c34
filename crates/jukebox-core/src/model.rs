//! Chat-scoped queue data model.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

use jukebox_types::PlaybackStateKind;

/// Opaque chat identifier; the partition key for all playback state.
///
/// Group chats commonly use negative identifiers, so this wraps an `i64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(value: i64) -> Self {
        ChatId(value)
    }
}

/// One pending or playing track. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueItem {
    /// Local playable file resolved by the fetcher.
    pub asset_path: PathBuf,
    /// Display title derived from the asset's file name.
    pub title: String,
}

impl QueueItem {
    /// Build an item for a fetched asset, deriving the title from its base name.
    pub fn from_asset(asset_path: PathBuf) -> Self {
        let title = title_for_path(&asset_path);
        Self { asset_path, title }
    }
}

fn title_for_path(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Per-chat playback state machine states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Idle,
    Advancing,
    Playing,
    Stopping,
}

impl From<PlaybackState> for PlaybackStateKind {
    fn from(state: PlaybackState) -> Self {
        match state {
            PlaybackState::Idle => PlaybackStateKind::Idle,
            PlaybackState::Advancing => PlaybackStateKind::Advancing,
            PlaybackState::Playing => PlaybackStateKind::Playing,
            PlaybackState::Stopping => PlaybackStateKind::Stopping,
        }
    }
}

/// Queue and session bookkeeping for a single chat.
///
/// Owned by the [`ChatQueueStore`](crate::store::ChatQueueStore); other
/// components only see it through short-lived guards or snapshots.
#[derive(Debug, Default)]
pub struct ChatQueueState {
    /// Pending items in playback order.
    pub items: VecDeque<QueueItem>,
    /// `true` while a session is attached for this chat.
    pub playing: bool,
    /// Coordinator state.
    pub state: PlaybackState,
    /// Bumped by every clear; stale fetches compare against it.
    pub epoch: u64,
    /// Item most recently attached to the session (already popped).
    pub now_playing: Option<QueueItem>,
}

impl ChatQueueState {
    /// `true` when nothing is queued and no session is attached.
    pub fn is_quiescent(&self) -> bool {
        self.items.is_empty() && !self.playing
    }
}

/// Read-only view of a chat's playback state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatStatus {
    pub state: PlaybackState,
    pub now_playing: Option<QueueItem>,
    pub queued: Vec<QueueItem>,
    pub epoch: u64,
}
