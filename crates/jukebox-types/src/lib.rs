use serde::{Deserialize, Serialize};

/// Reason why a chat's stream stopped on the transport side.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of the asset.
    Eof,
    /// The transport process failed or exited abnormally.
    Error,
    /// Playback was explicitly torn down by a command.
    Stopped,
}

/// Coarse per-chat playback state.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStateKind {
    /// No session and nothing queued.
    #[default]
    Idle,
    /// Popping the next item and attaching it to the session.
    Advancing,
    /// A session is attached and streaming.
    Playing,
    /// Tearing the session down after a stop request.
    Stopping,
}

/// Request payload for the `play` command.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlayRequest {
    /// URL (`http://`, `https://`) or free-text search terms.
    pub query: String,
}

/// Generic command reply returned by play/skip/stop/pause/resume.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CommandResponse {
    /// Chat the command was issued for.
    pub chat_id: i64,
    /// `true` when the command succeeded.
    pub ok: bool,
    /// Human-readable reply for the user.
    pub message: String,
}

/// Single pending queue entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueueEntry {
    /// 1-based position in playback order.
    pub position: usize,
    /// Display title derived from the asset file name.
    pub title: String,
}

/// Queue listing for a chat.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueueResponse {
    /// Chat the listing belongs to.
    pub chat_id: i64,
    /// Pending items, head first.
    pub items: Vec<QueueEntry>,
    /// Pre-formatted listing (or the empty-queue text).
    pub message: String,
}

/// Playback status for a chat.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatStatusResponse {
    /// Chat the status belongs to.
    pub chat_id: i64,
    /// Current playback state.
    pub state: PlaybackStateKind,
    /// Title of the item attached to the session, if any.
    pub now_playing: Option<String>,
    /// Number of pending items.
    pub queued: usize,
    /// Stop counter; bumps each time the chat is stopped.
    pub epoch: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_state_serializes_snake_case() {
        let json = serde_json::to_string(&PlaybackStateKind::Advancing).unwrap();
        assert_eq!(json, "\"advancing\"");
    }

    #[test]
    fn end_reason_parses_from_snake_case() {
        let reason: PlaybackEndReason = serde_json::from_str("\"eof\"").unwrap();
        assert_eq!(reason, PlaybackEndReason::Eof);
    }
}
