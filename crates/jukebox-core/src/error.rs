//! Error taxonomy for fetching, session control, and commands.

use std::time::Duration;

use thiserror::Error;

use crate::model::ChatId;

/// Failure resolving a query into a local asset. Reported to the caller;
/// the queue is never mutated.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("nothing found for query")]
    NotFound,

    #[error("downloader unavailable: {0}")]
    Unavailable(String),

    #[error("downloader exited with {status}: {stderr}")]
    Downloader { status: String, stderr: String },

    #[error("downloaded file not found")]
    MissingOutput,

    #[error("unsupported query: {0}")]
    Unsupported(String),

    #[error("download timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure from the streaming session backend.
///
/// Start/replace failures drop the offending item; end failures are logged
/// and never block the move to idle.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start session for chat {chat_id}: {reason}")]
    Start { chat_id: ChatId, reason: String },

    #[error("failed to replace session content for chat {chat_id}: {reason}")]
    Replace { chat_id: ChatId, reason: String },

    #[error("failed to end session for chat {chat_id}: {reason}")]
    End { chat_id: ChatId, reason: String },

    #[error("session {op} for chat {chat_id} timed out after {after:?}")]
    Timeout {
        chat_id: ChatId,
        op: &'static str,
        after: Duration,
    },
}

/// Failure surfaced to the user by a command handler.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Usage: /play <URL or search terms>")]
    EmptyQuery,

    #[error("Failed to download: {0}")]
    Fetch(#[from] FetchError),
}

/// The chat was stopped after the caller captured its epoch.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("chat {chat_id} was stopped (epoch {expected} -> {current})")]
pub struct StaleEpoch {
    pub chat_id: ChatId,
    pub expected: u64,
    pub current: u64,
}
