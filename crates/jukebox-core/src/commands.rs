//! User command entry points.
//!
//! Handlers validate input, fetch outside of any chat lock, mutate the store,
//! and hand the chat to the coordinator. Each returns a short reply for the
//! user.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::{AdvanceOutcome, PlaybackCoordinator};
use crate::error::{CommandError, FetchError};
use crate::fetcher::{AssetFetcher, MediaQuery};
use crate::model::{ChatId, ChatStatus, QueueItem};

pub const QUEUE_EMPTY_TEXT: &str = "Queue is empty.";

/// Human-readable command result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Greeting,
    /// Fetched and queued behind the current item.
    Queued { title: String, position: usize },
    /// Fetched and attached to the session right away.
    NowPlaying { title: String },
    /// Fetched, but the chat was stopped in the meantime.
    Discarded { title: String },
    /// Fetched and queued, but the transport refused it.
    PlaybackFailed { title: String },
    Skipped { next: Option<String> },
    Stopped,
    /// Pending titles in playback order.
    Queue(Vec<String>),
    /// Recognized command with no implementation (pause/resume).
    Unsupported(&'static str),
}

impl Reply {
    /// `true` for commands that are recognized but not implemented.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Reply::Unsupported(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Greeting => write!(
                f,
                "Jukebox is online! Use /play <URL or search terms> to play music."
            ),
            Reply::Queued { title, position } => {
                write!(f, "Added to queue at position {position}: {title}")
            }
            Reply::NowPlaying { title } => write!(f, "Now playing: {title}"),
            Reply::Discarded { title } => write!(
                f,
                "Playback was stopped while {title} downloaded; it was not queued."
            ),
            Reply::PlaybackFailed { title } => {
                write!(f, "Could not start playback of {title}; skipped.")
            }
            Reply::Skipped { next: Some(title) } => write!(f, "Skipped. Now playing: {title}"),
            Reply::Skipped { next: None } => write!(f, "Skipped. {QUEUE_EMPTY_TEXT}"),
            Reply::Stopped => write!(f, "Stopped and left the voice chat."),
            Reply::Queue(titles) if titles.is_empty() => write!(f, "{QUEUE_EMPTY_TEXT}"),
            Reply::Queue(titles) => {
                write!(f, "Queue:")?;
                for (index, title) in titles.iter().enumerate() {
                    write!(f, "\n{}. {title}", index + 1)?;
                }
                Ok(())
            }
            Reply::Unsupported(command) => write!(f, "{command} is not implemented."),
        }
    }
}

pub struct ChatCommands {
    fetcher: Arc<dyn AssetFetcher>,
    coordinator: Arc<PlaybackCoordinator>,
    fetch_timeout: Duration,
}

impl ChatCommands {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        coordinator: Arc<PlaybackCoordinator>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            coordinator,
            fetch_timeout,
        }
    }

    pub fn coordinator(&self) -> &Arc<PlaybackCoordinator> {
        &self.coordinator
    }

    pub fn greeting(&self) -> Reply {
        Reply::Greeting
    }

    /// Fetch `query`, queue the result, and start playback if the chat is idle.
    ///
    /// A failed fetch leaves the queue untouched. A stop issued while the
    /// fetch was running discards the result.
    pub async fn play(&self, chat_id: ChatId, query: &str) -> Result<Reply, CommandError> {
        let Some(query) = MediaQuery::parse(query) else {
            return Err(CommandError::EmptyQuery);
        };
        let store = self.coordinator.store();
        let epoch = store.epoch(chat_id);

        tracing::info!(chat_id = %chat_id, query = %query.as_str(), "fetching asset");
        let asset = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(chat_id, &query)).await {
            Ok(Ok(path)) => path,
            Ok(Err(err)) => {
                tracing::warn!(chat_id = %chat_id, query = %query.as_str(), error = %err, "fetch failed");
                return Err(err.into());
            }
            Err(_) => {
                tracing::warn!(chat_id = %chat_id, query = %query.as_str(), "fetch timed out");
                return Err(FetchError::Timeout(self.fetch_timeout).into());
            }
        };

        let item = QueueItem::from_asset(asset);
        let title = item.title.clone();
        let position = match store.enqueue_at_epoch(chat_id, item.clone(), epoch) {
            Ok(position) => position,
            Err(stale) => {
                tracing::info!(chat_id = %chat_id, title = %title, error = %stale, "discarding fetch finished after stop");
                return Ok(Reply::Discarded { title });
            }
        };
        tracing::info!(chat_id = %chat_id, title = %title, position, "item queued");

        match self.coordinator.advance_if_idle(chat_id).await {
            Some(AdvanceOutcome::Started { item: started, .. }) if started == item => {
                Ok(Reply::NowPlaying { title })
            }
            Some(AdvanceOutcome::Exhausted { dropped }) if dropped > 0 => {
                Ok(Reply::PlaybackFailed { title })
            }
            _ => {
                let queued_at = store
                    .snapshot(chat_id)
                    .iter()
                    .position(|queued| *queued == item);
                match queued_at {
                    Some(index) => Ok(Reply::Queued {
                        title,
                        position: index + 1,
                    }),
                    // Cleared by a stop that landed before the advance step.
                    None if store.epoch(chat_id) != epoch => {
                        tracing::info!(chat_id = %chat_id, title = %title, "queued item cleared by stop");
                        Ok(Reply::Discarded { title })
                    }
                    // Picked up by a concurrent advance step.
                    None => Ok(Reply::NowPlaying { title }),
                }
            }
        }
    }

    pub async fn skip(&self, chat_id: ChatId) -> Reply {
        match self.coordinator.skip(chat_id).await {
            AdvanceOutcome::Started { item, .. } => Reply::Skipped {
                next: Some(item.title),
            },
            AdvanceOutcome::Exhausted { .. } => Reply::Skipped { next: None },
        }
    }

    pub async fn stop(&self, chat_id: ChatId) -> Reply {
        self.coordinator.stop(chat_id).await;
        Reply::Stopped
    }

    pub fn queue_list(&self, chat_id: ChatId) -> Reply {
        let titles = self
            .coordinator
            .store()
            .snapshot(chat_id)
            .into_iter()
            .map(|item| item.title)
            .collect();
        Reply::Queue(titles)
    }

    pub fn status(&self, chat_id: ChatId) -> ChatStatus {
        self.coordinator.status(chat_id)
    }

    pub fn pause(&self, _chat_id: ChatId) -> Reply {
        Reply::Unsupported("Pause")
    }

    pub fn resume(&self, _chat_id: ChatId) -> Reply {
        Reply::Unsupported("Resume")
    }
}
