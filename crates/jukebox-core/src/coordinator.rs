//! Per-chat playback state machine.
//!
//! Every step that touches the session backend runs while holding the chat's
//! advance lock from [`ChatQueueStore::lock_chat`], so at most one advance,
//! skip, or stop executes per chat while other chats proceed in parallel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use jukebox_types::PlaybackEndReason;

use crate::error::SessionError;
use crate::model::{ChatId, ChatStatus, PlaybackState, QueueItem};
use crate::session::{SessionBackend, SessionEvent, SessionEventReceiver};
use crate::store::{ChatGuard, ChatQueueStore};

/// Result of one advance step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// `item` is now streaming; `dropped` items failed to attach before it.
    Started { item: QueueItem, dropped: usize },
    /// The queue ran dry and the chat is idle; `dropped` items failed to attach.
    Exhausted { dropped: usize },
}

pub struct PlaybackCoordinator {
    store: Arc<ChatQueueStore>,
    backend: Arc<dyn SessionBackend>,
    session_timeout: Duration,
}

impl PlaybackCoordinator {
    pub fn new(
        store: Arc<ChatQueueStore>,
        backend: Arc<dyn SessionBackend>,
        session_timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            session_timeout,
        }
    }

    pub fn store(&self) -> &Arc<ChatQueueStore> {
        &self.store
    }

    pub fn status(&self, chat_id: ChatId) -> ChatStatus {
        self.store.status(chat_id)
    }

    /// Move the chat to its next queued item, or tear down when empty.
    pub async fn advance(&self, chat_id: ChatId) -> AdvanceOutcome {
        let guard = self.store.lock_chat(chat_id).await;
        self.advance_locked(&guard).await
    }

    /// Advance only when no session is attached; returns `None` otherwise.
    pub async fn advance_if_idle(&self, chat_id: ChatId) -> Option<AdvanceOutcome> {
        let guard = self.store.lock_chat(chat_id).await;
        if guard.playing() {
            tracing::debug!(chat_id = %chat_id, queued = guard.queue_len(), "session busy; item stays queued");
            return None;
        }
        Some(self.advance_locked(&guard).await)
    }

    /// Tear the current session down unconditionally, then advance.
    pub async fn skip(&self, chat_id: ChatId) -> AdvanceOutcome {
        let guard = self.store.lock_chat(chat_id).await;
        self.teardown(&guard).await;
        self.advance_locked(&guard).await
    }

    /// Clear the queue, then tear the session down. Always ends idle.
    ///
    /// The queue is cleared before waiting for the chat lock, so a step that
    /// is already running finds nothing more to play. Returns the number of
    /// discarded items.
    pub async fn stop(&self, chat_id: ChatId) -> usize {
        let removed = self.store.clear(chat_id);
        let guard = self.store.lock_chat(chat_id).await;
        guard.set_state(PlaybackState::Stopping);
        self.teardown(&guard).await;
        guard.set_state(PlaybackState::Idle);
        tracing::info!(chat_id = %chat_id, removed, "playback stopped");
        removed
    }

    /// React to a stream ending on its own.
    ///
    /// Events that do not match the item currently attached are stale and
    /// ignored.
    pub async fn handle_event(&self, event: SessionEvent) -> Option<AdvanceOutcome> {
        let SessionEvent::Ended {
            chat_id,
            asset_path,
            reason,
        } = event;
        if reason == PlaybackEndReason::Stopped {
            return None;
        }

        let guard = self.store.lock_chat(chat_id).await;
        let current = guard.now_playing();
        let matches = current
            .as_ref()
            .is_some_and(|item| item.asset_path == asset_path);
        if guard.state() != PlaybackState::Playing || !matches {
            tracing::debug!(
                chat_id = %chat_id,
                asset = %asset_path.display(),
                "ignoring stale stream end"
            );
            return None;
        }
        if reason == PlaybackEndReason::Error {
            tracing::warn!(
                chat_id = %chat_id,
                asset = %asset_path.display(),
                "stream ended with an error; advancing"
            );
        }
        Some(self.advance_locked(&guard).await)
    }

    /// Drain backend events until the channel closes.
    pub async fn run_events(self: Arc<Self>, mut events: SessionEventReceiver) {
        while let Some(event) = events.recv().await {
            let coordinator = self.clone();
            tokio::spawn(async move {
                coordinator.handle_event(event).await;
            });
        }
        tracing::debug!("session event channel closed");
    }

    /// Stop every known chat. Used on process exit.
    pub async fn shutdown(&self) {
        for chat_id in self.store.chat_ids() {
            self.stop(chat_id).await;
        }
    }

    async fn advance_locked(&self, guard: &ChatGuard) -> AdvanceOutcome {
        let chat_id = guard.chat_id();
        let mut dropped = 0usize;
        loop {
            let Some(item) = guard.pop_head() else {
                if guard.playing() {
                    self.teardown(guard).await;
                }
                guard.set_state(PlaybackState::Idle);
                tracing::debug!(chat_id = %chat_id, dropped, "queue exhausted");
                return AdvanceOutcome::Exhausted { dropped };
            };

            guard.set_state(PlaybackState::Advancing);
            let attached = guard.playing();
            let result = if attached {
                self.timed(
                    chat_id,
                    "replace",
                    self.backend.replace_session_content(chat_id, &item.asset_path),
                )
                .await
            } else {
                self.timed(
                    chat_id,
                    "start",
                    self.backend.start_session(chat_id, &item.asset_path),
                )
                .await
            };

            match result {
                Ok(()) => {
                    tracing::info!(
                        chat_id = %chat_id,
                        title = %item.title,
                        replaced = attached,
                        "session playing"
                    );
                    guard.mark_attached(item.clone());
                    return AdvanceOutcome::Started { item, dropped };
                }
                Err(err) => {
                    tracing::warn!(
                        chat_id = %chat_id,
                        title = %item.title,
                        error = %err,
                        "dropping item that failed to attach"
                    );
                    dropped += 1;
                }
            }
        }
    }

    /// Best-effort session teardown; failures are logged and absorbed.
    async fn teardown(&self, guard: &ChatGuard) {
        let chat_id = guard.chat_id();
        match self
            .timed(chat_id, "end", self.backend.end_session(chat_id))
            .await
        {
            Ok(()) => tracing::debug!(chat_id = %chat_id, "session ended"),
            Err(err) => tracing::warn!(chat_id = %chat_id, error = %err, "session teardown failed"),
        }
        guard.mark_detached();
    }

    async fn timed<F>(&self, chat_id: ChatId, op: &'static str, call: F) -> Result<(), SessionError>
    where
        F: Future<Output = Result<(), SessionError>>,
    {
        match tokio::time::timeout(self.session_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout {
                chat_id,
                op,
                after: self.session_timeout,
            }),
        }
    }
}
