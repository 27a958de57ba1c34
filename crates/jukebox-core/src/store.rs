//! Process-wide chat queue store.
//!
//! Owns every [`ChatQueueState`]. Each chat gets its own slot with two locks:
//! a short synchronous lock over the queue (never held across `.await`) and an
//! async advance lock that the coordinator holds for a whole advance step,
//! adapter calls included. The map lock only guards lookup/insert, so
//! different chats never wait on each other's queue or session work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OwnedMutexGuard;

use crate::error::StaleEpoch;
use crate::model::{ChatId, ChatQueueState, ChatStatus, PlaybackState, QueueItem};

#[derive(Default)]
struct ChatSlot {
    queue: Mutex<ChatQueueState>,
    advance: Arc<tokio::sync::Mutex<()>>,
}

impl ChatSlot {
    fn lock_queue(&self) -> MutexGuard<'_, ChatQueueState> {
        self.queue.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[derive(Default)]
pub struct ChatQueueStore {
    chats: Mutex<HashMap<ChatId, Arc<ChatSlot>>>,
}

impl ChatQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the slot for a chat, registering an empty one on first use.
    fn slot(&self, chat_id: ChatId) -> Arc<ChatSlot> {
        let mut chats = self.chats.lock().unwrap_or_else(|err| err.into_inner());
        chats.entry(chat_id).or_default().clone()
    }

    /// Slot lookup for read paths; never registers the chat.
    fn existing(&self, chat_id: ChatId) -> Option<Arc<ChatSlot>> {
        let chats = self.chats.lock().unwrap_or_else(|err| err.into_inner());
        chats.get(&chat_id).cloned()
    }

    /// Register the chat if needed and return a view of its state.
    pub fn get_or_create(&self, chat_id: ChatId) -> ChatStatus {
        let _ = self.slot(chat_id);
        self.status(chat_id)
    }

    /// Append an item to the tail of the chat's queue; returns its 1-based position.
    pub fn enqueue(&self, chat_id: ChatId, item: QueueItem) -> usize {
        let slot = self.slot(chat_id);
        let mut queue = slot.lock_queue();
        queue.items.push_back(item);
        queue.items.len()
    }

    /// Append only if no clear happened since `epoch` was observed.
    pub fn enqueue_at_epoch(
        &self,
        chat_id: ChatId,
        item: QueueItem,
        epoch: u64,
    ) -> Result<usize, StaleEpoch> {
        let slot = self.slot(chat_id);
        let mut queue = slot.lock_queue();
        if queue.epoch != epoch {
            return Err(StaleEpoch {
                chat_id,
                expected: epoch,
                current: queue.epoch,
            });
        }
        queue.items.push_back(item);
        Ok(queue.items.len())
    }

    /// Empty the queue and bump the epoch. Does not touch the session.
    ///
    /// Returns the number of discarded items.
    pub fn clear(&self, chat_id: ChatId) -> usize {
        let slot = self.slot(chat_id);
        let mut queue = slot.lock_queue();
        let removed = queue.items.len();
        queue.items.clear();
        queue.epoch += 1;
        removed
    }

    pub fn peek_head(&self, chat_id: ChatId) -> Option<QueueItem> {
        self.existing(chat_id)?.lock_queue().items.front().cloned()
    }

    pub fn pop_head(&self, chat_id: ChatId) -> Option<QueueItem> {
        self.existing(chat_id)?.lock_queue().items.pop_front()
    }

    /// Copy of the pending items in playback order.
    pub fn snapshot(&self, chat_id: ChatId) -> Vec<QueueItem> {
        self.existing(chat_id)
            .map(|slot| {
                let queue = slot.lock_queue();
                queue.items.iter().cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Current epoch; an unknown chat is at epoch 0.
    pub fn epoch(&self, chat_id: ChatId) -> u64 {
        self.existing(chat_id)
            .map(|slot| {
                let queue = slot.lock_queue();
                queue.epoch
            })
            .unwrap_or(0)
    }

    /// State view; unknown chats read as idle and empty.
    pub fn status(&self, chat_id: ChatId) -> ChatStatus {
        let Some(slot) = self.existing(chat_id) else {
            return ChatStatus::default();
        };
        let queue = slot.lock_queue();
        ChatStatus {
            state: queue.state,
            now_playing: queue.now_playing.clone(),
            queued: queue.items.iter().cloned().collect(),
            epoch: queue.epoch,
        }
    }

    /// Chats that have been seen so far.
    pub fn chat_ids(&self) -> Vec<ChatId> {
        let chats = self.chats.lock().unwrap_or_else(|err| err.into_inner());
        let mut ids: Vec<ChatId> = chats.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Check out a chat for one advance step.
    ///
    /// Waits for any step already running for the same chat; other chats are
    /// unaffected.
    pub async fn lock_chat(&self, chat_id: ChatId) -> ChatGuard {
        let slot = self.slot(chat_id);
        let advance = slot.advance.clone().lock_owned().await;
        ChatGuard {
            chat_id,
            slot,
            _advance: advance,
        }
    }
}

/// Exclusive handle on a chat for the duration of one advance step.
pub struct ChatGuard {
    chat_id: ChatId,
    slot: Arc<ChatSlot>,
    _advance: OwnedMutexGuard<()>,
}

impl ChatGuard {
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn pop_head(&self) -> Option<QueueItem> {
        self.slot.lock_queue().items.pop_front()
    }

    pub fn queue_len(&self) -> usize {
        self.slot.lock_queue().items.len()
    }

    pub fn state(&self) -> PlaybackState {
        self.slot.lock_queue().state
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.slot.lock_queue().state = state;
    }

    /// `true` while a session is attached.
    pub fn playing(&self) -> bool {
        self.slot.lock_queue().playing
    }

    pub fn now_playing(&self) -> Option<QueueItem> {
        self.slot.lock_queue().now_playing.clone()
    }

    /// Record that `item` is now streaming on an attached session.
    pub fn mark_attached(&self, item: QueueItem) {
        let mut queue = self.slot.lock_queue();
        queue.playing = true;
        queue.now_playing = Some(item);
        queue.state = PlaybackState::Playing;
    }

    /// Record that no session is attached any more.
    pub fn mark_detached(&self) {
        let mut queue = self.slot.lock_queue();
        queue.playing = false;
        queue.now_playing = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn item(name: &str) -> QueueItem {
        QueueItem::from_asset(PathBuf::from(format!("/tmp/{name}.m4a")))
    }

    #[test]
    fn enqueue_preserves_submission_order() {
        let store = ChatQueueStore::new();
        let chat = ChatId(1);
        assert_eq!(store.enqueue(chat, item("a")), 1);
        assert_eq!(store.enqueue(chat, item("b")), 2);
        assert_eq!(store.enqueue(chat, item("c")), 3);

        let titles: Vec<String> = store.snapshot(chat).into_iter().map(|i| i.title).collect();
        assert_eq!(titles, vec!["a.m4a", "b.m4a", "c.m4a"]);
        assert_eq!(store.peek_head(chat), Some(item("a")));
    }

    #[test]
    fn pop_head_removes_front_until_empty() {
        let store = ChatQueueStore::new();
        let chat = ChatId(1);
        store.enqueue(chat, item("a"));
        store.enqueue(chat, item("b"));

        assert_eq!(store.pop_head(chat), Some(item("a")));
        assert_eq!(store.pop_head(chat), Some(item("b")));
        assert_eq!(store.pop_head(chat), None);
    }

    #[test]
    fn clear_bumps_epoch_and_rejects_stale_enqueue() {
        let store = ChatQueueStore::new();
        let chat = ChatId(7);
        let epoch = store.epoch(chat);
        store.enqueue(chat, item("a"));

        assert_eq!(store.clear(chat), 1);
        assert!(store.snapshot(chat).is_empty());

        let err = store.enqueue_at_epoch(chat, item("late"), epoch).unwrap_err();
        assert_eq!(err.expected, epoch);
        assert_eq!(err.current, epoch + 1);
        assert!(store.snapshot(chat).is_empty());

        let fresh = store.epoch(chat);
        assert_eq!(store.enqueue_at_epoch(chat, item("b"), fresh), Ok(1));
    }

    #[test]
    fn chats_are_partitioned() {
        let store = ChatQueueStore::new();
        store.enqueue(ChatId(1), item("a"));
        store.clear(ChatId(2));

        assert_eq!(store.snapshot(ChatId(1)).len(), 1);
        assert_eq!(store.epoch(ChatId(1)), 0);
        assert_eq!(store.chat_ids(), vec![ChatId(1), ChatId(2)]);
    }

    #[test]
    fn get_or_create_registers_empty_chat() {
        let store = ChatQueueStore::new();
        let status = store.get_or_create(ChatId(3));
        assert_eq!(status.state, PlaybackState::Idle);
        assert!(status.queued.is_empty());
        assert_eq!(store.chat_ids(), vec![ChatId(3)]);
    }

    #[test]
    fn reads_do_not_register_unknown_chats() {
        let store = ChatQueueStore::new();

        assert!(store.snapshot(ChatId(5)).is_empty());
        assert_eq!(store.epoch(ChatId(5)), 0);
        assert_eq!(store.status(ChatId(5)), ChatStatus::default());
        assert_eq!(store.peek_head(ChatId(5)), None);
        assert_eq!(store.pop_head(ChatId(5)), None);
        assert!(store.chat_ids().is_empty());

        store
            .enqueue_at_epoch(ChatId(5), item("a"), store.epoch(ChatId(5)))
            .unwrap();
        assert_eq!(store.chat_ids(), vec![ChatId(5)]);
    }

    #[tokio::test]
    async fn lock_chat_is_exclusive_per_chat() {
        let store = ChatQueueStore::new();
        let held = store.lock_chat(ChatId(1)).await;

        let same = tokio::time::timeout(Duration::from_millis(50), store.lock_chat(ChatId(1))).await;
        assert!(same.is_err());

        let other = tokio::time::timeout(Duration::from_millis(50), store.lock_chat(ChatId(2))).await;
        assert!(other.is_ok());

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(50), store.lock_chat(ChatId(1))).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn snapshot_does_not_wait_for_advance_lock() {
        let store = ChatQueueStore::new();
        store.enqueue(ChatId(1), item("a"));
        let guard = store.lock_chat(ChatId(1)).await;
        guard.mark_attached(item("playing"));

        let status = store.status(ChatId(1));
        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.now_playing, Some(item("playing")));
        assert_eq!(status.queued, vec![item("a")]);
        drop(guard);
    }
}
