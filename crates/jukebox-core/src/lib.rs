//! Chat-scoped playback orchestration.
//!
//! A [`ChatQueueStore`] owns one FIFO queue per chat, a
//! [`PlaybackCoordinator`] drives each chat's session through an
//! [`SessionBackend`], and [`ChatCommands`] turn user commands into queue
//! mutations and advance steps. Assets are resolved by an [`AssetFetcher`].

pub mod commands;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use commands::{ChatCommands, Reply, QUEUE_EMPTY_TEXT};
pub use coordinator::{AdvanceOutcome, PlaybackCoordinator};
pub use error::{CommandError, FetchError, SessionError, StaleEpoch};
pub use fetcher::{AssetFetcher, MediaQuery};
pub use model::{ChatId, ChatQueueState, ChatStatus, PlaybackState, QueueItem};
pub use session::{
    session_events, SessionBackend, SessionEvent, SessionEventReceiver, SessionEventSender,
};
pub use store::{ChatGuard, ChatQueueStore};
