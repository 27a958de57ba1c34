//! Recording adapters shared by the coordinator and command tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{FetchError, SessionError};
use crate::fetcher::{AssetFetcher, MediaQuery};
use crate::model::ChatId;
use crate::session::SessionBackend;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Start(ChatId, PathBuf),
    Replace(ChatId, PathBuf),
    End(ChatId),
}

#[derive(Default)]
pub(crate) struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<PathBuf>>,
    hanging: Mutex<HashSet<PathBuf>>,
    fail_end: AtomicBool,
    delays: Mutex<HashMap<ChatId, Duration>>,
    in_flight: Mutex<HashMap<ChatId, usize>>,
    max_in_flight: Mutex<HashMap<ChatId, usize>>,
}

impl RecordingBackend {
    pub(crate) fn fail_asset(&self, path: &str) {
        self.failing.lock().unwrap().insert(PathBuf::from(path));
    }

    pub(crate) fn hang_asset(&self, path: &str) {
        self.hanging.lock().unwrap().insert(PathBuf::from(path));
    }

    pub(crate) fn fail_end(&self, fail: bool) {
        self.fail_end.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, chat_id: ChatId, delay: Duration) {
        self.delays.lock().unwrap().insert(chat_id, delay);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn max_concurrent(&self, chat_id: ChatId) -> usize {
        self.max_in_flight
            .lock()
            .unwrap()
            .get(&chat_id)
            .copied()
            .unwrap_or(0)
    }

    async fn record(&self, chat_id: ChatId, call: Call) {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let count = in_flight.entry(chat_id).or_default();
            *count += 1;
            let mut max = self.max_in_flight.lock().unwrap();
            let peak = max.entry(chat_id).or_default();
            *peak = (*peak).max(*count);
        }
        self.calls.lock().unwrap().push(call);
        let delay = self.delays.lock().unwrap().get(&chat_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(count) = in_flight.get_mut(&chat_id) {
            *count -= 1;
        }
    }

    async fn attach(&self, chat_id: ChatId, asset: &Path, call: Call) -> Result<(), String> {
        self.record(chat_id, call).await;
        let hangs = self.hanging.lock().unwrap().contains(asset);
        if hangs {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(asset) {
            return Err("transport refused asset".to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for RecordingBackend {
    async fn start_session(&self, chat_id: ChatId, asset: &Path) -> Result<(), SessionError> {
        self.attach(chat_id, asset, Call::Start(chat_id, asset.to_path_buf()))
            .await
            .map_err(|reason| SessionError::Start { chat_id, reason })
    }

    async fn replace_session_content(
        &self,
        chat_id: ChatId,
        asset: &Path,
    ) -> Result<(), SessionError> {
        self.attach(chat_id, asset, Call::Replace(chat_id, asset.to_path_buf()))
            .await
            .map_err(|reason| SessionError::Replace { chat_id, reason })
    }

    async fn end_session(&self, chat_id: ChatId) -> Result<(), SessionError> {
        self.record(chat_id, Call::End(chat_id)).await;
        if self.fail_end.load(Ordering::SeqCst) {
            return Err(SessionError::End {
                chat_id,
                reason: "not in a call".to_string(),
            });
        }
        Ok(())
    }
}

/// Lets a test hold a fetch open until it decides to release it.
#[derive(Default)]
pub(crate) struct FetchGate {
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
}

/// Fetcher answering from a fixed target -> path table.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    results: Mutex<HashMap<String, PathBuf>>,
    seen: Mutex<Vec<String>>,
    gate: Option<Arc<FetchGate>>,
}

impl ScriptedFetcher {
    pub(crate) fn with_gate(gate: Arc<FetchGate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) fn resolve(&self, target: &str, path: &str) {
        self.results
            .lock()
            .unwrap()
            .insert(target.to_string(), PathBuf::from(path));
    }

    pub(crate) fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetFetcher for ScriptedFetcher {
    async fn fetch(&self, _chat_id: ChatId, query: &MediaQuery) -> Result<PathBuf, FetchError> {
        let target = query.target();
        self.seen.lock().unwrap().push(target.clone());
        if let Some(gate) = self.gate.as_ref() {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.results
            .lock()
            .unwrap()
            .get(&target)
            .cloned()
            .ok_or(FetchError::NotFound)
    }
}
