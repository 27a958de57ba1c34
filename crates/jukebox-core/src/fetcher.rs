//! Asset fetcher abstraction and query classification.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::model::ChatId;

const URL_SCHEMES: [&str; 2] = ["http://", "https://"];
const SEARCH_PREFIX: &str = "ytsearch1:";

/// A user query, classified as a direct locator or a search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaQuery {
    /// Begins with a recognized URL scheme; passed through unmodified.
    Locator(String),
    /// Free text, resolved as a best single match search.
    Search(String),
}

impl MediaQuery {
    /// Classify a raw query. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_ascii_lowercase();
        if URL_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            Some(MediaQuery::Locator(trimmed.to_string()))
        } else {
            Some(MediaQuery::Search(trimmed.to_string()))
        }
    }

    /// Downloader target: the URL itself, or a best-match search expression.
    pub fn target(&self) -> String {
        match self {
            MediaQuery::Locator(url) => url.clone(),
            MediaQuery::Search(terms) => format!("{SEARCH_PREFIX}{terms}"),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MediaQuery::Locator(value) | MediaQuery::Search(value) => value,
        }
    }
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Resolve `query` into a locally stored playable file for `chat_id`.
    ///
    /// The chat id only feeds the stored file's name.
    async fn fetch(&self, chat_id: ChatId, query: &MediaQuery) -> Result<PathBuf, FetchError>;
}
