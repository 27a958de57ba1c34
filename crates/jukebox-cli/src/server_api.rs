use anyhow::{Context, Result};
use jukebox_types::{ChatStatusResponse, CommandResponse, PlayRequest, QueueResponse};
use serde::de::DeserializeOwned;

/// Command routes that take no body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChatAction {
    Skip,
    Stop,
    Pause,
    Resume,
}

impl ChatAction {
    fn route(self) -> &'static str {
        match self {
            ChatAction::Skip => "skip",
            ChatAction::Stop => "stop",
            ChatAction::Pause => "pause",
            ChatAction::Resume => "resume",
        }
    }
}

pub(crate) fn chat_url(server: &str, chat_id: i64, route: &str) -> String {
    format!("{}/chats/{chat_id}/{route}", server.trim_end_matches('/'))
}

pub(crate) fn play(server: &str, chat_id: i64, query: &str) -> Result<CommandResponse> {
    let url = chat_url(server, chat_id, "play");
    let resp = ureq::post(&url)
        .config()
        .http_status_as_error(false)
        .build()
        .send_json(PlayRequest {
            query: query.to_string(),
        })
        .context("request /play")?;
    read_json(resp, "play")
}

pub(crate) fn command(server: &str, chat_id: i64, action: ChatAction) -> Result<CommandResponse> {
    let url = chat_url(server, chat_id, action.route());
    let resp = ureq::post(&url)
        .config()
        .http_status_as_error(false)
        .build()
        .send_empty()
        .with_context(|| format!("request /{}", action.route()))?;
    read_json(resp, action.route())
}

pub(crate) fn queue(server: &str, chat_id: i64) -> Result<QueueResponse> {
    let url = chat_url(server, chat_id, "queue");
    read_json(ureq::get(&url).call().context("request /queue")?, "queue")
}

pub(crate) fn status(server: &str, chat_id: i64) -> Result<ChatStatusResponse> {
    let url = chat_url(server, chat_id, "status");
    read_json(ureq::get(&url).call().context("request /status")?, "status")
}

pub(crate) fn greeting(server: &str) -> Result<String> {
    let url = format!("{}/", server.trim_end_matches('/'));
    let mut resp = ureq::get(&url).call().context("request /")?;
    resp.body_mut()
        .read_to_string()
        .context("read / response body")
}

fn read_json<T: DeserializeOwned>(
    mut resp: ureq::http::Response<ureq::Body>,
    label: &str,
) -> Result<T> {
    let body = resp
        .body_mut()
        .read_to_string()
        .with_context(|| format!("read /{label} response body"))?;
    serde_json::from_str(&body).with_context(|| format!("decode /{label} response"))
}
