//! Read-only queue and status handlers.

use actix_web::{get, web, HttpResponse, Responder};
use jukebox_core::{ChatId, Reply};
use jukebox_types::{ChatStatusResponse, QueueEntry, QueueResponse};

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/chats/{chat_id}/queue",
    params(("chat_id" = i64, Path, description = "Chat identifier")),
    responses(
        (status = 200, description = "Pending items", body = QueueResponse)
    )
)]
#[get("/chats/{chat_id}/queue")]
/// List pending items, head first.
pub async fn queue_list(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let chat_id = ChatId(path.into_inner());
    let reply = state.commands.queue_list(chat_id);
    let items = match &reply {
        Reply::Queue(titles) => titles
            .iter()
            .enumerate()
            .map(|(index, title)| QueueEntry {
                position: index + 1,
                title: title.clone(),
            })
            .collect(),
        _ => Vec::new(),
    };
    HttpResponse::Ok().json(QueueResponse {
        chat_id: chat_id.0,
        items,
        message: reply.to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/chats/{chat_id}/status",
    params(("chat_id" = i64, Path, description = "Chat identifier")),
    responses(
        (status = 200, description = "Playback status", body = ChatStatusResponse)
    )
)]
#[get("/chats/{chat_id}/status")]
pub async fn chat_status(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let chat_id = ChatId(path.into_inner());
    let status = state.commands.status(chat_id);
    HttpResponse::Ok().json(ChatStatusResponse {
        chat_id: chat_id.0,
        state: status.state.into(),
        now_playing: status.now_playing.map(|item| item.title),
        queued: status.queued.len(),
        epoch: status.epoch,
    })
}
