//! Per-chat command handlers.

use actix_web::{post, web, HttpResponse, Responder};
use jukebox_core::{ChatId, CommandError, FetchError, Reply};
use jukebox_types::{CommandResponse, PlayRequest};

use crate::state::AppState;

fn reply_response(chat_id: ChatId, reply: Reply) -> HttpResponse {
    let ok = !matches!(
        reply,
        Reply::Unsupported(_) | Reply::PlaybackFailed { .. } | Reply::Discarded { .. }
    );
    let body = CommandResponse {
        chat_id: chat_id.0,
        ok,
        message: reply.to_string(),
    };
    if reply.is_unsupported() {
        HttpResponse::NotImplemented().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

fn error_response(chat_id: ChatId, err: CommandError) -> HttpResponse {
    let body = CommandResponse {
        chat_id: chat_id.0,
        ok: false,
        message: err.to_string(),
    };
    match err {
        CommandError::EmptyQuery => HttpResponse::BadRequest().json(body),
        CommandError::Fetch(FetchError::Timeout(_)) => HttpResponse::GatewayTimeout().json(body),
        CommandError::Fetch(_) => HttpResponse::BadGateway().json(body),
    }
}

#[utoipa::path(
    post,
    path = "/chats/{chat_id}/play",
    params(("chat_id" = i64, Path, description = "Chat identifier")),
    request_body = PlayRequest,
    responses(
        (status = 200, description = "Queued or started", body = CommandResponse),
        (status = 400, description = "Empty query", body = CommandResponse),
        (status = 502, description = "Download failed", body = CommandResponse),
        (status = 504, description = "Download timed out", body = CommandResponse)
    )
)]
#[post("/chats/{chat_id}/play")]
/// Fetch a URL or search result and queue it for the chat.
pub async fn play(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<PlayRequest>,
) -> impl Responder {
    let chat_id = ChatId(path.into_inner());
    match state.commands.play(chat_id, &body.query).await {
        Ok(reply) => reply_response(chat_id, reply),
        Err(err) => error_response(chat_id, err),
    }
}

#[utoipa::path(
    post,
    path = "/chats/{chat_id}/skip",
    params(("chat_id" = i64, Path, description = "Chat identifier")),
    responses(
        (status = 200, description = "Skipped", body = CommandResponse)
    )
)]
#[post("/chats/{chat_id}/skip")]
/// End the current item and move to the next one.
pub async fn skip(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let chat_id = ChatId(path.into_inner());
    reply_response(chat_id, state.commands.skip(chat_id).await)
}

#[utoipa::path(
    post,
    path = "/chats/{chat_id}/stop",
    params(("chat_id" = i64, Path, description = "Chat identifier")),
    responses(
        (status = 200, description = "Stopped", body = CommandResponse)
    )
)]
#[post("/chats/{chat_id}/stop")]
/// Clear the queue and leave the session.
pub async fn stop(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let chat_id = ChatId(path.into_inner());
    reply_response(chat_id, state.commands.stop(chat_id).await)
}

#[utoipa::path(
    post,
    path = "/chats/{chat_id}/pause",
    params(("chat_id" = i64, Path, description = "Chat identifier")),
    responses(
        (status = 501, description = "Not implemented", body = CommandResponse)
    )
)]
#[post("/chats/{chat_id}/pause")]
pub async fn pause(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let chat_id = ChatId(path.into_inner());
    reply_response(chat_id, state.commands.pause(chat_id))
}

#[utoipa::path(
    post,
    path = "/chats/{chat_id}/resume",
    params(("chat_id" = i64, Path, description = "Chat identifier")),
    responses(
        (status = 501, description = "Not implemented", body = CommandResponse)
    )
)]
#[post("/chats/{chat_id}/resume")]
pub async fn resume(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let chat_id = ChatId(path.into_inner());
    reply_response(chat_id, state.commands.resume(chat_id))
}
