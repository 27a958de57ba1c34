use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Chats that have been touched since startup.
    pub chats: usize,
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    let chats = state.commands.coordinator().store().chat_ids().len();
    HttpResponse::Ok().json(HealthResponse { status: "ok", chats })
}

/// Greeting text (the `/start` reply).
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Greeting", body = String, content_type = "text/plain")
    )
)]
#[get("/")]
pub async fn greeting(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(state.commands.greeting().to_string())
}
