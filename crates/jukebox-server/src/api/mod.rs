//! HTTP API handlers.
//!
//! Defines the Actix routes for chat commands, queue inspection, and health.

pub mod commands;
pub mod queue;
pub mod system;

pub use commands::{pause, play, resume, skip, stop};
pub use queue::{chat_status, queue_list};
pub use system::{greeting, health, HealthResponse};

pub use commands::{__path_pause, __path_play, __path_resume, __path_skip, __path_stop};
pub use queue::{__path_chat_status, __path_queue_list};
pub use system::{__path_greeting, __path_health};

/// Register every API route on an app or scope.
pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(health)
        .service(greeting)
        .service(play)
        .service(skip)
        .service(stop)
        .service(pause)
        .service(resume)
        .service(queue_list)
        .service(chat_status);
}
