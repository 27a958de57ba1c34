use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health,
        api::greeting,
        api::play,
        api::skip,
        api::stop,
        api::pause,
        api::resume,
        api::queue_list,
        api::chat_status,
    ),
    components(
        schemas(
            jukebox_types::PlayRequest,
            jukebox_types::CommandResponse,
            jukebox_types::QueueEntry,
            jukebox_types::QueueResponse,
            jukebox_types::ChatStatusResponse,
            jukebox_types::PlaybackStateKind,
            api::HealthResponse,
        )
    ),
    tags(
        (name = "jukebox-server", description = "Per-chat jukebox control API")
    )
)]
pub struct ApiDoc;
