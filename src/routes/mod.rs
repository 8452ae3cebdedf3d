use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, config::CaptureLimits, state::AppState};

pub mod auth;
pub mod files;
pub mod health;
pub mod memos;
pub mod projects;

/// Headroom for multipart framing and text fields on top of file payloads.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());
    let body_limit = request_body_limit(&state.config.limits);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let memo_routes = Router::new()
        .route("/", get(memos::list_memos))
        .route(
            "/:id",
            get(memos::get_memo)
                .patch(memos::update_memo)
                .delete(memos::delete_memo),
        )
        .route("/:id/attachments", post(memos::add_attachments))
        .route("/:id/location", post(memos::add_location));

    let project_routes = Router::new().route(
        "/",
        get(projects::list_projects).post(projects::create_project),
    );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .route("/api/v1/capture", post(memos::capture_memo))
        .nest("/api/v1/memos", memo_routes)
        .nest("/api/v1/projects", project_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    let mut router = Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/health", get(health::health_check));
    if state.local_files.is_some() {
        router = router.route("/files/*key", get(files::serve_file));
    }

    router
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed_origins {
        Some(origins) => {
            let parsed: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(parsed)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

fn request_body_limit(limits: &CaptureLimits) -> usize {
    let media_batch = limits
        .max_attachments_per_request
        .saturating_mul(limits.max_attachment_bytes);
    limits
        .max_audio_bytes
        .max(media_batch)
        .saturating_add(MULTIPART_OVERHEAD)
}
