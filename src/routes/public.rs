use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints available to anonymous callers. Course reads still honour the caller's
/// credentials when present, so an enrolled student sees lesson bodies on the same URL
/// an anonymous visitor sees the locked outline.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Creates the account at the identity provider, then mirrors the profile locally.
        .route("/register", post(handlers::register_user))
        // GET /courses?category=...&search=...
        .route("/courses", get(handlers::list_courses))
        // GET /courses/{id}
        // Filtered through the enrollment gate for the (optional) viewer.
        .route("/courses/{id}", get(handlers::get_course))
        // GET /courses/{id}/topics/{topic_id}/lessons/{lesson_id}
        .route(
            "/courses/{id}/topics/{topic_id}/lessons/{lesson_id}",
            get(handlers::get_lesson),
        )
}
