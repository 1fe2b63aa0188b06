use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Nested under `/admin` and wrapped by the authentication layer. Each handler authorizes
/// `Action::ManageUsers`, which only the admin role satisfies.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/users
        .route("/users", get(handlers::list_users))
        // PUT /admin/users/{id}/role
        // Refuses to demote a user who still instructs courses.
        .route("/users/{id}/role", put(handlers::update_user_role))
}
