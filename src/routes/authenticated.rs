use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

/// Authenticated Router Module
///
/// Every route here requires a resolved `AuthUser`. Role and ownership checks are made
/// by the mutation engine through `policy::authorize` against the freshly loaded course.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        .route("/me", get(handlers::get_me))
        // GET /me/courses
        // Courses the caller authors.
        .route("/me/courses", get(handlers::get_my_courses))
        // GET /me/enrollments
        .route("/me/enrollments", get(handlers::get_my_enrollments))
        // --- Course Authoring ---
        // POST /courses
        // Instructors and admins only.
        .route("/courses", post(handlers::create_course))
        // PUT/DELETE /courses/{id}
        // Owner or admin. PUT only touches the whitelisted scalar fields.
        .route(
            "/courses/{id}",
            put(handlers::update_course).delete(handlers::delete_course),
        )
        // POST /courses/{id}/topics
        .route("/courses/{id}/topics", post(handlers::add_topic))
        // DELETE /courses/{id}/topics/{topic_id}
        .route(
            "/courses/{id}/topics/{topic_id}",
            delete(handlers::delete_topic),
        )
        // POST /courses/{id}/topics/{topic_id}/lessons
        .route(
            "/courses/{id}/topics/{topic_id}/lessons",
            post(handlers::add_lesson),
        )
        // DELETE /courses/{id}/topics/{topic_id}/lessons/{lesson_id}
        // Shares its path with the public GET; axum merges the method routers.
        .route(
            "/courses/{id}/topics/{topic_id}/lessons/{lesson_id}",
            delete(handlers::delete_lesson),
        )
        // PATCH /courses/{id}/topics/{topic_id}/lessons/{lesson_id}/hidden
        .route(
            "/courses/{id}/topics/{topic_id}/lessons/{lesson_id}/hidden",
            patch(handlers::toggle_lesson_hidden),
        )
        // --- Learning ---
        // POST /courses/{id}/enroll
        // A second call answers 409 `already_enrolled`.
        .route("/courses/{id}/enroll", post(handlers::enroll))
        // POST /courses/{id}/topics/{topic_id}/lessons/{lesson_id}/quiz
        // Scores an answer sheet. Enrolled students and staff only.
        .route(
            "/courses/{id}/topics/{topic_id}/lessons/{lesson_id}/quiz",
            post(handlers::submit_quiz),
        )
}
