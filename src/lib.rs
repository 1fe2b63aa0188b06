use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain core: the content tree, who may touch it, and what each viewer sees.
pub mod content;
pub mod engine;
pub mod gate;
pub mod models;
pub mod policy;
pub mod quiz;

// Service plumbing.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod repository;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use engine::ContentMutationEngine;
pub use error::AppError;
pub use identity::{HttpIdentityProvider, IdentityState, LocalIdentityProvider};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_courses, handlers::get_course, handlers::get_lesson,
        handlers::register_user, handlers::get_me, handlers::get_my_courses,
        handlers::get_my_enrollments, handlers::create_course, handlers::update_course,
        handlers::delete_course, handlers::add_topic, handlers::delete_topic,
        handlers::add_lesson, handlers::delete_lesson, handlers::toggle_lesson_hidden,
        handlers::enroll, handlers::submit_quiz, handlers::list_users,
        handlers::update_user_role
    ),
    components(
        schemas(
            models::Role, models::LessonKind, models::Question, models::Lesson, models::Topic,
            models::Course, models::CreateCourseRequest, models::UpdateCourseRequest,
            models::CreateTopicRequest, models::QuestionInput, models::CreateLessonRequest,
            models::QuizSubmission, models::RegisterUserRequest, models::UpdateRoleRequest,
            models::InstructorSummary, models::CourseSummary, models::LessonAccess,
            models::QuestionView, models::LessonView, models::TopicView, models::CourseView,
            models::EnrollmentResponse, models::UserProfile, quiz::QuizResult,
            quiz::QuestionOutcome,
        )
    ),
    tags(
        (name = "course-portal", description = "Course authoring and learning API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single container of shared services, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// User and course persistence.
    pub repo: RepositoryState,
    /// Credential owner used by registration.
    pub identity: IdentityState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
    /// Read-modify-write cycle for course documents, sharing `repo`.
    pub engine: ContentMutationEngine,
}

impl AppState {
    pub fn new(repo: RepositoryState, identity: IdentityState, config: AppConfig) -> Self {
        let engine = ContentMutationEngine::new(repo.clone(), config.write_retry_limit);
        Self {
            repo,
            identity,
            config,
            engine,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Runs the `AuthUser` extractor before the handler. A failed extraction rejects the
/// request with 401 and the handler never executes.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, applies scoped and global middleware, and registers state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly (authenticated and admin routes sit behind the auth layer)
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer (outermost)
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with the `x-request-id` set by the layer above it.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
