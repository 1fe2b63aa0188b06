use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use course_portal::{
    AppState, InMemoryRepository, LocalIdentityProvider,
    auth::{AuthUser, MaybeAuthUser},
    config::AppConfig,
    error::{AppError, ConflictKind, ForbiddenReason, Resource},
    handlers::{self, CourseFilter},
    models::{
        CourseView, CreateCourseRequest, CreateLessonRequest, CreateTopicRequest, LessonKind,
        QuestionInput, QuizSubmission, RegisterUserRequest, Role, UpdateRoleRequest, User,
    },
};
use std::{collections::BTreeMap, sync::Arc};
use uuid::Uuid;

// --- TEST UTILITIES ---

const INSTRUCTOR_ID: Uuid = Uuid::from_u128(1);
const STUDENT_ID: Uuid = Uuid::from_u128(2);
const ADMIN_ID: Uuid = Uuid::from_u128(3);

fn seeded_users() -> Vec<User> {
    vec![
        User {
            id: INSTRUCTOR_ID,
            name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            role: Role::Instructor,
            ..User::default()
        },
        User {
            id: STUDENT_ID,
            name: "Sam Student".to_string(),
            email: "sam@example.com".to_string(),
            username: Some("sam".to_string()),
            role: Role::Student,
            ..User::default()
        },
        User {
            id: ADMIN_ID,
            name: "Ada Admin".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::Admin,
            ..User::default()
        },
    ]
}

fn create_test_state() -> AppState {
    AppState::new(
        Arc::new(InMemoryRepository::with_users(seeded_users())),
        Arc::new(LocalIdentityProvider::new()),
        AppConfig::default(),
    )
}

fn instructor() -> AuthUser {
    AuthUser {
        id: INSTRUCTOR_ID,
        role: Role::Instructor,
    }
}

fn student() -> AuthUser {
    AuthUser {
        id: STUDENT_ID,
        role: Role::Student,
    }
}

fn admin() -> AuthUser {
    AuthUser {
        id: ADMIN_ID,
        role: Role::Admin,
    }
}

struct Seeded {
    course_id: Uuid,
    topic_id: Uuid,
    text_lesson: Uuid,
    quiz_lesson: Uuid,
}

/// A course with one topic holding a text lesson and a two-question quiz.
async fn seed_course(state: &AppState, title: &str, category: &str) -> Seeded {
    let course = state
        .engine
        .create_course(
            &instructor(),
            &CreateCourseRequest {
                title: title.to_string(),
                description: format!("All about {title}"),
                category: Some(category.to_string()),
                ..CreateCourseRequest::default()
            },
        )
        .await
        .unwrap();
    let (_, topic_id) = state
        .engine
        .add_topic(
            &instructor(),
            course.id,
            &CreateTopicRequest {
                title: "Basics".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    let (_, text) = state
        .engine
        .add_lesson(
            &instructor(),
            course.id,
            topic_id,
            &CreateLessonRequest {
                title: "Reading".to_string(),
                content: Some("secret body".to_string()),
                ..CreateLessonRequest::default()
            },
        )
        .await
        .unwrap();
    let question = |options: &[&str], correct: i64| QuestionInput {
        question_text: "Which?".to_string(),
        code_snippet: None,
        options: options.iter().map(|o| o.to_string()).collect(),
        correct_answer_index: correct,
    };
    let (_, quiz) = state
        .engine
        .add_lesson(
            &instructor(),
            course.id,
            topic_id,
            &CreateLessonRequest {
                title: "Check".to_string(),
                kind: LessonKind::Quiz,
                questions: vec![question(&["a", "b", "c"], 1), question(&["a", "b", "c", "d"], 3)],
                ..CreateLessonRequest::default()
            },
        )
        .await
        .unwrap();

    Seeded {
        course_id: course.id,
        topic_id,
        text_lesson: text.id,
        quiz_lesson: quiz.id,
    }
}

fn register_request(email: &str, role: Option<Role>) -> RegisterUserRequest {
    RegisterUserRequest {
        name: "New Person".to_string(),
        email: email.to_string(),
        username: None,
        password: "long enough password".to_string(),
        role,
    }
}

fn answers(pairs: &[(i64, i64)]) -> QuizSubmission {
    QuizSubmission {
        answers: pairs.iter().copied().collect::<BTreeMap<_, _>>(),
    }
}

// --- COURSE READ TESTS ---

#[tokio::test]
async fn test_list_courses_filters_by_category_and_search() {
    let state = create_test_state();
    seed_course(&state, "Rust", "Programming").await;
    seed_course(&state, "Watercolour", "Art").await;

    let Json(all) = handlers::list_courses(State(state.clone()), Query(CourseFilter::default()))
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|c| c.lesson_count == 2));
    assert_eq!(all[0].instructor.as_ref().unwrap().name, "Jane Doe");

    let Json(art) = handlers::list_courses(
        State(state.clone()),
        Query(CourseFilter {
            category: Some("art".to_string()),
            ..CourseFilter::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(art.len(), 1);
    assert_eq!(art[0].title, "Watercolour");

    let Json(found) = handlers::list_courses(
        State(state),
        Query(CourseFilter {
            search: Some("RUST".to_string()),
            ..CourseFilter::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_get_course_gates_content_by_enrollment() {
    let state = create_test_state();
    let seeded = seed_course(&state, "Rust", "Programming").await;

    let Json(anon) = handlers::get_course(
        MaybeAuthUser(None),
        State(state.clone()),
        Path(seeded.course_id),
    )
    .await
    .unwrap();
    let text = &anon.topics[0].lessons[0];
    assert!(text.content.is_none());
    assert!(!anon.is_enrolled);

    let Json(enrollment) =
        handlers::enroll(student(), State(state.clone()), Path(seeded.course_id))
            .await
            .unwrap();
    assert_eq!(enrollment.enrolled_count, 1);

    let Json(member) = handlers::get_course(
        MaybeAuthUser(Some(student())),
        State(state),
        Path(seeded.course_id),
    )
    .await
    .unwrap();
    assert!(member.is_enrolled);
    assert_eq!(member.enrolled_count, 1);
    assert_eq!(
        member.topics[0].lessons[0].content.as_deref(),
        Some("secret body")
    );
}

#[tokio::test]
async fn test_get_course_not_found() {
    let state = create_test_state();
    let err = handlers::get_course(MaybeAuthUser(None), State(state), Path(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_lesson_locked_for_visitor() {
    let state = create_test_state();
    let seeded = seed_course(&state, "Rust", "Programming").await;

    let err = handlers::get_lesson(
        MaybeAuthUser(Some(student())),
        State(state),
        Path((seeded.course_id, seeded.topic_id, seeded.text_lesson)),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::Forbidden(ForbiddenReason::NotEnrolled)
    ));
}

// --- ENROLLMENT & QUIZ TESTS ---

#[tokio::test]
async fn test_enroll_twice_returns_conflict_response() {
    let state = create_test_state();
    let seeded = seed_course(&state, "Rust", "Programming").await;

    let Json(first) = handlers::enroll(student(), State(state.clone()), Path(seeded.course_id))
        .await
        .unwrap();
    assert_eq!(first.enrolled_count, 1);

    let err = handlers::enroll(student(), State(state), Path(seeded.course_id))
        .await
        .unwrap_err();
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "already_enrolled");
}

#[tokio::test]
async fn test_submit_quiz_requires_enrollment() {
    let state = create_test_state();
    let seeded = seed_course(&state, "Rust", "Programming").await;

    let err = handlers::submit_quiz(
        student(),
        State(state),
        Path((seeded.course_id, seeded.topic_id, seeded.quiz_lesson)),
        Json(answers(&[(0, 1)])),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::Forbidden(ForbiddenReason::NotEnrolled)
    ));
}

#[tokio::test]
async fn test_submit_quiz_scores_enrolled_student() {
    let state = create_test_state();
    let seeded = seed_course(&state, "Rust", "Programming").await;
    let Json(enrollment) =
        handlers::enroll(student(), State(state.clone()), Path(seeded.course_id))
            .await
            .unwrap();
    assert_eq!(enrollment.enrolled_count, 1);

    let Json(result) = handlers::submit_quiz(
        student(),
        State(state),
        Path((seeded.course_id, seeded.topic_id, seeded.quiz_lesson)),
        Json(answers(&[(0, 1), (1, 2)])),
    )
    .await
    .unwrap();

    assert_eq!(result.correct_count, 1);
    assert_eq!(result.total, 2);
    assert_eq!(result.percentage, 50);
}

#[tokio::test]
async fn test_submit_quiz_on_text_lesson_is_validation_error() {
    let state = create_test_state();
    let seeded = seed_course(&state, "Rust", "Programming").await;

    let err = handlers::submit_quiz(
        instructor(),
        State(state),
        Path((seeded.course_id, seeded.topic_id, seeded.text_lesson)),
        Json(answers(&[])),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_submit_quiz_on_hidden_lesson_reads_as_missing() {
    let state = create_test_state();
    let seeded = seed_course(&state, "Rust", "Programming").await;
    let Json(enrollment) =
        handlers::enroll(student(), State(state.clone()), Path(seeded.course_id))
            .await
            .unwrap();
    assert_eq!(enrollment.enrolled_count, 1);
    let Json(hidden) = handlers::toggle_lesson_hidden(
        instructor(),
        State(state.clone()),
        Path((seeded.course_id, seeded.topic_id, seeded.quiz_lesson)),
    )
    .await
    .unwrap();
    assert!(hidden.hidden);

    let err = handlers::submit_quiz(
        student(),
        State(state.clone()),
        Path((seeded.course_id, seeded.topic_id, seeded.quiz_lesson)),
        Json(answers(&[(0, 1)])),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(Resource::Lesson)));

    // A non-member gets the same answer as for an id that never existed.
    let outsider = AuthUser {
        id: Uuid::from_u128(99),
        role: Role::Student,
    };
    let hidden_err = handlers::submit_quiz(
        outsider,
        State(state.clone()),
        Path((seeded.course_id, seeded.topic_id, seeded.quiz_lesson)),
        Json(answers(&[(0, 1)])),
    )
    .await
    .unwrap_err();
    let missing_err = handlers::submit_quiz(
        outsider,
        State(state),
        Path((seeded.course_id, seeded.topic_id, Uuid::from_u128(404))),
        Json(answers(&[(0, 1)])),
    )
    .await
    .unwrap_err();
    assert_eq!(hidden_err.code(), missing_err.code());
    assert_eq!(hidden_err.status(), StatusCode::NOT_FOUND);
}

// --- AUTHORING TESTS ---

#[tokio::test]
async fn test_create_course_returns_created_with_full_view() {
    let state = create_test_state();
    let (status, Json(view)): (StatusCode, Json<CourseView>) = handlers::create_course(
        instructor(),
        State(state),
        Json(CreateCourseRequest {
            title: "Rust".to_string(),
            description: "Systems".to_string(),
            ..CreateCourseRequest::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert!(view.can_edit);
    assert_eq!(view.category, "General");
    assert_eq!(view.version, 1);
}

#[tokio::test]
async fn test_delete_course_by_student_is_forbidden() {
    let state = create_test_state();
    let seeded = seed_course(&state, "Rust", "Programming").await;

    let err = handlers::delete_course(student(), State(state.clone()), Path(seeded.course_id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    let status = handlers::delete_course(admin(), State(state), Path(seeded.course_id))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_my_courses_and_enrollments() {
    let state = create_test_state();
    let seeded = seed_course(&state, "Rust", "Programming").await;
    seed_course(&state, "Go", "Programming").await;
    let Json(enrollment) =
        handlers::enroll(student(), State(state.clone()), Path(seeded.course_id))
            .await
            .unwrap();
    assert_eq!(enrollment.enrolled_count, 1);

    let Json(authored) = handlers::get_my_courses(instructor(), State(state.clone()))
        .await
        .unwrap();
    assert_eq!(authored.len(), 2);

    let Json(enrolled) = handlers::get_my_enrollments(student(), State(state))
        .await
        .unwrap();
    assert_eq!(enrolled.len(), 1);
    assert_eq!(enrolled[0].id, seeded.course_id);
}

// --- REGISTRATION TESTS ---

#[tokio::test]
async fn test_register_user_success() {
    let state = create_test_state();
    let (status, Json(profile)) = handlers::register_user(
        State(state.clone()),
        Json(register_request("New@Example.com", Some(Role::Instructor))),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(profile.email, "new@example.com");
    assert_eq!(profile.role, Role::Instructor);

    let Json(me) = handlers::get_me(
        AuthUser {
            id: profile.id,
            role: profile.role,
        },
        State(state),
    )
    .await
    .unwrap();
    assert_eq!(me.name, "New Person");
}

#[tokio::test]
async fn test_register_defaults_to_student() {
    let state = create_test_state();
    let (_, Json(profile)) =
        handlers::register_user(State(state), Json(register_request("x@example.com", None)))
            .await
            .unwrap();
    assert_eq!(profile.role, Role::Student);
}

#[tokio::test]
async fn test_register_admin_is_rejected() {
    let state = create_test_state();
    let err = handlers::register_user(
        State(state),
        Json(register_request("boss@example.com", Some(Role::Admin))),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "role"));
}

#[tokio::test]
async fn test_register_duplicates_conflict() {
    let state = create_test_state();
    let err = handlers::register_user(
        State(state.clone()),
        Json(register_request("SAM@example.com", None)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::EmailTaken)));

    let mut req = register_request("fresh@example.com", None);
    req.username = Some("sam".to_string());
    let err = handlers::register_user(State(state), Json(req))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::UsernameTaken)));
}

#[tokio::test]
async fn test_register_short_password_is_rejected() {
    let state = create_test_state();
    let mut req = register_request("short@example.com", None);
    req.password = "short".to_string();

    let err = handlers::register_user(State(state), Json(req))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "password"));
}

#[tokio::test]
async fn test_register_provider_rejection_creates_no_user() {
    let state = AppState::new(
        Arc::new(InMemoryRepository::with_users(seeded_users())),
        Arc::new(LocalIdentityProvider::new_failing()),
        AppConfig::default(),
    );

    let err = handlers::register_user(
        State(state.clone()),
        Json(register_request("nope@example.com", None)),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let Json(users) = handlers::list_users(admin(), State(state)).await.unwrap();
    assert_eq!(users.len(), 3);
}

// --- ADMIN TESTS ---

#[tokio::test]
async fn test_list_users_forbidden_for_instructor() {
    let state = create_test_state();
    let err = handlers::list_users(instructor(), State(state))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(ForbiddenReason::WrongRole)));
}

#[tokio::test]
async fn test_update_role_promotes_student() {
    let state = create_test_state();
    let Json(profile) = handlers::update_user_role(
        admin(),
        State(state),
        Path(STUDENT_ID),
        Json(UpdateRoleRequest {
            role: Role::Instructor,
        }),
    )
    .await
    .unwrap();
    assert_eq!(profile.role, Role::Instructor);
}

#[tokio::test]
async fn test_update_role_refuses_to_demote_active_author() {
    let state = create_test_state();
    seed_course(&state, "Rust", "Programming").await;

    let err = handlers::update_user_role(
        admin(),
        State(state),
        Path(INSTRUCTOR_ID),
        Json(UpdateRoleRequest {
            role: Role::Student,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_update_role_unknown_user() {
    let state = create_test_state();
    let err = handlers::update_user_role(
        admin(),
        State(state),
        Path(Uuid::from_u128(999)),
        Json(UpdateRoleRequest { role: Role::Admin }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}
