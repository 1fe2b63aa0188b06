use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    engine::non_blank,
    error::{AppError, ConflictKind, Resource},
    gate,
    models::{
        Course, CourseSummary, CourseView, CreateCourseRequest, CreateLessonRequest,
        CreateTopicRequest, EnrollmentResponse, Lesson, LessonAccess, LessonKind, LessonView,
        QuizSubmission, RegisterUserRequest, Role, UpdateCourseRequest, UpdateRoleRequest, User,
        UserProfile,
    },
    policy::{self, Action},
    quiz::{self, QuizResult},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

// --- Filter Structs ---

/// CourseFilter
///
/// Accepted query parameters for GET /courses.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CourseFilter {
    /// Exact category match, case-insensitive.
    pub category: Option<String>,
    /// Substring match on title or description, case-insensitive.
    pub search: Option<String>,
    /// Only courses authored by this instructor.
    pub instructor_id: Option<Uuid>,
}

impl CourseFilter {
    fn matches(&self, course: &Course) -> bool {
        let category_ok = self
            .category
            .as_deref()
            .is_none_or(|c| course.category.eq_ignore_ascii_case(c.trim()));
        let search_ok = self.search.as_deref().is_none_or(|s| {
            let needle = s.trim().to_lowercase();
            course.title.to_lowercase().contains(&needle)
                || course.description.to_lowercase().contains(&needle)
        });
        let instructor_ok = self.instructor_id.is_none_or(|id| course.instructor_id == id);
        category_ok && search_ok && instructor_ok
    }
}

// --- Helpers ---

async fn load_course(state: &AppState, id: Uuid) -> Result<Course, AppError> {
    state
        .repo
        .load_course(id)
        .await?
        .ok_or(AppError::NotFound(Resource::Course))
}

/// Gated view of a course, with the author's public profile attached.
async fn render(
    state: &AppState,
    course: &Course,
    viewer: Option<&AuthUser>,
) -> Result<CourseView, AppError> {
    let instructor = state.repo.get_user(course.instructor_id).await?;
    Ok(gate::filter(course, instructor.as_ref(), viewer))
}

/// Summaries for a batch of courses, looking each instructor up once.
async fn summarize_all(state: &AppState, courses: &[Course]) -> Result<Vec<CourseSummary>, AppError> {
    let mut instructors: HashMap<Uuid, Option<User>> = HashMap::new();
    let mut out = Vec::with_capacity(courses.len());
    for course in courses {
        if !instructors.contains_key(&course.instructor_id) {
            let user = state.repo.get_user(course.instructor_id).await?;
            instructors.insert(course.instructor_id, user);
        }
        let instructor = instructors.get(&course.instructor_id).and_then(Option::as_ref);
        out.push(gate::summarize(course, instructor));
    }
    Ok(out)
}

const MIN_PASSWORD_LEN: usize = 8;

// --- Public Handlers ---

/// list_courses
///
/// [Public Route] Lists course metadata with the instructor's name and email.
/// Lesson bodies never appear in listings.
#[utoipa::path(
    get,
    path = "/courses",
    params(CourseFilter),
    responses((status = 200, description = "Course listing", body = [CourseSummary]))
)]
pub async fn list_courses(
    State(state): State<AppState>,
    Query(filter): Query<CourseFilter>,
) -> Result<Json<Vec<CourseSummary>>, AppError> {
    policy::authorize(None, Action::ListCourses, None)?;
    let courses: Vec<Course> = state
        .repo
        .list_courses()
        .await?
        .into_iter()
        .filter(|c| filter.matches(c))
        .collect();
    Ok(Json(summarize_all(&state, &courses).await?))
}

/// get_course
///
/// [Public Route] Retrieves one course through the enrollment gate. Anonymous callers and
/// non-members get the curriculum outline with locked lessons; enrolled students get lesson
/// bodies; the owner and admins get everything including hidden drafts and answer keys.
#[utoipa::path(
    get,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Found", body = CourseView),
        (status = 404, description = "Course not found")
    )
)]
pub async fn get_course(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseView>, AppError> {
    let course = load_course(&state, id).await?;
    policy::authorize(viewer.as_ref(), Action::ReadCourse, Some(&course))?;
    Ok(Json(render(&state, &course, viewer.as_ref()).await?))
}

/// get_lesson
///
/// [Public Route] Retrieves a single lesson if the viewer may see its body.
#[utoipa::path(
    get,
    path = "/courses/{id}/topics/{topic_id}/lessons/{lesson_id}",
    params(
        ("id" = Uuid, Path, description = "Course ID"),
        ("topic_id" = Uuid, Path, description = "Topic ID"),
        ("lesson_id" = Uuid, Path, description = "Lesson ID")
    ),
    responses(
        (status = 200, description = "Lesson", body = LessonView),
        (status = 403, description = "Locked: enroll first"),
        (status = 404, description = "Lesson not found or hidden"),
        (status = 404, description = "Course, topic or lesson not found")
    )
)]
pub async fn get_lesson(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path((id, topic_id, lesson_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<LessonView>, AppError> {
    let course = load_course(&state, id).await?;
    Ok(Json(gate::lesson_view(
        &course,
        topic_id,
        lesson_id,
        viewer.as_ref(),
    )?))
}

/// register_user
///
/// [Public Route] Creates an account. The credential goes to the identity provider, which
/// returns the canonical user id; the profile is then mirrored into the local user store.
/// Self-registration may pick `student` or `instructor`, never `admin`.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered", body = UserProfile),
        (status = 409, description = "Email or username taken"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    // 1. Payload Validation
    let name = non_blank("name", &payload.name)?;
    let email = non_blank("email", &payload.email)?.to_lowercase();
    if !email.contains('@') {
        return Err(AppError::validation("email", "must be an email address"));
    }
    let username = payload
        .username
        .as_deref()
        .map(|u| non_blank("username", u))
        .transpose()?;
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    let role = payload.role.unwrap_or_default();
    if role == Role::Admin {
        return Err(AppError::validation(
            "role",
            "admin accounts can only be granted by an administrator",
        ));
    }

    // 2. Uniqueness Check (before the provider, so a duplicate never leaves a remote account)
    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(ConflictKind::EmailTaken));
    }
    if let Some(username) = &username {
        if state.repo.find_user_by_username(username).await?.is_some() {
            return Err(AppError::Conflict(ConflictKind::UsernameTaken));
        }
    }

    // 3. Identity Provider Sign-Up
    let id = state.identity.sign_up(&email, &payload.password).await?;

    // 4. Local Profile Mirror

    let user = state
        .repo
        .create_user(User {
            id,
            name,
            email,
            username,
            role,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

// --- Authenticated Handlers ---

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let user = state
        .repo
        .get_user(auth.id)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    Ok(Json(user.into()))
}

/// get_my_courses
///
/// [Authenticated Route] Courses the caller authors, including their drafts.
#[utoipa::path(
    get,
    path = "/me/courses",
    responses((status = 200, description = "Authored courses", body = [CourseSummary]))
)]
pub async fn get_my_courses(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CourseSummary>>, AppError> {
    let courses = state.repo.courses_by_instructor(id).await?;
    Ok(Json(summarize_all(&state, &courses).await?))
}

/// get_my_enrollments
///
/// [Authenticated Route] Courses the caller is enrolled in.
#[utoipa::path(
    get,
    path = "/me/enrollments",
    responses((status = 200, description = "Enrolled courses", body = [CourseSummary]))
)]
pub async fn get_my_enrollments(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CourseSummary>>, AppError> {
    let courses = state.repo.courses_enrolled(id).await?;
    Ok(Json(summarize_all(&state, &courses).await?))
}

/// create_course
///
/// [Authenticated Route] Instructors and admins only. The caller becomes the instructor.
#[utoipa::path(
    post,
    path = "/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Created", body = CourseView),
        (status = 403, description = "Wrong role")
    )
)]
pub async fn create_course(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<CourseView>), AppError> {
    let course = state.engine.create_course(&auth, &payload).await?;
    let view = render(&state, &course, Some(&auth)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// update_course
///
/// [Authenticated Route] Owner or admin. Only title, description, category, price and
/// thumbnail can change; any other key in the body is ignored.
#[utoipa::path(
    put,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course ID")),
    request_body = UpdateCourseRequest,
    responses(
        (status = 200, description = "Updated", body = CourseView),
        (status = 403, description = "Not owner"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_course(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateCourseRequest>,
) -> Result<Json<CourseView>, AppError> {
    let course = state.engine.update_course(&auth, id, &patch).await?;
    Ok(Json(render(&state, &course, Some(&auth)).await?))
}

/// delete_course
///
/// [Authenticated Route] Owner or admin. Removes the course with all topics and lessons.
#[utoipa::path(
    delete,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not owner"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_course(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.engine.delete_course(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// add_topic
///
/// [Authenticated Route] Owner or admin. Appends a topic to the curriculum.
#[utoipa::path(
    post,
    path = "/courses/{id}/topics",
    params(("id" = Uuid, Path, description = "Course ID")),
    request_body = CreateTopicRequest,
    responses((status = 201, description = "Topic added", body = CourseView))
)]
pub async fn add_topic(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateTopicRequest>,
) -> Result<(StatusCode, Json<CourseView>), AppError> {
    let (course, _topic_id) = state.engine.add_topic(&auth, id, &payload).await?;
    let view = render(&state, &course, Some(&auth)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// delete_topic
///
/// [Authenticated Route] Owner or admin. Removes the topic and its lessons.
#[utoipa::path(
    delete,
    path = "/courses/{id}/topics/{topic_id}",
    params(
        ("id" = Uuid, Path, description = "Course ID"),
        ("topic_id" = Uuid, Path, description = "Topic ID")
    ),
    responses((status = 200, description = "Topic removed", body = CourseView))
)]
pub async fn delete_topic(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, topic_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CourseView>, AppError> {
    let course = state.engine.delete_topic(&auth, id, topic_id).await?;
    Ok(Json(render(&state, &course, Some(&auth)).await?))
}

/// add_lesson
///
/// [Authenticated Route] Owner or admin. Quiz questions are validated before anything is
/// written; the stored lesson (with its new id) is returned.
#[utoipa::path(
    post,
    path = "/courses/{id}/topics/{topic_id}/lessons",
    params(
        ("id" = Uuid, Path, description = "Course ID"),
        ("topic_id" = Uuid, Path, description = "Topic ID")
    ),
    request_body = CreateLessonRequest,
    responses(
        (status = 201, description = "Lesson added", body = Lesson),
        (status = 422, description = "Invalid question")
    )
)]
pub async fn add_lesson(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, topic_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<(StatusCode, Json<Lesson>), AppError> {
    let (_, lesson) = state
        .engine
        .add_lesson(&auth, id, topic_id, &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

/// delete_lesson
///
/// [Authenticated Route] Owner or admin.
#[utoipa::path(
    delete,
    path = "/courses/{id}/topics/{topic_id}/lessons/{lesson_id}",
    params(
        ("id" = Uuid, Path, description = "Course ID"),
        ("topic_id" = Uuid, Path, description = "Topic ID"),
        ("lesson_id" = Uuid, Path, description = "Lesson ID")
    ),
    responses((status = 200, description = "Lesson removed", body = CourseView))
)]
pub async fn delete_lesson(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, topic_id, lesson_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<CourseView>, AppError> {
    let course = state
        .engine
        .delete_lesson(&auth, id, topic_id, lesson_id)
        .await?;
    Ok(Json(render(&state, &course, Some(&auth)).await?))
}

/// toggle_lesson_hidden
///
/// [Authenticated Route] Owner or admin. Flips the lesson's `hidden` flag.
#[utoipa::path(
    patch,
    path = "/courses/{id}/topics/{topic_id}/lessons/{lesson_id}/hidden",
    params(
        ("id" = Uuid, Path, description = "Course ID"),
        ("topic_id" = Uuid, Path, description = "Topic ID"),
        ("lesson_id" = Uuid, Path, description = "Lesson ID")
    ),
    responses((status = 200, description = "Toggled", body = Lesson))
)]
pub async fn toggle_lesson_hidden(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, topic_id, lesson_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<Lesson>, AppError> {
    let (_, lesson) = state
        .engine
        .toggle_lesson_hidden(&auth, id, topic_id, lesson_id)
        .await?;
    Ok(Json(lesson))
}

/// enroll
///
/// [Authenticated Route] Adds the caller to the course. A repeat call answers 409 with
/// code `already_enrolled` and changes nothing.
#[utoipa::path(
    post,
    path = "/courses/{id}/enroll",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Enrolled", body = EnrollmentResponse),
        (status = 409, description = "Already enrolled")
    )
)]
pub async fn enroll(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EnrollmentResponse>, AppError> {
    let course = state.engine.enroll(&auth, id).await?;
    Ok(Json(EnrollmentResponse {
        course_id: course.id,
        enrolled_count: course.students_enrolled.len(),
        message: "Enrolled successfully".to_string(),
    }))
}

/// submit_quiz
///
/// [Authenticated Route] Scores answers against a quiz lesson. Nothing is persisted.
#[utoipa::path(
    post,
    path = "/courses/{id}/topics/{topic_id}/lessons/{lesson_id}/quiz",
    params(
        ("id" = Uuid, Path, description = "Course ID"),
        ("topic_id" = Uuid, Path, description = "Topic ID"),
        ("lesson_id" = Uuid, Path, description = "Lesson ID")
    ),
    request_body = QuizSubmission,
    responses(
        (status = 200, description = "Scored", body = QuizResult),
        (status = 403, description = "Not enrolled"),
        (status = 404, description = "Lesson not found or hidden"),
        (status = 422, description = "Lesson is not a quiz")
    )
)]
pub async fn submit_quiz(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, topic_id, lesson_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(submission): Json<QuizSubmission>,
) -> Result<Json<QuizResult>, AppError> {
    // 1. Resolve the Lesson (hidden reads as missing to non-staff, ahead of enrollment)
    let course = load_course(&state, id).await?;
    let lesson = course.find_lesson(topic_id, lesson_id)?;
    if gate::lesson_access(&course, lesson, Some(&auth)) == LessonAccess::Hidden {
        return Err(AppError::NotFound(Resource::Lesson));
    }
    // 2. Submission Rights and Lesson Type
    policy::authorize(Some(&auth), Action::SubmitQuiz, Some(&course))?;
    if lesson.kind != LessonKind::Quiz {
        return Err(AppError::validation("lesson", "lesson is not a quiz"));
    }

    // 3. Server-Side Scoring
    let result = quiz::grade(&lesson.questions, &submission.answers);
    tracing::debug!(
        course_id = %id,
        lesson_id = %lesson_id,
        user_id = %auth.id,
        correct = result.correct_count,
        total = result.total,
        "quiz scored"
    );
    Ok(Json(result))
}

// --- Admin Handlers ---

/// list_users
///
/// [Admin Route] Every registered user.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "All users", body = [UserProfile]))
)]
pub async fn list_users(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserProfile>>, AppError> {
    policy::authorize(Some(&auth), Action::ManageUsers, None)?;
    let users = state.repo.list_users().await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

/// update_user_role
///
/// [Admin Route] Changes a user's role. A user who still instructs courses cannot be
/// demoted to `student`, since every course must keep an instructor-capable author.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 404, description = "User not found"),
        (status = 422, description = "User still instructs courses")
    )
)]
pub async fn update_user_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<UserProfile>, AppError> {
    policy::authorize(Some(&auth), Action::ManageUsers, None)?;

    // The store checks for authored courses and writes the role in one step.
    let user = state
        .repo
        .set_user_role(id, payload.role)
        .await?
        .ok_or(AppError::NotFound(Resource::User))?;
    tracing::info!(user_id = %id, role = %user.role, admin = %auth.id, "role changed");
    Ok(Json(user.into()))
}
