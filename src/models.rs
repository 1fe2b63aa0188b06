use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity ---

/// Role
///
/// The RBAC field carried by every principal. Serialized lowercase (`"student"`,
/// `"instructor"`, `"admin"`) both on the wire and in the `users.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }

    /// Whether a user with this role may author courses.
    pub fn can_author(&self) -> bool {
        matches!(self, Role::Instructor | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// User
///
/// The local profile mirrored from the identity provider. Credentials never live here:
/// the provider owns the password hash, this record owns the role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub username: Option<String>,
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Content Tree ---

/// LessonKind
///
/// Selects which body field of a `Lesson` is active: `content` for text,
/// `video_url` for video, `questions` for quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum LessonKind {
    Video,
    #[default]
    Text,
    Quiz,
}

/// Question
///
/// One multiple-choice item of a quiz lesson. `correct_answer_index` always indexes an
/// existing option; this is checked when the lesson is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Question {
    pub question_text: String,
    pub code_snippet: Option<String>,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Lesson {
    pub id: Uuid,
    pub title: String,
    // 'type' is a reserved keyword in Rust; the wire name stays "type".
    #[serde(rename = "type", default)]
    pub kind: LessonKind,
    pub content: Option<String>,
    pub video_url: Option<String>,
    /// Length in minutes.
    pub duration: Option<u32>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub free_preview: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Topic {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// Course
///
/// The aggregate root and the transactional boundary: topics and lessons are only ever
/// persisted as part of their owning course document. `version` is bumped by the store on
/// every successful write and used for compare-and-swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    // Set once at creation to the creating principal.
    pub instructor_id: Uuid,
    pub price: f64,
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    #[schema(value_type = Vec<Uuid>)]
    pub students_enrolled: BTreeSet<Uuid>,
    #[serde(default)]
    pub version: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn is_enrolled(&self, user_id: Uuid) -> bool {
        self.students_enrolled.contains(&user_id)
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.instructor_id == user_id
    }

    pub fn lesson_count(&self) -> usize {
        self.topics.iter().map(|t| t.lessons.len()).sum()
    }
}

pub const DEFAULT_CATEGORY: &str = "General";

// --- Request Payloads (Input Schemas) ---

/// CreateCourseRequest
///
/// Input payload for POST /courses. The instructor is always the caller; an
/// `instructor_id` key in the body is not part of this schema and is dropped.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub thumbnail_url: Option<String>,
}

/// UpdateCourseRequest
///
/// Whitelisted partial update for PUT /courses/{id}. Only these scalar fields can change;
/// `topics`, `students_enrolled` and `instructor_id` are unreachable through this payload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCourseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTopicRequest {
    pub title: String,
    pub description: Option<String>,
}

/// QuestionInput
///
/// A question as submitted by an author. The answer index is signed on the wire so a
/// negative value surfaces as a validation error instead of a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct QuestionInput {
    pub question_text: String,
    pub code_snippet: Option<String>,
    pub options: Vec<String>,
    pub correct_answer_index: i64,
}

/// CreateLessonRequest
///
/// Input payload for POST /courses/{id}/topics/{topic_id}/lessons.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateLessonRequest {
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: LessonKind,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<u32>,
    #[serde(default)]
    pub questions: Vec<QuestionInput>,
    #[serde(default)]
    pub free_preview: bool,
}

/// QuizSubmission
///
/// Answers keyed by question index (position in the lesson), valued by option index.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct QuizSubmission {
    #[serde(default)]
    pub answers: BTreeMap<i64, i64>,
}

/// RegisterUserRequest
///
/// Input payload for POST /register. The password is forwarded to the identity provider
/// and never persisted or logged by this service.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub username: Option<String>,
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

// --- Output Schemas ---

/// InstructorSummary
///
/// The public face of a course author: enough to print "by Jane Doe" in a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct InstructorSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for InstructorSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// CourseSummary
///
/// Listing entry for GET /courses. Carries metadata and counts only, never lesson bodies.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub thumbnail_url: Option<String>,
    pub instructor: Option<InstructorSummary>,
    pub topic_count: usize,
    pub lesson_count: usize,
    pub enrolled_count: usize,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// LessonAccess
///
/// A lesson's state from one viewer's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum LessonAccess {
    Visible,
    Locked,
    Hidden,
}

/// QuestionView
///
/// A question as shown to a viewer. The answer key is only present for staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct QuestionView {
    pub question_text: String,
    pub code_snippet: Option<String>,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer_index: Option<usize>,
}

/// LessonView
///
/// A lesson after the enrollment gate. Body fields are `None` unless `access` is `Visible`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LessonView {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: LessonKind,
    pub duration: Option<u32>,
    pub free_preview: bool,
    pub hidden: bool,
    pub access: LessonAccess,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub questions: Option<Vec<QuestionView>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TopicView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub lessons: Vec<LessonView>,
}

/// CourseView
///
/// The only shape in which a course document leaves the service. Built exclusively by
/// `gate::filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CourseView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub thumbnail_url: Option<String>,
    pub instructor: Option<InstructorSummary>,
    pub topics: Vec<TopicView>,
    pub enrolled_count: usize,
    pub is_enrolled: bool,
    pub can_edit: bool,
    pub version: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// EnrollmentResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct EnrollmentResponse {
    pub course_id: Uuid,
    pub enrolled_count: usize,
    pub message: String,
}

/// UserProfile
///
/// Output schema for GET /me and the admin user listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub username: Option<String>,
    pub role: Role,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            username: user.username,
            role: user.role,
        }
    }
}
