use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{identity::IdentityError, repository::RepositoryError};

/// Resource
///
/// Names the kind of node a path-addressed lookup failed to find. Carried by
/// `AppError::NotFound` so the caller can render "Topic not found" instead of a bare 404.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Course,
    Topic,
    Lesson,
    User,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Course => "course",
            Resource::Topic => "topic",
            Resource::Lesson => "lesson",
            Resource::User => "user",
        };
        f.write_str(name)
    }
}

/// ForbiddenReason
///
/// The distinct reasons an authenticated principal may be refused. Kept separate so
/// "wrong role" and "not the owner" never collapse into one generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForbiddenReason {
    WrongRole,
    NotOwner,
    NotEnrolled,
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ForbiddenReason::WrongRole => "your role does not permit this action",
            ForbiddenReason::NotOwner => "only the course instructor or an admin may do this",
            ForbiddenReason::NotEnrolled => "enroll in this course to access its lessons",
        };
        f.write_str(text)
    }
}

/// ConflictKind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    AlreadyEnrolled,
    StaleVersion,
    EmailTaken,
    UsernameTaken,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConflictKind::AlreadyEnrolled => "already enrolled",
            ConflictKind::StaleVersion => "the course was modified concurrently, please retry",
            ConflictKind::EmailTaken => "email is already registered",
            ConflictKind::UsernameTaken => "username is already taken",
        };
        f.write_str(text)
    }
}

/// AppError
///
/// The single error type returned by every operation of the core. Each variant maps to
/// one HTTP status and a stable machine-readable `code`, so clients can render a specific
/// message for every failure.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(ForbiddenReason),

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{0}")]
    Conflict(ConflictKind),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::Forbidden(ForbiddenReason::WrongRole) => "wrong_role",
            AppError::Forbidden(ForbiddenReason::NotOwner) => "not_owner",
            AppError::Forbidden(ForbiddenReason::NotEnrolled) => "not_enrolled",
            AppError::NotFound(_) => "not_found",
            AppError::Validation { .. } => "validation_error",
            AppError::Conflict(ConflictKind::AlreadyEnrolled) => "already_enrolled",
            AppError::Conflict(ConflictKind::StaleVersion) => "stale_version",
            AppError::Conflict(ConflictKind::EmailTaken) => "email_taken",
            AppError::Conflict(ConflictKind::UsernameTaken) => "username_taken",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::StaleVersion(_) => AppError::Conflict(ConflictKind::StaleVersion),
            RepositoryError::MissingCourse(_) => AppError::NotFound(Resource::Course),
            RepositoryError::StillInstructs(_, authored) => AppError::validation(
                "role",
                format!("user still instructs {authored} course(s)"),
            ),
            RepositoryError::NotAnAuthor(_) => AppError::Forbidden(ForbiddenReason::WrongRole),
            RepositoryError::Duplicate(ref constraint) if constraint.contains("username") => {
                AppError::Conflict(ConflictKind::UsernameTaken)
            }
            RepositoryError::Duplicate(_) => AppError::Conflict(ConflictKind::EmailTaken),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// ErrorBody
///
/// JSON shape of every error response: `{"error": "...", "code": "...", "resource"?, "field"?}`.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = match &self {
            // Store and provider failures are logged in full but never echoed to the client.
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed with internal error");
                ErrorBody {
                    error: "internal server error".to_string(),
                    code,
                    resource: None,
                    field: None,
                }
            }
            AppError::NotFound(resource) => ErrorBody {
                error: self.to_string(),
                code,
                resource: Some(*resource),
                field: None,
            },
            AppError::Validation { field, .. } => ErrorBody {
                error: self.to_string(),
                code,
                resource: None,
                field: Some(field.clone()),
            },
            _ => ErrorBody {
                error: self.to_string(),
                code,
                resource: None,
                field: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected(_) => {
                AppError::validation("credentials", "rejected by the identity provider")
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
