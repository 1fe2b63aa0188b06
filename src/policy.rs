//! The single authorization decision point.
//!
//! Every operation names an `Action`; each action maps to exactly one `Rule` in
//! `Action::rule`. Handlers and the mutation engine never branch on roles themselves.

use crate::{
    auth::AuthUser,
    error::{AppError, ConflictKind, ForbiddenReason, Resource},
    models::{Course, Role},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListCourses,
    ReadCourse,
    CreateCourse,
    UpdateCourse,
    DeleteCourse,
    AddTopic,
    DeleteTopic,
    AddLesson,
    DeleteLesson,
    ToggleLessonHidden,
    Enroll,
    SubmitQuiz,
    ManageUsers,
}

/// Rule
///
/// The shape of a permission check. `OwnerOrAdmin`, `NewMember` and `Participant` are
/// evaluated against the target course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Anyone, including anonymous callers.
    Public,
    /// The principal's role must be one of these.
    Roles(&'static [Role]),
    /// Admins, or the course's instructor.
    OwnerOrAdmin,
    /// Any authenticated principal who is not yet enrolled.
    NewMember,
    /// Enrolled students, the course's instructor, or admins.
    Participant,
}

const AUTHORS: &[Role] = &[Role::Instructor, Role::Admin];
const ADMINS: &[Role] = &[Role::Admin];

impl Action {
    pub const fn rule(self) -> Rule {
        match self {
            Action::ListCourses | Action::ReadCourse => Rule::Public,
            Action::CreateCourse => Rule::Roles(AUTHORS),
            Action::UpdateCourse
            | Action::DeleteCourse
            | Action::AddTopic
            | Action::DeleteTopic
            | Action::AddLesson
            | Action::DeleteLesson
            | Action::ToggleLessonHidden => Rule::OwnerOrAdmin,
            Action::Enroll => Rule::NewMember,
            Action::SubmitQuiz => Rule::Participant,
            Action::ManageUsers => Rule::Roles(ADMINS),
        }
    }
}

/// Denial
///
/// Why `authorize` said no. Each variant renders a distinct client-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    WrongRole,
    NotOwner,
    NotEnrolled,
    AlreadyEnrolled,
    NotFound(Resource),
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Unauthenticated => AppError::Unauthenticated,
            Denial::WrongRole => AppError::Forbidden(ForbiddenReason::WrongRole),
            Denial::NotOwner => AppError::Forbidden(ForbiddenReason::NotOwner),
            Denial::NotEnrolled => AppError::Forbidden(ForbiddenReason::NotEnrolled),
            Denial::AlreadyEnrolled => AppError::Conflict(ConflictKind::AlreadyEnrolled),
            Denial::NotFound(resource) => AppError::NotFound(resource),
        }
    }
}

/// authorize
///
/// Decides whether `principal` may perform `action` on `course`. Check order is fixed:
/// a missing course is reported before anything about the caller, then authentication,
/// then the action's rule.
pub fn authorize(
    principal: Option<&AuthUser>,
    action: Action,
    course: Option<&Course>,
) -> Result<(), Denial> {
    let rule = action.rule();
    if rule == Rule::Public {
        return Ok(());
    }

    let needs_course = matches!(rule, Rule::OwnerOrAdmin | Rule::NewMember | Rule::Participant);
    if needs_course && course.is_none() {
        return Err(Denial::NotFound(Resource::Course));
    }

    let principal = principal.ok_or(Denial::Unauthenticated)?;

    match (rule, course) {
        (Rule::Roles(allowed), _) => {
            if allowed.contains(&principal.role) {
                Ok(())
            } else {
                Err(Denial::WrongRole)
            }
        }
        (Rule::OwnerOrAdmin, Some(course)) => {
            if is_staff(Some(principal), course) {
                Ok(())
            } else {
                Err(Denial::NotOwner)
            }
        }
        (Rule::NewMember, Some(course)) => {
            if course.is_enrolled(principal.id) {
                Err(Denial::AlreadyEnrolled)
            } else {
                Ok(())
            }
        }
        (Rule::Participant, Some(course)) => {
            if is_staff(Some(principal), course) || course.is_enrolled(principal.id) {
                Ok(())
            } else {
                Err(Denial::NotEnrolled)
            }
        }
        (Rule::Public, _) => Ok(()),
        (_, None) => Err(Denial::NotFound(Resource::Course)),
    }
}

/// Staff of a course: any admin, or the course's own instructor. Instructors of other
/// courses are ordinary viewers here.
pub fn is_staff(principal: Option<&AuthUser>, course: &Course) -> bool {
    principal.is_some_and(|p| p.is_admin() || course.is_owned_by(p.id))
}
