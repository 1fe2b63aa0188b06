//! Enrollment gate: the serialization boundary for course documents.
//!
//! Every course that leaves the service goes through `filter` (full view) or `summarize`
//! (listing). Lesson bodies stay in storage; the gate only decides what is copied out.

use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, ForbiddenReason, Resource},
    models::{
        Course, CourseSummary, CourseView, InstructorSummary, Lesson, LessonAccess, LessonView,
        Question, QuestionView, TopicView, User,
    },
    policy,
};

/// lesson_access
///
/// Staff see everything. For everyone else the hidden flag wins over both enrollment and
/// free preview; then enrollment or free preview unlocks the body.
pub fn lesson_access(course: &Course, lesson: &Lesson, viewer: Option<&AuthUser>) -> LessonAccess {
    if policy::is_staff(viewer, course) {
        return LessonAccess::Visible;
    }
    if lesson.hidden {
        return LessonAccess::Hidden;
    }
    let enrolled = viewer.is_some_and(|v| course.is_enrolled(v.id));
    if enrolled || lesson.free_preview {
        LessonAccess::Visible
    } else {
        LessonAccess::Locked
    }
}

fn question_view(question: &Question, reveal_answer: bool) -> QuestionView {
    QuestionView {
        question_text: question.question_text.clone(),
        code_snippet: question.code_snippet.clone(),
        options: question.options.clone(),
        correct_answer_index: reveal_answer.then_some(question.correct_answer_index),
    }
}

fn project_lesson(lesson: &Lesson, access: LessonAccess, staff: bool) -> LessonView {
    let visible = access == LessonAccess::Visible;
    LessonView {
        id: lesson.id,
        title: lesson.title.clone(),
        kind: lesson.kind,
        duration: lesson.duration,
        free_preview: lesson.free_preview,
        hidden: lesson.hidden,
        access,
        content: lesson.content.clone().filter(|_| visible),
        video_url: lesson.video_url.clone().filter(|_| visible),
        questions: visible.then(|| {
            lesson
                .questions
                .iter()
                .map(|q| question_view(q, staff))
                .collect()
        }),
    }
}

/// filter
///
/// Builds the viewer-specific `CourseView`. Hidden lessons are dropped entirely for
/// non-staff; locked lessons keep their metadata but no body.
pub fn filter(course: &Course, instructor: Option<&User>, viewer: Option<&AuthUser>) -> CourseView {
    let staff = policy::is_staff(viewer, course);

    let topics = course
        .topics
        .iter()
        .map(|topic| TopicView {
            id: topic.id,
            title: topic.title.clone(),
            description: topic.description.clone(),
            lessons: topic
                .lessons
                .iter()
                .filter_map(|lesson| match lesson_access(course, lesson, viewer) {
                    LessonAccess::Hidden => None,
                    access => Some(project_lesson(lesson, access, staff)),
                })
                .collect(),
        })
        .collect();

    CourseView {
        id: course.id,
        title: course.title.clone(),
        description: course.description.clone(),
        category: course.category.clone(),
        price: course.price,
        thumbnail_url: course.thumbnail_url.clone(),
        instructor: instructor.map(InstructorSummary::from),
        topics,
        enrolled_count: course.students_enrolled.len(),
        is_enrolled: viewer.is_some_and(|v| course.is_enrolled(v.id)),
        can_edit: staff,
        version: course.version,
        created_at: course.created_at,
        updated_at: course.updated_at,
    }
}

/// lesson_view
///
/// Single-lesson read. A locked lesson is an error here so the client can tell "enroll
/// first" apart from "no such lesson". A hidden lesson reads as missing to non-staff, the
/// same answer `filter` gives by leaving it out.
pub fn lesson_view(
    course: &Course,
    topic_id: Uuid,
    lesson_id: Uuid,
    viewer: Option<&AuthUser>,
) -> Result<LessonView, AppError> {
    let lesson = course.find_lesson(topic_id, lesson_id)?;
    match lesson_access(course, lesson, viewer) {
        LessonAccess::Visible => Ok(project_lesson(
            lesson,
            LessonAccess::Visible,
            policy::is_staff(viewer, course),
        )),
        LessonAccess::Locked => Err(AppError::Forbidden(ForbiddenReason::NotEnrolled)),
        LessonAccess::Hidden => Err(AppError::NotFound(Resource::Lesson)),
    }
}

pub fn summarize(course: &Course, instructor: Option<&User>) -> CourseSummary {
    CourseSummary {
        id: course.id,
        title: course.title.clone(),
        description: course.description.clone(),
        category: course.category.clone(),
        price: course.price,
        thumbnail_url: course.thumbnail_url.clone(),
        instructor: instructor.map(InstructorSummary::from),
        topic_count: course.topics.len(),
        lesson_count: course.lesson_count(),
        enrolled_count: course.students_enrolled.len(),
        created_at: course.created_at,
    }
}
