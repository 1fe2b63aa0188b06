//! Content mutation engine.
//!
//! The pure functions at the top of this module edit a `Course` in memory and enforce the
//! tree invariants. `ContentMutationEngine` wraps them in the load → resolve → authorize →
//! mutate → compare-and-swap cycle against the repository.

use chrono::Utc;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    content::Target,
    error::{AppError, ConflictKind, Resource},
    models::{
        Course, CreateCourseRequest, CreateLessonRequest, CreateTopicRequest, DEFAULT_CATEGORY,
        Lesson, Question, QuestionInput, Topic, UpdateCourseRequest,
    },
    policy::{self, Action},
    repository::{RepositoryError, RepositoryState},
};

// --- Validation ---

pub(crate) fn non_blank(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(field, "must not be blank"));
    }
    Ok(trimmed.to_string())
}

fn valid_price(price: f64) -> Result<f64, AppError> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::validation("price", "must be a non-negative number"));
    }
    Ok(price)
}

/// Turns an author's question into a stored one, or explains which field is wrong.
pub fn validate_question(position: usize, input: &QuestionInput) -> Result<Question, AppError> {
    let field = |name: &str| format!("questions[{position}].{name}");

    let question_text = non_blank(&field("question_text"), &input.question_text)?;
    if input.options.len() < 2 {
        return Err(AppError::validation(
            field("options"),
            "a question needs at least two options",
        ));
    }
    let correct_answer_index = usize::try_from(input.correct_answer_index)
        .ok()
        .filter(|idx| *idx < input.options.len())
        .ok_or_else(|| {
            AppError::validation(
                field("correct_answer_index"),
                format!("must be between 0 and {}", input.options.len() - 1),
            )
        })?;

    Ok(Question {
        question_text,
        code_snippet: input.code_snippet.clone(),
        options: input.options.clone(),
        correct_answer_index,
    })
}

// --- Pure Mutations ---

pub fn new_course(instructor_id: Uuid, req: &CreateCourseRequest) -> Result<Course, AppError> {
    let now = Utc::now();
    Ok(Course {
        id: Uuid::new_v4(),
        title: non_blank("title", &req.title)?,
        description: non_blank("description", &req.description)?,
        category: match req.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => DEFAULT_CATEGORY.to_string(),
        },
        instructor_id,
        price: valid_price(req.price.unwrap_or(0.0))?,
        thumbnail_url: req.thumbnail_url.clone(),
        topics: Vec::new(),
        students_enrolled: BTreeSet::new(),
        version: 0,
        created_at: now,
        updated_at: now,
    })
}

/// update_course
///
/// Applies the whitelisted scalar fields of `patch`. All fields are validated before any
/// is written, so a bad price never leaves a half-applied title behind.
pub fn update_course(course: &mut Course, patch: &UpdateCourseRequest) -> Result<(), AppError> {
    let title = patch.title.as_deref().map(|t| non_blank("title", t)).transpose()?;
    let description = patch
        .description
        .as_deref()
        .map(|d| non_blank("description", d))
        .transpose()?;
    let category = patch
        .category
        .as_deref()
        .map(|c| non_blank("category", c))
        .transpose()?;
    let price = patch.price.map(valid_price).transpose()?;

    if let Some(title) = title {
        course.title = title;
    }
    if let Some(description) = description {
        course.description = description;
    }
    if let Some(category) = category {
        course.category = category;
    }
    if let Some(price) = price {
        course.price = price;
    }
    if let Some(thumbnail) = &patch.thumbnail_url {
        course.thumbnail_url = Some(thumbnail.clone());
    }
    Ok(())
}

/// Appends a topic with no lessons and returns its id. Duplicate titles are allowed.
pub fn add_topic(course: &mut Course, req: &CreateTopicRequest) -> Result<Uuid, AppError> {
    let topic = Topic {
        id: Uuid::new_v4(),
        title: non_blank("title", &req.title)?,
        description: req.description.clone(),
        lessons: Vec::new(),
    };
    let id = topic.id;
    course.topics.push(topic);
    Ok(id)
}

pub fn delete_topic(course: &mut Course, topic_id: Uuid) -> Result<Topic, AppError> {
    let position = course
        .topics
        .iter()
        .position(|t| t.id == topic_id)
        .ok_or(AppError::NotFound(Resource::Topic))?;
    Ok(course.topics.remove(position))
}

/// add_lesson
///
/// Every question is validated before the lesson is appended; one bad question rejects the
/// whole lesson. New lessons always start visible.
pub fn add_lesson(
    course: &mut Course,
    topic_id: Uuid,
    req: &CreateLessonRequest,
) -> Result<Lesson, AppError> {
    let topic = course.find_topic_mut(topic_id)?;

    let questions = req
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| validate_question(i, q))
        .collect::<Result<Vec<_>, _>>()?;

    let lesson = Lesson {
        id: Uuid::new_v4(),
        title: non_blank("title", &req.title)?,
        kind: req.kind,
        content: req.content.clone(),
        video_url: req.video_url.clone(),
        duration: req.duration,
        questions,
        hidden: false,
        free_preview: req.free_preview,
    };
    topic.lessons.push(lesson.clone());
    Ok(lesson)
}

/// Removes a lesson by id, so concurrent appends to the same topic cannot shift the target.
pub fn delete_lesson(
    course: &mut Course,
    topic_id: Uuid,
    lesson_id: Uuid,
) -> Result<Lesson, AppError> {
    let topic = course.find_topic_mut(topic_id)?;
    let position = topic
        .lessons
        .iter()
        .position(|l| l.id == lesson_id)
        .ok_or(AppError::NotFound(Resource::Lesson))?;
    Ok(topic.lessons.remove(position))
}

/// Flips `hidden`. Applying it twice restores the original value.
pub fn toggle_lesson_hidden(
    course: &mut Course,
    topic_id: Uuid,
    lesson_id: Uuid,
) -> Result<Lesson, AppError> {
    let lesson = course.find_lesson_mut(topic_id, lesson_id)?;
    lesson.hidden = !lesson.hidden;
    Ok(lesson.clone())
}

pub fn enroll(course: &mut Course, user_id: Uuid) -> Result<(), AppError> {
    if !course.students_enrolled.insert(user_id) {
        return Err(AppError::Conflict(ConflictKind::AlreadyEnrolled));
    }
    Ok(())
}

// --- Engine ---

/// ContentMutationEngine
///
/// Applies mutations to stored courses with optimistic concurrency. Each attempt re-reads
/// the course, so existence and authorization are re-checked against the state the write
/// will actually replace.
#[derive(Clone)]
pub struct ContentMutationEngine {
    repo: RepositoryState,
    max_attempts: u32,
}

impl ContentMutationEngine {
    pub fn new(repo: RepositoryState, max_attempts: u32) -> Self {
        Self {
            repo,
            max_attempts: max_attempts.max(1),
        }
    }

    /// apply
    ///
    /// One read-modify-write transaction on a single course. `mutate` runs on a private
    /// copy; nothing is visible to other readers unless the compare-and-swap succeeds.
    async fn apply<T, F>(
        &self,
        principal: &AuthUser,
        target: Target,
        action: Action,
        mut mutate: F,
    ) -> Result<(Course, T), AppError>
    where
        F: FnMut(&mut Course) -> Result<T, AppError> + Send,
        T: Send,
    {
        for attempt in 1..=self.max_attempts {
            let mut course = self
                .repo
                .load_course(target.course_id)
                .await?
                .ok_or(AppError::NotFound(Resource::Course))?;

            course.resolve(&target)?;
            policy::authorize(Some(principal), action, Some(&course))?;

            let expected_version = course.version;
            let output = mutate(&mut course)?;
            course.updated_at = Utc::now();

            match self.repo.save_course(course, expected_version).await {
                Ok(saved) => {
                    tracing::info!(
                        course_id = %saved.id,
                        actor = %principal.id,
                        action = ?action,
                        version = saved.version,
                        "course updated"
                    );
                    return Ok((saved, output));
                }
                Err(RepositoryError::StaleVersion(id)) => {
                    tracing::warn!(course_id = %id, attempt, action = ?action, "lost version race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Conflict(ConflictKind::StaleVersion))
    }

    pub async fn create_course(
        &self,
        principal: &AuthUser,
        req: &CreateCourseRequest,
    ) -> Result<Course, AppError> {
        policy::authorize(Some(principal), Action::CreateCourse, None)?;
        let course = new_course(principal.id, req)?;
        let course = self.repo.insert_course(course).await?;
        tracing::info!(course_id = %course.id, actor = %principal.id, "course created");
        Ok(course)
    }

    pub async fn delete_course(&self, principal: &AuthUser, course_id: Uuid) -> Result<(), AppError> {
        let course = self
            .repo
            .load_course(course_id)
            .await?
            .ok_or(AppError::NotFound(Resource::Course))?;
        policy::authorize(Some(principal), Action::DeleteCourse, Some(&course))?;

        if !self.repo.delete_course(course_id).await? {
            return Err(AppError::NotFound(Resource::Course));
        }
        tracing::info!(course_id = %course_id, actor = %principal.id, "course deleted");
        Ok(())
    }

    pub async fn update_course(
        &self,
        principal: &AuthUser,
        course_id: Uuid,
        patch: &UpdateCourseRequest,
    ) -> Result<Course, AppError> {
        let (course, ()) = self
            .apply(principal, Target::course(course_id), Action::UpdateCourse, |c| {
                update_course(c, patch)
            })
            .await?;
        Ok(course)
    }

    pub async fn add_topic(
        &self,
        principal: &AuthUser,
        course_id: Uuid,
        req: &CreateTopicRequest,
    ) -> Result<(Course, Uuid), AppError> {
        self.apply(principal, Target::course(course_id), Action::AddTopic, |c| {
            add_topic(c, req)
        })
        .await
    }

    pub async fn delete_topic(
        &self,
        principal: &AuthUser,
        course_id: Uuid,
        topic_id: Uuid,
    ) -> Result<Course, AppError> {
        let (course, _) = self
            .apply(
                principal,
                Target::topic(course_id, topic_id),
                Action::DeleteTopic,
                |c| delete_topic(c, topic_id),
            )
            .await?;
        Ok(course)
    }

    pub async fn add_lesson(
        &self,
        principal: &AuthUser,
        course_id: Uuid,
        topic_id: Uuid,
        req: &CreateLessonRequest,
    ) -> Result<(Course, Lesson), AppError> {
        self.apply(
            principal,
            Target::topic(course_id, topic_id),
            Action::AddLesson,
            |c| add_lesson(c, topic_id, req),
        )
        .await
    }

    pub async fn delete_lesson(
        &self,
        principal: &AuthUser,
        course_id: Uuid,
        topic_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Course, AppError> {
        let (course, _) = self
            .apply(
                principal,
                Target::lesson(course_id, topic_id, lesson_id),
                Action::DeleteLesson,
                |c| delete_lesson(c, topic_id, lesson_id),
            )
            .await?;
        Ok(course)
    }

    pub async fn toggle_lesson_hidden(
        &self,
        principal: &AuthUser,
        course_id: Uuid,
        topic_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<(Course, Lesson), AppError> {
        self.apply(
            principal,
            Target::lesson(course_id, topic_id, lesson_id),
            Action::ToggleLessonHidden,
            |c| toggle_lesson_hidden(c, topic_id, lesson_id),
        )
        .await
    }

    pub async fn enroll(&self, principal: &AuthUser, course_id: Uuid) -> Result<Course, AppError> {
        let student = principal.id;
        let (course, ()) = self
            .apply(principal, Target::course(course_id), Action::Enroll, |c| {
                enroll(c, student)
            })
            .await?;
        Ok(course)
    }
}
