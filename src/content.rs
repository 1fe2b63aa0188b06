//! Navigation over the Course → Topic → Lesson → Question tree.
//!
//! Topics and lessons are addressed by their stable id, never by position. Questions have
//! no identity of their own and are addressed by ordinal.

use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::{AppError, Resource},
    models::{Course, Lesson, Question, Topic},
};

/// Target
///
/// A request's path into the tree: a course, optionally narrowed to a topic and a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub course_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
}

impl Target {
    pub fn course(course_id: Uuid) -> Self {
        Self {
            course_id,
            topic_id: None,
            lesson_id: None,
        }
    }

    pub fn topic(course_id: Uuid, topic_id: Uuid) -> Self {
        Self {
            course_id,
            topic_id: Some(topic_id),
            lesson_id: None,
        }
    }

    pub fn lesson(course_id: Uuid, topic_id: Uuid, lesson_id: Uuid) -> Self {
        Self {
            course_id,
            topic_id: Some(topic_id),
            lesson_id: Some(lesson_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("question index {index} is out of range for a lesson with {len} questions")]
pub struct OutOfRange {
    pub index: usize,
    pub len: usize,
}

impl Course {
    pub fn find_topic(&self, topic_id: Uuid) -> Result<&Topic, AppError> {
        self.topics
            .iter()
            .find(|t| t.id == topic_id)
            .ok_or(AppError::NotFound(Resource::Topic))
    }

    pub fn find_topic_mut(&mut self, topic_id: Uuid) -> Result<&mut Topic, AppError> {
        self.topics
            .iter_mut()
            .find(|t| t.id == topic_id)
            .ok_or(AppError::NotFound(Resource::Topic))
    }

    /// Reports a missing topic before a missing lesson, so the caller learns which level
    /// of the path is wrong.
    pub fn find_lesson(&self, topic_id: Uuid, lesson_id: Uuid) -> Result<&Lesson, AppError> {
        self.find_topic(topic_id)?
            .lessons
            .iter()
            .find(|l| l.id == lesson_id)
            .ok_or(AppError::NotFound(Resource::Lesson))
    }

    pub fn find_lesson_mut(
        &mut self,
        topic_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<&mut Lesson, AppError> {
        self.find_topic_mut(topic_id)?
            .lessons
            .iter_mut()
            .find(|l| l.id == lesson_id)
            .ok_or(AppError::NotFound(Resource::Lesson))
    }

    /// Checks that every node named by `target` exists in this course.
    pub fn resolve(&self, target: &Target) -> Result<(), AppError> {
        if target.course_id != self.id {
            return Err(AppError::NotFound(Resource::Course));
        }
        match (target.topic_id, target.lesson_id) {
            (Some(topic_id), Some(lesson_id)) => self.find_lesson(topic_id, lesson_id).map(|_| ()),
            (Some(topic_id), None) => self.find_topic(topic_id).map(|_| ()),
            (None, Some(_)) => Err(AppError::NotFound(Resource::Topic)),
            (None, None) => Ok(()),
        }
    }
}

impl Lesson {
    pub fn find_question(&self, index: usize) -> Result<&Question, OutOfRange> {
        self.questions.get(index).ok_or(OutOfRange {
            index,
            len: self.questions.len(),
        })
    }
}
