use crate::models::{Course, Role, UnknownRole, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// RepositoryError
///
/// Failures of the persistence layer. `StaleVersion` is the compare-and-swap rejection the
/// mutation engine retries on; everything else aborts the operation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("course {0} was modified by another writer")]
    StaleVersion(Uuid),

    #[error("course {0} no longer exists")]
    MissingCourse(Uuid),

    #[error("user {0} still instructs {1} course(s)")]
    StillInstructs(Uuid, usize),

    #[error("user {0} may not author courses")]
    NotAnAuthor(Uuid),

    #[error("unique constraint violated: {0}")]
    Duplicate(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<UnknownRole> for RepositoryError {
    fn from(err: UnknownRole) -> Self {
        RepositoryError::Corrupt(err.to_string())
    }
}

/// Repository Trait
///
/// The persistence contract. Courses are stored and written as whole aggregates; the only
/// write path for an existing course is `save_course`, which is a compare-and-swap on
/// `Course::version`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_username(&self, username: &str)
    -> Result<Option<User>, RepositoryError>;
    async fn create_user(&self, user: User) -> Result<User, RepositoryError>;
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
    /// Returns `None` if no user has this id. A role that cannot author is refused with
    /// `StillInstructs` while the user owns courses; the check and the write are atomic
    /// with respect to `insert_course`.
    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>, RepositoryError>;

    // --- Courses ---
    async fn list_courses(&self) -> Result<Vec<Course>, RepositoryError>;
    async fn courses_by_instructor(&self, instructor_id: Uuid)
    -> Result<Vec<Course>, RepositoryError>;
    async fn courses_enrolled(&self, user_id: Uuid) -> Result<Vec<Course>, RepositoryError>;
    async fn load_course(&self, id: Uuid) -> Result<Option<Course>, RepositoryError>;
    /// Stores a brand-new course at version 1. Fails with `NotAnAuthor` if the instructor's
    /// stored role can no longer author.
    async fn insert_course(&self, course: Course) -> Result<Course, RepositoryError>;
    /// Replaces the stored course only if its version still equals `expected_version`.
    /// On success the returned course carries `expected_version + 1`.
    async fn save_course(
        &self,
        course: Course,
        expected_version: i64,
    ) -> Result<Course, RepositoryError>;
    /// Deletes the course and its whole subtree. Returns false if it did not exist.
    async fn delete_course(&self, id: Uuid) -> Result<bool, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Postgres ---

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    username: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            username: row.username,
            role: row.role.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct CourseRow {
    document: Json<Course>,
    version: i64,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        let mut course = row.document.0;
        // The column is authoritative; the embedded copy is informational.
        course.version = row.version;
        course
    }
}

const USER_COLUMNS: &str = "id, name, email, username, role, created_at";

/// PostgresRepository
///
/// Users live in a relational `users` table. Each course is one JSONB document in
/// `courses.document`, next to a `version` column used for optimistic concurrency and a few
/// denormalized columns for filtering.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_user(&self, column: &str, value: &str) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn fetch_courses(
        &self,
        filter: &str,
        param: Option<String>,
    ) -> Result<Vec<Course>, RepositoryError> {
        let sql = format!(
            "SELECT document, version FROM courses {filter} ORDER BY created_at DESC"
        );
        let mut query = sqlx::query_as::<_, CourseRow>(&sql);
        if let Some(param) = param {
            query = query.bind(param);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Course::from).collect())
    }
}

fn map_unique_violation(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepositoryError::Duplicate(db.constraint().unwrap_or("unknown").to_string());
        }
    }
    RepositoryError::Database(err)
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    /// Email comparison is case-insensitive; addresses are stored lowercased.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.fetch_user("email", &email.to_lowercase()).await
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, RepositoryError> {
        self.fetch_user("username", username).await
    }

    async fn create_user(&self, user: User) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users (id, name, email, username, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(user.email.to_lowercase())
            .bind(&user.username)
            .bind(user.role.as_str())
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)?;
        User::try_from(row)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    /// The user row is locked `FOR UPDATE` and `insert_course` takes `FOR SHARE` on the
    /// same row, so a course cannot appear between the count and the update.
    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        if !role.can_author() {
            let authored: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM courses WHERE instructor_id = $1")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            if authored > 0 {
                return Err(RepositoryError::StillInstructs(id, authored as usize));
            }
        }

        let sql = format!("UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        User::try_from(row).map(Some)
    }

    async fn list_courses(&self) -> Result<Vec<Course>, RepositoryError> {
        self.fetch_courses("", None).await
    }

    async fn courses_by_instructor(
        &self,
        instructor_id: Uuid,
    ) -> Result<Vec<Course>, RepositoryError> {
        self.fetch_courses(
            "WHERE instructor_id = $1::uuid",
            Some(instructor_id.to_string()),
        )
        .await
    }

    /// Uses the JSONB `?` operator: membership of the user id string in the enrolled array.
    async fn courses_enrolled(&self, user_id: Uuid) -> Result<Vec<Course>, RepositoryError> {
        self.fetch_courses(
            "WHERE document->'students_enrolled' ? $1",
            Some(user_id.to_string()),
        )
        .await
    }

    async fn load_course(&self, id: Uuid) -> Result<Option<Course>, RepositoryError> {
        let row = sqlx::query_as::<_, CourseRow>(
            "SELECT document, version FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Course::from))
    }

    async fn insert_course(&self, mut course: Course) -> Result<Course, RepositoryError> {
        course.version = 1;
        let mut tx = self.pool.begin().await?;

        let role: Option<String> =
            sqlx::query_scalar("SELECT role FROM users WHERE id = $1 FOR SHARE")
                .bind(course.instructor_id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(role) = role {
            if !role.parse::<Role>()?.can_author() {
                return Err(RepositoryError::NotAnAuthor(course.instructor_id));
            }
        }

        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            INSERT INTO courses (id, instructor_id, title, category, document, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING document, version
            "#,
        )
        .bind(course.id)
        .bind(course.instructor_id)
        .bind(&course.title)
        .bind(&course.category)
        .bind(Json(&course))
        .bind(course.version)
        .bind(course.created_at)
        .bind(course.updated_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row.into())
    }

    /// save_course
    ///
    /// The compare-and-swap write: the `WHERE version = $expected` guard makes the
    /// read-modify-write cycle safe against concurrent editors. Zero affected rows means
    /// either the course vanished or someone else wrote first; the two are told apart with
    /// an existence check.
    async fn save_course(
        &self,
        mut course: Course,
        expected_version: i64,
    ) -> Result<Course, RepositoryError> {
        course.version = expected_version + 1;
        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            UPDATE courses
            SET document = $3, title = $4, category = $5, version = $6, updated_at = $7
            WHERE id = $1 AND version = $2
            RETURNING document, version
            "#,
        )
        .bind(course.id)
        .bind(expected_version)
        .bind(Json(&course))
        .bind(&course.title)
        .bind(&course.category)
        .bind(course.version)
        .bind(course.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM courses WHERE id = $1)")
                        .bind(course.id)
                        .fetch_one(&self.pool)
                        .await?;
                if exists {
                    Err(RepositoryError::StaleVersion(course.id))
                } else {
                    Err(RepositoryError::MissingCourse(course.id))
                }
            }
        }
    }

    async fn delete_course(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let res = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

// --- In-Memory ---

/// InMemoryRepository
///
/// A process-local implementation of `Repository` with the same compare-and-swap
/// semantics as Postgres. Backs local runs without `DATABASE_URL` and the test suite.
#[derive(Default)]
pub struct InMemoryRepository {
    users: RwLock<HashMap<Uuid, User>>,
    courses: RwLock<HashMap<Uuid, Course>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a repository pre-populated with users.
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let map = users.into_iter().map(|u| (u.id, u)).collect();
        Self {
            users: RwLock::new(map),
            courses: RwLock::new(HashMap::new()),
        }
    }

    async fn sorted_courses<F>(&self, keep: F) -> Vec<Course>
    where
        F: Fn(&Course) -> bool,
    {
        let courses = self.courses.read().await;
        let mut out: Vec<Course> = courses.values().filter(|c| keep(c)).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        out
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let email = email.to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned())
    }

    async fn create_user(&self, mut user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        user.email = user.email.to_lowercase();
        if users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Duplicate("users_email_key".to_string()));
        }
        if user.username.is_some() && users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::Duplicate("users_username_key".to_string()));
        }
        if users.contains_key(&user.id) {
            return Err(RepositoryError::Duplicate("users_pkey".to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    /// Holds the users write lock across the course count; `insert_course` takes the users
    /// lock first as well, so the two cannot interleave.
    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>, RepositoryError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if !role.can_author() {
            let authored = self
                .courses
                .read()
                .await
                .values()
                .filter(|c| c.instructor_id == id)
                .count();
            if authored > 0 {
                return Err(RepositoryError::StillInstructs(id, authored));
            }
        }
        user.role = role;
        Ok(Some(user.clone()))
    }

    async fn list_courses(&self) -> Result<Vec<Course>, RepositoryError> {
        Ok(self.sorted_courses(|_| true).await)
    }

    async fn courses_by_instructor(
        &self,
        instructor_id: Uuid,
    ) -> Result<Vec<Course>, RepositoryError> {
        Ok(self.sorted_courses(|c| c.instructor_id == instructor_id).await)
    }

    async fn courses_enrolled(&self, user_id: Uuid) -> Result<Vec<Course>, RepositoryError> {
        Ok(self.sorted_courses(|c| c.is_enrolled(user_id)).await)
    }

    async fn load_course(&self, id: Uuid) -> Result<Option<Course>, RepositoryError> {
        Ok(self.courses.read().await.get(&id).cloned())
    }

    async fn insert_course(&self, mut course: Course) -> Result<Course, RepositoryError> {
        let users = self.users.read().await;
        if let Some(author) = users.get(&course.instructor_id) {
            if !author.role.can_author() {
                return Err(RepositoryError::NotAnAuthor(course.instructor_id));
            }
        }
        let mut courses = self.courses.write().await;
        course.version = 1;
        courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn save_course(
        &self,
        mut course: Course,
        expected_version: i64,
    ) -> Result<Course, RepositoryError> {
        let mut courses = self.courses.write().await;
        let stored = courses
            .get(&course.id)
            .ok_or(RepositoryError::MissingCourse(course.id))?;
        if stored.version != expected_version {
            return Err(RepositoryError::StaleVersion(course.id));
        }
        course.version = expected_version + 1;
        courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn delete_course(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.courses.write().await.remove(&id).is_some())
    }
}
