//! Postgres-backed stores.
//!
//! ## Locking
//!
//! A course lock scope is a transaction holding `SELECT ... FOR UPDATE` on the
//! course row. The wait is bounded per transaction with `lock_timeout`.
//! Dropping the scope drops the transaction, which rolls it back.
//!
//! ## Error Mapping
//!
//! | PostgreSQL code | `StoreError` | Scenario |
//! |-----------------|--------------|----------|
//! | `55P03` | `LockTimeout` | another scope held the course row too long |
//! | `23505` | `Conflict` | duplicate membership or email |
//! | other / non-database | `Backend` | connectivity, constraint, decode failures |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use classroll_auth::user::normalize_email;
use classroll_auth::{NewUser, Role, User};
use classroll_core::{CourseId, Page, PageRequest, UserId};
use classroll_courses::{Capacity, Course, CourseChanges, CourseSnapshot, CourseSummary, NewCourse};

use super::r#trait::{CourseStore, LockedCourse, StoreError, UserStore};

/// Open a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Apply the bundled schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::backend(format!("migration failed: {e}")))
}

#[derive(Debug, FromRow)]
struct CourseRow {
    id: Uuid,
    title: String,
    capacity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CourseRow> for Course {
    type Error = StoreError;

    fn try_from(row: CourseRow) -> Result<Self, Self::Error> {
        let capacity = Capacity::new(i64::from(row.capacity))
            .map_err(|e| StoreError::backend(format!("course {} has invalid capacity: {e}", row.id)))?;
        Ok(Course {
            id: CourseId::from_uuid(row.id),
            title: row.title,
            capacity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CourseSummaryRow {
    #[sqlx(flatten)]
    course: CourseRow,
    students_count: i64,
}

impl TryFrom<CourseSummaryRow> for CourseSummary {
    type Error = StoreError;

    fn try_from(row: CourseSummaryRow) -> Result<Self, Self::Error> {
        Ok(CourseSummary {
            course: row.course.try_into()?,
            students_count: u64::try_from(row.students_count).unwrap_or_default(),
        })
    }
}

const SUMMARY_COLUMNS: &str = r#"
    c.id, c.title, c.capacity, c.created_at, c.updated_at,
    (SELECT COUNT(*) FROM course_user cu WHERE cu.course_id = c.id) AS students_count
"#;

/// Postgres course store.
#[derive(Debug, Clone)]
pub struct PostgresCourseStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresCourseStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    fn lock_timeout_ms(&self) -> u64 {
        u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Begin a transaction and take the row lock on one course.
    ///
    /// Returns `None` (after rolling back) when the course row is missing.
    async fn begin_locked(
        &self,
        id: CourseId,
    ) -> Result<Option<(Transaction<'static, Postgres>, CourseRow)>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT id, title, capacity, created_at, updated_at
            FROM courses
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| self.map_lock_error(id, "lock_course", e))?;

        match row {
            Some(row) => Ok(Some((tx, row))),
            None => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                Ok(None)
            }
        }
    }

    fn map_lock_error(&self, id: CourseId, operation: &str, err: sqlx::Error) -> StoreError {
        if db_code(&err).as_deref() == Some("55P03") {
            StoreError::LockTimeout {
                course_id: id,
                waited_ms: self.lock_timeout_ms(),
            }
        } else {
            map_sqlx_error(operation, err)
        }
    }
}

#[async_trait]
impl CourseStore for PostgresCourseStore {
    #[instrument(skip(self, course), err)]
    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError> {
        let course = course.into_course(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO courses (id, title, capacity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(course.id.as_uuid())
        .bind(&course.title)
        .bind(i32::try_from(course.capacity.get()).unwrap_or(i32::MAX))
        .bind(course.created_at)
        .bind(course.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_course", e))?;
        Ok(course)
    }

    #[instrument(skip(self), fields(course_id = %id), err)]
    async fn get_course(&self, id: CourseId) -> Result<Option<CourseSummary>, StoreError> {
        let row = sqlx::query_as::<_, CourseSummaryRow>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM courses c WHERE c.id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_course", e))?;

        row.map(CourseSummary::try_from).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_courses(&self, page: PageRequest) -> Result<Page<CourseSummary>, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_courses", e))?;

        let rows = sqlx::query_as::<_, CourseSummaryRow>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM courses c ORDER BY c.created_at, c.id LIMIT $1 OFFSET $2"
        ))
        .bind(i64::try_from(page.limit()).unwrap_or(i64::MAX))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_courses", e))?;

        let data = rows
            .into_iter()
            .map(CourseSummary::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(data, page, u64::try_from(total).unwrap_or_default()))
    }

    #[instrument(skip(self), fields(course_id = %id), err)]
    async fn course_exists(&self, id: CourseId) -> Result<bool, StoreError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM courses WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("course_exists", e))
    }

    #[instrument(skip(self), fields(course_id = %id), err)]
    async fn lock_course(&self, id: CourseId) -> Result<Option<Box<dyn LockedCourse>>, StoreError> {
        let Some((mut tx, row)) = self.begin_locked(id).await? else {
            return Ok(None);
        };

        let enrolled: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM course_user WHERE course_id = $1")
            .bind(id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("count_members", e))?;

        let course = Course::try_from(row)?;
        let snapshot = CourseSnapshot::new(course.capacity, u64::try_from(enrolled).unwrap_or_default());

        Ok(Some(Box::new(PostgresLockedCourse {
            course_id: id,
            tx: Some(tx),
            snapshot,
        })))
    }

    #[instrument(skip(self, changes), fields(course_id = %id), err)]
    async fn update_course(
        &self,
        id: CourseId,
        changes: CourseChanges,
    ) -> Result<Option<Course>, StoreError> {
        let Some((mut tx, row)) = self.begin_locked(id).await? else {
            return Ok(None);
        };

        let mut course = Course::try_from(row)?;
        changes.apply(&mut course, Utc::now());

        sqlx::query("UPDATE courses SET title = $2, capacity = $3, updated_at = $4 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(&course.title)
            .bind(i32::try_from(course.capacity.get()).unwrap_or(i32::MAX))
            .bind(course.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_course", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Some(course))
    }

    #[instrument(skip(self), fields(course_id = %id), err)]
    async fn delete_course(&self, id: CourseId) -> Result<bool, StoreError> {
        let Some((mut tx, _row)) = self.begin_locked(id).await? else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_course", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(true)
    }
}

struct PostgresLockedCourse {
    course_id: CourseId,
    tx: Option<Transaction<'static, Postgres>>,
    snapshot: CourseSnapshot,
}

impl PostgresLockedCourse {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        let course_id = self.course_id;
        self.tx.as_mut().ok_or_else(|| {
            StoreError::backend(format!("lock scope for course {course_id} is already closed"))
        })
    }
}

#[async_trait]
impl LockedCourse for PostgresLockedCourse {
    fn course_id(&self) -> CourseId {
        self.course_id
    }

    fn snapshot(&self) -> CourseSnapshot {
        self.snapshot
    }

    async fn membership_exists(&mut self, user_id: UserId) -> Result<bool, StoreError> {
        let course_id = self.course_id;
        let tx = self.tx()?;
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM course_user WHERE course_id = $1 AND user_id = $2)",
        )
        .bind(course_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("membership_exists", e))
    }

    async fn insert_membership(&mut self, user_id: UserId) -> Result<(), StoreError> {
        let course_id = self.course_id;
        let tx = self.tx()?;
        sqlx::query("INSERT INTO course_user (course_id, user_id) VALUES ($1, $2)")
            .bind(course_id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_membership", e))?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or_else(|| {
            StoreError::backend(format!("lock scope for course {} is already closed", self.course_id))
        })?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e| StoreError::backend(format!("user {} has {e}", row.id)))?;
        Ok(User {
            id: UserId::from_uuid(row.id),
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres user store.
#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    #[instrument(skip(self, user), err)]
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let user = user.into_user(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(user)
    }

    #[instrument(skip(self, email), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE LOWER(email) = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_email", e))?;

        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_id", e))?;

        row.map(User::try_from).transpose()
    }
}

fn db_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend(format!("timed out acquiring a connection in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
