use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use classroll_auth::user::normalize_email;
use classroll_auth::{NewUser, User};
use classroll_core::{CourseId, Page, PageRequest, UserId};
use classroll_courses::{Course, CourseChanges, CourseSnapshot, CourseSummary, NewCourse};

use super::r#trait::{CourseStore, LockedCourse, StoreError, UserStore};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

fn poisoned() -> StoreError {
    StoreError::backend("lock poisoned")
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read().map_err(|_| poisoned())
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write().map_err(|_| poisoned())
}

#[derive(Debug)]
struct CourseRecord {
    course: Course,
    members: HashSet<UserId>,
    deleted: bool,
}

impl CourseRecord {
    fn summary(&self) -> CourseSummary {
        CourseSummary {
            course: self.course.clone(),
            students_count: self.members.len() as u64,
        }
    }
}

/// One course: its exclusive gate plus the committed state.
///
/// The gate serializes writers; readers only take the short `state` lock
/// and never wait for a writer's scope to finish.
#[derive(Debug)]
struct CourseSlot {
    gate: Arc<Mutex<()>>,
    state: RwLock<CourseRecord>,
}

#[derive(Debug, Default)]
struct Catalog {
    slots: HashMap<CourseId, Arc<CourseSlot>>,
    order: Vec<CourseId>,
}

/// In-memory course store.
///
/// Intended for tests/dev. Locking semantics match the Postgres store:
/// one exclusive, timeout-bounded lock per course.
#[derive(Debug)]
pub struct InMemoryCourseStore {
    catalog: RwLock<Catalog>,
    lock_timeout: Duration,
}

impl Default for InMemoryCourseStore {
    fn default() -> Self {
        Self {
            catalog: RwLock::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryCourseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    fn slot(&self, id: CourseId) -> Result<Option<Arc<CourseSlot>>, StoreError> {
        Ok(read(&self.catalog)?.slots.get(&id).cloned())
    }

    async fn acquire(&self, id: CourseId, slot: &CourseSlot) -> Result<OwnedMutexGuard<()>, StoreError> {
        tokio::time::timeout(self.lock_timeout, slot.gate.clone().lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout {
                course_id: id,
                waited_ms: u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX),
            })
    }
}

#[async_trait]
impl CourseStore for InMemoryCourseStore {
    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError> {
        let course = course.into_course(Utc::now());
        let slot = Arc::new(CourseSlot {
            gate: Arc::new(Mutex::new(())),
            state: RwLock::new(CourseRecord {
                course: course.clone(),
                members: HashSet::new(),
                deleted: false,
            }),
        });

        let mut catalog = write(&self.catalog)?;
        if catalog.slots.contains_key(&course.id) {
            return Err(StoreError::Conflict(format!("course {} already exists", course.id)));
        }
        catalog.slots.insert(course.id, slot);
        catalog.order.push(course.id);
        Ok(course)
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<CourseSummary>, StoreError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(None);
        };
        let record = read(&slot.state)?;
        Ok((!record.deleted).then(|| record.summary()))
    }

    async fn list_courses(&self, page: PageRequest) -> Result<Page<CourseSummary>, StoreError> {
        let catalog = read(&self.catalog)?;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);

        let mut data = Vec::with_capacity(limit.min(catalog.order.len()));
        for id in catalog.order.iter().skip(offset).take(limit) {
            if let Some(slot) = catalog.slots.get(id) {
                data.push(read(&slot.state)?.summary());
            }
        }
        Ok(Page::new(data, page, catalog.order.len() as u64))
    }

    async fn course_exists(&self, id: CourseId) -> Result<bool, StoreError> {
        Ok(read(&self.catalog)?.slots.contains_key(&id))
    }

    async fn lock_course(&self, id: CourseId) -> Result<Option<Box<dyn LockedCourse>>, StoreError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(None);
        };
        let guard = self.acquire(id, &slot).await?;

        let snapshot = {
            let record = read(&slot.state)?;
            if record.deleted {
                return Ok(None);
            }
            CourseSnapshot::new(record.course.capacity, record.members.len() as u64)
        };

        Ok(Some(Box::new(InMemoryLockedCourse {
            course_id: id,
            slot,
            guard: Some(guard),
            snapshot,
            pending: Vec::new(),
        })))
    }

    async fn update_course(
        &self,
        id: CourseId,
        changes: CourseChanges,
    ) -> Result<Option<Course>, StoreError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(None);
        };
        let _guard = self.acquire(id, &slot).await?;

        let mut record = write(&slot.state)?;
        if record.deleted {
            return Ok(None);
        }
        changes.apply(&mut record.course, Utc::now());
        Ok(Some(record.course.clone()))
    }

    async fn delete_course(&self, id: CourseId) -> Result<bool, StoreError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(false);
        };
        let _guard = self.acquire(id, &slot).await?;

        {
            let mut record = write(&slot.state)?;
            if record.deleted {
                return Ok(false);
            }
            record.deleted = true;
            record.members.clear();
        }

        let mut catalog = write(&self.catalog)?;
        catalog.slots.remove(&id);
        catalog.order.retain(|c| *c != id);
        Ok(true)
    }
}

/// Lock scope over an in-memory course.
///
/// Inserts are buffered in `pending` and applied on commit. Dropping the
/// scope releases the gate and discards the buffer.
struct InMemoryLockedCourse {
    course_id: CourseId,
    slot: Arc<CourseSlot>,
    guard: Option<OwnedMutexGuard<()>>,
    snapshot: CourseSnapshot,
    pending: Vec<UserId>,
}

impl InMemoryLockedCourse {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.guard.is_some() {
            Ok(())
        } else {
            Err(StoreError::backend(format!(
                "lock scope for course {} is already closed",
                self.course_id
            )))
        }
    }
}

#[async_trait]
impl LockedCourse for InMemoryLockedCourse {
    fn course_id(&self) -> CourseId {
        self.course_id
    }

    fn snapshot(&self) -> CourseSnapshot {
        self.snapshot
    }

    async fn membership_exists(&mut self, user_id: UserId) -> Result<bool, StoreError> {
        self.ensure_open()?;
        if self.pending.contains(&user_id) {
            return Ok(true);
        }
        Ok(read(&self.slot.state)?.members.contains(&user_id))
    }

    async fn insert_membership(&mut self, user_id: UserId) -> Result<(), StoreError> {
        if self.membership_exists(user_id).await? {
            return Err(StoreError::Conflict(format!(
                "user {user_id} is already a member of course {}",
                self.course_id
            )));
        }
        self.pending.push(user_id);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        {
            let mut record = write(&self.slot.state)?;
            record.members.extend(self.pending.drain(..));
        }
        self.guard.take();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.pending.clear();
        self.guard.take();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Accounts {
    by_id: HashMap<UserId, User>,
    by_email: HashMap<String, UserId>,
}

/// In-memory user store. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    accounts: RwLock<Accounts>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let user = user.into_user(Utc::now());
        let key = normalize_email(&user.email);

        let mut accounts = write(&self.accounts)?;
        if accounts.by_email.contains_key(&key) {
            return Err(StoreError::Conflict(format!("email {key} is already registered")));
        }
        accounts.by_email.insert(key, user.id);
        accounts.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let accounts = read(&self.accounts)?;
        Ok(accounts
            .by_email
            .get(&normalize_email(email))
            .and_then(|id| accounts.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(read(&self.accounts)?.by_id.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroll_courses::{Capacity, CoursePatch};

    fn draft(title: &str, capacity: i64) -> NewCourse {
        NewCourse {
            title: title.to_string(),
            capacity: Capacity::new(capacity).unwrap(),
        }
    }

    #[tokio::test]
    async fn committed_membership_is_counted() {
        let store = InMemoryCourseStore::new();
        let course = store.create_course(draft("Rust", 2)).await.unwrap();
        let student = UserId::new();

        let mut scope = store.lock_course(course.id).await.unwrap().unwrap();
        assert_eq!(scope.snapshot().enrolled, 0);
        scope.insert_membership(student).await.unwrap();
        scope.commit().await.unwrap();
        drop(scope);

        let summary = store.get_course(course.id).await.unwrap().unwrap();
        assert_eq!(summary.students_count, 1);

        let mut scope = store.lock_course(course.id).await.unwrap().unwrap();
        assert!(scope.membership_exists(student).await.unwrap());
    }

    #[tokio::test]
    async fn dropped_scope_discards_inserts_and_releases_lock() {
        let store = InMemoryCourseStore::new().with_lock_timeout(Duration::from_millis(200));
        let course = store.create_course(draft("Rust", 2)).await.unwrap();

        let mut scope = store.lock_course(course.id).await.unwrap().unwrap();
        scope.insert_membership(UserId::new()).await.unwrap();
        drop(scope);

        let scope = store.lock_course(course.id).await.unwrap().unwrap();
        assert_eq!(scope.snapshot().enrolled, 0);
    }

    #[tokio::test]
    async fn duplicate_insert_in_scope_conflicts() {
        let store = InMemoryCourseStore::new();
        let course = store.create_course(draft("Rust", 2)).await.unwrap();
        let student = UserId::new();

        let mut scope = store.lock_course(course.id).await.unwrap().unwrap();
        scope.insert_membership(student).await.unwrap();
        let err = scope.insert_membership(student).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn held_lock_times_out_other_writers() {
        let store = InMemoryCourseStore::new().with_lock_timeout(Duration::from_millis(50));
        let course = store.create_course(draft("Rust", 2)).await.unwrap();

        let _held = store.lock_course(course.id).await.unwrap().unwrap();
        let err = store.lock_course(course.id).await.err().unwrap();
        assert!(err.is_retryable());

        let err = store
            .update_course(course.id, CourseChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        // Reads are not blocked by the writer.
        assert!(store.get_course(course.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn closed_scope_rejects_further_work() {
        let store = InMemoryCourseStore::new();
        let course = store.create_course(draft("Rust", 2)).await.unwrap();

        let mut scope = store.lock_course(course.id).await.unwrap().unwrap();
        scope.commit().await.unwrap();
        assert!(matches!(
            scope.insert_membership(UserId::new()).await,
            Err(StoreError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn update_and_delete() {
        let store = InMemoryCourseStore::new();
        let course = store.create_course(draft("Rust", 5)).await.unwrap();

        let changes = CoursePatch {
            title: Some("Rust II".to_string()),
            capacity: Some(3),
        }
        .validate()
        .unwrap();
        let updated = store.update_course(course.id, changes).await.unwrap().unwrap();
        assert_eq!(updated.title, "Rust II");
        assert_eq!(updated.capacity.get(), 3);

        assert!(store.delete_course(course.id).await.unwrap());
        assert!(!store.delete_course(course.id).await.unwrap());
        assert!(!store.course_exists(course.id).await.unwrap());
        assert!(store.lock_course(course.id).await.unwrap().is_none());
        assert!(
            store
                .update_course(course.id, CourseChanges::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn waiter_sees_deletion_as_missing() {
        let store = Arc::new(InMemoryCourseStore::new());
        let course = store.create_course(draft("Rust", 1)).await.unwrap();

        let held = store.lock_course(course.id).await.unwrap().unwrap();
        let deleter = {
            let store = store.clone();
            tokio::spawn(async move { store.delete_course(course.id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.lock_course(course.id).await.map(|s| s.is_some()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(deleter.await.unwrap().unwrap());
        assert!(!waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn listing_follows_creation_order() {
        let store = InMemoryCourseStore::new();
        for i in 0..5 {
            store.create_course(draft(&format!("C{i}"), 1)).await.unwrap();
        }

        let page = store.list_courses(PageRequest::new(Some(2), Some(2))).await.unwrap();
        let titles: Vec<_> = page.data.iter().map(|s| s.course.title.as_str()).collect();
        assert_eq!(titles, ["C2", "C3"]);
        assert_eq!(page.total, 5);
        assert_eq!(page.last_page, 3);
    }

    #[tokio::test]
    async fn emails_are_unique_case_insensitively() {
        let store = InMemoryUserStore::new();
        let user = store
            .create_user(NewUser::admin("Admin", "Admin@Example.com", "hash".to_string()))
            .await
            .unwrap();

        let err = store
            .create_user(NewUser::admin("Other", "admin@example.COM", "hash".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let found = store.find_by_email(" ADMIN@example.com ").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap().email, "admin@example.com");
    }
}
