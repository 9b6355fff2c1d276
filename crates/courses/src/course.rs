//! Course entity and its admin-facing inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classroll_core::{CourseId, DomainError, DomainResult, ValidationErrors};

const MAX_TITLE_LEN: usize = 255;

/// Maximum number of simultaneous memberships a course accepts.
///
/// Always at least 1. Bounded by `i32::MAX` so it fits a SQL `INTEGER`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Capacity(u32);

impl Capacity {
    pub const MAX: u32 = i32::MAX as u32;

    pub fn new(value: i64) -> DomainResult<Self> {
        if value < 1 {
            return Err(DomainError::validation("capacity", "The capacity must be at least 1."));
        }
        u32::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
            .ok_or_else(|| DomainError::validation("capacity", "The capacity is too large."))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for Capacity {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Capacity> for u32 {
    fn from(value: Capacity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Capacity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A course as stored. The enrolled count is never stored here; see
/// [`CourseSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub capacity: Capacity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A course together with its membership count at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseSummary {
    #[serde(flatten)]
    pub course: Course,
    pub students_count: u64,
}

/// Admin input for creating a course (unvalidated).
#[derive(Debug, Clone, Deserialize)]
pub struct CourseDraft {
    pub title: String,
    pub capacity: i64,
}

impl CourseDraft {
    pub fn validate(self) -> Result<NewCourse, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let title = check_title(&self.title, &mut errors);
        let capacity = check_capacity(self.capacity, &mut errors);
        errors.into_result()?;

        match (title, capacity) {
            (Some(title), Some(capacity)) => Ok(NewCourse { title, capacity }),
            _ => Err(ValidationErrors::new()),
        }
    }
}

/// A validated course ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCourse {
    pub title: String,
    pub capacity: Capacity,
}

impl NewCourse {
    pub fn into_course(self, now: DateTime<Utc>) -> Course {
        Course {
            id: CourseId::new(),
            title: self.title,
            capacity: self.capacity,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Admin input for updating a course (unvalidated). Absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoursePatch {
    pub title: Option<String>,
    pub capacity: Option<i64>,
}

impl CoursePatch {
    pub fn validate(self) -> Result<CourseChanges, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let title = self.title.as_deref().and_then(|t| check_title(t, &mut errors));
        let capacity = self.capacity.and_then(|c| check_capacity(c, &mut errors));
        errors.into_result()?;
        Ok(CourseChanges { title, capacity })
    }
}

/// Validated course changes.
///
/// Lowering the capacity below the current enrolled count is allowed; it
/// blocks further enrollment but never evicts anyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseChanges {
    pub title: Option<String>,
    pub capacity: Option<Capacity>,
}

impl CourseChanges {
    pub fn apply(&self, course: &mut Course, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            course.title = title.clone();
        }
        if let Some(capacity) = self.capacity {
            course.capacity = capacity;
        }
        course.updated_at = now;
    }
}

fn check_title(raw: &str, errors: &mut ValidationErrors) -> Option<String> {
    let title = raw.trim();
    if title.is_empty() {
        errors.add("title", "The title field is required.");
        None
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.add("title", "The title may not be greater than 255 characters.");
        None
    } else {
        Some(title.to_string())
    }
}

fn check_capacity(raw: i64, errors: &mut ValidationErrors) -> Option<Capacity> {
    match Capacity::new(raw) {
        Ok(capacity) => Some(capacity),
        Err(DomainError::Validation(e)) => {
            for msg in e.messages("capacity") {
                errors.add("capacity", msg.clone());
            }
            None
        }
        Err(other) => {
            errors.add("capacity", other.to_string());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn draft_trims_title() {
        let course = CourseDraft {
            title: "  Rust 101 ".to_string(),
            capacity: 30,
        }
        .validate()
        .unwrap();
        assert_eq!(course.title, "Rust 101");
        assert_eq!(course.capacity.get(), 30);
    }

    #[test]
    fn draft_reports_every_bad_field() {
        let errors = CourseDraft {
            title: " ".to_string(),
            capacity: 0,
        }
        .validate()
        .unwrap_err();
        assert!(errors.contains("title"));
        assert!(errors.contains("capacity"));
    }

    #[test]
    fn overlong_title_is_rejected() {
        let errors = CourseDraft {
            title: "x".repeat(256),
            capacity: 1,
        }
        .validate()
        .unwrap_err();
        assert!(errors.contains("title"));
    }

    #[test]
    fn empty_patch_only_touches_timestamp() {
        let mut course = NewCourse {
            title: "Algebra".to_string(),
            capacity: Capacity::new(5).unwrap(),
        }
        .into_course(Utc::now());
        let before = course.clone();

        let later = before.updated_at + chrono::Duration::seconds(1);
        CoursePatch::default().validate().unwrap().apply(&mut course, later);

        assert_eq!(course.title, before.title);
        assert_eq!(course.capacity, before.capacity);
        assert_eq!(course.updated_at, later);
    }

    #[test]
    fn patch_may_lower_capacity() {
        let changes = CoursePatch {
            title: None,
            capacity: Some(3),
        }
        .validate()
        .unwrap();
        assert_eq!(changes.capacity, Some(Capacity::new(3).unwrap()));
    }

    #[test]
    fn patch_rejects_zero_capacity() {
        let errors = CoursePatch {
            title: Some("ok".to_string()),
            capacity: Some(0),
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.messages("capacity"), ["The capacity must be at least 1.".to_string()]);
    }

    #[test]
    fn summary_serializes_flat() {
        let course = NewCourse {
            title: "Databases".to_string(),
            capacity: Capacity::new(2).unwrap(),
        }
        .into_course(Utc::now());
        let json = serde_json::to_value(CourseSummary {
            course,
            students_count: 1,
        })
        .unwrap();
        assert_eq!(json["title"], "Databases");
        assert_eq!(json["capacity"], 2);
        assert_eq!(json["students_count"], 1);
    }

    proptest! {
        #[test]
        fn capacity_accepts_exactly_the_positive_sql_range(value in any::<i64>()) {
            let ok = Capacity::new(value).is_ok();
            prop_assert_eq!(ok, value >= 1 && value <= i64::from(i32::MAX));
        }
    }
}
