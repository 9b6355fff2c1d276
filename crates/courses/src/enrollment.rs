//! The enrollment decision.
//!
//! [`decide`] is a pure function of a course snapshot taken inside the
//! course's lock scope. Callers must not reuse a snapshot across scopes.

use serde::Serialize;
use thiserror::Error;

use classroll_core::{CourseId, UserId};

use crate::course::Capacity;

/// Capacity and membership count observed under the course lock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CourseSnapshot {
    pub capacity: Capacity,
    pub enrolled: u64,
}

impl CourseSnapshot {
    pub fn new(capacity: Capacity, enrolled: u64) -> Self {
        Self { capacity, enrolled }
    }

    pub fn has_room(&self) -> bool {
        self.enrolled < u64::from(self.capacity.get())
    }

    /// Seats left; zero when the course is at or over capacity.
    pub fn remaining(&self) -> u64 {
        u64::from(self.capacity.get()).saturating_sub(self.enrolled)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("already enrolled in this course")]
    AlreadyEnrolled,

    #[error("course is full")]
    CourseFull,
}

/// Decide whether one more membership may be created.
///
/// A duplicate is reported before fullness so a member of a full course
/// gets `AlreadyEnrolled`. Fullness is `enrolled >= capacity`, which also
/// covers courses whose capacity was lowered below their headcount.
pub fn decide(snapshot: &CourseSnapshot, already_member: bool) -> Result<(), Rejection> {
    if already_member {
        return Err(Rejection::AlreadyEnrolled);
    }
    if !snapshot.has_room() {
        return Err(Rejection::CourseFull);
    }
    Ok(())
}

/// Outcome of a successful enrollment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Enrollment {
    pub course_id: CourseId,
    pub user_id: UserId,
    /// Headcount after this enrollment.
    pub enrolled: u64,
    pub capacity: Capacity,
}
