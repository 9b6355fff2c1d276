//! Course catalog domain: courses, capacities and the enrollment decision.

pub mod course;
pub mod enrollment;

pub use course::{Capacity, Course, CourseChanges, CourseDraft, CoursePatch, CourseSummary, NewCourse};
pub use enrollment::{CourseSnapshot, Enrollment, Rejection, decide};
