//! Storage seams for the engine. The catalog and user directory are owned
//! by the wider platform and only read here; enrollments, completions and
//! bookings are owned by this service and mutated through the traits below.
//! Each mutating method is one atomic unit against the backing store.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    Booking, BookingDecision, BookingStatus, Enrollment, LessonCompletion, NewBooking,
    ToggleOutcome,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Read-only view of courses and lessons.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn course_exists(&self, course_id: Uuid) -> Result<bool, EngineError>;

    /// Course a lesson belongs to, or `None` for an unknown lesson.
    async fn course_for_lesson(&self, lesson_id: Uuid) -> Result<Option<Uuid>, EngineError>;

    async fn lesson_count(&self, course_id: Uuid) -> Result<i64, EngineError>;

    async fn course_count(&self) -> Result<i64, EngineError>;
}

/// Read-only view of platform users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, EngineError>;

    async fn student_count(&self) -> Result<i64, EngineError>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Insert a fresh enrollment at zero percent. Fails with `Conflict` when
    /// the (user, course) pair already exists.
    async fn insert_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Enrollment, EngineError>;

    /// Flip one lesson's completion flag and rewrite the enrollment's
    /// percentage from fresh counts, all in one atomic step. Fails with
    /// `Forbidden` when the user is not enrolled in the lesson's course.
    async fn toggle_completion(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        course_id: Uuid,
    ) -> Result<ToggleOutcome, EngineError>;

    async fn enrollments_for_user(&self, user_id: Uuid) -> Result<Vec<Enrollment>, EngineError>;

    async fn enrollments_for_course(
        &self,
        course_id: Uuid,
    ) -> Result<Vec<Enrollment>, EngineError>;

    /// Completion rows a user holds within one course. Fails with
    /// `Forbidden` when the user is not enrolled.
    async fn completions_for_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<LessonCompletion>, EngineError>;

    async fn enrollment_count(&self) -> Result<i64, EngineError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Persist a validated booking in `Pending` status.
    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, EngineError>;

    /// Apply an admin decision to a booking that is still pending. Fails
    /// with `NotFound` for an unknown id and `InvalidState` when the
    /// booking already left `Pending`.
    async fn apply_decision(
        &self,
        booking_id: Uuid,
        decision: BookingDecision,
    ) -> Result<Booking, EngineError>;

    async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, EngineError>;

    /// All bookings, optionally narrowed to one status, newest session first.
    async fn all_bookings(
        &self,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, EngineError>;

    async fn pending_booking_count(&self) -> Result<i64, EngineError>;
}
