use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// A user's membership in one course. `progress_percent` is denormalized
/// from lesson completions and rewritten on every toggle.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub progress_percent: i32,
    pub created_at: DateTime<Utc>,
}

/// Per-user, per-lesson completion flag. Rows persist once created; a
/// re-toggle flips `completed` instead of deleting the row.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct LessonCompletion {
    pub user_id: Uuid,
    pub lesson_id: Uuid,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: BookingKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub description: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "booking_kind", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingKind {
    Doubt,
    Consultation,
}

impl fmt::Display for BookingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Doubt => write!(f, "DOUBT"),
            Self::Consultation => write!(f, "CONSULTATION"),
        }
    }
}

impl FromStr for BookingKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DOUBT" => Ok(Self::Doubt),
            "CONSULTATION" => Ok(Self::Consultation),
            other => Err(EngineError::InvalidInput(format!(
                "unknown booking type {other:?}, expected DOUBT or CONSULTATION"
            ))),
        }
    }
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "booking_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for BookingStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(EngineError::InvalidInput(format!(
                "unknown booking status {other:?}"
            ))),
        }
    }
}

/// Admin verdict on a pending booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingDecision {
    Confirm,
    Reject,
}

impl BookingDecision {
    pub fn target_status(self) -> BookingStatus {
        match self {
            Self::Confirm => BookingStatus::Confirmed,
            Self::Reject => BookingStatus::Cancelled,
        }
    }
}

impl FromStr for BookingDecision {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CONFIRM" => Ok(Self::Confirm),
            "REJECT" => Ok(Self::Reject),
            other => Err(EngineError::InvalidInput(format!(
                "unknown decision {other:?}, expected CONFIRM or REJECT"
            ))),
        }
    }
}

/// Validated payload for a new booking request.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub kind: BookingKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub description: String,
}

impl NewBooking {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.description.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "description must not be blank".into(),
            ));
        }
        if self.end_time <= self.start_time {
            return Err(EngineError::InvalidInput(
                "end_time must be after start_time".into(),
            ));
        }
        Ok(())
    }
}

/// Result of flipping one lesson's completion flag.
#[derive(Serialize, Debug, Clone, Copy)]
pub struct ToggleOutcome {
    pub completed: bool,
    pub progress_percent: i32,
}

#[derive(Serialize, Debug, Clone, Copy)]
pub struct PlatformStats {
    pub total_courses: i64,
    pub total_students: i64,
    pub total_enrollments: i64,
    pub pending_bookings: i64,
}

/// Percentage of lessons completed, rounded half-up. A course with no
/// lessons reports zero.
// Progress is always derived fresh from full counts; an incremental counter
// would drift on missed or replayed toggles.
pub fn progress_percent(completed: i64, total: i64) -> i32 {
    if total <= 0 {
        return 0;
    }
    (100.0 * completed as f64 / total as f64).round() as i32
}
