//! In-memory backend for tests and local development (`STORE=memory`).
//! Every mutation runs under a single write lock, which gives it the same
//! atomicity the Postgres backend gets from a transaction.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    progress_percent, Booking, BookingDecision, BookingStatus, Enrollment, LessonCompletion,
    NewBooking, ToggleOutcome,
};
use crate::store::{BookingStore, CourseCatalog, ProgressStore, UserDirectory};

#[derive(Default)]
struct Tables {
    students: HashSet<Uuid>,
    admins: HashSet<Uuid>,
    courses: HashSet<Uuid>,
    /// lesson id -> owning course id
    lessons: HashMap<Uuid, Uuid>,
    enrollments: HashMap<(Uuid, Uuid), Enrollment>,
    completions: HashMap<(Uuid, Uuid), LessonCompletion>,
    bookings: HashMap<Uuid, Booking>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_student(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.students.insert(id);
        id
    }

    pub async fn seed_admin(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.admins.insert(id);
        id
    }

    pub async fn seed_course(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.courses.insert(id);
        id
    }

    pub async fn seed_lesson(&self, course_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.lessons.insert(id, course_id);
        id
    }
}

#[async_trait]
impl CourseCatalog for MemoryStore {
    async fn course_exists(&self, course_id: Uuid) -> Result<bool, EngineError> {
        Ok(self.tables.read().await.courses.contains(&course_id))
    }

    async fn course_for_lesson(&self, lesson_id: Uuid) -> Result<Option<Uuid>, EngineError> {
        Ok(self.tables.read().await.lessons.get(&lesson_id).copied())
    }

    async fn lesson_count(&self, course_id: Uuid) -> Result<i64, EngineError> {
        let t = self.tables.read().await;
        Ok(t.lessons.values().filter(|&&c| c == course_id).count() as i64)
    }

    async fn course_count(&self) -> Result<i64, EngineError> {
        Ok(self.tables.read().await.courses.len() as i64)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, EngineError> {
        let t = self.tables.read().await;
        Ok(t.students.contains(&user_id) || t.admins.contains(&user_id))
    }

    async fn student_count(&self) -> Result<i64, EngineError> {
        Ok(self.tables.read().await.students.len() as i64)
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn insert_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Enrollment, EngineError> {
        let mut t = self.tables.write().await;
        if t.enrollments.contains_key(&(user_id, course_id)) {
            return Err(EngineError::Conflict(format!(
                "user {user_id} already enrolled in course {course_id}"
            )));
        }
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            progress_percent: 0,
            created_at: Utc::now(),
        };
        t.enrollments.insert((user_id, course_id), enrollment.clone());
        Ok(enrollment)
    }

    async fn toggle_completion(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        course_id: Uuid,
    ) -> Result<ToggleOutcome, EngineError> {
        let mut t = self.tables.write().await;
        if !t.enrollments.contains_key(&(user_id, course_id)) {
            return Err(EngineError::Forbidden(format!(
                "user {user_id} is not enrolled in course {course_id}"
            )));
        }
        let now = Utc::now();
        let completed = {
            let flag = t
                .completions
                .entry((user_id, lesson_id))
                .or_insert_with(|| LessonCompletion {
                    user_id,
                    lesson_id,
                    completed: false,
                    updated_at: now,
                });
            flag.completed = !flag.completed;
            flag.updated_at = now;
            flag.completed
        };
        let total = t.lessons.values().filter(|&&c| c == course_id).count() as i64;
        let done = t
            .completions
            .iter()
            .filter(|((u, l), flag)| {
                *u == user_id && flag.completed && t.lessons.get(l) == Some(&course_id)
            })
            .count() as i64;
        let percent = progress_percent(done, total);
        if let Some(enrollment) = t.enrollments.get_mut(&(user_id, course_id)) {
            enrollment.progress_percent = percent;
        }
        Ok(ToggleOutcome {
            completed,
            progress_percent: percent,
        })
    }

    async fn enrollments_for_user(&self, user_id: Uuid) -> Result<Vec<Enrollment>, EngineError> {
        let t = self.tables.read().await;
        let mut rows: Vec<Enrollment> = t
            .enrollments
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn enrollments_for_course(
        &self,
        course_id: Uuid,
    ) -> Result<Vec<Enrollment>, EngineError> {
        let t = self.tables.read().await;
        let mut rows: Vec<Enrollment> = t
            .enrollments
            .values()
            .filter(|e| e.course_id == course_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn completions_for_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<LessonCompletion>, EngineError> {
        let t = self.tables.read().await;
        if !t.enrollments.contains_key(&(user_id, course_id)) {
            return Err(EngineError::Forbidden(format!(
                "user {user_id} is not enrolled in course {course_id}"
            )));
        }
        let mut rows: Vec<LessonCompletion> = t
            .completions
            .iter()
            .filter(|((u, l), _)| *u == user_id && t.lessons.get(l) == Some(&course_id))
            .map(|(_, flag)| flag.clone())
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    async fn enrollment_count(&self) -> Result<i64, EngineError> {
        Ok(self.tables.read().await.enrollments.len() as i64)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, EngineError> {
        let mut t = self.tables.write().await;
        let row = Booking {
            id: Uuid::new_v4(),
            user_id: booking.user_id,
            kind: booking.kind,
            start_time: booking.start_time,
            end_time: booking.end_time,
            description: booking.description,
            status: BookingStatus::Pending,
            created_at: Utc::now(),
        };
        t.bookings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn apply_decision(
        &self,
        booking_id: Uuid,
        decision: BookingDecision,
    ) -> Result<Booking, EngineError> {
        let mut t = self.tables.write().await;
        let booking = t
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| EngineError::NotFound(format!("booking {booking_id}")))?;
        if booking.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "booking {booking_id} is already {}",
                booking.status
            )));
        }
        booking.status = decision.target_status();
        Ok(booking.clone())
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, EngineError> {
        let t = self.tables.read().await;
        let mut rows: Vec<Booking> = t
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(rows)
    }

    async fn all_bookings(
        &self,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, EngineError> {
        let t = self.tables.read().await;
        let mut rows: Vec<Booking> = t
            .bookings
            .values()
            .filter(|b| status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(rows)
    }

    async fn pending_booking_count(&self) -> Result<i64, EngineError> {
        let t = self.tables.read().await;
        Ok(t.bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending)
            .count() as i64)
    }
}
