//! Postgres backend. All engine writes go through single statements or a
//! single transaction, so a crash never leaves a half-applied mutation.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    progress_percent, Booking, BookingDecision, BookingStatus, Enrollment, LessonCompletion,
    NewBooking, ToggleOutcome,
};
use crate::store::{BookingStore, CourseCatalog, ProgressStore, UserDirectory};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseCatalog for PgStore {
    async fn course_exists(&self, course_id: Uuid) -> Result<bool, EngineError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM courses WHERE id = $1)")
                .bind(course_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn course_for_lesson(&self, lesson_id: Uuid) -> Result<Option<Uuid>, EngineError> {
        let course_id: Option<Uuid> = sqlx::query_scalar(
            r#"SELECT s.course_id FROM lessons l
               JOIN sections s ON s.id = l.section_id
               WHERE l.id = $1"#,
        )
        .bind(lesson_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(course_id)
    }

    async fn lesson_count(&self, course_id: Uuid) -> Result<i64, EngineError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM lessons l
               JOIN sections s ON s.id = l.section_id
               WHERE s.course_id = $1"#,
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn course_count(&self) -> Result<i64, EngineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, EngineError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn student_count(&self) -> Result<i64, EngineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'STUDENT'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn insert_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Enrollment, EngineError> {
        sqlx::query_as::<_, Enrollment>(
            r#"INSERT INTO enrollments (user_id, course_id)
               VALUES ($1, $2)
               RETURNING id, user_id, course_id, progress_percent, created_at"#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match EngineError::from(e) {
            EngineError::Conflict(_) => EngineError::Conflict(format!(
                "user {user_id} already enrolled in course {course_id}"
            )),
            other => other,
        })
    }

    async fn toggle_completion(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        course_id: Uuid,
    ) -> Result<ToggleOutcome, EngineError> {
        let mut tx = self.pool.begin().await?;

        // Lock the enrollment row for the whole flip + recount + persist
        // span so concurrent toggles on one enrollment serialize.
        let enrollment_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM enrollments WHERE user_id = $1 AND course_id = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(enrollment_id) = enrollment_id else {
            return Err(EngineError::Forbidden(format!(
                "user {user_id} is not enrolled in course {course_id}"
            )));
        };

        let completed: bool = sqlx::query_scalar(
            r#"INSERT INTO lesson_completions (user_id, lesson_id, completed)
               VALUES ($1, $2, TRUE)
               ON CONFLICT (user_id, lesson_id)
               DO UPDATE SET completed = NOT lesson_completions.completed, updated_at = NOW()
               RETURNING completed"#,
        )
        .bind(user_id)
        .bind(lesson_id)
        .fetch_one(&mut *tx)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM lessons l
               JOIN sections s ON s.id = l.section_id
               WHERE s.course_id = $1"#,
        )
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await?;
        let done: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM lesson_completions c
               JOIN lessons l ON l.id = c.lesson_id
               JOIN sections s ON s.id = l.section_id
               WHERE c.user_id = $1 AND c.completed AND s.course_id = $2"#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await?;

        let percent = progress_percent(done, total);
        sqlx::query("UPDATE enrollments SET progress_percent = $1 WHERE id = $2")
            .bind(percent)
            .bind(enrollment_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(ToggleOutcome {
            completed,
            progress_percent: percent,
        })
    }

    async fn enrollments_for_user(&self, user_id: Uuid) -> Result<Vec<Enrollment>, EngineError> {
        let rows = sqlx::query_as::<_, Enrollment>(
            r#"SELECT id, user_id, course_id, progress_percent, created_at
               FROM enrollments WHERE user_id = $1
               ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn enrollments_for_course(
        &self,
        course_id: Uuid,
    ) -> Result<Vec<Enrollment>, EngineError> {
        let rows = sqlx::query_as::<_, Enrollment>(
            r#"SELECT id, user_id, course_id, progress_percent, created_at
               FROM enrollments WHERE course_id = $1
               ORDER BY created_at DESC"#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn completions_for_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<LessonCompletion>, EngineError> {
        let enrolled: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM enrollments WHERE user_id = $1 AND course_id = $2)",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        if !enrolled {
            return Err(EngineError::Forbidden(format!(
                "user {user_id} is not enrolled in course {course_id}"
            )));
        }
        let rows = sqlx::query_as::<_, LessonCompletion>(
            r#"SELECT c.user_id, c.lesson_id, c.completed, c.updated_at
               FROM lesson_completions c
               JOIN lessons l ON l.id = c.lesson_id
               JOIN sections s ON s.id = l.section_id
               WHERE c.user_id = $1 AND s.course_id = $2
               ORDER BY c.updated_at DESC"#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn enrollment_count(&self) -> Result<i64, EngineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, EngineError> {
        let row = sqlx::query_as::<_, Booking>(
            r#"INSERT INTO bookings (user_id, kind, start_time, end_time, description)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, user_id, kind, start_time, end_time, description, status, created_at"#,
        )
        .bind(booking.user_id)
        .bind(booking.kind)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn apply_decision(
        &self,
        booking_id: Uuid,
        decision: BookingDecision,
    ) -> Result<Booking, EngineError> {
        // Guarded update: only a pending row matches, so two admins racing
        // on the same booking can never both win.
        let updated: Option<Booking> = sqlx::query_as(
            r#"UPDATE bookings SET status = $1
               WHERE id = $2 AND status = 'PENDING'
               RETURNING id, user_id, kind, start_time, end_time, description, status, created_at"#,
        )
        .bind(decision.target_status())
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(booking) = updated {
            return Ok(booking);
        }
        let current: Option<BookingStatus> =
            sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1")
                .bind(booking_id)
                .fetch_optional(&self.pool)
                .await?;
        match current {
            Some(status) => Err(EngineError::InvalidState(format!(
                "booking {booking_id} is already {status}"
            ))),
            None => Err(EngineError::NotFound(format!("booking {booking_id}"))),
        }
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, EngineError> {
        let rows = sqlx::query_as::<_, Booking>(
            r#"SELECT id, user_id, kind, start_time, end_time, description, status, created_at
               FROM bookings WHERE user_id = $1
               ORDER BY start_time DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn all_bookings(
        &self,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, EngineError> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, Booking>(
                    r#"SELECT id, user_id, kind, start_time, end_time, description, status, created_at
                       FROM bookings WHERE status = $1
                       ORDER BY start_time DESC"#,
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Booking>(
                    r#"SELECT id, user_id, kind, start_time, end_time, description, status, created_at
                       FROM bookings
                       ORDER BY start_time DESC"#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    async fn pending_booking_count(&self) -> Result<i64, EngineError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE status = 'PENDING'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
