//! Enrollment and progress tracking. Owns the enrollments and
//! lesson_completions tables; consults the course catalog and user
//! directory but never writes through them.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Enrollment, LessonCompletion, ToggleOutcome};
use crate::store::{CourseCatalog, ProgressStore, UserDirectory};

#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    catalog: Arc<dyn CourseCatalog>,
    directory: Arc<dyn UserDirectory>,
}

impl ProgressTracker {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        catalog: Arc<dyn CourseCatalog>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            store,
            catalog,
            directory,
        }
    }

    /// Enroll a user into a course at zero percent progress.
    pub async fn enroll(&self, user_id: Uuid, course_id: Uuid) -> Result<Enrollment, EngineError> {
        if !self.directory.user_exists(user_id).await? {
            return Err(EngineError::NotFound(format!("user {user_id}")));
        }
        if !self.catalog.course_exists(course_id).await? {
            return Err(EngineError::NotFound(format!("course {course_id}")));
        }
        let enrollment = self.store.insert_enrollment(user_id, course_id).await?;
        tracing::info!(%user_id, %course_id, "user enrolled");
        Ok(enrollment)
    }

    /// Flip one lesson's completion flag for a user and recompute the
    /// enrollment percentage from the course's full lesson set.
    pub async fn toggle_lesson_completion(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<ToggleOutcome, EngineError> {
        let course_id = self
            .catalog
            .course_for_lesson(lesson_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("lesson {lesson_id}")))?;
        let outcome = self
            .store
            .toggle_completion(user_id, lesson_id, course_id)
            .await?;
        tracing::debug!(
            %user_id,
            %lesson_id,
            completed = outcome.completed,
            percent = outcome.progress_percent,
            "lesson completion toggled"
        );
        Ok(outcome)
    }

    /// Every enrollment the user holds, newest first. Unknown users simply
    /// hold none.
    pub async fn enrollments_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Enrollment>, EngineError> {
        self.store.enrollments_for_user(user_id).await
    }

    /// Roster of a course, newest enrollment first.
    pub async fn enrollments_for_course(
        &self,
        course_id: Uuid,
    ) -> Result<Vec<Enrollment>, EngineError> {
        if !self.catalog.course_exists(course_id).await? {
            return Err(EngineError::NotFound(format!("course {course_id}")));
        }
        self.store.enrollments_for_course(course_id).await
    }

    /// Completion rows the user holds within one course, most recently
    /// touched first.
    pub async fn completions_for_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<LessonCompletion>, EngineError> {
        self.store.completions_for_course(user_id, course_id).await
    }

    pub async fn enrollment_count(&self) -> Result<i64, EngineError> {
        self.store.enrollment_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn setup() -> (ProgressTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tracker = ProgressTracker::new(store.clone(), store.clone(), store.clone());
        (tracker, store)
    }

    async fn seed_course_with_lessons(store: &MemoryStore, lessons: usize) -> (Uuid, Vec<Uuid>) {
        let course = store.seed_course().await;
        let mut ids = Vec::with_capacity(lessons);
        for _ in 0..lessons {
            ids.push(store.seed_lesson(course).await);
        }
        (course, ids)
    }

    #[tokio::test]
    async fn enroll_starts_at_zero_percent() {
        let (tracker, store) = setup().await;
        let user = store.seed_student().await;
        let (course, _) = seed_course_with_lessons(&store, 3).await;

        let enrollment = tracker.enroll(user, course).await.unwrap();
        assert_eq!(enrollment.user_id, user);
        assert_eq!(enrollment.course_id, course);
        assert_eq!(enrollment.progress_percent, 0);
    }

    #[tokio::test]
    async fn enroll_rejects_unknown_course() {
        let (tracker, store) = setup().await;
        let user = store.seed_student().await;

        let err = tracker.enroll(user, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn enroll_rejects_unknown_user() {
        let (tracker, store) = setup().await;
        let (course, _) = seed_course_with_lessons(&store, 1).await;

        let err = tracker.enroll(Uuid::new_v4(), course).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn double_enroll_conflicts_and_keeps_one_row() {
        let (tracker, store) = setup().await;
        let user = store.seed_student().await;
        let (course, _) = seed_course_with_lessons(&store, 2).await;

        tracker.enroll(user, course).await.unwrap();
        let err = tracker.enroll(user, course).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        let mine = tracker.enrollments_for_user(user).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].progress_percent, 0);
    }

    #[tokio::test]
    async fn three_lesson_walkthrough() {
        let (tracker, store) = setup().await;
        let user = store.seed_student().await;
        let (course, lessons) = seed_course_with_lessons(&store, 3).await;
        assert_eq!(store.lesson_count(course).await.unwrap(), 3);
        tracker.enroll(user, course).await.unwrap();

        let first = tracker
            .toggle_lesson_completion(user, lessons[0])
            .await
            .unwrap();
        assert!(first.completed);
        assert_eq!(first.progress_percent, 33);

        let second = tracker
            .toggle_lesson_completion(user, lessons[1])
            .await
            .unwrap();
        assert_eq!(second.progress_percent, 67);

        let third = tracker
            .toggle_lesson_completion(user, lessons[2])
            .await
            .unwrap();
        assert_eq!(third.progress_percent, 100);

        let undone = tracker
            .toggle_lesson_completion(user, lessons[2])
            .await
            .unwrap();
        assert!(!undone.completed);
        assert_eq!(undone.progress_percent, 67);
    }

    #[tokio::test]
    async fn double_toggle_restores_prior_percentage() {
        let (tracker, store) = setup().await;
        let user = store.seed_student().await;
        let (course, lessons) = seed_course_with_lessons(&store, 4).await;
        tracker.enroll(user, course).await.unwrap();

        tracker
            .toggle_lesson_completion(user, lessons[0])
            .await
            .unwrap();
        let up = tracker
            .toggle_lesson_completion(user, lessons[1])
            .await
            .unwrap();
        assert_eq!(up.progress_percent, 50);

        let down = tracker
            .toggle_lesson_completion(user, lessons[1])
            .await
            .unwrap();
        assert!(!down.completed);
        assert_eq!(down.progress_percent, 25);
    }

    #[tokio::test]
    async fn toggle_rejects_unknown_lesson() {
        let (tracker, store) = setup().await;
        let user = store.seed_student().await;
        let (course, _) = seed_course_with_lessons(&store, 1).await;
        tracker.enroll(user, course).await.unwrap();

        let err = tracker
            .toggle_lesson_completion(user, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn toggle_requires_enrollment() {
        let (tracker, store) = setup().await;
        let user = store.seed_student().await;
        let (_, lessons) = seed_course_with_lessons(&store, 2).await;

        let err = tracker
            .toggle_lesson_completion(user, lessons[0])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn progress_is_tracked_per_user() {
        let (tracker, store) = setup().await;
        let alice = store.seed_student().await;
        let bob = store.seed_student().await;
        let (course, lessons) = seed_course_with_lessons(&store, 2).await;
        tracker.enroll(alice, course).await.unwrap();
        tracker.enroll(bob, course).await.unwrap();

        tracker
            .toggle_lesson_completion(alice, lessons[0])
            .await
            .unwrap();

        let alice_rows = tracker.enrollments_for_user(alice).await.unwrap();
        let bob_rows = tracker.enrollments_for_user(bob).await.unwrap();
        assert_eq!(alice_rows[0].progress_percent, 50);
        assert_eq!(bob_rows[0].progress_percent, 0);
    }

    #[tokio::test]
    async fn course_roster_requires_known_course() {
        let (tracker, store) = setup().await;
        let user = store.seed_student().await;
        let (course, _) = seed_course_with_lessons(&store, 1).await;
        tracker.enroll(user, course).await.unwrap();

        let roster = tracker.enrollments_for_course(course).await.unwrap();
        assert_eq!(roster.len(), 1);

        let err = tracker
            .enrollments_for_course(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn completions_listing_requires_enrollment() {
        let (tracker, store) = setup().await;
        let user = store.seed_student().await;
        let outsider = store.seed_student().await;
        let (course, lessons) = seed_course_with_lessons(&store, 3).await;
        tracker.enroll(user, course).await.unwrap();

        tracker
            .toggle_lesson_completion(user, lessons[0])
            .await
            .unwrap();
        tracker
            .toggle_lesson_completion(user, lessons[1])
            .await
            .unwrap();
        tracker
            .toggle_lesson_completion(user, lessons[1])
            .await
            .unwrap();

        let rows = tracker.completions_for_course(user, course).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().filter(|r| r.completed).count(), 1);

        let err = tracker
            .completions_for_course(outsider, course)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }
}
