//! Booking lifecycle. A booking is created `PENDING` and moves exactly once,
//! to `CONFIRMED` or `CANCELLED`, by an admin decision. Terminal rows are
//! kept forever; nothing here deletes.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Booking, BookingDecision, BookingStatus, NewBooking};
use crate::store::{BookingStore, UserDirectory};

#[derive(Clone)]
pub struct BookingScheduler {
    store: Arc<dyn BookingStore>,
    directory: Arc<dyn UserDirectory>,
}

impl BookingScheduler {
    pub fn new(store: Arc<dyn BookingStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { store, directory }
    }

    /// File a new session request. Overlapping windows are allowed; sorting
    /// those out is what the admin review queue is for.
    pub async fn create_booking(&self, request: NewBooking) -> Result<Booking, EngineError> {
        request.validate()?;
        if !self.directory.user_exists(request.user_id).await? {
            return Err(EngineError::NotFound(format!("user {}", request.user_id)));
        }
        let booking = self.store.insert_booking(request).await?;
        tracing::info!(
            booking_id = %booking.id,
            user_id = %booking.user_id,
            kind = %booking.kind,
            "booking requested"
        );
        Ok(booking)
    }

    /// Apply an admin decision. Role enforcement is the caller's contract;
    /// this only guards the state machine.
    pub async fn decide(
        &self,
        booking_id: Uuid,
        decision: BookingDecision,
    ) -> Result<Booking, EngineError> {
        let booking = self.store.apply_decision(booking_id, decision).await?;
        tracing::info!(booking_id = %booking.id, status = %booking.status, "booking decided");
        Ok(booking)
    }

    /// A user's own bookings, newest session first.
    pub async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, EngineError> {
        self.store.bookings_for_user(user_id).await
    }

    /// The review queue, optionally narrowed to one status.
    pub async fn all_bookings(
        &self,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, EngineError> {
        self.store.all_bookings(status).await
    }

    pub async fn pending_booking_count(&self) -> Result<i64, EngineError> {
        self.store.pending_booking_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingKind;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    async fn setup() -> (BookingScheduler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let scheduler = BookingScheduler::new(store.clone(), store.clone());
        (scheduler, store)
    }

    fn request(user_id: Uuid, hours_from_now: i64) -> NewBooking {
        let start = Utc::now() + Duration::hours(hours_from_now);
        NewBooking {
            user_id,
            kind: BookingKind::Doubt,
            start_time: start,
            end_time: start + Duration::minutes(30),
            description: "ownership questions".into(),
        }
    }

    #[tokio::test]
    async fn new_booking_is_pending() {
        let (scheduler, store) = setup().await;
        let user = store.seed_student().await;

        let booking = scheduler.create_booking(request(user, 2)).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.kind, BookingKind::Doubt);
        assert_eq!(booking.user_id, user);
    }

    #[tokio::test]
    async fn create_rejects_inverted_window() {
        let (scheduler, store) = setup().await;
        let user = store.seed_student().await;

        let mut req = request(user, 2);
        req.end_time = req.start_time - Duration::minutes(30);
        let err = scheduler.create_booking(req).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let mut req = request(user, 2);
        req.end_time = req.start_time;
        let err = scheduler.create_booking(req).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_rejects_blank_description() {
        let (scheduler, store) = setup().await;
        let user = store.seed_student().await;

        let mut req = request(user, 1);
        req.description = "   ".into();
        let err = scheduler.create_booking(req).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_rejects_unknown_user() {
        let (scheduler, _) = setup().await;

        let err = scheduler
            .create_booking(request(Uuid::new_v4(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn confirm_moves_pending_to_confirmed() {
        let (scheduler, store) = setup().await;
        let user = store.seed_student().await;
        let booking = scheduler.create_booking(request(user, 2)).await.unwrap();

        let decided = scheduler
            .decide(booking.id, BookingDecision::Confirm)
            .await
            .unwrap();
        assert_eq!(decided.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn reject_moves_pending_to_cancelled() {
        let (scheduler, store) = setup().await;
        let user = store.seed_student().await;
        let booking = scheduler.create_booking(request(user, 2)).await.unwrap();

        let decided = scheduler
            .decide(booking.id, BookingDecision::Reject)
            .await
            .unwrap();
        assert_eq!(decided.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn second_decision_fails_invalid_state() {
        let (scheduler, store) = setup().await;
        let user = store.seed_student().await;
        let booking = scheduler.create_booking(request(user, 2)).await.unwrap();

        scheduler
            .decide(booking.id, BookingDecision::Confirm)
            .await
            .unwrap();
        let err = scheduler
            .decide(booking.id, BookingDecision::Reject)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn cancelled_booking_stays_cancelled() {
        let (scheduler, store) = setup().await;
        let user = store.seed_student().await;
        let booking = scheduler.create_booking(request(user, 2)).await.unwrap();

        scheduler
            .decide(booking.id, BookingDecision::Reject)
            .await
            .unwrap();
        let err = scheduler
            .decide(booking.id, BookingDecision::Confirm)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        let mine = scheduler.bookings_for_user(user).await.unwrap();
        assert_eq!(mine[0].status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn decide_rejects_unknown_booking() {
        let (scheduler, _) = setup().await;

        let err = scheduler
            .decide(Uuid::new_v4(), BookingDecision::Confirm)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn queue_filters_by_status_and_sorts_newest_first() {
        let (scheduler, store) = setup().await;
        let user = store.seed_student().await;
        let early = scheduler.create_booking(request(user, 1)).await.unwrap();
        let late = scheduler.create_booking(request(user, 5)).await.unwrap();
        let middle = scheduler.create_booking(request(user, 3)).await.unwrap();
        scheduler
            .decide(middle.id, BookingDecision::Confirm)
            .await
            .unwrap();

        let queue = scheduler.all_bookings(None).await.unwrap();
        let order: Vec<Uuid> = queue.iter().map(|b| b.id).collect();
        assert_eq!(order, vec![late.id, middle.id, early.id]);

        let pending = scheduler
            .all_bookings(Some(BookingStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|b| b.status == BookingStatus::Pending));
    }

    #[tokio::test]
    async fn user_listing_is_scoped_to_the_user() {
        let (scheduler, store) = setup().await;
        let alice = store.seed_student().await;
        let bob = store.seed_student().await;
        scheduler.create_booking(request(alice, 1)).await.unwrap();
        scheduler.create_booking(request(alice, 2)).await.unwrap();
        scheduler.create_booking(request(bob, 3)).await.unwrap();

        let alice_rows = scheduler.bookings_for_user(alice).await.unwrap();
        let bob_rows = scheduler.bookings_for_user(bob).await.unwrap();
        assert_eq!(alice_rows.len(), 2);
        assert_eq!(bob_rows.len(), 1);
        assert!(alice_rows.iter().all(|b| b.user_id == alice));
    }
}
