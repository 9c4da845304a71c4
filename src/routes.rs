use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::booking::BookingScheduler;
use crate::error::EngineError;
use crate::models::{
    Booking, BookingDecision, BookingStatus, Enrollment, LessonCompletion, NewBooking,
    PlatformStats, ToggleOutcome,
};
use crate::progress::ProgressTracker;
use crate::store::{BookingStore, CourseCatalog, ProgressStore, UserDirectory};

#[derive(Clone)]
pub struct AppState {
    pub tracker: ProgressTracker,
    pub scheduler: BookingScheduler,
    pub catalog: Arc<dyn CourseCatalog>,
    pub directory: Arc<dyn UserDirectory>,
}

impl AppState {
    /// Wire both engines onto one backend that implements every store trait.
    pub fn for_store<S>(store: Arc<S>) -> Self
    where
        S: ProgressStore + BookingStore + CourseCatalog + UserDirectory + 'static,
    {
        let catalog: Arc<dyn CourseCatalog> = store.clone();
        let directory: Arc<dyn UserDirectory> = store.clone();
        Self {
            tracker: ProgressTracker::new(store.clone(), catalog.clone(), directory.clone()),
            scheduler: BookingScheduler::new(store, directory.clone()),
            catalog,
            directory,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // enrollment + progress
        .route("/api/enrollments", post(enroll))
        .route("/api/lessons/:lesson_id/complete", post(toggle_lesson))
        .route("/api/users/:user_id/enrollments", get(user_enrollments))
        .route("/api/courses/:course_id/enrollments", get(course_enrollments))
        .route(
            "/api/users/:user_id/courses/:course_id/completions",
            get(course_completions),
        )
        // booking lifecycle
        .route("/api/bookings", post(create_booking).get(list_bookings))
        .route("/api/bookings/:booking_id", patch(decide_booking))
        .route("/api/users/:user_id/bookings", get(user_bookings))
        // admin counters + liveness
        .route("/api/stats", get(stats))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Deserialize)]
struct EnrollReq {
    user_id: Uuid,
    course_id: Uuid,
}

async fn enroll(
    State(state): State<AppState>,
    Json(req): Json<EnrollReq>,
) -> Result<(StatusCode, Json<Enrollment>), EngineError> {
    let enrollment = state.tracker.enroll(req.user_id, req.course_id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

#[derive(Deserialize)]
struct ToggleReq {
    user_id: Uuid,
}

async fn toggle_lesson(
    State(state): State<AppState>,
    Path(lesson_id): Path<Uuid>,
    Json(req): Json<ToggleReq>,
) -> Result<Json<ToggleOutcome>, EngineError> {
    let outcome = state
        .tracker
        .toggle_lesson_completion(req.user_id, lesson_id)
        .await?;
    Ok(Json(outcome))
}

async fn user_enrollments(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Enrollment>>, EngineError> {
    Ok(Json(state.tracker.enrollments_for_user(user_id).await?))
}

async fn course_enrollments(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Vec<Enrollment>>, EngineError> {
    Ok(Json(state.tracker.enrollments_for_course(course_id).await?))
}

async fn course_completions(
    State(state): State<AppState>,
    Path((user_id, course_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<LessonCompletion>>, EngineError> {
    Ok(Json(
        state
            .tracker
            .completions_for_course(user_id, course_id)
            .await?,
    ))
}

// Booking input arrives with loose client types; parse by hand so a bad kind
// or timestamp reports invalid_input instead of a generic decode failure.
#[derive(Deserialize)]
struct CreateBookingReq {
    user_id: Uuid,
    #[serde(rename = "type")]
    kind: String,
    start_time: String,
    end_time: String,
    description: String,
}

async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<CreateBookingReq>,
) -> Result<(StatusCode, Json<Booking>), EngineError> {
    let request = NewBooking {
        user_id: req.user_id,
        kind: req.kind.parse()?,
        start_time: parse_instant(&req.start_time, "start_time")?,
        end_time: parse_instant(&req.end_time, "end_time")?,
        description: req.description,
    };
    let booking = state.scheduler.create_booking(request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(Deserialize)]
struct DecideReq {
    decision: String,
}

async fn decide_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<DecideReq>,
) -> Result<Json<Booking>, EngineError> {
    let decision: BookingDecision = req.decision.parse()?;
    Ok(Json(state.scheduler.decide(booking_id, decision).await?))
}

async fn user_bookings(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Booking>>, EngineError> {
    Ok(Json(state.scheduler.bookings_for_user(user_id).await?))
}

#[derive(Deserialize)]
struct BookingFilter {
    status: Option<String>,
}

async fn list_bookings(
    State(state): State<AppState>,
    Query(filter): Query<BookingFilter>,
) -> Result<Json<Vec<Booking>>, EngineError> {
    let status = match filter.status.as_deref() {
        Some(raw) => Some(raw.parse::<BookingStatus>()?),
        None => None,
    };
    Ok(Json(state.scheduler.all_bookings(status).await?))
}

async fn stats(State(state): State<AppState>) -> Result<Json<PlatformStats>, EngineError> {
    let stats = PlatformStats {
        total_courses: state.catalog.course_count().await?,
        total_students: state.directory.student_count().await?,
        total_enrollments: state.tracker.enrollment_count().await?,
        pending_bookings: state.scheduler.pending_booking_count().await?,
    };
    Ok(Json(stats))
}

async fn health() -> &'static str {
    "ok"
}

// --- helpers ---

fn parse_instant(raw: &str, field: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            EngineError::InvalidInput(format!("{field} is not a valid RFC 3339 timestamp"))
        })
}
