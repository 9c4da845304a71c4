//! Enrollment-progress and session-booking engine for a course platform.
//! State lives entirely in the backing store; every public operation is a
//! single atomic unit, so the service scales horizontally with no
//! coordination beyond the store itself.

pub mod booking;
pub mod db;
pub mod error;
pub mod models;
pub mod progress;
pub mod routes;
pub mod store;
