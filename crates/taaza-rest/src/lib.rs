//! # Taaza REST
//!
//! REST API layer using Axum for the Taaza email service.
//! Exposes the producer endpoints, queue statistics, the dead-letter list,
//! and health checks.

pub mod controllers;
pub mod extractors;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;

pub use router::*;
pub use state::*;
