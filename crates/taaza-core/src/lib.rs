//! # Taaza Core
//!
//! Core types shared by every Taaza crate: the service-level error type and
//! its HTTP mapping, request validation helpers, the validated [`Email`]
//! value object, and logging initialization.

pub mod email;
pub mod error;
pub mod result;
pub mod telemetry;
pub mod validation;

pub use email::*;
pub use error::*;
pub use result::*;
pub use telemetry::*;
pub use validation::*;
