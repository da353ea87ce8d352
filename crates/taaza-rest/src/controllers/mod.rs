//! REST API controllers.

pub mod email_controller;
pub mod health_controller;
