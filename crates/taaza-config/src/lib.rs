//! # Taaza Config
//!
//! Configuration management for the Taaza email service.
//! Supports layered configuration from files, environment variables, the
//! legacy variables of earlier deployments, and runtime refresh.

mod app_config;
mod loader;

pub use app_config::*;
pub use loader::*;
