//! # Taaza Server
//!
//! Wires the configuration, queue store, worker pool, and HTTP API into one
//! process.

pub mod app;
pub mod startup;

pub use app::App;
