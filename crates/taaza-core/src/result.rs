//! Result type aliases.

use crate::TaazaError;

/// A specialized `Result` type for Taaza service operations.
pub type TaazaResult<T> = Result<T, TaazaError>;
