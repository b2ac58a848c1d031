//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map service errors to a string for CLI output.
///
/// Pipeline failures are prefixed with their stable category so scripts can match on it.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::Pipeline(err) => format!("[{}] {}", err.category(), e),
        other => other.to_string(),
    }
}
