//! Error types for checked access.

use thiserror::Error;

/// Failure of a checked lookup such as [`RobinMap::at`](crate::RobinMap::at).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum AccessError {
    /// The requested key has no entry in the map.
    #[error("key not found")]
    KeyNotFound,
}
