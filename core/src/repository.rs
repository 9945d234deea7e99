//! Storage boundary shared by the per-service repository traits.
//!
//! Persistence itself is out of scope for the choreography layer; each
//! service assumes a repository interface (get/add/update/list) and this
//! module only supplies the error type those interfaces surface.

use thiserror::Error;

/// Error raised by a repository implementation.
#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    /// The storage backend failed.
    #[error("storage backend failure: {0}")]
    Backend(String),
}
