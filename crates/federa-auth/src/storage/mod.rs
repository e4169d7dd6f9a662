//! Storage traits for identity data and rate-limit counters.
//!
//! This module defines storage interfaces for:
//!
//! - Users and their provider identities ([`IdentityStorage`])
//! - Ephemeral login attempt counters ([`RateLimitStore`])
//!
//! # Implementations
//!
//! - `federa-auth-memory` - in-process storage with the same uniqueness and
//!   atomicity guarantees a relational backend gives

pub mod rate_limit;
pub mod user;

pub use rate_limit::{RateLimitCounter, RateLimitStore};
pub use user::{IdentityStorage, LoginCommit, ProviderIdentity, User, UserBuilder, username_for};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// `(backend, provider_uid)` is already linked to a user.
    #[error("Identity {backend}/{provider_uid} is already linked")]
    IdentityTaken {
        /// The backend name.
        backend: String,
        /// The provider uid.
        provider_uid: String,
    },

    /// The user already holds an identity for this backend.
    #[error("User {user_id} already has an identity for backend {backend}")]
    BackendAlreadyLinked {
        /// The user id.
        user_id: String,
        /// The backend name.
        backend: String,
    },

    /// The email address is already used by another user.
    #[error("Email address already in use: {0}")]
    EmailTaken(String),

    /// The user to update does not exist.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Any other failure of the underlying store.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Returns `true` if this error is a uniqueness conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::IdentityTaken { .. } | Self::BackendAlreadyLinked { .. } | Self::EmailTaken(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_predicate() {
        assert!(StorageError::identity_taken("koha", "1").is_conflict());
        assert!(StorageError::EmailTaken("a@b.fi".to_string()).is_conflict());
        assert!(!StorageError::Backend("down".to_string()).is_conflict());
        assert!(!StorageError::UserNotFound("x".to_string()).is_conflict());
    }
}
