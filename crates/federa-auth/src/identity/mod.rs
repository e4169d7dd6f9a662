//! Identity resolution and account linking.
//!
//! Given `(backend, provider_uid, details)` the resolver finds the local user
//! already linked to that identity, links the identity to an existing user
//! with the same email, or plans a new user. Nothing is written until
//! [`IdentityResolver::commit`] applies the whole plan in one storage call.
//!
//! # Concurrency
//!
//! Two first logins of the same person can race. Storage rejects the loser
//! with a uniqueness conflict; the resolver then re-runs its lookups, which
//! now find the winner's rows, and commits again. A conflict that survives
//! the retries becomes a typed [`ResolveError`].

mod resolver;

use serde::{Deserialize, Serialize};

use crate::storage::{ProviderIdentity, StorageError, User};

pub(crate) use resolver::refresh_extra_data;
pub use resolver::{IdentityResolver, MAX_COMMIT_ATTEMPTS, Retry};

/// Account linking policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityPolicy {
    /// Link a new identity to the existing user with the same email.
    pub link_by_email: bool,

    /// Email addresses are unique across users. Enforced by storage.
    pub unique_email: bool,
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self {
            link_by_email: true,
            unique_email: true,
        }
    }
}

/// Resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The backend requires an email and none was given.
    #[error("Email address is required")]
    EmailRequired,

    /// The email matches more than one user, or is taken.
    #[error("Email address {email} is not unique")]
    DuplicateEmail {
        /// The email address.
        email: String,
    },

    /// The user already has a different identity for this backend.
    #[error("User {user_id} already has another identity on backend {backend}")]
    ConflictingAssociation {
        /// The backend name.
        backend: String,
        /// The user id.
        user_id: String,
    },

    /// Non-conflict storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How the user was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    /// The identity was already linked.
    ExistingIdentity,

    /// The identity was linked to a user found by email.
    LinkedByEmail,

    /// A new user is created.
    Created,
}

impl ResolutionAction {
    /// Returns `true` if a new user was created.
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}

impl std::fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExistingIdentity => write!(f, "existing_identity"),
            Self::LinkedByEmail => write!(f, "linked_by_email"),
            Self::Created => write!(f, "created"),
        }
    }
}

/// Working state of one resolution, filled in stage by stage.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Backend name.
    pub backend: String,

    /// Provider uid.
    pub provider_uid: String,

    /// The resolved or planned user.
    pub user: Option<User>,

    /// How the user was found.
    pub action: Option<ResolutionAction>,

    /// The identity to link or refresh.
    pub identity: Option<ProviderIdentity>,

    /// Whether `identity` is a new link.
    pub link_identity: bool,
}

impl Resolution {
    /// Starts a resolution.
    #[must_use]
    pub fn new(backend: impl Into<String>, provider_uid: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            provider_uid: provider_uid.into(),
            user: None,
            action: None,
            identity: None,
            link_identity: false,
        }
    }

    /// Returns `true` once the identity was found already linked.
    #[must_use]
    pub fn is_existing(&self) -> bool {
        self.action == Some(ResolutionAction::ExistingIdentity)
    }

    /// Returns `true` once a user is attached.
    #[must_use]
    pub fn has_user(&self) -> bool {
        self.user.is_some()
    }
}
