//! User and provider identity storage.
//!
//! Defines the canonical [`User`], the durable [`ProviderIdentity`] link and
//! the [`IdentityStorage`] trait. Implementations live in separate crates
//! (e.g. `federa-auth-memory`).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{StorageError, StorageResult};
use crate::types::AuthDetails;

// =============================================================================
// Provider Identity
// =============================================================================

/// Durable link between a local user and one `(backend, provider_uid)` pair.
///
/// `(backend, provider_uid)` is unique across all users, and a user holds at
/// most one identity per backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    /// Surrogate id of the link.
    pub id: Uuid,

    /// The owning user.
    pub user_id: Uuid,

    /// Name of the backend this identity came through.
    pub backend: String,

    /// Backend-scoped unique identifier.
    pub provider_uid: String,

    /// Provider extra attributes refreshed on every login.
    #[serde(default)]
    pub extra_data: serde_json::Map<String, serde_json::Value>,

    /// When the link was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When extra data was last refreshed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ProviderIdentity {
    /// Creates a new link for `user_id`.
    #[must_use]
    pub fn new(user_id: Uuid, backend: impl Into<String>, provider_uid: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            user_id,
            backend: backend.into(),
            provider_uid: provider_uid.into(),
            extra_data: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if this identity matches the given backend and uid.
    #[must_use]
    pub fn matches(&self, backend: &str, provider_uid: &str) -> bool {
        self.backend == backend && self.provider_uid == provider_uid
    }
}

// =============================================================================
// User Type
// =============================================================================

/// Canonical local account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Permanent surrogate id. Never derived from a provider id.
    pub id: Uuid,

    /// Generated username, unique per user.
    pub username: String,

    /// Email address; unique when the deployment requires it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Given name.
    #[serde(default)]
    pub first_name: String,

    /// Family name.
    #[serde(default)]
    pub last_name: String,

    /// Backend used for the most recent successful login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_backend: Option<String>,

    /// Group claims attached by the group stage.
    #[serde(default)]
    pub groups: Vec<String>,

    /// Scalar claims copied from the most recent login.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// Linked provider identities. Loaded by storage; never written through
    /// a user update.
    #[serde(default)]
    pub identities: Vec<ProviderIdentity>,

    /// When the user was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the user was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Creates a new user with a fresh id and a username derived from it.
    #[must_use]
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            username: username_for(id),
            email: None,
            first_name: String::new(),
            last_name: String::new(),
            last_login_backend: None,
            groups: Vec::new(),
            attributes: HashMap::new(),
            identities: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a new user builder.
    #[must_use]
    pub fn builder() -> UserBuilder {
        UserBuilder::new()
    }

    /// Returns this user's identity for `backend`, if any.
    #[must_use]
    pub fn identity_for(&self, backend: &str) -> Option<&ProviderIdentity> {
        self.identities.iter().find(|i| i.backend == backend)
    }

    /// Returns `true` if the user is linked to `(backend, provider_uid)`.
    #[must_use]
    pub fn has_identity(&self, backend: &str, provider_uid: &str) -> bool {
        self.identities
            .iter()
            .any(|i| i.matches(backend, provider_uid))
    }

    /// Returns `true` if the user is in `group`.
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    /// Merges incoming details into this user.
    ///
    /// Non-empty incoming values replace stored ones; an empty incoming value
    /// never clears a stored field. Returns `true` if anything changed.
    pub fn merge_details(&mut self, details: &AuthDetails) -> bool {
        let mut changed = false;

        if let Some(email) = details.email()
            && self.email.as_deref() != Some(email)
        {
            self.email = Some(email.to_string());
            changed = true;
        }
        changed |= replace_if_non_empty(&mut self.first_name, &details.first_name);
        changed |= replace_if_non_empty(&mut self.last_name, &details.last_name);

        for (name, value) in &details.claims {
            if value.is_empty() {
                continue;
            }
            let value = serde_json::Value::String(value.clone());
            if self.attributes.get(name) != Some(&value) {
                self.attributes.insert(name.clone(), value);
                changed = true;
            }
        }

        if changed {
            self.updated_at = OffsetDateTime::now_utc();
        }
        changed
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}

/// Username for a user id: `u-` followed by the simple uuid form.
#[must_use]
pub fn username_for(id: Uuid) -> String {
    format!("u-{}", id.simple())
}

fn replace_if_non_empty(stored: &mut String, incoming: &str) -> bool {
    let incoming = incoming.trim();
    if incoming.is_empty() || stored == incoming {
        return false;
    }
    *stored = incoming.to_string();
    true
}

// =============================================================================
// User Builder
// =============================================================================

/// Builder for creating `User` instances.
pub struct UserBuilder {
    user: User,
}

impl UserBuilder {
    fn new() -> Self {
        Self { user: User::new() }
    }

    /// Sets the user id and the username derived from it.
    #[must_use]
    pub fn id(mut self, id: Uuid) -> Self {
        self.user.id = id;
        self.user.username = username_for(id);
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.user.email = Some(email.into());
        self
    }

    /// Sets first and last name.
    #[must_use]
    pub fn name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.user.first_name = first.into();
        self.user.last_name = last.into();
        self
    }

    /// Adds a group.
    #[must_use]
    pub fn add_group(mut self, group: impl Into<String>) -> Self {
        self.user.groups.push(group.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn add_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.user.attributes.insert(key.into(), value);
        self
    }

    /// Builds the user.
    #[must_use]
    pub fn build(self) -> User {
        self.user
    }
}

// =============================================================================
// Login Commit
// =============================================================================

/// All writes of one successful login, applied atomically.
///
/// Built by the pipeline's mutating stages and handed to
/// [`IdentityStorage::commit_login`] in one call, so a failure leaves neither
/// an orphan user nor a half-linked identity behind.
#[derive(Debug, Clone)]
pub struct LoginCommit {
    /// Desired state of the user row. `identities` is ignored.
    pub user: User,

    /// Insert the user instead of updating it.
    pub create_user: bool,

    /// The identity used for this login.
    pub identity: ProviderIdentity,

    /// Insert the identity instead of refreshing its extra data.
    pub link_identity: bool,
}

// =============================================================================
// Identity Storage Trait
// =============================================================================

/// Storage operations for users and their provider identities.
///
/// Implementations must enforce uniqueness of `(backend, provider_uid)`, at
/// most one identity per backend per user, and (when configured) unique
/// email, turning a lost race into a [`StorageError`] conflict.
#[async_trait]
pub trait IdentityStorage: Send + Sync {
    /// Find a user by id, identities included.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, user_id: Uuid) -> StorageResult<Option<User>>;

    /// Find the user linked to `(backend, provider_uid)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_identity(
        &self,
        backend: &str,
        provider_uid: &str,
    ) -> StorageResult<Option<User>>;

    /// Find all users whose email matches, case-insensitively.
    ///
    /// More than one result means email uniqueness has been violated.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_email(&self, email: &str) -> StorageResult<Vec<User>>;

    /// Apply a login's writes atomically and return the stored user.
    ///
    /// # Errors
    ///
    /// Returns a conflict if:
    /// - the identity is new and `(backend, provider_uid)` is already linked
    /// - the identity is new and the user already has one for the backend
    /// - the user is new (or changes email) and the email is taken while
    ///   email uniqueness is enforced
    ///
    /// Returns [`StorageError::UserNotFound`] when updating a missing user.
    async fn commit_login(&self, commit: &LoginCommit) -> StorageResult<User>;
}

impl StorageError {
    /// Creates an `IdentityTaken` conflict.
    #[must_use]
    pub fn identity_taken(backend: impl Into<String>, provider_uid: impl Into<String>) -> Self {
        Self::IdentityTaken {
            backend: backend.into(),
            provider_uid: provider_uid.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
