//! The identity resolver.

use std::sync::Arc;

use time::OffsetDateTime;

use super::{IdentityPolicy, Resolution, ResolutionAction, ResolveError};
use crate::storage::{IdentityStorage, LoginCommit, ProviderIdentity, StorageError, User};
use crate::types::AuthDetails;

/// How many times a plan is committed before a conflict is final.
pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Finds, links or creates the local user for a provider identity.
#[derive(Clone)]
pub struct IdentityResolver {
    storage: Arc<dyn IdentityStorage>,
    policy: IdentityPolicy,
}

impl IdentityResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(storage: Arc<dyn IdentityStorage>, policy: IdentityPolicy) -> Self {
        Self { storage, policy }
    }

    /// The linking policy.
    #[must_use]
    pub fn policy(&self) -> &IdentityPolicy {
        &self.policy
    }

    /// Resolves `(backend, provider_uid)` to a user, committing the result.
    ///
    /// Returns the user and whether it was created by this call. Resolving
    /// the same identity again returns the same user with `created = false`.
    ///
    /// # Errors
    ///
    /// Returns `EmailRequired`, `DuplicateEmail` or `ConflictingAssociation`
    /// when the identity cannot be resolved, or a storage error.
    pub async fn resolve(
        &self,
        backend: &str,
        provider_uid: &str,
        details: &AuthDetails,
        email_required: bool,
    ) -> Result<(User, bool), ResolveError> {
        let mut attempt = 1;
        loop {
            let resolution = self
                .plan(backend, provider_uid, details, email_required)
                .await?;
            match self.commit(resolution).await {
                Ok((user, action)) => return Ok((user, action.is_created())),
                Err(Retry::Conflict(err)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::debug!(backend, attempt, error = %err, "lost a race, resolving again");
                    attempt += 1;
                }
                Err(retry) => return Err(retry.into_error(backend, provider_uid)),
            }
        }
    }

    /// Runs the lookup and planning stages without writing anything.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub async fn plan(
        &self,
        backend: &str,
        provider_uid: &str,
        details: &AuthDetails,
        email_required: bool,
    ) -> Result<Resolution, ResolveError> {
        let mut resolution = Resolution::new(backend, provider_uid);
        self.social_user(&mut resolution).await?;
        if !resolution.is_existing() {
            self.require_email(details, email_required)?;
            self.associate_by_email(&mut resolution, details).await?;
            self.create_user(&mut resolution, details);
            self.check_existing_social_associations(&resolution)?;
        }
        self.associate_user(&mut resolution);
        Ok(resolution)
    }

    /// Attaches the user already linked to the identity, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn social_user(&self, resolution: &mut Resolution) -> Result<(), ResolveError> {
        let found = self
            .storage
            .find_by_identity(&resolution.backend, &resolution.provider_uid)
            .await?;
        if let Some(user) = found {
            tracing::debug!(backend = %resolution.backend, user_id = %user.id, "identity already linked");
            resolution.identity = user
                .identities
                .iter()
                .find(|i| i.matches(&resolution.backend, &resolution.provider_uid))
                .cloned();
            resolution.user = Some(user);
            resolution.action = Some(ResolutionAction::ExistingIdentity);
        }
        Ok(())
    }

    /// Refuses logins without email on backends that need one.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::EmailRequired`].
    pub fn require_email(
        &self,
        details: &AuthDetails,
        email_required: bool,
    ) -> Result<(), ResolveError> {
        if email_required && details.email().is_none() {
            return Err(ResolveError::EmailRequired);
        }
        Ok(())
    }

    /// Attaches the existing user with the same email when linking is on.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::DuplicateEmail`] when more than one user has
    /// the email, or a storage error.
    pub async fn associate_by_email(
        &self,
        resolution: &mut Resolution,
        details: &AuthDetails,
    ) -> Result<(), ResolveError> {
        if resolution.has_user() || !self.policy.link_by_email {
            return Ok(());
        }
        let Some(email) = details.email() else {
            return Ok(());
        };

        let mut matches = self.storage.find_by_email(email).await?;
        match matches.len() {
            0 => Ok(()),
            1 => {
                let user = matches.remove(0);
                tracing::info!(
                    backend = %resolution.backend,
                    user_id = %user.id,
                    "linking identity to existing user by email"
                );
                resolution.user = Some(user);
                resolution.action = Some(ResolutionAction::LinkedByEmail);
                Ok(())
            }
            n => {
                tracing::warn!(backend = %resolution.backend, matches = n, "email shared by several users");
                Err(ResolveError::DuplicateEmail {
                    email: email.to_string(),
                })
            }
        }
    }

    /// Plans a new user from the details when nothing matched.
    pub fn create_user(&self, resolution: &mut Resolution, details: &AuthDetails) {
        if resolution.has_user() {
            return;
        }
        let mut user = User::new();
        user.merge_details(details);
        user.groups = details.groups.clone();
        resolution.user = Some(user);
        resolution.action = Some(ResolutionAction::Created);
    }

    /// Rejects users already holding another identity on the same backend.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::ConflictingAssociation`].
    pub fn check_existing_social_associations(
        &self,
        resolution: &Resolution,
    ) -> Result<(), ResolveError> {
        let Some(user) = resolution.user.as_ref() else {
            return Ok(());
        };
        match user.identity_for(&resolution.backend) {
            Some(existing) if existing.provider_uid != resolution.provider_uid => {
                tracing::warn!(
                    backend = %resolution.backend,
                    user_id = %user.id,
                    "user already linked to another identity on this backend"
                );
                Err(ResolveError::ConflictingAssociation {
                    backend: resolution.backend.clone(),
                    user_id: user.id.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Plans the `(backend, uid) -> user` link when it does not exist yet.
    pub fn associate_user(&self, resolution: &mut Resolution) {
        if resolution.identity.is_some() {
            return;
        }
        if let Some(user) = resolution.user.as_ref() {
            resolution.identity = Some(ProviderIdentity::new(
                user.id,
                resolution.backend.clone(),
                resolution.provider_uid.clone(),
            ));
            resolution.link_identity = true;
        }
    }

    /// Applies a plan in one storage call.
    ///
    /// # Errors
    ///
    /// Returns [`Retry::Conflict`] when the plan lost a uniqueness race and
    /// [`Retry::Fatal`] otherwise.
    pub async fn commit(
        &self,
        resolution: Resolution,
    ) -> Result<(User, ResolutionAction), Retry> {
        let (Some(user), Some(identity), Some(action)) =
            (resolution.user, resolution.identity, resolution.action)
        else {
            return Err(Retry::Fatal(ResolveError::Storage(StorageError::Backend(
                "resolution is incomplete".to_string(),
            ))));
        };

        let commit = LoginCommit {
            user,
            create_user: action.is_created(),
            identity,
            link_identity: resolution.link_identity,
        };

        match self.storage.commit_login(&commit).await {
            Ok(user) => {
                tracing::info!(
                    backend = %resolution.backend,
                    user_id = %user.id,
                    action = %action,
                    "login committed"
                );
                Ok((user, action))
            }
            Err(err) if err.is_conflict() => Err(Retry::Conflict(err)),
            Err(err) => Err(Retry::Fatal(err.into())),
        }
    }
}

/// Outcome of a failed commit.
#[derive(Debug)]
pub enum Retry {
    /// A uniqueness conflict; resolving again may succeed.
    Conflict(StorageError),
    /// Not worth retrying.
    Fatal(ResolveError),
}

impl Retry {
    /// Final error once no more attempts are left.
    #[must_use]
    pub fn into_error(self, backend: &str, provider_uid: &str) -> ResolveError {
        match self {
            Self::Fatal(err) => err,
            Self::Conflict(StorageError::EmailTaken(email)) => ResolveError::DuplicateEmail { email },
            Self::Conflict(StorageError::BackendAlreadyLinked { user_id, backend }) => {
                ResolveError::ConflictingAssociation { backend, user_id }
            }
            Self::Conflict(err) => {
                tracing::error!(backend, provider_uid, error = %err, "conflict persisted after retries");
                ResolveError::ConflictingAssociation {
                    backend: backend.to_string(),
                    user_id: String::new(),
                }
            }
        }
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Refreshes identity extra data with the incoming provider attributes.
pub(crate) fn refresh_extra_data(identity: &mut ProviderIdentity, details: &AuthDetails) {
    if details.extra.is_empty() {
        return;
    }
    for (key, value) in &details.extra {
        identity.extra_data.insert(key.clone(), value.clone());
    }
    identity.updated_at = OffsetDateTime::now_utc();
}
