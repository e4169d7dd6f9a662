//! In-memory user and identity storage.

use std::collections::HashMap;

use async_trait::async_trait;
use federa_auth::storage::{
    IdentityStorage, LoginCommit, ProviderIdentity, StorageError, StorageResult, User,
};
use tokio::sync::RwLock;
use uuid::Uuid;

type IdentityKey = (String, String);

#[derive(Debug, Default)]
struct Tables {
    /// Users without their identities.
    users: HashMap<Uuid, User>,
    /// Identities keyed by `(backend, provider_uid)`.
    identities: HashMap<IdentityKey, ProviderIdentity>,
}

impl Tables {
    fn hydrate(&self, user: &User) -> User {
        let mut user = user.clone();
        user.identities = self
            .identities
            .values()
            .filter(|identity| identity.user_id == user.id)
            .cloned()
            .collect();
        user.identities.sort_by(|a, b| a.backend.cmp(&b.backend));
        user
    }

    fn email_owner(&self, email: &str) -> Option<Uuid> {
        self.users
            .values()
            .find(|user| {
                user.email
                    .as_deref()
                    .is_some_and(|stored| stored.eq_ignore_ascii_case(email))
            })
            .map(|user| user.id)
    }

    /// Checks every constraint before anything is written.
    fn check(&self, commit: &LoginCommit, unique_email: bool) -> StorageResult<()> {
        let user_id = commit.user.id;
        let identity = &commit.identity;

        if commit.create_user {
            if self.users.contains_key(&user_id) {
                return Err(StorageError::Backend(format!("user {user_id} already exists")));
            }
        } else if !self.users.contains_key(&user_id) {
            return Err(StorageError::UserNotFound(user_id.to_string()));
        }

        if unique_email
            && let Some(email) = commit.user.email.as_deref()
            && self.email_owner(email).is_some_and(|owner| owner != user_id)
        {
            return Err(StorageError::EmailTaken(email.to_string()));
        }

        let key = (identity.backend.clone(), identity.provider_uid.clone());
        if commit.link_identity {
            if self.identities.contains_key(&key) {
                return Err(StorageError::identity_taken(
                    &identity.backend,
                    &identity.provider_uid,
                ));
            }
            if self
                .identities
                .values()
                .any(|i| i.user_id == user_id && i.backend == identity.backend)
            {
                return Err(StorageError::BackendAlreadyLinked {
                    user_id: user_id.to_string(),
                    backend: identity.backend.clone(),
                });
            }
        } else {
            match self.identities.get(&key) {
                Some(existing) if existing.user_id == user_id => {}
                Some(_) => {
                    return Err(StorageError::identity_taken(
                        &identity.backend,
                        &identity.provider_uid,
                    ));
                }
                None => {
                    return Err(StorageError::Backend(format!(
                        "identity {}/{} is not linked",
                        identity.backend, identity.provider_uid
                    )));
                }
            }
        }
        Ok(())
    }
}

/// User and identity storage held in process memory.
///
/// Every commit runs under one write lock and validates all constraints
/// before mutating, so a rejected commit leaves no partial writes.
#[derive(Debug)]
pub struct InMemoryIdentityStorage {
    tables: RwLock<Tables>,
    unique_email: bool,
}

impl InMemoryIdentityStorage {
    /// Creates empty storage with unique email enforced.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            unique_email: true,
        }
    }

    /// Sets whether email addresses must be unique across users.
    #[must_use]
    pub fn with_unique_email(mut self, unique: bool) -> Self {
        self.unique_email = unique;
        self
    }

    /// Inserts a user directly, bypassing login rules.
    ///
    /// Identities on `user` are stored as well. Intended for seeding.
    pub async fn insert_user(&self, user: User) {
        let mut tables = self.tables.write().await;
        for identity in &user.identities {
            tables.identities.insert(
                (identity.backend.clone(), identity.provider_uid.clone()),
                identity.clone(),
            );
        }
        let mut row = user;
        row.identities.clear();
        tables.users.insert(row.id, row);
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    /// Number of stored identities.
    pub async fn identity_count(&self) -> usize {
        self.tables.read().await.identities.len()
    }
}

impl Default for InMemoryIdentityStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStorage for InMemoryIdentityStorage {
    async fn find_by_id(&self, user_id: Uuid) -> StorageResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&user_id).map(|user| tables.hydrate(user)))
    }

    async fn find_by_identity(
        &self,
        backend: &str,
        provider_uid: &str,
    ) -> StorageResult<Option<User>> {
        let tables = self.tables.read().await;
        let key = (backend.to_string(), provider_uid.to_string());
        Ok(tables
            .identities
            .get(&key)
            .and_then(|identity| tables.users.get(&identity.user_id))
            .map(|user| tables.hydrate(user)))
    }

    async fn find_by_email(&self, email: &str) -> StorageResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|user| {
                user.email
                    .as_deref()
                    .is_some_and(|stored| stored.eq_ignore_ascii_case(email))
            })
            .map(|user| tables.hydrate(user))
            .collect())
    }

    async fn commit_login(&self, commit: &LoginCommit) -> StorageResult<User> {
        let mut tables = self.tables.write().await;
        tables.check(commit, self.unique_email)?;

        let identity = commit.identity.clone();
        tables.identities.insert(
            (identity.backend.clone(), identity.provider_uid.clone()),
            identity,
        );

        let mut row = commit.user.clone();
        row.identities.clear();
        let user_id = row.id;
        let stored = tables.hydrate(&row);
        tables.users.insert(user_id, row);

        tracing::trace!(
            user_id = %user_id,
            created = commit.create_user,
            linked = commit.link_identity,
            "login committed to memory"
        );

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_login(backend: &str, uid: &str, email: Option<&str>) -> LoginCommit {
        let mut user = User::new();
        user.email = email.map(str::to_string);
        let identity = ProviderIdentity::new(user.id, backend, uid);
        LoginCommit {
            user,
            create_user: true,
            identity,
            link_identity: true,
        }
    }

    #[tokio::test]
    async fn test_commit_and_find() {
        let storage = InMemoryIdentityStorage::new();
        let commit = new_login("koha", "42", Some("a@b.fi"));
        let user = storage.commit_login(&commit).await.unwrap();
        assert_eq!(user.identities.len(), 1);

        let found = storage.find_by_identity("koha", "42").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(storage.find_by_identity("koha", "43").await.unwrap().is_none());

        let by_email = storage.find_by_email("A@B.FI").await.unwrap();
        assert_eq!(by_email.len(), 1);

        let by_id = storage.find_by_id(user.id).await.unwrap().unwrap();
        assert!(by_id.has_identity("koha", "42"));
    }

    #[tokio::test]
    async fn test_identity_taken_leaves_no_user() {
        let storage = InMemoryIdentityStorage::new();
        storage
            .commit_login(&new_login("koha", "42", None))
            .await
            .unwrap();

        let err = storage
            .commit_login(&new_login("koha", "42", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::IdentityTaken { .. }));
        assert!(err.is_conflict());
        assert_eq!(storage.user_count().await, 1);
        assert_eq!(storage.identity_count().await, 1);
    }

    #[tokio::test]
    async fn test_email_taken() {
        let storage = InMemoryIdentityStorage::new();
        storage
            .commit_login(&new_login("koha", "1", Some("a@b.fi")))
            .await
            .unwrap();

        let err = storage
            .commit_login(&new_login("foli", "2", Some("A@b.fi")))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::EmailTaken("A@b.fi".to_string()));
        assert_eq!(storage.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_email_not_unique_when_disabled() {
        let storage = InMemoryIdentityStorage::new().with_unique_email(false);
        storage
            .commit_login(&new_login("koha", "1", Some("a@b.fi")))
            .await
            .unwrap();
        storage
            .commit_login(&new_login("foli", "2", Some("a@b.fi")))
            .await
            .unwrap();
        assert_eq!(storage.find_by_email("a@b.fi").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_identity_on_same_backend() {
        let storage = InMemoryIdentityStorage::new();
        let user = storage
            .commit_login(&new_login("koha", "1", None))
            .await
            .unwrap();

        let commit = LoginCommit {
            identity: ProviderIdentity::new(user.id, "koha", "2"),
            user: user.clone(),
            create_user: false,
            link_identity: true,
        };
        let err = storage.commit_login(&commit).await.unwrap_err();
        assert!(matches!(err, StorageError::BackendAlreadyLinked { .. }));
        assert_eq!(storage.identity_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let storage = InMemoryIdentityStorage::new();
        let mut commit = new_login("koha", "1", None);
        commit.create_user = false;
        let err = storage.commit_login(&commit).await.unwrap_err();
        assert!(matches!(err, StorageError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_refresh_existing_identity() {
        let storage = InMemoryIdentityStorage::new();
        let user = storage
            .commit_login(&new_login("koha", "1", None))
            .await
            .unwrap();

        let mut identity = user.identities[0].clone();
        identity
            .extra_data
            .insert("library".to_string(), serde_json::json!("main"));
        let mut updated = user.clone();
        updated.first_name = "Aino".to_string();

        let stored = storage
            .commit_login(&LoginCommit {
                user: updated,
                create_user: false,
                identity,
                link_identity: false,
            })
            .await
            .unwrap();
        assert_eq!(stored.first_name, "Aino");
        assert_eq!(stored.identities[0].extra_data["library"], "main");
        assert_eq!(storage.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_seeded_user_is_found() {
        let storage = InMemoryIdentityStorage::new();
        let user = User::builder().email("seed@b.fi").build();
        storage.insert_user(user.clone()).await;
        let found = storage.find_by_email("seed@b.fi").await.unwrap();
        assert_eq!(found[0].id, user.id);
    }
}
