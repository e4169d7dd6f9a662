//! # federa-auth
//!
//! Authentication pipeline of the Federa identity broker.
//!
//! This crate provides:
//! - Provider backends that normalize federation, OAuth2 and credential
//!   responses into one attribute set
//! - The credential-exchange login protocol with attempt limiting
//! - Identity resolution and account linking
//! - The fixed-order authentication pipeline with a single commit
//! - Audit logging for every terminal outcome
//! - IdP metadata caching and Axum login handlers
//!
//! ## Modules
//!
//! - [`backend`] - Provider backends and the backend registry
//! - [`login`] - Credential form, remote verification and login states
//! - [`rate_limit`] - Attempt limiting per backend and identifier
//! - [`identity`] - Identity resolution and account linking
//! - [`pipeline`] - The authentication pipeline
//! - [`audit`] - Authentication audit log
//! - [`metadata`] - IdP metadata cache
//! - [`storage`] - Storage traits
//! - [`config`] - Broker configuration
//! - [`http`] - Axum HTTP handlers

pub mod audit;
pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod login;
pub mod metadata;
pub mod pipeline;
pub mod rate_limit;
pub mod storage;
pub mod types;

pub use audit::{AuditEntry, AuditLog, AuditOutcome, TracingAuditLog};
pub use backend::{
    AccessDecision, AccessRule, AttributeMapping, BackendKind, BackendRegistry,
    CredentialBackend, FederationBackend, OAuth2Backend, ProviderBackend,
};
pub use config::{BackendConfig, BrokerConfig, ConfigError};
pub use error::{ErrorCategory, PipelineError};
pub use http::{AuthState, AuthSummary, router};
pub use identity::{IdentityPolicy, IdentityResolver, ResolveError};
pub use login::{CredentialError, CredentialVerifier, HttpCredentialVerifier};
pub use metadata::{IdpMetadata, IdpMetadataCache, MetadataError};
pub use pipeline::{AuthCompletion, LoggingCompletion, Pipeline, PipelineBuilder, Stage};
pub use rate_limit::{RateLimitPolicy, RateLimiter};
pub use storage::{IdentityStorage, ProviderIdentity, RateLimitStore, StorageError, User};
pub use types::{AuthDetails, AuthInput, Credentials};

/// Type alias for pipeline results.
pub type AuthResult<T> = Result<T, PipelineError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use federa_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::audit::{AuditEntry, AuditLog, AuditOutcome};
    pub use crate::backend::{BackendRegistry, ProviderBackend};
    pub use crate::config::{BrokerConfig, ConfigError};
    pub use crate::error::{ErrorCategory, PipelineError};
    pub use crate::pipeline::{AuthCompletion, Pipeline};
    pub use crate::storage::{IdentityStorage, RateLimitStore, StorageError, User};
    pub use crate::types::{AuthDetails, AuthInput, Credentials};
}
