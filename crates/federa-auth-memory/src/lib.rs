//! In-memory storage for the Federa authentication pipeline.
//!
//! This crate provides in-process implementations of the storage traits
//! from `federa-auth`:
//!
//! - [`InMemoryIdentityStorage`] - users and provider identities, with the
//!   uniqueness rules a relational schema would enforce
//! - [`InMemoryRateLimitStore`] - fixed-window attempt counters with atomic
//!   per-key increments
//! - [`InMemoryAuditLog`] - append-only audit entries
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use federa_auth::Pipeline;
//! use federa_auth_memory::{InMemoryAuditLog, InMemoryIdentityStorage, InMemoryRateLimitStore};
//!
//! let pipeline = Pipeline::builder()
//!     .registry(registry)
//!     .identity_storage(Arc::new(InMemoryIdentityStorage::new()))
//!     .rate_limit_store(Arc::new(InMemoryRateLimitStore::new()))
//!     .audit_log(Arc::new(InMemoryAuditLog::new()))
//!     .verifier(verifier)
//!     .build()?;
//! ```

pub mod audit;
pub mod identity;
pub mod rate_limit;

pub use audit::InMemoryAuditLog;
pub use identity::InMemoryIdentityStorage;
pub use rate_limit::InMemoryRateLimitStore;
