//! Common types shared by backends, the resolver and the pipeline.
//!
//! ## Domain Types
//!
//! - [`AuthDetails`] - Normalized attribute set from one provider response
//! - [`AuthInput`] - Raw inbound data handed to the pipeline

pub mod details;
pub mod input;

pub use details::{AuthDetails, normalize_email};
pub use input::{AuthInput, Credentials};
