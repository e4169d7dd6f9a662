//! Per-backend access rules.
//!
//! A rule is evaluated against normalized [`AuthDetails`] before any user is
//! looked up or created. Rules never fail: a claim that is absent from the
//! details is a denial, not an error.

use serde::{Deserialize, Serialize};

use crate::types::AuthDetails;

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Authentication may proceed.
    Allow,
    /// Authentication is refused.
    Deny {
        /// Why, for logs only. Never shown to the user.
        reason: String,
    },
}

impl AccessDecision {
    /// Returns `true` if access is allowed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }
}

/// Access predicate attached to a backend.
///
/// # Example (TOML)
///
/// ```toml
/// [broker.backends.access]
/// rule = "require_claim"
/// claim = "school_role"
/// value = "student"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AccessRule {
    /// Every authenticated identity is allowed.
    #[default]
    AllowAll,

    /// Allowed only when `claim` is present and equals `value` exactly.
    RequireClaim {
        /// Claim name in [`AuthDetails::claims`].
        claim: String,
        /// Required value.
        value: String,
    },
}

impl AccessRule {
    /// Creates a rule requiring `claim == value`.
    #[must_use]
    pub fn require_claim(claim: impl Into<String>, value: impl Into<String>) -> Self {
        Self::RequireClaim {
            claim: claim.into(),
            value: value.into(),
        }
    }

    /// Evaluates the rule.
    #[must_use]
    pub fn evaluate(&self, details: &AuthDetails) -> AccessDecision {
        match self {
            Self::AllowAll => AccessDecision::Allow,
            Self::RequireClaim { claim, value } => match details.claim(claim) {
                Some(actual) if actual == value => AccessDecision::Allow,
                Some(actual) => AccessDecision::deny(format!("{claim} is '{actual}'")),
                None => AccessDecision::deny(format!("{claim} is missing")),
            },
        }
    }
}
