//! Pipeline error types.
//!
//! Every failure raised by a backend, the credential login protocol, the
//! identity resolver or storage is converted into a single [`PipelineError`]
//! before it reaches a caller of [`Pipeline::authenticate`].
//!
//! [`Pipeline::authenticate`]: crate::pipeline::Pipeline::authenticate

use std::fmt;

use crate::audit::AuditOutcome;
use crate::backend::NormalizationError;
use crate::identity::ResolveError;
use crate::login::CredentialError;
use crate::storage::StorageError;

/// Terminal failure of one authentication transaction.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The provider response could not be normalized.
    #[error("Normalization failed: {0}")]
    Normalization(#[from] NormalizationError),

    /// The backend's access policy denied the normalized details.
    #[error("Authentication not allowed for backend {backend}")]
    NotAllowed {
        /// The backend that denied access.
        backend: String,
    },

    /// The backend requires an email address and none was provided.
    #[error("Email address is required")]
    EmailRequired,

    /// More than one local user shares the incoming email address.
    #[error("Email address {email} is shared by multiple accounts")]
    DuplicateEmail {
        /// The ambiguous email address.
        email: String,
    },

    /// The resolved user is already linked to a different uid on this backend.
    #[error("User {user_id} is already linked to backend {backend} with another identity")]
    ConflictingAssociation {
        /// The backend with the existing link.
        backend: String,
        /// The local user id.
        user_id: String,
    },

    /// The identifier or secret was empty after trimming.
    #[error("Identifier and secret are required for backend {backend}")]
    IncompleteCredentials {
        /// The credential backend.
        backend: String,
    },

    /// Too many attempts for this identifier within the rate-limit window.
    #[error("Account temporarily locked")]
    AccountTemporarilyLocked,

    /// The remote credential API could not be reached or answered garbage.
    #[error("Authentication backend unavailable: {backend}")]
    BackendUnavailable {
        /// The unavailable backend.
        backend: String,
    },

    /// The remote system reported invalid credentials.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// No backend is registered under the requested name.
    #[error("Unknown authentication backend: {0}")]
    UnknownBackend(String),

    /// The backend is registered but disabled.
    #[error("Authentication backend is disabled: {0}")]
    BackendDisabled(String),

    /// The input kind does not match what the backend consumes.
    #[error("Backend {backend} does not accept {input} input")]
    UnsupportedInput {
        /// The backend name.
        backend: String,
        /// The rejected input kind.
        input: &'static str,
    },

    /// Storage failed in a way that is not a uniqueness conflict.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Creates a new `NotAllowed` error.
    #[must_use]
    pub fn not_allowed(backend: impl Into<String>) -> Self {
        Self::NotAllowed {
            backend: backend.into(),
        }
    }

    /// Creates a new `BackendUnavailable` error.
    #[must_use]
    pub fn backend_unavailable(backend: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
        }
    }

    /// Returns `true` if the provider uid could not be extracted.
    #[must_use]
    pub fn is_missing_identifier(&self) -> bool {
        matches!(
            self,
            Self::Normalization(NormalizationError::MissingIdentifier { .. })
        )
    }

    /// Returns `true` if the user can recover by supplying more data.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::EmailRequired)
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::Storage(_)
        )
    }

    /// Returns the error category for logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Normalization(_) => ErrorCategory::Federation,
            Self::NotAllowed { .. } => ErrorCategory::Authorization,
            Self::EmailRequired | Self::IncompleteCredentials { .. } => ErrorCategory::Validation,
            Self::DuplicateEmail { .. } | Self::ConflictingAssociation { .. } => {
                ErrorCategory::AccountConflict
            }
            Self::AccountTemporarilyLocked | Self::AuthenticationFailed => {
                ErrorCategory::Authentication
            }
            Self::BackendUnavailable { .. } => ErrorCategory::Federation,
            Self::UnknownBackend(_) | Self::BackendDisabled(_) => ErrorCategory::Configuration,
            Self::UnsupportedInput { .. } => ErrorCategory::Validation,
            Self::Storage(_) => ErrorCategory::Infrastructure,
        }
    }

    /// The outcome recorded in the audit log for this failure.
    #[must_use]
    pub fn audit_outcome(&self) -> AuditOutcome {
        match self {
            Self::AccountTemporarilyLocked => AuditOutcome::RateLimited,
            _ => AuditOutcome::Failure,
        }
    }

    /// Message safe to show to the end user.
    ///
    /// Never reveals which credential was wrong or which account conflicted.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Normalization(_) | Self::UnsupportedInput { .. } => {
                "The identity provider returned an invalid response."
            }
            Self::NotAllowed { .. } => "You are not permitted to log in with this method.",
            Self::EmailRequired => "An email address is required to log in.",
            Self::IncompleteCredentials { .. } => "Enter both your username and password.",
            Self::DuplicateEmail { .. } | Self::ConflictingAssociation { .. } => {
                "Your account could not be linked. Please contact support."
            }
            Self::AccountTemporarilyLocked => {
                "Too many login attempts. Your account is temporarily locked."
            }
            Self::BackendUnavailable { .. } => {
                "The login service is unavailable. Please try again later."
            }
            Self::AuthenticationFailed => "Invalid username or password.",
            Self::UnknownBackend(_) | Self::BackendDisabled(_) => {
                "This login method is not available."
            }
            Self::Storage(_) => "An internal error occurred. Please try again later.",
        }
    }

    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Normalization(_)
            | Self::UnsupportedInput { .. }
            | Self::IncompleteCredentials { .. }
            | Self::EmailRequired => 400,
            Self::AuthenticationFailed => 401,
            Self::NotAllowed { .. } => 403,
            Self::UnknownBackend(_) | Self::BackendDisabled(_) => 404,
            Self::DuplicateEmail { .. } | Self::ConflictingAssociation { .. } => 409,
            Self::AccountTemporarilyLocked => 429,
            Self::Storage(_) => 500,
            Self::BackendUnavailable { .. } => 503,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Normalization(NormalizationError::MissingIdentifier { .. }) => {
                "missing_identifier"
            }
            Self::Normalization(_) => "normalization_error",
            Self::NotAllowed { .. } => "not_allowed",
            Self::EmailRequired => "email_required",
            Self::IncompleteCredentials { .. } => "incomplete_credentials",
            Self::DuplicateEmail { .. } => "duplicate_email",
            Self::ConflictingAssociation { .. } => "conflicting_association",
            Self::AccountTemporarilyLocked => "account_locked",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::AuthenticationFailed => "authentication_failed",
            Self::UnknownBackend(_) => "unknown_backend",
            Self::BackendDisabled(_) => "backend_disabled",
            Self::UnsupportedInput { .. } => "unsupported_input",
            Self::Storage(_) => "server_error",
        }
    }
}

impl From<CredentialError> for PipelineError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Locked => Self::AccountTemporarilyLocked,
            CredentialError::InvalidCredentials => Self::AuthenticationFailed,
            CredentialError::Unavailable { backend, .. } => Self::BackendUnavailable { backend },
        }
    }
}

impl From<ResolveError> for PipelineError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::EmailRequired => Self::EmailRequired,
            ResolveError::DuplicateEmail { email } => Self::DuplicateEmail { email },
            ResolveError::ConflictingAssociation { backend, user_id } => {
                Self::ConflictingAssociation { backend, user_id }
            }
            ResolveError::Storage(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Categories of pipeline errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential verification failures and lockouts.
    Authentication,
    /// Access policy denials.
    Authorization,
    /// Account linking conflicts.
    AccountConflict,
    /// Malformed or incomplete input.
    Validation,
    /// Provider responses and remote backends.
    Federation,
    /// Backend registry and settings problems.
    Configuration,
    /// Storage failures.
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::AccountConflict => write!(f, "account_conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Federation => write!(f, "federation"),
            Self::Configuration => write!(f, "configuration"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::not_allowed("opas_student_adfs");
        assert_eq!(
            err.to_string(),
            "Authentication not allowed for backend opas_student_adfs"
        );

        let err = PipelineError::UnknownBackend("nope".to_string());
        assert_eq!(err.to_string(), "Unknown authentication backend: nope");

        let err = PipelineError::AuthenticationFailed;
        assert_eq!(err.to_string(), "Authentication failed");
    }

    #[test]
    fn test_user_messages_are_generic() {
        let msg = PipelineError::AuthenticationFailed.user_message();
        assert_eq!(msg, "Invalid username or password.");

        let dup = PipelineError::DuplicateEmail {
            email: "someone@example.com".to_string(),
        };
        assert!(!dup.user_message().contains("someone@example.com"));
    }

    #[test]
    fn test_audit_outcome() {
        assert_eq!(
            PipelineError::AccountTemporarilyLocked.audit_outcome(),
            AuditOutcome::RateLimited
        );
        assert_eq!(
            PipelineError::AuthenticationFailed.audit_outcome(),
            AuditOutcome::Failure
        );
        assert_eq!(
            PipelineError::not_allowed("x").audit_outcome(),
            AuditOutcome::Failure
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(PipelineError::backend_unavailable("koha").is_server_error());
        assert!(PipelineError::AuthenticationFailed.is_client_error());
        assert!(PipelineError::EmailRequired.is_recoverable());
        assert!(!PipelineError::AuthenticationFailed.is_recoverable());

        let missing = PipelineError::from(NormalizationError::MissingIdentifier {
            backend: "turku_adfs".to_string(),
            attribute: "oid".to_string(),
        });
        assert!(missing.is_missing_identifier());
        assert_eq!(missing.code(), "missing_identifier");
    }

    #[test]
    fn test_credential_error_conversion() {
        assert!(matches!(
            PipelineError::from(CredentialError::Locked),
            PipelineError::AccountTemporarilyLocked
        ));
        assert!(matches!(
            PipelineError::from(CredentialError::InvalidCredentials),
            PipelineError::AuthenticationFailed
        ));
        let err = PipelineError::from(CredentialError::unavailable("koha", "timeout"));
        assert!(matches!(err, PipelineError::BackendUnavailable { ref backend } if backend == "koha"));
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(PipelineError::AccountTemporarilyLocked.status_code(), 429);
        assert_eq!(PipelineError::AuthenticationFailed.status_code(), 401);
        assert_eq!(PipelineError::not_allowed("x").status_code(), 403);
        assert_eq!(
            PipelineError::DuplicateEmail {
                email: "a@b.fi".to_string()
            }
            .status_code(),
            409
        );
    }

    #[test]
    fn test_server_error_matches_status() {
        let errors = [
            PipelineError::from(NormalizationError::MissingIdentifier {
                backend: "turku_adfs".to_string(),
                attribute: "oid".to_string(),
            }),
            PipelineError::not_allowed("x"),
            PipelineError::EmailRequired,
            PipelineError::DuplicateEmail {
                email: "a@b.fi".to_string(),
            },
            PipelineError::ConflictingAssociation {
                backend: "koha".to_string(),
                user_id: "u1".to_string(),
            },
            PipelineError::IncompleteCredentials {
                backend: "koha".to_string(),
            },
            PipelineError::AccountTemporarilyLocked,
            PipelineError::backend_unavailable("koha"),
            PipelineError::AuthenticationFailed,
            PipelineError::UnknownBackend("nope".to_string()),
            PipelineError::BackendDisabled("foli".to_string()),
            PipelineError::UnsupportedInput {
                backend: "koha".to_string(),
                input: "provider response",
            },
            PipelineError::Storage("down".to_string()),
        ];
        for err in &errors {
            assert_eq!(err.is_server_error(), err.status_code() >= 500, "{err}");
        }
        assert!(PipelineError::UnknownBackend("nope".to_string()).is_client_error());
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Authentication.to_string(), "authentication");
        assert_eq!(ErrorCategory::AccountConflict.to_string(), "account_conflict");
        assert_eq!(
            PipelineError::EmailRequired.category(),
            ErrorCategory::Validation
        );
    }
}
