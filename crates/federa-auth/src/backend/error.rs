//! Backend normalization errors.

/// A provider response could not be turned into a uid and details.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    /// The designated uid attribute is absent, empty or not a scalar string.
    #[error("Backend {backend} response has no usable identifier in {attribute}")]
    MissingIdentifier {
        /// The backend name.
        backend: String,
        /// The attribute that should carry the uid.
        attribute: String,
    },

    /// The response is not shaped the way the backend expects.
    #[error("Backend {backend} returned an invalid response: {reason}")]
    InvalidResponse {
        /// The backend name.
        backend: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl NormalizationError {
    /// Creates a new `MissingIdentifier` error.
    #[must_use]
    pub fn missing_identifier(backend: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingIdentifier {
            backend: backend.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates a new `InvalidResponse` error.
    #[must_use]
    pub fn invalid_response(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}
