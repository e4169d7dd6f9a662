//! States of the credential login protocol.

use std::fmt;

use super::CredentialError;

/// Where one credential login currently is.
///
/// ```text
/// Idle -> FormDisplayed -> Submitted -> RateCheck -> RemoteCall
///                                           |            |
///                                         Locked   Authenticated | Denied | BackendUnavailable
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginState {
    /// Nothing happened yet.
    Idle,
    /// The form was rendered, possibly with field errors.
    FormDisplayed,
    /// A valid form was posted.
    Submitted,
    /// The attempt counter is being incremented and checked.
    RateCheck,
    /// The verification API is being called.
    RemoteCall,
    /// The remote system confirmed the identity.
    Authenticated,
    /// The remote system rejected the credentials.
    Denied,
    /// Too many attempts; the remote system was not called.
    Locked,
    /// The remote system failed or answered garbage.
    BackendUnavailable,
}

impl LoginState {
    /// Returns `true` for the four end states.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Authenticated | Self::Denied | Self::Locked | Self::BackendUnavailable
        )
    }

    /// Returns `true` if the protocol allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: LoginState) -> bool {
        use LoginState::*;
        matches!(
            (self, next),
            (Idle, FormDisplayed)
                | (Idle | FormDisplayed, Submitted)
                | (FormDisplayed, FormDisplayed)
                | (Submitted, RateCheck)
                | (RateCheck, RemoteCall | Locked | BackendUnavailable)
                | (RemoteCall, Authenticated | Denied | BackendUnavailable)
        )
    }

    /// Returns the state name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FormDisplayed => "form_displayed",
            Self::Submitted => "submitted",
            Self::RateCheck => "rate_check",
            Self::RemoteCall => "remote_call",
            Self::Authenticated => "authenticated",
            Self::Denied => "denied",
            Self::Locked => "locked",
            Self::BackendUnavailable => "backend_unavailable",
        }
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&CredentialError> for LoginState {
    fn from(err: &CredentialError) -> Self {
        match err {
            CredentialError::Locked => Self::Locked,
            CredentialError::InvalidCredentials => Self::Denied,
            CredentialError::Unavailable { .. } => Self::BackendUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_skips_remote_call() {
        assert!(LoginState::RateCheck.can_transition_to(LoginState::Locked));
        assert!(!LoginState::Locked.can_transition_to(LoginState::RemoteCall));
        assert!(!LoginState::Submitted.can_transition_to(LoginState::RemoteCall));
    }

    #[test]
    fn test_terminal_states() {
        assert!(LoginState::Denied.is_terminal());
        assert!(LoginState::BackendUnavailable.is_terminal());
        assert!(!LoginState::RemoteCall.is_terminal());
        for terminal in [
            LoginState::Authenticated,
            LoginState::Denied,
            LoginState::Locked,
            LoginState::BackendUnavailable,
        ] {
            assert!(!terminal.can_transition_to(LoginState::Submitted));
        }
    }

    #[test]
    fn test_error_maps_to_terminal_state() {
        assert_eq!(LoginState::from(&CredentialError::Locked), LoginState::Locked);
        assert_eq!(
            LoginState::from(&CredentialError::unavailable("koha", "timeout")),
            LoginState::BackendUnavailable
        );
    }
}
