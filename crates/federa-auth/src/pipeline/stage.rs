//! The fixed stage list.

use std::fmt;

/// One step of the authentication sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Extract details from the provider response.
    SocialDetails,
    /// Extract the provider uid.
    SocialUid,
    /// Apply the backend's access rule.
    AuthAllowed,
    /// Look up an existing link for `(backend, uid)`.
    SocialUser,
    /// Refuse missing email when the backend requires it.
    RequireEmail,
    /// Link to an existing user with the same email.
    AssociateByEmail,
    /// Plan a new user.
    CreateUser,
    /// Refuse a second identity on the same backend.
    CheckExistingSocialAssociations,
    /// Plan the `(backend, uid) -> user` link.
    AssociateUser,
    /// Refresh the identity's provider extra data.
    LoadExtraData,
    /// Merge incoming details into the user.
    UserDetails,
    /// Replace group claims with the incoming ones.
    UpdateGroups,
    /// Bookmark the backend and commit.
    Finalize,
}

impl Stage {
    /// Execution order. Never reordered at runtime.
    pub const ORDER: [Stage; 13] = [
        Stage::SocialDetails,
        Stage::SocialUid,
        Stage::AuthAllowed,
        Stage::SocialUser,
        Stage::RequireEmail,
        Stage::AssociateByEmail,
        Stage::CreateUser,
        Stage::CheckExistingSocialAssociations,
        Stage::AssociateUser,
        Stage::LoadExtraData,
        Stage::UserDetails,
        Stage::UpdateGroups,
        Stage::Finalize,
    ];

    /// Position in [`Stage::ORDER`].
    #[must_use]
    pub fn position(&self) -> usize {
        Self::ORDER.iter().position(|s| s == self).unwrap_or(0)
    }

    /// Stages skipped once `social_user` found an existing link.
    #[must_use]
    pub fn skipped_for_existing_identity(&self) -> bool {
        matches!(
            self,
            Self::RequireEmail
                | Self::AssociateByEmail
                | Self::CreateUser
                | Self::CheckExistingSocialAssociations
        )
    }

    /// Stages that only plan writes; nothing is persisted before `finalize`.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        self.position() >= Stage::AssociateByEmail.position()
    }

    /// Returns the stage name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SocialDetails => "social_details",
            Self::SocialUid => "social_uid",
            Self::AuthAllowed => "auth_allowed",
            Self::SocialUser => "social_user",
            Self::RequireEmail => "require_email",
            Self::AssociateByEmail => "associate_by_email",
            Self::CreateUser => "create_user",
            Self::CheckExistingSocialAssociations => "check_existing_social_associations",
            Self::AssociateUser => "associate_user",
            Self::LoadExtraData => "load_extra_data",
            Self::UserDetails => "user_details",
            Self::UpdateGroups => "update_groups",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
