//! Error types for moderation intents

use crate::permissions::CommandName;
use crate::storage::StoreError;
use thiserror::Error;

/// Reasons an actor is not allowed to go ahead
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("You do not have permission to use moderation commands.")]
    NotStaff,

    #[error("Your role **{role}** does not have permission to use `/{command}`.")]
    MissingPermission { role: String, command: CommandName },

    #[error("Your role **{role}** does not have permission to use `/{command}`. You need an override code.")]
    OverrideCodeRequired { role: String, command: CommandName },

    #[error("Invalid or already used override code.")]
    InvalidOverrideCode,

    #[error("**{target}** is a staff member ({role}) and cannot be sanctioned by you.")]
    StaffImmune { target: String, role: String },
}

/// The platform refused or failed to carry out a call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl From<poise::serenity_prelude::Error> for PlatformError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self(error.to_string())
    }
}

/// Errors that can end a moderation intent
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error(transparent)]
    AuthorizationDenied(#[from] Denial),

    #[error("{0}")]
    NotFound(String),

    #[error("The platform rejected the action: {0}")]
    ExternalActionFailure(#[from] PlatformError),

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ModerationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Short title for the error embed shown to the actor
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied(_) => "❌ Not Allowed",
            Self::NotFound(_) => "❌ Not Found",
            Self::ExternalActionFailure(_) => "❌ Action Failed",
            Self::Storage(_) => "❌ Storage Error",
            Self::InvalidInput(_) => "❌ Invalid Input",
        }
    }
}

pub type ModerationResult<T> = Result<T, ModerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ModerationError::from(Denial::MissingPermission {
            role: "Trial Moderator".to_string(),
            command: CommandName::Kick,
        });
        assert_eq!(
            error.to_string(),
            "Your role **Trial Moderator** does not have permission to use `/kick`."
        );

        let error = ModerationError::from(PlatformError("Missing Permissions".to_string()));
        assert_eq!(
            error.to_string(),
            "The platform rejected the action: Missing Permissions"
        );

        let error = ModerationError::invalid("duration must be between 1 and 40320 minutes");
        assert_eq!(error.title(), "❌ Invalid Input");
    }
}
