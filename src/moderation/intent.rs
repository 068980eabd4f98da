use super::error::{ModerationError, ModerationResult};
use super::platform::UserProfile;
use crate::ledger::Severity;
use crate::permissions::CommandName;
use uuid::Uuid;

/// Longest timeout the platform accepts (28 days)
pub const MAX_TIMEOUT_MINUTES: i64 = 40_320;
/// Longest message-deletion window for a ban
pub const MAX_DELETE_DAYS: i64 = 7;

/// The member running a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: u64,
    pub tag: String,
    pub avatar_url: String,
    pub role_ids: Vec<u64>,
}

/// Which cases a lookup should return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseQuery {
    Number(u64),
    User(UserProfile),
    Severity(Severity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationCommand {
    Warn {
        target: UserProfile,
        reason: String,
        severity: Severity,
        timeout_minutes: Option<i64>,
        silent: bool,
    },
    Timeout {
        target: UserProfile,
        minutes: i64,
        reason: String,
    },
    Kick {
        target: UserProfile,
        reason: String,
    },
    Ban {
        /// Mention or raw user id
        target: String,
        reason: String,
        hackban: bool,
        delete_days: i64,
        override_code: Option<String>,
    },
    Unban {
        /// `None` lists the current bans instead
        user_id: Option<String>,
        reason: Option<String>,
        override_code: Option<String>,
    },
    ClearWarnings {
        target: UserProfile,
    },
    CaseLookup {
        query: CaseQuery,
    },
    DeleteCase {
        number: u64,
        revert_warning: bool,
    },
    GenerateBanCode,
}

impl ModerationCommand {
    #[must_use]
    pub const fn name(&self) -> CommandName {
        match self {
            Self::Warn { .. } => CommandName::Warn,
            Self::Timeout { .. } => CommandName::Timeout,
            Self::Kick { .. } => CommandName::Kick,
            Self::Ban { hackban: true, .. } => CommandName::Hackban,
            Self::Ban { .. } => CommandName::Ban,
            Self::Unban { .. } => CommandName::Unban,
            Self::ClearWarnings { .. } => CommandName::ClearWarnings,
            Self::CaseLookup { .. } => CommandName::Case,
            Self::DeleteCase { .. } => CommandName::DeleteCase,
            Self::GenerateBanCode => CommandName::GenerateBanCode,
        }
    }
}

/// One inbound moderation request
#[derive(Debug, Clone)]
pub struct ModerationIntent {
    pub id: Uuid,
    pub guild_id: u64,
    pub actor: Actor,
    pub command: ModerationCommand,
}

impl ModerationIntent {
    pub fn new(guild_id: u64, actor: Actor, command: ModerationCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            guild_id,
            actor,
            command,
        }
    }
}

/// Accepts `<@id>`, `<@!id>` or a bare id.
///
/// # Errors
/// Returns `InvalidInput` for anything else.
pub fn parse_user_reference(raw: &str) -> ModerationResult<u64> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.strip_prefix('!').unwrap_or(inner))
        .unwrap_or(trimmed);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ModerationError::invalid(
            "Please provide a valid user mention (@user) or user ID.",
        ));
    }
    match digits.parse::<u64>() {
        Ok(0) | Err(_) => Err(ModerationError::invalid("That user ID is out of range.")),
        Ok(id) => Ok(id),
    }
}

/// # Errors
/// Returns `InvalidInput` unless `1 <= minutes <= 40320`.
pub fn validate_timeout_minutes(minutes: i64) -> ModerationResult<u32> {
    if (1..=MAX_TIMEOUT_MINUTES).contains(&minutes) {
        u32::try_from(minutes).map_err(|_| ModerationError::invalid("Timeout is out of range."))
    } else {
        Err(ModerationError::invalid(format!(
            "Timeout must be between 1 and {MAX_TIMEOUT_MINUTES} minutes."
        )))
    }
}

/// # Errors
/// Returns `InvalidInput` unless `0 <= days <= 7`.
pub fn validate_delete_days(days: i64) -> ModerationResult<u8> {
    if (0..=MAX_DELETE_DAYS).contains(&days) {
        u8::try_from(days).map_err(|_| ModerationError::invalid("Delete days out of range."))
    } else {
        Err(ModerationError::invalid(format!(
            "Message deletion must be between 0 and {MAX_DELETE_DAYS} days."
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_reference() {
        assert_eq!(parse_user_reference("<@123456789>").ok(), Some(123_456_789));
        assert_eq!(parse_user_reference("<@!123456789>").ok(), Some(123_456_789));
        assert_eq!(parse_user_reference(" 42 ").ok(), Some(42));
        assert!(parse_user_reference("<@abc>").is_err());
        assert!(parse_user_reference("<#123>").is_err());
        assert!(parse_user_reference("someone").is_err());
        assert!(parse_user_reference("").is_err());
        assert!(parse_user_reference("0").is_err());
        assert!(parse_user_reference("99999999999999999999999").is_err());
    }

    #[test]
    fn test_timeout_bounds() {
        assert!(validate_timeout_minutes(0).is_err());
        assert_eq!(validate_timeout_minutes(1).ok(), Some(1));
        assert_eq!(validate_timeout_minutes(40_320).ok(), Some(40_320));
        assert!(validate_timeout_minutes(40_321).is_err());
    }

    #[test]
    fn test_delete_day_bounds() {
        assert_eq!(validate_delete_days(0).ok(), Some(0));
        assert_eq!(validate_delete_days(7).ok(), Some(7));
        assert!(validate_delete_days(8).is_err());
        assert!(validate_delete_days(-1).is_err());
    }

    #[test]
    fn test_command_names() {
        let ban = ModerationCommand::Ban {
            target: "1".to_string(),
            reason: "r".to_string(),
            hackban: true,
            delete_days: 0,
            override_code: None,
        };
        assert_eq!(ban.name(), CommandName::Hackban);
        assert_eq!(ModerationCommand::GenerateBanCode.name(), CommandName::GenerateBanCode);
    }
}
