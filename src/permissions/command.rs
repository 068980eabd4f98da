use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Every command name the permission tables can refer to.
///
/// `Hackban` is not a slash command of its own; it is the permission key the
/// ban command checks when run in hackban mode.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandName {
    #[display("warn")]
    Warn,
    #[display("case")]
    Case,
    #[display("clearwarnings")]
    ClearWarnings,
    #[display("purge")]
    Purge,
    #[display("kick")]
    Kick,
    #[display("timeout")]
    Timeout,
    #[display("ban")]
    Ban,
    #[display("hackban")]
    Hackban,
    #[display("unban")]
    Unban,
    #[display("deletecase")]
    DeleteCase,
    #[display("generatebancode")]
    GenerateBanCode,
    #[display("help")]
    Help,
}

impl CommandName {
    pub const ALL: [CommandName; 12] = [
        CommandName::Warn,
        CommandName::Case,
        CommandName::ClearWarnings,
        CommandName::Purge,
        CommandName::Kick,
        CommandName::Timeout,
        CommandName::Ban,
        CommandName::Hackban,
        CommandName::Unban,
        CommandName::DeleteCase,
        CommandName::GenerateBanCode,
        CommandName::Help,
    ];

    /// Whether running the command needs an explicit grant in the actor's
    /// permission set. The rest only need the actor to be staff.
    #[must_use]
    pub const fn requires_grant(self) -> bool {
        !matches!(self, Self::Case | Self::Purge | Self::Help)
    }
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("unknown command name: {_0}")]
pub struct UnknownCommand(pub String);

impl std::error::Error for UnknownCommand {}

impl FromStr for CommandName {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|name| name.to_string().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCommand(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde_name() {
        for name in CommandName::ALL {
            let json = serde_json::to_string(&name).expect("serialize");
            assert_eq!(json, format!("\"{name}\""));
        }
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("DeleteCase".parse::<CommandName>(), Ok(CommandName::DeleteCase));
        assert_eq!(" hackban ".parse::<CommandName>(), Ok(CommandName::Hackban));
        assert!("softban".parse::<CommandName>().is_err());
    }

    #[test]
    fn test_grant_requirements() {
        assert!(CommandName::Ban.requires_grant());
        assert!(CommandName::GenerateBanCode.requires_grant());
        assert!(!CommandName::Case.requires_grant());
        assert!(!CommandName::Purge.requires_grant());
        assert!(!CommandName::Help.requires_grant());
    }
}
