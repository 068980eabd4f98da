use super::CommandName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Permission set attached to a staff role or override entry.
///
/// Written in configuration either as the keyword `all` or as a list of
/// command names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPermission", into = "RawPermission")]
pub enum Permission {
    All,
    Subset(BTreeSet<CommandName>),
}

impl Permission {
    #[must_use]
    pub fn none() -> Self {
        Self::Subset(BTreeSet::new())
    }

    #[must_use]
    pub fn allows(&self, command: CommandName) -> bool {
        match self {
            Self::All => true,
            Self::Subset(commands) => commands.contains(&command),
        }
    }
}

impl Default for Permission {
    fn default() -> Self {
        Self::none()
    }
}

impl FromIterator<CommandName> for Permission {
    fn from_iter<I: IntoIterator<Item = CommandName>>(iter: I) -> Self {
        Self::Subset(iter.into_iter().collect())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawPermission {
    Keyword(String),
    List(Vec<CommandName>),
}

impl TryFrom<RawPermission> for Permission {
    type Error = String;

    fn try_from(raw: RawPermission) -> Result<Self, Self::Error> {
        match raw {
            RawPermission::Keyword(word) if word.eq_ignore_ascii_case("all") => Ok(Self::All),
            RawPermission::Keyword(word) => Err(format!(
                "permissions must be \"all\" or a list of command names, got \"{word}\""
            )),
            RawPermission::List(commands) => Ok(commands.into_iter().collect()),
        }
    }
}

impl From<Permission> for RawPermission {
    fn from(permission: Permission) -> Self {
        match permission {
            Permission::All => Self::Keyword("all".to_string()),
            Permission::Subset(commands) => Self::List(commands.into_iter().collect()),
        }
    }
}
