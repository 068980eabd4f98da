use super::Permission;
use serde::{Deserialize, Serialize};

/// Level used for override entries that do not set one explicitly.
pub const OVERRIDE_DEFAULT_LEVEL: i32 = -1;

/// A server role that marks its holders as staff.
///
/// Lower `level` means more authority; 0 is the top of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffRole {
    pub id: u64,
    pub name: String,
    pub level: i32,
    #[serde(default)]
    pub permissions: Permission,
}

/// A per-user grant that applies regardless of the user's roles.
///
/// Holders without a real staff role act invisibly: their sanctions run but
/// leave no cases, warnings, log messages or code disclosures behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub user_id: u64,
    #[serde(default = "default_override_name")]
    pub name: String,
    #[serde(default = "default_override_level")]
    pub level: i32,
    pub permissions: Permission,
}

fn default_override_name() -> String {
    "Override User".to_string()
}

const fn default_override_level() -> i32 {
    OVERRIDE_DEFAULT_LEVEL
}
