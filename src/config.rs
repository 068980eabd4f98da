//! Bot configuration
//!
//! Loaded once at startup from a YAML file. A few deployment settings can be
//! overridden from the environment so the same file works across hosts.

use crate::moderation::{DEFAULT_CODE_VIEWER_MAX_LEVEL, DispatchSettings};
use crate::permissions::{OverrideEntry, PermissionResolver, StaffRole};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const CONFIG_PATH_VAR: &str = "WARDEN_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/warden.yaml";
pub const DATA_DIR_VAR: &str = "WARDEN_DATA_DIR";
pub const LOG_CHANNEL_VAR: &str = "WARDEN_LOG_CHANNEL";
pub const CODE_CHANNEL_VAR: &str = "WARDEN_CODE_CHANNEL";
/// One year
pub const MAX_DISCLOSURE_DELAY_HOURS: i64 = 24 * 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{var} must be a numeric id, got {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("staff role {0} is listed more than once")]
    DuplicateRole(u64),

    #[error("override entry for user {0} is listed more than once")]
    DuplicateOverride(u64),

    #[error("disclosure_delay_hours must be between 0 and {MAX_DISCLOSURE_DELAY_HOURS}, got {0}")]
    DisclosureDelay(i64),
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[allow(clippy::unnecessary_wraps)]
fn default_case_export_dir() -> Option<PathBuf> {
    Some(PathBuf::from("cases"))
}

const fn default_sweep_interval_secs() -> u64 {
    3600
}

const fn default_disclosure_delay_hours() -> i64 {
    24
}

const fn default_code_viewer_max_level() -> i32 {
    DEFAULT_CODE_VIEWER_MAX_LEVEL
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub staff_roles: Vec<StaffRole>,
    #[serde(default)]
    pub overrides: Vec<OverrideEntry>,
    #[serde(default)]
    pub log_channel_id: Option<u64>,
    #[serde(default)]
    pub code_channel_id: Option<u64>,
    /// Guild checked when deciding whether a code generator is invisible
    #[serde(default)]
    pub home_guild_id: Option<u64>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Folder of per-user case files, `null` to disable the export
    #[serde(default = "default_case_export_dir")]
    pub case_export_dir: Option<PathBuf>,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_disclosure_delay_hours")]
    pub disclosure_delay_hours: i64,
    /// Roles at or above this level (lower number) may view ban codes
    #[serde(default = "default_code_viewer_max_level")]
    pub code_viewer_max_level: i32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            staff_roles: Vec::new(),
            overrides: Vec::new(),
            log_channel_id: None,
            code_channel_id: None,
            home_guild_id: None,
            data_dir: default_data_dir(),
            case_export_dir: default_case_export_dir(),
            sweep_interval_secs: default_sweep_interval_secs(),
            disclosure_delay_hours: default_disclosure_delay_hours(),
            code_viewer_max_level: default_code_viewer_max_level(),
        }
    }
}

impl BotConfig {
    /// # Errors
    /// Returns an error for malformed YAML or duplicate entries.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or is invalid.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_yaml(&yaml)?;
        info!(
            path = %path.display(),
            staff_roles = config.staff_roles.len(),
            overrides = config.overrides.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load from `WARDEN_CONFIG` (or the default path) and apply environment
    /// overrides.
    ///
    /// # Errors
    /// Returns an error if the file or an override is invalid.
    pub async fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(path).await?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Apply environment-style overrides read through `lookup`.
    ///
    /// # Errors
    /// Returns `InvalidEnv` when a channel override is not a number.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|dir| !dir.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }

        let parse_id = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            lookup(var)
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidEnv { var, value })
                })
                .transpose()
        };
        if let Some(id) = parse_id(LOG_CHANNEL_VAR)? {
            self.log_channel_id = Some(id);
        }
        if let Some(id) = parse_id(CODE_CHANNEL_VAR)? {
            self.code_channel_id = Some(id);
        }
        Ok(())
    }

    /// Reject duplicate ids. Two roles sharing a level are allowed but
    /// reported, since the tie is broken arbitrarily.
    ///
    /// # Errors
    /// Returns the first duplicate role or override found, or an out of
    /// range disclosure delay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=MAX_DISCLOSURE_DELAY_HOURS).contains(&self.disclosure_delay_hours) {
            return Err(ConfigError::DisclosureDelay(self.disclosure_delay_hours));
        }

        let mut role_ids = HashSet::new();
        let mut levels: HashMap<i32, &str> = HashMap::new();
        for role in &self.staff_roles {
            if !role_ids.insert(role.id) {
                return Err(ConfigError::DuplicateRole(role.id));
            }
            if let Some(other) = levels.insert(role.level, &role.name) {
                warn!(
                    level = role.level,
                    "Staff roles {other} and {} share a level",
                    role.name
                );
            }
        }

        let mut override_ids = HashSet::new();
        for entry in &self.overrides {
            if !override_ids.insert(entry.user_id) {
                return Err(ConfigError::DuplicateOverride(entry.user_id));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn resolver(&self) -> PermissionResolver {
        PermissionResolver::new(self.staff_roles.iter().cloned(), self.overrides.iter().cloned())
    }

    #[must_use]
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            log_channel_id: self.log_channel_id,
            code_channel_id: self.code_channel_id,
            code_viewer_max_level: self.code_viewer_max_level,
        }
    }

    #[must_use]
    pub fn disclosure_delay(&self) -> chrono::Duration {
        chrono::Duration::hours(
            self.disclosure_delay_hours
                .clamp(0, MAX_DISCLOSURE_DELAY_HOURS),
        )
    }

    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{CommandName, Permission};

    const SAMPLE: &str = r#"
staff_roles:
  - id: 100
    name: Owner
    level: 0
    permissions: all
  - id: 107
    name: Trial Moderator
    level: 7
    permissions: [warn, timeout]
  - id: 108
    name: Staff
    level: 8
    permissions: []
overrides:
  - user_id: 9001
    permissions: all
log_channel_id: 500
code_channel_id: 600
home_guild_id: 1000
"#;

    #[test]
    fn test_parse_sample() {
        let config = BotConfig::from_yaml(SAMPLE).expect("config");
        assert_eq!(config.staff_roles.len(), 3);
        assert_eq!(config.staff_roles[0].permissions, Permission::All);
        assert_eq!(config.overrides[0].name, "Override User");
        assert_eq!(config.overrides[0].level, -1);
        assert_eq!(config.log_channel_id, Some(500));
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.case_export_dir, Some(PathBuf::from("cases")));
        assert_eq!(config.sweep_interval_secs, 3600);
        assert_eq!(config.disclosure_delay(), chrono::Duration::hours(24));

        let resolver = config.resolver();
        assert!(resolver.has_command_permission(&[107], 1, CommandName::Warn));
        assert!(resolver.is_staff(&[], 9001));
        assert!(!resolver.is_recordable(&[], 9001));
    }

    #[test]
    fn test_example_config_parses() {
        let config = BotConfig::from_yaml(include_str!("../config/warden.example.yaml")).expect("config");
        assert_eq!(config.staff_roles.len(), 9);
        let resolver = config.resolver();
        let head_admin = 1_431_794_494_185_017_344;
        assert!(resolver.has_command_permission(&[head_admin], 1, CommandName::DeleteCase));
        assert!(!resolver.has_command_permission(&[head_admin], 1, CommandName::GenerateBanCode));
    }

    #[test]
    fn test_export_can_be_disabled() {
        let config = BotConfig::from_yaml("case_export_dir: null").expect("config");
        assert_eq!(config.case_export_dir, None);
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let yaml = r"
staff_roles:
  - { id: 1, name: A, level: 1, permissions: all }
  - { id: 1, name: B, level: 2, permissions: [] }
";
        assert!(matches!(
            BotConfig::from_yaml(yaml),
            Err(ConfigError::DuplicateRole(1))
        ));
    }

    #[test]
    fn test_disclosure_delay_bounds() {
        assert!(matches!(
            BotConfig::from_yaml("disclosure_delay_hours: -1"),
            Err(ConfigError::DisclosureDelay(-1))
        ));
        assert!(matches!(
            BotConfig::from_yaml("disclosure_delay_hours: 9223372036854775807"),
            Err(ConfigError::DisclosureDelay(_))
        ));

        let config = BotConfig::from_yaml("disclosure_delay_hours: 0").expect("config");
        assert_eq!(config.disclosure_delay(), chrono::Duration::zero());

        let unchecked = BotConfig {
            disclosure_delay_hours: i64::MAX,
            ..BotConfig::default()
        };
        assert_eq!(
            unchecked.disclosure_delay(),
            chrono::Duration::hours(MAX_DISCLOSURE_DELAY_HOURS)
        );
    }

    #[test]
    fn test_shared_level_is_allowed() {
        let yaml = r"
staff_roles:
  - { id: 1, name: A, level: 1, permissions: all }
  - { id: 2, name: B, level: 1, permissions: [] }
";
        assert!(BotConfig::from_yaml(yaml).is_ok());
    }

    #[test]
    fn test_unknown_permission_rejected() {
        let yaml = r"
staff_roles:
  - { id: 1, name: A, level: 1, permissions: [softban] }
";
        assert!(matches!(BotConfig::from_yaml(yaml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = BotConfig::default();
        let env: HashMap<&str, &str> = [
            (DATA_DIR_VAR, "/var/lib/warden"),
            (LOG_CHANNEL_VAR, " 123 "),
        ]
        .into_iter()
        .collect();

        config
            .apply_overrides(|var| env.get(var).map(ToString::to_string))
            .expect("overrides");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/warden"));
        assert_eq!(config.log_channel_id, Some(123));
        assert_eq!(config.code_channel_id, None);

        let result = config.apply_overrides(|var| (var == CODE_CHANNEL_VAR).then(|| "abc".to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv {
                var: CODE_CHANNEL_VAR,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = BotConfig::load(dir.path().join("nope.yaml")).await;
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("warden.yaml");
        tokio::fs::write(&path, SAMPLE).await.expect("write");

        let config = BotConfig::load(&path).await.expect("config");
        assert_eq!(config.home_guild_id, Some(1000));
    }
}
