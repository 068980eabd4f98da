//! Staff hierarchy and override resolution
//!
//! The resolver is built once from configuration and never changes at
//! runtime. All queries take the member's role ids and user id as plain
//! integers so the same resolver serves commands, the dispatcher and the
//! disclosure sweep.

use super::{CommandName, OverrideEntry, Permission, StaffRole};
use std::collections::HashMap;

/// Where an effective identity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// A real staff role with this id
    Role(u64),
    /// The user's override entry
    Override,
}

/// The staff identity a member acts under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveIdentity {
    pub source: IdentitySource,
    pub name: String,
    pub level: i32,
    pub permissions: Permission,
}

#[derive(Debug, Clone, Default)]
pub struct PermissionResolver {
    roles: HashMap<u64, StaffRole>,
    overrides: HashMap<u64, OverrideEntry>,
}

impl PermissionResolver {
    pub fn new(
        roles: impl IntoIterator<Item = StaffRole>,
        overrides: impl IntoIterator<Item = OverrideEntry>,
    ) -> Self {
        Self {
            roles: roles.into_iter().map(|role| (role.id, role)).collect(),
            overrides: overrides
                .into_iter()
                .map(|entry| (entry.user_id, entry))
                .collect(),
        }
    }

    /// The highest-authority staff role among `role_ids`, ignoring overrides.
    #[must_use]
    pub fn highest_staff_role(&self, role_ids: &[u64]) -> Option<&StaffRole> {
        role_ids
            .iter()
            .filter_map(|id| self.roles.get(id))
            .min_by_key(|role| role.level)
    }

    /// Real staff roles win; the override entry is the fallback.
    #[must_use]
    pub fn resolve_identity(&self, role_ids: &[u64], user_id: u64) -> Option<EffectiveIdentity> {
        if let Some(role) = self.highest_staff_role(role_ids) {
            return Some(EffectiveIdentity {
                source: IdentitySource::Role(role.id),
                name: role.name.clone(),
                level: role.level,
                permissions: role.permissions.clone(),
            });
        }

        self.overrides.get(&user_id).map(|entry| EffectiveIdentity {
            source: IdentitySource::Override,
            name: entry.name.clone(),
            level: entry.level,
            permissions: entry.permissions.clone(),
        })
    }

    #[must_use]
    pub fn is_overridden(&self, user_id: u64) -> bool {
        self.overrides.contains_key(&user_id)
    }

    #[must_use]
    pub fn has_real_staff_role(&self, role_ids: &[u64]) -> bool {
        role_ids.iter().any(|id| self.roles.contains_key(id))
    }

    /// Gate for every moderation command.
    #[must_use]
    pub fn is_staff(&self, role_ids: &[u64], user_id: u64) -> bool {
        self.has_real_staff_role(role_ids) || self.is_overridden(user_id)
    }

    /// Override permissions are consulted first, then the highest staff role.
    #[must_use]
    pub fn has_command_permission(&self, role_ids: &[u64], user_id: u64, command: CommandName) -> bool {
        if let Some(entry) = self.overrides.get(&user_id) {
            if entry.permissions.allows(command) {
                return true;
            }
        }

        self.resolve_identity(role_ids, user_id)
            .is_some_and(|identity| identity.permissions.allows(command))
    }

    /// Whether actions by this member leave a trace (cases, warnings, logs,
    /// code disclosures).
    #[must_use]
    pub fn is_recordable(&self, role_ids: &[u64], user_id: u64) -> bool {
        !self.is_overridden(user_id) || self.has_real_staff_role(role_ids)
    }

    /// Staff roles granted `command`, highest authority first.
    #[must_use]
    pub fn roles_allowing(&self, command: CommandName) -> Vec<&StaffRole> {
        let mut roles: Vec<_> = self
            .roles
            .values()
            .filter(|role| role.permissions.allows(command))
            .collect();
        roles.sort_by_key(|role| (role.level, role.id));
        roles
    }

    /// Name of the identity the member acts under, for denial messages.
    #[must_use]
    pub fn role_name(&self, role_ids: &[u64], user_id: u64) -> String {
        self.resolve_identity(role_ids, user_id)
            .map_or_else(|| "Unknown".to_string(), |identity| identity.name)
    }
}
