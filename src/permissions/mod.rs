//! Staff roles, override entries and the permission resolver

pub mod command;
pub mod permission;
pub mod resolver;
pub mod role;

pub use command::{CommandName, UnknownCommand};
pub use permission::Permission;
pub use resolver::{EffectiveIdentity, IdentitySource, PermissionResolver};
pub use role::{OVERRIDE_DEFAULT_LEVEL, OverrideEntry, StaffRole};
