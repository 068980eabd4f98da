//! Seams to the chat platform
//!
//! The dispatcher and the disclosure sweep only talk to the outside world
//! through these two traits, so both can be exercised against mocks.

use super::error::PlatformError;
use super::event::ModerationEvent;
use async_trait::async_trait;

/// What the bot knows about a user it acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    pub tag: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    pub user: UserProfile,
    pub reason: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModerationPlatform: Send + Sync {
    /// Role ids of a guild member, `None` when the user is not a member.
    async fn member_role_ids(&self, guild_id: u64, user_id: u64) -> Result<Option<Vec<u64>>, PlatformError>;

    async fn fetch_user(&self, user_id: u64) -> Result<UserProfile, PlatformError>;

    async fn timeout(&self, guild_id: u64, user_id: u64, minutes: u32, reason: &str) -> Result<(), PlatformError>;

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError>;

    async fn ban(
        &self,
        guild_id: u64,
        user_id: u64,
        delete_message_days: u8,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn unban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError>;

    async fn list_bans(&self, guild_id: u64) -> Result<Vec<BanEntry>, PlatformError>;

    /// Notify the sanctioned user. `reveal_moderator` is false when the actor
    /// must stay invisible.
    async fn send_direct_message(
        &self,
        user_id: u64,
        guild_id: u64,
        event: &ModerationEvent,
        reveal_moderator: bool,
    ) -> Result<(), PlatformError>;
}

/// Destination for log and code-channel messages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, channel_id: u64, event: &ModerationEvent) -> Result<(), PlatformError>;
}
