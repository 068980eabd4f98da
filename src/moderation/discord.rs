//! Discord implementation of the platform seams

use super::error::PlatformError;
use super::event::ModerationEvent;
use super::platform::{BanEntry, ModerationPlatform, NotificationSink, UserProfile};
use crate::embeds;
use async_trait::async_trait;
use poise::serenity_prelude::{
    self as serenity, ChannelId, CreateMessage, EditMember, GuildId, Http, User, UserId,
};
use std::sync::Arc;
use tracing::info;

/// Bans shown when unban is run without a user id
pub const BAN_LIST_PAGE: u8 = 10;

/// Talks to Discord over HTTP
#[derive(Clone)]
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl std::fmt::Debug for DiscordGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordGateway").finish_non_exhaustive()
    }
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.get(),
            name: user.name.clone(),
            tag: user.tag(),
            avatar_url: user.face(),
        }
    }
}

fn is_not_found(error: &serenity::Error) -> bool {
    matches!(
        error,
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

#[async_trait]
impl ModerationPlatform for DiscordGateway {
    async fn member_role_ids(&self, guild_id: u64, user_id: u64) -> Result<Option<Vec<u64>>, PlatformError> {
        match GuildId::new(guild_id)
            .member(&*self.http, UserId::new(user_id))
            .await
        {
            Ok(member) => Ok(Some(member.roles.iter().map(|role| role.get()).collect())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_user(&self, user_id: u64) -> Result<UserProfile, PlatformError> {
        let user = UserId::new(user_id).to_user(&*self.http).await?;
        Ok(UserProfile::from(&user))
    }

    async fn timeout(&self, guild_id: u64, user_id: u64, minutes: u32, reason: &str) -> Result<(), PlatformError> {
        let until = chrono::Utc::now() + chrono::Duration::minutes(i64::from(minutes));
        GuildId::new(guild_id)
            .edit_member(
                &*self.http,
                UserId::new(user_id),
                EditMember::new()
                    .disable_communication_until_datetime(until.into())
                    .audit_log_reason(reason),
            )
            .await?;
        info!("Timed out user {user_id} in guild {guild_id} until {until}");
        Ok(())
    }

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError> {
        GuildId::new(guild_id)
            .kick_with_reason(&*self.http, UserId::new(user_id), reason)
            .await?;
        info!("Kicked user {user_id} from guild {guild_id}");
        Ok(())
    }

    async fn ban(
        &self,
        guild_id: u64,
        user_id: u64,
        delete_message_days: u8,
        reason: &str,
    ) -> Result<(), PlatformError> {
        GuildId::new(guild_id)
            .ban_with_reason(&*self.http, UserId::new(user_id), delete_message_days, reason)
            .await?;
        info!("Banned user {user_id} from guild {guild_id}");
        Ok(())
    }

    async fn unban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError> {
        self.http
            .remove_ban(GuildId::new(guild_id), UserId::new(user_id), Some(reason))
            .await?;
        info!("Unbanned user {user_id} in guild {guild_id}");
        Ok(())
    }

    async fn list_bans(&self, guild_id: u64) -> Result<Vec<BanEntry>, PlatformError> {
        let bans = GuildId::new(guild_id)
            .bans(&*self.http, None, Some(BAN_LIST_PAGE))
            .await?;
        Ok(bans
            .iter()
            .map(|ban| BanEntry {
                user: UserProfile::from(&ban.user),
                reason: ban.reason.clone(),
            })
            .collect())
    }

    async fn send_direct_message(
        &self,
        user_id: u64,
        guild_id: u64,
        event: &ModerationEvent,
        reveal_moderator: bool,
    ) -> Result<(), PlatformError> {
        let guild_name = GuildId::new(guild_id)
            .to_partial_guild(&*self.http)
            .await
            .map_or_else(|_| "the server".to_string(), |guild| guild.name);
        let Some(embed) = embeds::direct_message_embed(event, &guild_name, reveal_moderator) else {
            return Ok(());
        };
        UserId::new(user_id)
            .direct_message(&*self.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for DiscordGateway {
    async fn publish(&self, channel_id: u64, event: &ModerationEvent) -> Result<(), PlatformError> {
        ChannelId::new(channel_id)
            .send_message(&*self.http, CreateMessage::new().embed(embeds::log_embed(event)))
            .await?;
        Ok(())
    }
}
