//! Slash commands
//!
//! Each command turns its options into a moderation intent, hands it to the
//! dispatcher and replies privately with the outcome.

use crate::embeds;
use crate::ledger::Severity;
use crate::moderation::{
    ActionDispatcher, Actor, CaseQuery, ModerationCommand, ModerationError, ModerationEvent, ModerationIntent,
    PlatformError, UserProfile,
};
use crate::permissions::CommandName;
use crate::{Context, Error};
use poise::CreateReply;
use poise::serenity_prelude::{self as serenity, CreateEmbed, GetMessages, MessageId};

/// Messages older than this cannot be bulk deleted
const BULK_DELETE_MAX_AGE_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum SeverityChoice {
    #[name = "minor"]
    Minor,
    #[name = "moderate"]
    Moderate,
    #[name = "severe"]
    Severe,
}

impl From<SeverityChoice> for Severity {
    fn from(choice: SeverityChoice) -> Self {
        match choice {
            SeverityChoice::Minor => Self::Minor,
            SeverityChoice::Moderate => Self::Moderate,
            SeverityChoice::Severe => Self::Severe,
        }
    }
}

/// Timeout lengths offered by the warn and timeout commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum TimeoutChoice {
    #[name = "60 seconds"]
    OneMinute,
    #[name = "5 minutes"]
    FiveMinutes,
    #[name = "10 minutes"]
    TenMinutes,
    #[name = "30 minutes"]
    ThirtyMinutes,
    #[name = "1 hour"]
    OneHour,
    #[name = "6 hours"]
    SixHours,
    #[name = "12 hours"]
    TwelveHours,
    #[name = "1 day"]
    OneDay,
    #[name = "3 days"]
    ThreeDays,
    #[name = "1 week"]
    OneWeek,
    #[name = "28 days"]
    FourWeeks,
}

impl TimeoutChoice {
    #[must_use]
    pub const fn minutes(self) -> i64 {
        match self {
            Self::OneMinute => 1,
            Self::FiveMinutes => 5,
            Self::TenMinutes => 10,
            Self::ThirtyMinutes => 30,
            Self::OneHour => 60,
            Self::SixHours => 6 * 60,
            Self::TwelveHours => 12 * 60,
            Self::OneDay => 24 * 60,
            Self::ThreeDays => 3 * 24 * 60,
            Self::OneWeek => 7 * 24 * 60,
            Self::FourWeeks => 28 * 24 * 60,
        }
    }
}

impl From<&serenity::User> for Actor {
    fn from(user: &serenity::User) -> Self {
        Self {
            id: user.id.get(),
            tag: user.tag(),
            avatar_url: user.face(),
            role_ids: Vec::new(),
        }
    }
}

async fn actor(ctx: Context<'_>) -> Actor {
    let mut actor = Actor::from(ctx.author());
    if let Some(member) = ctx.author_member().await {
        actor.role_ids = member.roles.iter().map(|role| role.get()).collect();
    }
    actor
}

fn guild_id(ctx: Context<'_>) -> Result<u64, Error> {
    ctx.guild_id()
        .map(|id| id.get())
        .ok_or_else(|| "This command can only be used in a server.".into())
}

async fn reply(ctx: Context<'_>, embed: CreateEmbed) -> Result<(), Error> {
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Defer, dispatch and answer with the outcome or the reason it failed.
async fn run(ctx: Context<'_>, command: ModerationCommand) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let intent = ModerationIntent::new(guild_id(ctx)?, actor(ctx).await, command);
    let embed = match ctx.data().dispatcher.dispatch(intent).await {
        Ok(outcome) => embeds::outcome_embed(&outcome),
        Err(e) => embeds::error_embed(&e),
    };
    reply(ctx, embed).await
}

/// Warn a user
#[poise::command(slash_command, guild_only)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "User to warn"] user: serenity::User,
    #[description = "Reason"] reason: String,
    #[description = "How serious the warning is"] severity: Option<SeverityChoice>,
    #[description = "Also time the user out"] timeout: Option<TimeoutChoice>,
    #[description = "Don't send a DM"] silent: Option<bool>,
) -> Result<(), Error> {
    let command = ModerationCommand::Warn {
        target: UserProfile::from(&user),
        reason,
        severity: severity.map(Severity::from).unwrap_or_default(),
        timeout_minutes: timeout.map(TimeoutChoice::minutes),
        silent: silent.unwrap_or(false),
    };
    run(ctx, command).await
}

/// Look up cases by number, user or severity
#[poise::command(slash_command, guild_only)]
pub async fn case(
    ctx: Context<'_>,
    #[description = "Case number"]
    #[min = 1]
    number: Option<u64>,
    #[description = "Search by user"] user: Option<serenity::User>,
    #[description = "Search by severity"] severity: Option<SeverityChoice>,
) -> Result<(), Error> {
    let query = match (number, user, severity) {
        (Some(number), _, _) => CaseQuery::Number(number),
        (None, Some(user), _) => CaseQuery::User(UserProfile::from(&user)),
        (None, None, Some(severity)) => CaseQuery::Severity(severity.into()),
        (None, None, None) => {
            ctx.defer_ephemeral().await?;
            let error = ModerationError::invalid("Please provide a case number, user, or severity.");
            return reply(ctx, embeds::error_embed(&error)).await;
        }
    };
    run(ctx, ModerationCommand::CaseLookup { query }).await
}

/// Clear all warnings for a user
#[poise::command(slash_command, guild_only)]
pub async fn clearwarnings(
    ctx: Context<'_>,
    #[description = "User"] user: serenity::User,
) -> Result<(), Error> {
    let target = UserProfile::from(&user);
    run(ctx, ModerationCommand::ClearWarnings { target }).await
}

/// Kick a user
#[poise::command(slash_command, guild_only)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "User"] user: serenity::User,
    #[description = "Reason"] reason: String,
) -> Result<(), Error> {
    let target = UserProfile::from(&user);
    run(ctx, ModerationCommand::Kick { target, reason }).await
}

/// Timeout a user
#[poise::command(slash_command, guild_only)]
pub async fn timeout(
    ctx: Context<'_>,
    #[description = "User"] user: serenity::User,
    #[description = "How long"] duration: TimeoutChoice,
    #[description = "Reason"] reason: String,
) -> Result<(), Error> {
    let command = ModerationCommand::Timeout {
        target: UserProfile::from(&user),
        minutes: duration.minutes(),
        reason,
    };
    run(ctx, command).await
}

/// Ban a user
#[poise::command(slash_command, guild_only)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "User mention or ID"] target: String,
    #[description = "Reason"] reason: String,
    #[description = "Ban by ID (even if not in server)"] hackban: Option<bool>,
    #[description = "Delete message history (0-7)"]
    #[min = 0]
    #[max = 7]
    delete_days: Option<i64>,
    #[description = "Override code"] override_code: Option<String>,
) -> Result<(), Error> {
    let command = ModerationCommand::Ban {
        target,
        reason,
        hackban: hackban.unwrap_or(false),
        delete_days: delete_days.unwrap_or(0),
        override_code,
    };
    run(ctx, command).await
}

/// Unban a user, or list current bans
#[poise::command(slash_command, guild_only)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User ID (leave empty to list bans)"] user_id: Option<String>,
    #[description = "Reason"] reason: Option<String>,
    #[description = "Override code"] override_code: Option<String>,
) -> Result<(), Error> {
    let command = ModerationCommand::Unban {
        user_id,
        reason,
        override_code,
    };
    run(ctx, command).await
}

/// Delete a case by number
#[poise::command(slash_command, guild_only)]
pub async fn deletecase(
    ctx: Context<'_>,
    #[description = "Case number"]
    #[min = 1]
    number: u64,
    #[description = "Undo the warning?"] revert_warn: Option<bool>,
) -> Result<(), Error> {
    let command = ModerationCommand::DeleteCase {
        number,
        revert_warning: revert_warn.unwrap_or(false),
    };
    run(ctx, command).await
}

/// Generate a one-time ban override code for Trial Moderators/Moderators
#[poise::command(slash_command, guild_only)]
pub async fn generatebancode(ctx: Context<'_>) -> Result<(), Error> {
    run(ctx, ModerationCommand::GenerateBanCode).await
}

/// Recent messages eligible for bulk deletion, newest first.
fn purge_candidates(
    messages: &[serenity::Message],
    amount: usize,
    author_id: Option<u64>,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<MessageId> {
    let cutoff = (now - chrono::Duration::days(BULK_DELETE_MAX_AGE_DAYS)).timestamp();
    messages
        .iter()
        .filter(|message| message.timestamp.unix_timestamp() > cutoff)
        .filter(|message| author_id.is_none_or(|id| message.author.id.get() == id))
        .take(amount)
        .map(|message| message.id)
        .collect()
}

async fn delete_messages(ctx: Context<'_>, ids: &[MessageId]) -> Result<(), PlatformError> {
    let channel_id = ctx.channel_id();
    match ids {
        [] => Ok(()),
        [id] => Ok(channel_id.delete_message(ctx, *id).await?),
        ids => Ok(channel_id.delete_messages(ctx, ids).await?),
    }
}

/// Staff gate, then the amount range.
fn check_purge(dispatcher: &ActionDispatcher, actor: &Actor, amount: u8) -> Result<(), ModerationError> {
    dispatcher.authorize(actor, CommandName::Purge)?;
    if (1..=100).contains(&amount) {
        Ok(())
    } else {
        Err(ModerationError::invalid("Amount must be between 1 and 100."))
    }
}

/// Delete messages
#[poise::command(slash_command, guild_only)]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "Amount"]
    #[min = 1]
    #[max = 100]
    amount: u8,
    #[description = "Only remove messages from this user"] user: Option<serenity::User>,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let actor = actor(ctx).await;
    let dispatcher = &ctx.data().dispatcher;

    let result = async {
        check_purge(dispatcher, &actor, amount)?;

        let channel_id = ctx.channel_id();
        let messages = channel_id
            .messages(ctx, GetMessages::new().limit(100))
            .await
            .map_err(PlatformError::from)?;
        let ids = purge_candidates(
            &messages,
            usize::from(amount),
            user.as_ref().map(|u| u.id.get()),
            chrono::Utc::now(),
        );
        delete_messages(ctx, &ids).await?;

        let event = ModerationEvent::Purged {
            channel_id: channel_id.get(),
            moderator: actor.clone(),
            requested: amount,
            deleted: ids.len(),
            target: user.as_ref().map(UserProfile::from),
        };
        dispatcher.report(&actor, &event).await;
        Ok(event)
    }
    .await;

    let embed = match result {
        Ok(event) => embeds::log_embed(&event),
        Err(e) => embeds::error_embed(&e),
    };
    reply(ctx, embed).await
}

/// Show all available moderation commands
#[poise::command(slash_command, guild_only)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let actor = actor(ctx).await;
    let dispatcher = &ctx.data().dispatcher;
    let embed = match dispatcher.authorize(&actor, CommandName::Help) {
        Ok(()) => embeds::help_embed(dispatcher.resolver()),
        Err(e) => embeds::error_embed(&e),
    };
    reply(ctx, embed).await
}

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![
        warn(),
        case(),
        clearwarnings(),
        purge(),
        kick(),
        timeout(),
        ban(),
        unban(),
        deletecase(),
        generatebancode(),
        help(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameter_names(cmd: &poise::Command<crate::Data, Error>) -> Vec<&str> {
        cmd.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_every_command_is_a_guild_slash_command() {
        let commands = all();
        assert_eq!(commands.len(), 11);
        for cmd in &commands {
            assert!(cmd.guild_only, "{} should be guild only", cmd.name);
            assert!(cmd.create_as_slash_command().is_some());
        }
    }

    #[test]
    fn test_command_names_match_permission_keys() {
        for cmd in all() {
            let name: CommandName = cmd.name.parse().expect("known command");
            assert_ne!(name, CommandName::Hackban);
        }
    }

    #[test]
    fn test_warn_definition() {
        let cmd = warn();
        assert_eq!(cmd.name, "warn");
        assert_eq!(
            parameter_names(&cmd),
            vec!["user", "reason", "severity", "timeout", "silent"]
        );
        assert!(cmd.parameters[0].required);
        assert!(!cmd.parameters[2].required);
    }

    #[test]
    fn test_ban_definition() {
        let cmd = ban();
        assert_eq!(
            parameter_names(&cmd),
            vec!["target", "reason", "hackban", "delete_days", "override_code"]
        );
    }

    #[test]
    fn test_unban_and_deletecase_definitions() {
        assert_eq!(
            parameter_names(&unban()),
            vec!["user_id", "reason", "override_code"]
        );
        assert!(unban().parameters.iter().all(|p| !p.required));
        assert_eq!(parameter_names(&deletecase()), vec!["number", "revert_warn"]);
    }

    #[test]
    fn test_timeout_choices() {
        let choices = [
            TimeoutChoice::OneMinute,
            TimeoutChoice::FiveMinutes,
            TimeoutChoice::TenMinutes,
            TimeoutChoice::ThirtyMinutes,
            TimeoutChoice::OneHour,
            TimeoutChoice::SixHours,
            TimeoutChoice::TwelveHours,
            TimeoutChoice::OneDay,
            TimeoutChoice::ThreeDays,
            TimeoutChoice::OneWeek,
            TimeoutChoice::FourWeeks,
        ];
        for choice in choices {
            assert!(
                crate::moderation::intent::validate_timeout_minutes(choice.minutes()).is_ok(),
                "{choice:?} should be a valid timeout"
            );
        }
        assert_eq!(TimeoutChoice::OneDay.minutes(), 1440);
        assert_eq!(TimeoutChoice::FourWeeks.minutes(), 40_320);

        assert_eq!(timeout().parameters[1].choices.len(), choices.len());
        assert_eq!(warn().parameters[3].choices.len(), choices.len());
    }

    #[test]
    fn test_purge_checks_staff_before_amount() {
        use crate::ledger::Ledgers;
        use crate::moderation::platform::{MockModerationPlatform, MockNotificationSink};
        use crate::moderation::{Denial, DispatchSettings};
        use crate::permissions::{OverrideEntry, Permission, PermissionResolver, StaffRole};
        use crate::storage::JsonStore;
        use std::sync::Arc;

        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = PermissionResolver::new(
            [StaffRole {
                id: 8,
                name: "Staff".to_string(),
                level: 8,
                permissions: Permission::none(),
            }],
            Vec::<OverrideEntry>::new(),
        );
        let dispatcher = ActionDispatcher::new(
            Arc::new(resolver),
            Ledgers::open(&JsonStore::new(dir.path()), None),
            Arc::new(MockModerationPlatform::new()),
            Arc::new(MockNotificationSink::new()),
            DispatchSettings::default(),
        );
        let outsider = Actor {
            id: 1,
            tag: "outsider".to_string(),
            avatar_url: String::new(),
            role_ids: Vec::new(),
        };
        let staff = Actor {
            role_ids: vec![8],
            ..outsider.clone()
        };

        assert!(matches!(
            check_purge(&dispatcher, &outsider, 0),
            Err(ModerationError::AuthorizationDenied(Denial::NotStaff))
        ));
        assert!(matches!(
            check_purge(&dispatcher, &staff, 0),
            Err(ModerationError::InvalidInput(_))
        ));
        assert!(check_purge(&dispatcher, &staff, 100).is_ok());
    }

    #[test]
    fn test_severity_choice_conversion() {
        assert_eq!(Severity::from(SeverityChoice::Minor), Severity::Minor);
        assert_eq!(Severity::from(SeverityChoice::Severe), Severity::Severe);
    }
}
