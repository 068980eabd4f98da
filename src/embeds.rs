//! Embed rendering for log messages, direct messages and command replies

use crate::ledger::{Case, CaseType, Severity};
use crate::moderation::{
    ActionReport, BanEntry, CodeGrant, ModerationError, ModerationEvent, ModerationOutcome,
    ReportNote, RevertOutcome, UserProfile,
};
use crate::permissions::{CommandName, PermissionResolver};
use poise::serenity_prelude::{Colour, CreateEmbed, CreateEmbedFooter, Timestamp};
use std::fmt::Write;

pub const INFO_COLOR: u32 = 0x0034_98db;
pub const SUCCESS_COLOR: u32 = 0x002e_cc71;
pub const ERROR_COLOR: u32 = 0x00e7_4c3c;
pub const CODE_COLOR: u32 = 0x009b_59b6;
const TIMEOUT_COLOR: u32 = 0x00f1_c40f;
const KICK_COLOR: u32 = 0x00e6_7e22;
const BAN_COLOR: u32 = 0x0099_2d22;

/// Most cases listed in one reply
pub const CASE_LIST_LIMIT: usize = 20;

fn base(color: u32, title: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .colour(Colour::new(color))
        .title(title)
        .timestamp(Timestamp::now())
}

fn case_label(case_number: Option<u64>) -> String {
    case_number.map_or_else(|| "N/A".to_string(), |n| format!("#{n}"))
}

fn member_label(user: &UserProfile) -> String {
    format!("{} ({})", user.tag, user.id)
}

fn severity_label(severity: Severity) -> String {
    format!("{} {}", severity.emoji(), severity.to_string().to_uppercase())
}

fn case_color(kind: CaseType) -> u32 {
    match kind {
        CaseType::Warn => Severity::Moderate.color(),
        CaseType::Timeout => TIMEOUT_COLOR,
        CaseType::Kick => KICK_COLOR,
        CaseType::Ban | CaseType::Hackban => BAN_COLOR,
    }
}

/// Message for the log or code channel.
#[must_use]
pub fn log_embed(event: &ModerationEvent) -> CreateEmbed {
    match event {
        ModerationEvent::Warned {
            target,
            moderator,
            reason,
            severity,
            case_number,
            warning_count,
            timeout_minutes,
        } => {
            let mut embed = base(severity.color(), format!("{} Member Warned", severity.emoji()))
                .thumbnail(&target.avatar_url)
                .field("Member", member_label(target), true)
                .field("Case #", case_label(*case_number), true)
                .field("Moderator", &moderator.tag, true)
                .field("Severity", severity_label(*severity), true)
                .field("Reason", reason, false)
                .footer(CreateEmbedFooter::new(format!(
                    "User ID: {} | Warning #{}",
                    target.id,
                    warning_count.map_or_else(|| "N/A".to_string(), |c| c.to_string())
                )));
            if let Some(minutes) = timeout_minutes {
                embed = embed.field("Timeout", format!("{minutes} minute(s)"), true);
            }
            embed
        }
        ModerationEvent::TimedOut {
            target,
            moderator,
            reason,
            minutes,
            case_number,
        } => base(TIMEOUT_COLOR, "⏱️ Member Timed Out")
            .thumbnail(&target.avatar_url)
            .field("Member", member_label(target), true)
            .field("Case #", case_label(*case_number), true)
            .field("Moderator", &moderator.tag, true)
            .field("Duration", format!("{minutes} minute(s)"), true)
            .field("Reason", reason, false),
        ModerationEvent::Kicked {
            target,
            moderator,
            reason,
            case_number,
        } => base(KICK_COLOR, "👢 Member Kicked")
            .thumbnail(&target.avatar_url)
            .field("Member", member_label(target), true)
            .field("Case #", case_label(*case_number), true)
            .field("Moderator", &moderator.tag, true)
            .field("Reason", reason, false),
        ModerationEvent::Banned {
            target,
            moderator,
            reason,
            hackban,
            delete_days,
            case_number,
            override_used,
        } => {
            let title = if *hackban {
                "🔨 Hackban Issued"
            } else {
                "🔨 Member Banned"
            };
            let mut embed = base(BAN_COLOR, title)
                .thumbnail(&target.avatar_url)
                .field("Member", member_label(target), true)
                .field("Case #", case_label(*case_number), true)
                .field("Moderator", &moderator.tag, true)
                .field("Messages Deleted", format!("{delete_days} day(s)"), true)
                .field("Reason", reason, false);
            if *override_used {
                embed = embed.field("🔑 Override Code", "Used", true);
            }
            embed
        }
        ModerationEvent::Unbanned {
            target,
            moderator,
            reason,
            override_used,
        } => {
            let mut embed = base(SUCCESS_COLOR, "✅ Member Unbanned")
                .field("Member", member_label(target), true)
                .field("Moderator", &moderator.tag, true)
                .field("Reason", reason, false);
            if *override_used {
                embed = embed.field("🔑 Override Code", "Used", true);
            }
            embed
        }
        ModerationEvent::WarningsCleared {
            target,
            moderator,
            cleared,
        } => base(SUCCESS_COLOR, "✅ Warnings Cleared")
            .field("Member", member_label(target), true)
            .field("Moderator", &moderator.tag, true)
            .field("Warnings Removed", cleared.to_string(), true),
        ModerationEvent::CaseDeleted {
            case,
            moderator,
            revert,
        } => {
            let mut embed = base(ERROR_COLOR, "🗑️ Case Deleted")
                .field("Case", format!("#{}", case.case_number), true)
                .field("Type", case.kind.to_string().to_uppercase(), true)
                .field("User", &case.username, true)
                .field("Deleted By", &moderator.tag, true)
                .field("Original Reason", &case.reason, false);
            if let Some(revert) = revert {
                embed = embed.field("Warning Revert", revert_label(*revert), false);
            }
            embed
        }
        ModerationEvent::Purged {
            channel_id,
            moderator,
            requested,
            deleted,
            target,
        } => {
            let mut embed = base(INFO_COLOR, "🗑️ Messages Purged")
                .field("Channel", format!("<#{channel_id}>"), true)
                .field("Moderator", &moderator.tag, true)
                .field("Deleted", format!("{deleted} of {requested}"), true);
            if let Some(target) = target {
                embed = embed.field("Filtered To", member_label(target), true);
            }
            embed
        }
        ModerationEvent::CodeIssued {
            code,
            generated_by,
            fresh,
        } => {
            let title = if *fresh {
                "🔑 Ban Override Code Generated"
            } else {
                "🔑 Current Ban Override Code"
            };
            code_embed(title, code, "Generated By", generated_by)
        }
        ModerationEvent::CodeUsed {
            code,
            used_by,
            generated_by,
        } => base(CODE_COLOR, "🔑 Override Code Used")
            .field("Code Used", format!("`{code}`"), true)
            .field("Used By", &used_by.tag, true)
            .field("Originally Generated By", generated_by, true)
            .description("A replacement code will be posted here after the disclosure delay."),
        ModerationEvent::CodeDisclosed { code, generated_by } => code_embed(
            "🔑 Auto-Generated Ban Override Code (24hr Delay)",
            code,
            "Originally Generated By",
            generated_by,
        )
        .description("A new override code has been automatically generated after the previous one was used."),
    }
}

fn code_embed(title: &str, code: &str, by_label: &str, by: &str) -> CreateEmbed {
    base(CODE_COLOR, title)
        .field("Override Code", format!("`{code}`"), false)
        .field("Valid For", "One-time use only", true)
        .field("Command", "Ban", true)
        .field(by_label, by, true)
}

const fn revert_label(revert: RevertOutcome) -> &'static str {
    match revert {
        RevertOutcome::Reverted => "One warning removed from the user's count",
        RevertOutcome::NothingToRevert => "The user had no warnings left to remove",
        RevertOutcome::NotAWarnCase => "Not a warn case, nothing to revert",
    }
}

/// Notice sent to the sanctioned user, `None` for events that are not
/// delivered by DM.
#[must_use]
pub fn direct_message_embed(
    event: &ModerationEvent,
    guild_name: &str,
    reveal_moderator: bool,
) -> Option<CreateEmbed> {
    let ModerationEvent::Warned {
        moderator,
        reason,
        severity,
        case_number,
        warning_count,
        timeout_minutes,
        ..
    } = event
    else {
        return None;
    };

    let mut embed = base(severity.color(), format!("{} You have been warned", severity.emoji()))
        .description(format!(
            "You have received a **{severity}** warning in **{guild_name}**."
        ))
        .field("Reason", reason, false)
        .field("Case Number", case_label(*case_number), true)
        .field("Severity", severity.to_string().to_uppercase(), true)
        .field(
            "Warning Count",
            warning_count.map_or_else(|| "N/A".to_string(), |c| c.to_string()),
            true,
        )
        .footer(CreateEmbedFooter::new(
            "Please follow the server rules to avoid further warnings.",
        ));
    if reveal_moderator {
        embed = embed.field("Warned by", &moderator.tag, true);
    }
    if let Some(minutes) = timeout_minutes {
        embed = embed.field("Timeout", format!("{minutes} minute(s)"), false);
    }
    Some(embed)
}

/// Private reply to the actor.
#[must_use]
pub fn outcome_embed(outcome: &ModerationOutcome) -> CreateEmbed {
    match outcome {
        ModerationOutcome::Action(report) => action_embed(report),
        ModerationOutcome::CaseDetail(case) => case_detail_embed(case),
        ModerationOutcome::Cases { title, cases } => case_list_embed(title, cases),
        ModerationOutcome::BanList(bans) => ban_list_embed(bans),
        ModerationOutcome::Code(grant) => code_grant_embed(grant),
    }
}

fn action_embed(report: &ActionReport) -> CreateEmbed {
    let mut embed = match &report.event {
        ModerationEvent::Warned {
            target,
            reason,
            severity,
            case_number,
            warning_count,
            timeout_minutes,
            ..
        } => {
            let mut embed = base(severity.color(), format!("{} Warning Issued", severity.emoji()))
                .description(format!("Successfully warned **{}**", target.tag))
                .field("Case Number", case_label(*case_number), true)
                .field("Severity", severity_label(*severity), true)
                .field(
                    "Warning Count",
                    warning_count.map_or_else(|| "N/A".to_string(), |c| format!("#{c}")),
                    true,
                )
                .field("Reason", reason, false);
            if let Some(minutes) = timeout_minutes {
                embed = embed.field("⏱️ Timeout Applied", format!("{minutes} minute(s)"), true);
            }
            embed
        }
        ModerationEvent::TimedOut {
            target,
            minutes,
            case_number,
            ..
        } => base(TIMEOUT_COLOR, "⏱️ Timeout Issued")
            .description(format!(
                "**{}** has been timed out for {minutes} minute(s).",
                target.tag
            ))
            .field("Case Number", case_label(*case_number), true),
        ModerationEvent::Kicked {
            target, case_number, ..
        } => base(KICK_COLOR, "👢 Member Kicked")
            .description(format!("**{}** has been kicked.", target.tag))
            .field("Case Number", case_label(*case_number), true),
        ModerationEvent::Banned {
            target,
            hackban,
            case_number,
            ..
        } => base(
            BAN_COLOR,
            if *hackban {
                "🔨 Hackban Issued"
            } else {
                "🔨 Member Banned"
            },
        )
        .description(format!("**{}** has been banned.", target.tag))
        .field("Case Number", case_label(*case_number), true),
        ModerationEvent::Unbanned { target, .. } => base(SUCCESS_COLOR, "✅ Member Unbanned")
            .description(format!("**{}** has been unbanned.", target.tag)),
        other => log_embed(other),
    };

    for note in &report.notes {
        embed = match note {
            ReportNote::DirectMessageSent => embed.field("✅ DM Status", "DM sent successfully", false),
            ReportNote::DirectMessageFailed => embed.field(
                "⚠️ DM Status",
                "Could not send DM (user may have DMs disabled)",
                false,
            ),
            ReportNote::SilentMode => embed.field("🔇 Silent Mode", "No DM sent to user", false),
            ReportNote::TimeoutFailed => embed.field(
                "⚠️ Timeout",
                "The warning was recorded but the timeout could not be applied",
                false,
            ),
            ReportNote::OverrideCodeUsed => embed.field(
                "🔑 Override Code",
                "Used. A replacement will be posted after the disclosure delay.",
                false,
            ),
        };
    }
    embed
}

#[must_use]
pub fn case_detail_embed(case: &Case) -> CreateEmbed {
    let mut embed = base(INFO_COLOR, format!("📁 Case #{}", case.case_number))
        .thumbnail(&case.user_avatar)
        .field(
            "Type",
            format!("{} {}", case.kind.emoji(), case.kind.to_string().to_uppercase()),
            true,
        )
        .field("User", format!("{} ({})", case.username, case.user_id), true)
        .field("Moderator", &case.moderator_name, true)
        .field(
            "Severity",
            case.severity
                .map_or_else(|| "None".to_string(), severity_label),
            true,
        )
        .field("Reason", &case.reason, false)
        .timestamp(Timestamp::from(case.timestamp));
    if let Some(duration) = case.duration {
        embed = embed.field(
            "Duration",
            format!("{duration} {}", case.kind.duration_unit()),
            true,
        );
    }
    embed
}

#[must_use]
pub fn case_list_embed(title: &str, cases: &[Case]) -> CreateEmbed {
    let mut description = String::new();
    for case in cases.iter().take(CASE_LIST_LIMIT) {
        let _ = writeln!(
            description,
            "**#{}** {} {} ({})",
            case.case_number,
            case.kind.emoji(),
            case.reason,
            case.severity
                .map_or_else(|| "None".to_string(), |s| s.to_string())
        );
    }

    let mut embed = base(INFO_COLOR, title).description(description);
    if cases.len() > CASE_LIST_LIMIT {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Showing {CASE_LIST_LIMIT} of {} cases",
            cases.len()
        )));
    }
    embed
}

#[must_use]
pub fn ban_list_embed(bans: &[BanEntry]) -> CreateEmbed {
    if bans.is_empty() {
        return base(INFO_COLOR, "📋 Banned Users List").description("No users are currently banned.");
    }

    let mut description = String::new();
    for ban in bans {
        let _ = writeln!(
            description,
            "**{}** ({})\nReason: {}",
            ban.user.tag,
            ban.user.id,
            ban.reason.as_deref().unwrap_or("No reason provided")
        );
    }
    base(INFO_COLOR, "📋 Banned Users List")
        .description(description)
        .footer(CreateEmbedFooter::new(
            "Use /unban with a user ID to unban someone",
        ))
}

fn code_grant_embed(grant: &CodeGrant) -> CreateEmbed {
    let title = if grant.fresh {
        "🔑 Ban Override Code Generated"
    } else {
        "🔑 Current Ban Override Code"
    };
    let embed = base(CODE_COLOR, title)
        .field("Override Code", format!("`{}`", grant.code), false)
        .field("Valid For", "One-time use only", true)
        .field("Command", "Ban", true);
    match grant.published_to {
        Some(channel_id) => embed.description(format!("Posted to <#{channel_id}>.")),
        None => embed.description("Only you can see this code."),
    }
}

#[must_use]
pub fn error_embed(error: &ModerationError) -> CreateEmbed {
    base(ERROR_COLOR, error.title()).description(error.to_string())
}

fn help_line(command: CommandName) -> Option<(&'static str, &'static str)> {
    let line = match command {
        CommandName::Warn => (
            "⚠️ /warn @user <reason>",
            "Warn a user with options:\n• **severity**: ⚠️ Minor | 🔶 Moderate | 🔴 Severe\n• **timeout**: Timeout duration (1-40320 min)\n• **silent**: Skip sending DM to user",
        ),
        CommandName::Timeout => ("⏱️ /timeout @user <duration> <reason>", "Timeout a user without warning"),
        CommandName::Kick => ("👢 /kick @user <reason>", "Kick a user from the server"),
        CommandName::Ban => (
            "🔨 /ban <target> <reason>",
            "Ban a user from the server\n• **target**: User @mention or User ID\n• **hackban**: Ban by ID without membership checks\n• **delete_days**: Delete message history (0-7 days)\n• **override_code**: One-time code for roles without ban permission",
        ),
        CommandName::Unban => (
            "✅ /unban <user_id> <reason>",
            "Unban a user from the server\n• Leave **user_id** empty to see the banned list\n• **override_code**: One-time code for roles without ban permission",
        ),
        CommandName::ClearWarnings => ("🗑️ /clearwarnings @user", "Clear all warnings for a user"),
        CommandName::Purge => (
            "💬 /purge <amount>",
            "Delete 1-100 recent messages\n• **user**: Only delete messages from a specific user",
        ),
        CommandName::Case => ("📁 /case", "Look up cases by number, user or severity"),
        CommandName::DeleteCase => ("🗑️ /deletecase <number>", "Delete a case (optionally revert the warning)"),
        CommandName::GenerateBanCode => ("🔑 /generatebancode", "Show or generate the current ban override code"),
        CommandName::Help => ("📖 /help", "Show this help message"),
        CommandName::Hackban => return None,
    };
    Some(line)
}

fn required_roles(resolver: &PermissionResolver, command: CommandName) -> String {
    if !command.requires_grant() {
        return "All Staff".to_string();
    }
    let roles = resolver.roles_allowing(command);
    if roles.is_empty() {
        return "Override only".to_string();
    }
    roles
        .iter()
        .map(|role| role.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Command overview with the roles allowed to run each command.
#[must_use]
pub fn help_embed(resolver: &PermissionResolver) -> CreateEmbed {
    let mut embed = base(INFO_COLOR, "📋 Moderation Commands")
        .description("Role requirements are shown for each command.");

    for command in CommandName::ALL {
        let Some((name, text)) = help_line(command) else {
            continue;
        };
        let mut requirement = required_roles(resolver, command);
        if command == CommandName::Ban {
            let _ = write!(
                requirement,
                " (hackban: {}, or any staff with an override code)",
                required_roles(resolver, CommandName::Hackban)
            );
        }
        embed = embed.field(name, format!("{text}\n**Required Role:** {requirement}"), false);
    }
    embed.footer(CreateEmbedFooter::new(crate::BOT_NAME))
}
