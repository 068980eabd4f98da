//! Moderation intent dispatcher
//!
//! Every intent goes through the same pipeline:
//! staff gate, input validation, permission or override-code check, staff
//! immunity, the platform action, and finally ledger writes and the log
//! message. A rejected platform action stops the pipeline before any ledger
//! is touched. Ledger writes and log messages are skipped for invisible
//! actors (override entries without a real staff role).

use super::error::{Denial, ModerationError, ModerationResult};
use super::event::{
    ActionReport, CodeGrant, ModerationEvent, ModerationOutcome, ReportNote, RevertOutcome,
};
use super::intent::{
    Actor, CaseQuery, ModerationCommand, ModerationIntent, parse_user_reference,
    validate_delete_days, validate_timeout_minutes,
};
use super::platform::{ModerationPlatform, NotificationSink, UserProfile};
use crate::ledger::{CaseType, Ledgers, NewCase, Severity, default_avatar_url};
use crate::permissions::{CommandName, PermissionResolver};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Default highest level number (lowest rank) allowed to view ban codes
pub const DEFAULT_CODE_VIEWER_MAX_LEVEL: i32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub log_channel_id: Option<u64>,
    pub code_channel_id: Option<u64>,
    pub code_viewer_max_level: i32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            log_channel_id: None,
            code_channel_id: None,
            code_viewer_max_level: DEFAULT_CODE_VIEWER_MAX_LEVEL,
        }
    }
}

#[derive(Clone)]
pub struct ActionDispatcher {
    resolver: Arc<PermissionResolver>,
    ledgers: Ledgers,
    platform: Arc<dyn ModerationPlatform>,
    sink: Arc<dyn NotificationSink>,
    settings: DispatchSettings,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("ledgers", &self.ledgers)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn unknown_user(user_id: u64) -> UserProfile {
    UserProfile {
        id: user_id,
        name: user_id.to_string(),
        tag: format!("User ID: {user_id}"),
        avatar_url: default_avatar_url(user_id),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ActionDispatcher {
    pub fn new(
        resolver: Arc<PermissionResolver>,
        ledgers: Ledgers,
        platform: Arc<dyn ModerationPlatform>,
        sink: Arc<dyn NotificationSink>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            resolver,
            ledgers,
            platform,
            sink,
            settings,
        }
    }

    #[must_use]
    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    #[must_use]
    pub fn ledgers(&self) -> &Ledgers {
        &self.ledgers
    }

    #[must_use]
    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    /// Run one moderation intent to completion.
    ///
    /// # Errors
    /// Returns a `ModerationError` describing why nothing (or only part of
    /// the pipeline) happened.
    #[instrument(
        name = "moderation_intent",
        skip_all,
        fields(
            intent_id = %intent.id,
            command = %intent.command.name(),
            guild_id = intent.guild_id,
            actor_id = intent.actor.id,
        )
    )]
    pub async fn dispatch(&self, intent: ModerationIntent) -> ModerationResult<ModerationOutcome> {
        let ModerationIntent {
            guild_id,
            actor,
            command,
            ..
        } = intent;

        let result = self.run(guild_id, &actor, command).await;
        match &result {
            Ok(_) => info!("Moderation intent completed"),
            Err(ModerationError::Storage(e)) => error!(error = %e, "Moderation intent failed"),
            Err(e) => warn!(error = %e, "Moderation intent rejected"),
        }
        result
    }

    async fn run(
        &self,
        guild_id: u64,
        actor: &Actor,
        command: ModerationCommand,
    ) -> ModerationResult<ModerationOutcome> {
        self.ensure_staff(actor)?;

        match command {
            ModerationCommand::Warn {
                target,
                reason,
                severity,
                timeout_minutes,
                silent,
            } => {
                self.warn(guild_id, actor, target, reason, severity, timeout_minutes, silent)
                    .await
            }
            ModerationCommand::Timeout {
                target,
                minutes,
                reason,
            } => self.timeout(guild_id, actor, target, minutes, reason).await,
            ModerationCommand::Kick { target, reason } => {
                self.kick(guild_id, actor, target, reason).await
            }
            ModerationCommand::Ban {
                target,
                reason,
                hackban,
                delete_days,
                override_code,
            } => {
                self.ban(guild_id, actor, &target, reason, hackban, delete_days, override_code)
                    .await
            }
            ModerationCommand::Unban {
                user_id,
                reason,
                override_code,
            } => self.unban(guild_id, actor, user_id, reason, override_code).await,
            ModerationCommand::ClearWarnings { target } => {
                self.clear_warnings(guild_id, actor, target).await
            }
            ModerationCommand::CaseLookup { query } => self.lookup_cases(guild_id, query).await,
            ModerationCommand::DeleteCase {
                number,
                revert_warning,
            } => self.delete_case(guild_id, actor, number, revert_warning).await,
            ModerationCommand::GenerateBanCode => self.generate_ban_code(actor).await,
        }
    }

    /// Staff gate plus the command's own permission rule. Used by commands
    /// that act outside the dispatcher, like purge and help.
    ///
    /// # Errors
    /// Returns `AuthorizationDenied` when the actor may not run `command`.
    pub fn authorize(&self, actor: &Actor, command: CommandName) -> ModerationResult<()> {
        self.ensure_staff(actor)?;
        match command {
            CommandName::GenerateBanCode if !self.may_view_codes(actor) => {
                Err(self.missing(actor, command).into())
            }
            CommandName::GenerateBanCode => Ok(()),
            command if command.requires_grant() => Ok(self.require_permission(actor, command)?),
            _ => Ok(()),
        }
    }

    /// Send `event` to the log channel unless the actor is invisible.
    /// Returns whether a message went out.
    pub async fn report(&self, actor: &Actor, event: &ModerationEvent) -> bool {
        if !self.recordable(actor) {
            debug!(actor_id = actor.id, "Skipped log for invisible actor");
            return false;
        }
        let Some(channel_id) = self.settings.log_channel_id else {
            return false;
        };
        match self.sink.publish(channel_id, event).await {
            Ok(()) => true,
            Err(e) => {
                warn!(channel_id, "Failed to send log message: {e}");
                false
            }
        }
    }

    #[must_use]
    pub fn recordable(&self, actor: &Actor) -> bool {
        self.resolver.is_recordable(&actor.role_ids, actor.id)
    }

    fn ensure_staff(&self, actor: &Actor) -> Result<(), Denial> {
        if self.resolver.is_staff(&actor.role_ids, actor.id) {
            Ok(())
        } else {
            Err(Denial::NotStaff)
        }
    }

    fn has(&self, actor: &Actor, command: CommandName) -> bool {
        self.resolver
            .has_command_permission(&actor.role_ids, actor.id, command)
    }

    fn missing(&self, actor: &Actor, command: CommandName) -> Denial {
        Denial::MissingPermission {
            role: self.resolver.role_name(&actor.role_ids, actor.id),
            command,
        }
    }

    fn require_permission(&self, actor: &Actor, command: CommandName) -> Result<(), Denial> {
        if self.has(actor, command) {
            Ok(())
        } else {
            Err(self.missing(actor, command))
        }
    }

    fn may_view_codes(&self, actor: &Actor) -> bool {
        self.has(actor, CommandName::GenerateBanCode)
            || self
                .resolver
                .resolve_identity(&actor.role_ids, actor.id)
                .is_some_and(|identity| identity.level <= self.settings.code_viewer_max_level)
    }

    /// Staff members cannot be sanctioned unless the actor holds an override.
    async fn ensure_not_immune(
        &self,
        guild_id: u64,
        actor: &Actor,
        target_id: u64,
        target_display: &str,
    ) -> ModerationResult<()> {
        if self.resolver.is_overridden(actor.id) {
            return Ok(());
        }
        match self.platform.member_role_ids(guild_id, target_id).await {
            Ok(Some(role_ids)) => match self.resolver.resolve_identity(&role_ids, target_id) {
                Some(identity) => Err(Denial::StaffImmune {
                    target: target_display.to_string(),
                    role: identity.name,
                }
                .into()),
                None => Ok(()),
            },
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(target_id, "Could not fetch target member for immunity check: {e}");
                Err(e.into())
            }
        }
    }

    /// Consume a ban override code, announce its use and mint the
    /// replacement.
    async fn consume_override_code(&self, actor: &Actor, code: &str) -> ModerationResult<()> {
        let Some(consumed) = self
            .ledgers
            .codes
            .validate_and_consume(code, CommandName::Ban, actor.id)
            .await?
        else {
            return Err(Denial::InvalidOverrideCode.into());
        };
        info!(actor_id = actor.id, "Override code consumed");

        if !self.recordable(actor) {
            debug!("Skipped override code usage notice for invisible actor");
        } else if let Some(channel_id) = self.settings.code_channel_id {
            let notice = ModerationEvent::CodeUsed {
                code: consumed.code.clone(),
                used_by: actor.clone(),
                generated_by: consumed.public_generator().to_string(),
            };
            if let Err(e) = self.sink.publish(channel_id, &notice).await {
                warn!(channel_id, "Failed to send override code usage notice: {e}");
            }
        }

        if let Err(e) = self.ledgers.codes.generate_replacement(&consumed).await {
            error!("Failed to generate replacement override code: {e}");
        }
        Ok(())
    }

    /// Resolve the override-code path for actors lacking `permission`.
    /// Returns the code to consume, if one is needed.
    fn code_requirement(
        &self,
        actor: &Actor,
        permission: CommandName,
        has_permission: bool,
        override_code: Option<String>,
    ) -> Result<Option<String>, Denial> {
        if has_permission {
            return Ok(None);
        }
        match non_empty(override_code) {
            Some(code) => Ok(Some(code)),
            None => Err(Denial::OverrideCodeRequired {
                role: self.resolver.role_name(&actor.role_ids, actor.id),
                command: permission,
            }),
        }
    }

    fn new_case(actor: &Actor, target: &UserProfile, kind: CaseType, reason: &str) -> NewCase {
        NewCase {
            kind,
            user_id: target.id,
            username: target.name.clone(),
            user_avatar: Some(target.avatar_url.clone()),
            moderator_id: actor.id,
            moderator_name: actor.tag.clone(),
            moderator_avatar: Some(actor.avatar_url.clone()),
            reason: reason.to_string(),
            severity: None,
            duration: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn warn(
        &self,
        guild_id: u64,
        actor: &Actor,
        target: UserProfile,
        reason: String,
        severity: Severity,
        timeout_minutes: Option<i64>,
        silent: bool,
    ) -> ModerationResult<ModerationOutcome> {
        let timeout = timeout_minutes.map(validate_timeout_minutes).transpose()?;
        self.require_permission(actor, CommandName::Warn)?;
        self.ensure_not_immune(guild_id, actor, target.id, &target.tag)
            .await?;

        let recorded = self.recordable(actor);
        let (warning_count, case_number) = if recorded {
            let count = self
                .ledgers
                .warnings
                .add_warning(guild_id, target.id, &target.name, &reason, severity)
                .await?;
            let mut new_case = Self::new_case(actor, &target, CaseType::Warn, &reason);
            new_case.severity = Some(severity);
            new_case.duration = timeout;
            let number = self.ledgers.cases.create_case(guild_id, new_case).await?;
            (Some(count), Some(number))
        } else {
            debug!("Warning by invisible actor not recorded");
            (None, None)
        };

        let mut notes = Vec::new();
        let mut event = ModerationEvent::Warned {
            target: target.clone(),
            moderator: actor.clone(),
            reason: reason.clone(),
            severity,
            case_number,
            warning_count,
            timeout_minutes: timeout,
        };

        if silent {
            notes.push(ReportNote::SilentMode);
        } else {
            match self
                .platform
                .send_direct_message(target.id, guild_id, &event, recorded)
                .await
            {
                Ok(()) => notes.push(ReportNote::DirectMessageSent),
                Err(e) => {
                    warn!(target_id = target.id, "Failed to DM warned user: {e}");
                    notes.push(ReportNote::DirectMessageFailed);
                }
            }
        }

        if let Some(minutes) = timeout {
            if let Err(e) = self
                .platform
                .timeout(guild_id, target.id, minutes, &reason)
                .await
            {
                warn!(target_id = target.id, "Failed to apply warning timeout: {e}");
                notes.push(ReportNote::TimeoutFailed);
                if let ModerationEvent::Warned {
                    timeout_minutes, ..
                } = &mut event
                {
                    *timeout_minutes = None;
                }
            }
        }

        self.report(actor, &event).await;
        Ok(ModerationOutcome::Action(ActionReport {
            event,
            recorded,
            notes,
        }))
    }

    async fn timeout(
        &self,
        guild_id: u64,
        actor: &Actor,
        target: UserProfile,
        minutes: i64,
        reason: String,
    ) -> ModerationResult<ModerationOutcome> {
        let minutes = validate_timeout_minutes(minutes)?;
        self.require_permission(actor, CommandName::Timeout)?;
        self.ensure_not_immune(guild_id, actor, target.id, &target.tag)
            .await?;

        self.platform
            .timeout(guild_id, target.id, minutes, &reason)
            .await?;

        let recorded = self.recordable(actor);
        let case_number = if recorded {
            let mut new_case = Self::new_case(actor, &target, CaseType::Timeout, &reason);
            new_case.duration = Some(minutes);
            Some(self.ledgers.cases.create_case(guild_id, new_case).await?)
        } else {
            None
        };

        let event = ModerationEvent::TimedOut {
            target,
            moderator: actor.clone(),
            reason,
            minutes,
            case_number,
        };
        self.report(actor, &event).await;
        Ok(ModerationOutcome::Action(ActionReport {
            event,
            recorded,
            notes: Vec::new(),
        }))
    }

    async fn kick(
        &self,
        guild_id: u64,
        actor: &Actor,
        target: UserProfile,
        reason: String,
    ) -> ModerationResult<ModerationOutcome> {
        self.require_permission(actor, CommandName::Kick)?;
        self.ensure_not_immune(guild_id, actor, target.id, &target.tag)
            .await?;

        self.platform.kick(guild_id, target.id, &reason).await?;

        let recorded = self.recordable(actor);
        let case_number = if recorded {
            let new_case = Self::new_case(actor, &target, CaseType::Kick, &reason);
            Some(self.ledgers.cases.create_case(guild_id, new_case).await?)
        } else {
            None
        };

        let event = ModerationEvent::Kicked {
            target,
            moderator: actor.clone(),
            reason,
            case_number,
        };
        self.report(actor, &event).await;
        Ok(ModerationOutcome::Action(ActionReport {
            event,
            recorded,
            notes: Vec::new(),
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn ban(
        &self,
        guild_id: u64,
        actor: &Actor,
        raw_target: &str,
        reason: String,
        hackban: bool,
        delete_days: i64,
        override_code: Option<String>,
    ) -> ModerationResult<ModerationOutcome> {
        let target_id = parse_user_reference(raw_target)?;
        let delete_days = validate_delete_days(delete_days)?;

        let permission = if hackban {
            CommandName::Hackban
        } else {
            CommandName::Ban
        };
        let code = self.code_requirement(actor, permission, self.has(actor, permission), override_code)?;

        let profile = self.platform.fetch_user(target_id).await.ok();
        if !hackban {
            let display = profile
                .as_ref()
                .map_or_else(|| target_id.to_string(), |p| p.tag.clone());
            self.ensure_not_immune(guild_id, actor, target_id, &display)
                .await?;
        }

        // The code stays consumed even if the ban below fails.
        let override_used = match &code {
            Some(code) => {
                self.consume_override_code(actor, code).await?;
                true
            }
            None => false,
        };

        self.platform
            .ban(guild_id, target_id, delete_days, &reason)
            .await?;

        let target = profile.unwrap_or_else(|| unknown_user(target_id));
        let recorded = self.recordable(actor);
        let case_number = if recorded {
            let kind = if hackban {
                CaseType::Hackban
            } else {
                CaseType::Ban
            };
            let mut new_case = Self::new_case(actor, &target, kind, &reason);
            if hackban {
                new_case.username = target.tag.clone();
            }
            new_case.duration = (delete_days > 0).then_some(u32::from(delete_days));
            Some(self.ledgers.cases.create_case(guild_id, new_case).await?)
        } else {
            debug!("Ban by invisible actor not recorded");
            None
        };

        let event = ModerationEvent::Banned {
            target,
            moderator: actor.clone(),
            reason,
            hackban,
            delete_days,
            case_number,
            override_used,
        };
        self.report(actor, &event).await;
        Ok(ModerationOutcome::Action(ActionReport {
            event,
            recorded,
            notes: if override_used {
                vec![ReportNote::OverrideCodeUsed]
            } else {
                Vec::new()
            },
        }))
    }

    async fn unban(
        &self,
        guild_id: u64,
        actor: &Actor,
        user_id: Option<String>,
        reason: Option<String>,
        override_code: Option<String>,
    ) -> ModerationResult<ModerationOutcome> {
        let target_id = non_empty(user_id)
            .map(|raw| parse_user_reference(&raw))
            .transpose()?;

        let has_permission = self.has(actor, CommandName::Unban) || self.has(actor, CommandName::Ban);
        let code = self.code_requirement(actor, CommandName::Unban, has_permission, override_code)?;
        let override_used = match &code {
            Some(code) => {
                self.consume_override_code(actor, code).await?;
                true
            }
            None => false,
        };

        let Some(target_id) = target_id else {
            let bans = self.platform.list_bans(guild_id).await?;
            return Ok(ModerationOutcome::BanList(bans));
        };

        let reason = non_empty(reason).unwrap_or_else(|| "No reason provided".to_string());
        self.platform.unban(guild_id, target_id, &reason).await?;

        let target = self
            .platform
            .fetch_user(target_id)
            .await
            .unwrap_or_else(|_| unknown_user(target_id));
        let event = ModerationEvent::Unbanned {
            target,
            moderator: actor.clone(),
            reason,
            override_used,
        };
        self.report(actor, &event).await;
        Ok(ModerationOutcome::Action(ActionReport {
            event,
            recorded: self.recordable(actor),
            notes: if override_used {
                vec![ReportNote::OverrideCodeUsed]
            } else {
                Vec::new()
            },
        }))
    }

    async fn clear_warnings(
        &self,
        guild_id: u64,
        actor: &Actor,
        target: UserProfile,
    ) -> ModerationResult<ModerationOutcome> {
        self.require_permission(actor, CommandName::ClearWarnings)?;

        let Some(cleared) = self
            .ledgers
            .warnings
            .clear_warnings(guild_id, target.id)
            .await?
        else {
            return Err(ModerationError::not_found(format!(
                "**{}** has no warnings to clear.",
                target.name
            )));
        };

        let event = ModerationEvent::WarningsCleared {
            target,
            moderator: actor.clone(),
            cleared,
        };
        self.report(actor, &event).await;
        Ok(ModerationOutcome::Action(ActionReport {
            event,
            recorded: self.recordable(actor),
            notes: Vec::new(),
        }))
    }

    async fn lookup_cases(&self, guild_id: u64, query: CaseQuery) -> ModerationResult<ModerationOutcome> {
        let cases = &self.ledgers.cases;
        match query {
            CaseQuery::Number(number) => cases
                .find_by_number(guild_id, number)
                .await?
                .map(ModerationOutcome::CaseDetail)
                .ok_or_else(|| {
                    ModerationError::not_found(format!(
                        "No case found with number **#{number}** in this server."
                    ))
                }),
            CaseQuery::User(user) => {
                let found = cases.find_by_user(guild_id, user.id).await?;
                if found.is_empty() {
                    return Err(ModerationError::not_found(format!(
                        "No cases found for **{}** in this server.",
                        user.tag
                    )));
                }
                Ok(ModerationOutcome::Cases {
                    title: format!("📁 Cases for {}", user.tag),
                    cases: found,
                })
            }
            CaseQuery::Severity(severity) => {
                let found = cases
                    .find_by_severity(guild_id, &severity.to_string())
                    .await?;
                if found.is_empty() {
                    return Err(ModerationError::not_found(format!(
                        "No **{severity}** cases found in this server."
                    )));
                }
                Ok(ModerationOutcome::Cases {
                    title: format!("📁 {} Severity Cases", severity.to_string().to_uppercase()),
                    cases: found,
                })
            }
        }
    }

    async fn delete_case(
        &self,
        guild_id: u64,
        actor: &Actor,
        number: u64,
        revert_warning: bool,
    ) -> ModerationResult<ModerationOutcome> {
        self.require_permission(actor, CommandName::DeleteCase)?;

        let Some(case) = self.ledgers.cases.delete_case(guild_id, number).await? else {
            return Err(ModerationError::not_found(format!(
                "Case #{number} does not exist or has already been deleted."
            )));
        };

        let revert = if !revert_warning {
            None
        } else if case.kind != CaseType::Warn {
            Some(RevertOutcome::NotAWarnCase)
        } else if self
            .ledgers
            .warnings
            .revert_warning(guild_id, case.user_id)
            .await?
        {
            Some(RevertOutcome::Reverted)
        } else {
            Some(RevertOutcome::NothingToRevert)
        };

        let event = ModerationEvent::CaseDeleted {
            case,
            moderator: actor.clone(),
            revert,
        };
        self.report(actor, &event).await;
        Ok(ModerationOutcome::Action(ActionReport {
            event,
            recorded: self.recordable(actor),
            notes: Vec::new(),
        }))
    }

    async fn generate_ban_code(&self, actor: &Actor) -> ModerationResult<ModerationOutcome> {
        if !self.may_view_codes(actor) {
            return Err(self.missing(actor, CommandName::GenerateBanCode).into());
        }

        let recorded = self.recordable(actor);
        let (code, fresh) = self
            .ledgers
            .codes
            .current_or_generate(&actor.tag, Some(actor.id), !recorded)
            .await?;

        let mut published_to = None;
        if !recorded {
            debug!("Ban code requested by invisible actor, not publishing");
        } else if let Some(channel_id) = self.settings.code_channel_id {
            let event = ModerationEvent::CodeIssued {
                code: code.code.clone(),
                generated_by: code.public_generator().to_string(),
                fresh,
            };
            match self.sink.publish(channel_id, &event).await {
                Ok(()) => {
                    self.ledgers.codes.mark_disclosed(&code.code).await?;
                    published_to = Some(channel_id);
                    self.report(actor, &event).await;
                }
                Err(e) => warn!(channel_id, "Failed to post override code: {e}"),
            }
        }

        Ok(ModerationOutcome::Code(CodeGrant {
            code: code.code,
            fresh,
            published_to,
        }))
    }
}
