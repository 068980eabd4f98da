use super::intent::Actor;
use super::platform::{BanEntry, UserProfile};
use crate::ledger::{Case, Severity};

/// Result of undoing a warning alongside a case deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertOutcome {
    Reverted,
    NothingToRevert,
    NotAWarnCase,
}

/// Something that happened and may be logged, published or sent by DM
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationEvent {
    Warned {
        target: UserProfile,
        moderator: Actor,
        reason: String,
        severity: Severity,
        case_number: Option<u64>,
        warning_count: Option<u32>,
        timeout_minutes: Option<u32>,
    },
    TimedOut {
        target: UserProfile,
        moderator: Actor,
        reason: String,
        minutes: u32,
        case_number: Option<u64>,
    },
    Kicked {
        target: UserProfile,
        moderator: Actor,
        reason: String,
        case_number: Option<u64>,
    },
    Banned {
        /// Display name used when the user could not be looked up
        target: UserProfile,
        moderator: Actor,
        reason: String,
        hackban: bool,
        delete_days: u8,
        case_number: Option<u64>,
        override_used: bool,
    },
    Unbanned {
        target: UserProfile,
        moderator: Actor,
        reason: String,
        override_used: bool,
    },
    WarningsCleared {
        target: UserProfile,
        moderator: Actor,
        cleared: u32,
    },
    CaseDeleted {
        case: Case,
        moderator: Actor,
        revert: Option<RevertOutcome>,
    },
    Purged {
        channel_id: u64,
        moderator: Actor,
        requested: u8,
        deleted: usize,
        target: Option<UserProfile>,
    },
    CodeIssued {
        code: String,
        generated_by: String,
        fresh: bool,
    },
    CodeUsed {
        code: String,
        used_by: Actor,
        generated_by: String,
    },
    CodeDisclosed {
        code: String,
        generated_by: String,
    },
}

/// Extra facts about how an action went, shown to the actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportNote {
    DirectMessageSent,
    DirectMessageFailed,
    SilentMode,
    TimeoutFailed,
    OverrideCodeUsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub event: ModerationEvent,
    /// Whether cases, warnings and logs were written for this action
    pub recorded: bool,
    pub notes: Vec<ReportNote>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGrant {
    pub code: String,
    pub fresh: bool,
    /// Channel the code was posted to, if it was posted
    pub published_to: Option<u64>,
}

/// What a successful intent hands back to the command layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationOutcome {
    Action(ActionReport),
    CaseDetail(Case),
    Cases { title: String, cases: Vec<Case> },
    BanList(Vec<BanEntry>),
    Code(CodeGrant),
}

impl ModerationOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&ActionReport> {
        match self {
            Self::Action(report) => Some(report),
            _ => None,
        }
    }
}
