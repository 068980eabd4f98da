//! Moderation intents, their dispatcher and the code disclosure sweep

pub mod discord;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod intent;
pub mod platform;
pub mod sweep;

pub use discord::DiscordGateway;
pub use dispatcher::{ActionDispatcher, DEFAULT_CODE_VIEWER_MAX_LEVEL, DispatchSettings};
pub use error::{Denial, ModerationError, ModerationResult, PlatformError};
pub use event::{ActionReport, CodeGrant, ModerationEvent, ModerationOutcome, ReportNote, RevertOutcome};
pub use intent::{Actor, CaseQuery, ModerationCommand, ModerationIntent, parse_user_reference};
pub use platform::{BanEntry, ModerationPlatform, NotificationSink, UserProfile};
pub use sweep::{DisclosureSweep, SweepRequest};
