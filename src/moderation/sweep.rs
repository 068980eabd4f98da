//! Delayed disclosure of auto-generated override codes
//!
//! A code minted to replace a consumed one stays hidden for a while, then
//! the sweep posts it to the code channel. Codes generated on behalf of an
//! invisible actor are never posted.

use super::event::ModerationEvent;
use super::platform::{ModerationPlatform, NotificationSink};
use crate::ledger::{OverrideCode, OverrideCodeLedger};
use crate::permissions::PermissionResolver;
use crate::storage::StoreResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Requests the sweep task understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepRequest {
    CheckNow,
    Shutdown,
}

#[derive(Clone)]
pub struct DisclosureSweep {
    codes: OverrideCodeLedger,
    resolver: Arc<PermissionResolver>,
    platform: Arc<dyn ModerationPlatform>,
    sink: Arc<dyn NotificationSink>,
    code_channel_id: Option<u64>,
    home_guild_id: Option<u64>,
    delay: chrono::Duration,
}

impl DisclosureSweep {
    pub fn new(
        codes: OverrideCodeLedger,
        resolver: Arc<PermissionResolver>,
        platform: Arc<dyn ModerationPlatform>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            codes,
            resolver,
            platform,
            sink,
            code_channel_id: None,
            home_guild_id: None,
            delay: chrono::Duration::hours(24),
        }
    }

    #[must_use]
    pub fn with_code_channel(mut self, channel_id: Option<u64>) -> Self {
        self.code_channel_id = channel_id;
        self
    }

    #[must_use]
    pub fn with_home_guild(mut self, guild_id: Option<u64>) -> Self {
        self.home_guild_id = guild_id;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: chrono::Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Whether the member who generated `code` is allowed to leave a trace.
    async fn generator_is_recordable(&self, code: &OverrideCode) -> bool {
        let Some(user_id) = code.generated_by_id else {
            return true;
        };
        if !self.resolver.is_overridden(user_id) {
            return true;
        }
        let Some(guild_id) = self.home_guild_id else {
            return false;
        };
        match self.platform.member_role_ids(guild_id, user_id).await {
            Ok(Some(role_ids)) => self.resolver.has_real_staff_role(&role_ids),
            Ok(None) => false,
            Err(e) => {
                debug!(user_id, "Could not look up code generator: {e}");
                false
            }
        }
    }

    /// Post every held-back code whose delay has elapsed at `now`.
    /// Returns how many codes were disclosed.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn run_once(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let Some(channel_id) = self.code_channel_id else {
            debug!("No code channel configured, skipping disclosure sweep");
            return Ok(0);
        };

        let mut disclosed = 0;
        for code in self.codes.pending_disclosures(now, self.delay).await? {
            if !self.generator_is_recordable(&code).await {
                debug!(generated_by = %code.generated_by, "Code generator is invisible, not disclosing");
                continue;
            }

            let event = ModerationEvent::CodeDisclosed {
                code: code.code.clone(),
                generated_by: code.generated_by.clone(),
            };
            if let Err(e) = self.sink.publish(channel_id, &event).await {
                warn!(channel_id, "Failed to disclose override code: {e}");
                continue;
            }
            if self.codes.mark_disclosed(&code.code).await? {
                disclosed += 1;
            }
        }

        if disclosed > 0 {
            info!(disclosed, "Disclosed held-back override codes");
        }
        Ok(disclosed)
    }

    /// Run the sweep every `period` and whenever a `CheckNow` arrives.
    pub fn spawn(self, period: Duration, mut rx: Receiver<SweepRequest>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Starting disclosure sweep with {}s interval", period.as_secs());
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    request = rx.recv() => match request {
                        Some(SweepRequest::CheckNow) => {
                            info!("Received request to run disclosure sweep");
                            if let Err(e) = self.run_once(Utc::now()).await {
                                error!("Error in disclosure sweep: {e}");
                            }
                        }
                        Some(SweepRequest::Shutdown) | None => {
                            info!("Received shutdown request for disclosure sweep");
                            break;
                        }
                    },
                    _ = interval.tick() => {
                        debug!("Performing periodic disclosure sweep");
                        if let Err(e) = self.run_once(Utc::now()).await {
                            error!("Error in periodic disclosure sweep: {e}");
                        }
                    }
                }
            }

            info!("Disclosure sweep shut down");
        })
    }
}
