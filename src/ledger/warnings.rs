//! Per-guild, per-user warning counts and history

use crate::storage::{JsonStore, StoreResult};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

pub const WARNINGS_DOCUMENT: &str = "warnings";

#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[display("minor")]
    Minor,
    #[default]
    #[display("moderate")]
    Moderate,
    #[display("severe")]
    Severe,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Minor, Severity::Moderate, Severity::Severe];

    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Minor => "⚠️",
            Self::Moderate => "🔶",
            Self::Severe => "🔴",
        }
    }

    #[must_use]
    pub const fn color(self) -> u32 {
        match self {
            Self::Minor => 0x00ff_aa00,
            Self::Moderate => 0x00ff_6600,
            Self::Severe => 0x00ff_0000,
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|severity| severity.to_string().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown severity: {wanted}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningEntry {
    pub reason: String,
    pub severity: Severity,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Warning state of one user. `count` always equals `history.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub username: String,
    pub count: u32,
    pub history: Vec<WarningEntry>,
}

impl WarningRecord {
    fn sync_count(&mut self) {
        self.count = u32::try_from(self.history.len()).unwrap_or(u32::MAX);
    }
}

/// guild id -> user id -> record
pub type WarningsDocument = BTreeMap<u64, BTreeMap<u64, WarningRecord>>;

#[derive(Clone, Debug)]
pub struct WarningLedger {
    store: JsonStore,
}

impl WarningLedger {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    /// Append a warning and return the user's new count.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn add_warning(
        &self,
        guild_id: u64,
        user_id: u64,
        username: &str,
        reason: &str,
        severity: Severity,
    ) -> StoreResult<u32> {
        let entry = WarningEntry {
            reason: reason.to_string(),
            severity,
            timestamp: Utc::now(),
        };

        self.store
            .update(WARNINGS_DOCUMENT, |doc: &mut WarningsDocument| {
                let record = doc
                    .entry(guild_id)
                    .or_default()
                    .entry(user_id)
                    .or_insert_with(|| WarningRecord {
                        username: username.to_string(),
                        count: 0,
                        history: Vec::new(),
                    });
                record.username = username.to_string();
                record.history.push(entry);
                record.sync_count();
                record.count
            })
            .await
    }

    /// Undo the most recent warning. Returns `false` when there was nothing
    /// to undo. The record disappears once its count reaches zero.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn revert_warning(&self, guild_id: u64, user_id: u64) -> StoreResult<bool> {
        self.store
            .update(WARNINGS_DOCUMENT, |doc: &mut WarningsDocument| {
                let Some(users) = doc.get_mut(&guild_id) else {
                    return false;
                };
                let Some(record) = users.get_mut(&user_id) else {
                    return false;
                };
                if record.history.pop().is_none() {
                    return false;
                }
                record.sync_count();
                if record.count == 0 {
                    users.remove(&user_id);
                }
                true
            })
            .await
    }

    /// Remove every warning for the user, returning the previous count, or
    /// `None` when the user had no record.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn clear_warnings(&self, guild_id: u64, user_id: u64) -> StoreResult<Option<u32>> {
        self.store
            .update(WARNINGS_DOCUMENT, |doc: &mut WarningsDocument| {
                doc.get_mut(&guild_id)
                    .and_then(|users| users.remove(&user_id))
                    .map(|record| record.count)
            })
            .await
    }

    /// # Errors
    /// Propagates storage failures.
    pub async fn get(&self, guild_id: u64, user_id: u64) -> StoreResult<Option<WarningRecord>> {
        let doc: WarningsDocument = self.store.load(WARNINGS_DOCUMENT).await?;
        Ok(doc
            .get(&guild_id)
            .and_then(|users| users.get(&user_id))
            .cloned())
    }
}
