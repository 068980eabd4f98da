//! Per-guild case ledger
//!
//! Case numbers start at 1 and only ever grow. Deleting a case leaves a gap;
//! the counter is never rewound and numbers are never reused.

use super::export::CaseExporter;
use super::warnings::Severity;
use crate::storage::{JsonStore, StoreResult};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const CASES_DOCUMENT: &str = "cases";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseType {
    #[display("warn")]
    Warn,
    #[display("timeout")]
    Timeout,
    #[display("kick")]
    Kick,
    #[display("ban")]
    Ban,
    #[display("hackban")]
    Hackban,
}

impl CaseType {
    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Warn => "⚠️",
            Self::Timeout => "⏱️",
            Self::Kick => "👢",
            Self::Ban | Self::Hackban => "🔨",
        }
    }

    /// Unit of the case's `duration` field
    #[must_use]
    pub const fn duration_unit(self) -> &'static str {
        match self {
            Self::Timeout | Self::Warn => "minute(s)",
            Self::Kick | Self::Ban | Self::Hackban => "day(s)",
        }
    }
}

/// One recorded sanction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub case_number: u64,
    #[serde(rename = "type")]
    pub kind: CaseType,
    pub user_id: u64,
    pub username: String,
    pub user_avatar: String,
    pub moderator_id: u64,
    pub moderator_name: String,
    pub moderator_avatar: String,
    pub reason: String,
    /// Only set for warn cases
    pub severity: Option<Severity>,
    /// Minutes for timeouts, message-deletion days for bans
    pub duration: Option<u32>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub guild_id: u64,
}

/// Everything the caller supplies when opening a case
#[derive(Debug, Clone)]
pub struct NewCase {
    pub kind: CaseType,
    pub user_id: u64,
    pub username: String,
    pub user_avatar: Option<String>,
    pub moderator_id: u64,
    pub moderator_name: String,
    pub moderator_avatar: Option<String>,
    pub reason: String,
    pub severity: Option<Severity>,
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildCaseLedger {
    pub next_case_number: u64,
    #[serde(default)]
    pub cases: Vec<Case>,
}

impl Default for GuildCaseLedger {
    fn default() -> Self {
        Self {
            next_case_number: 1,
            cases: Vec::new(),
        }
    }
}

/// guild id -> ledger
pub type CasesDocument = BTreeMap<u64, GuildCaseLedger>;

/// Default avatar the platform serves for accounts without one
#[must_use]
pub fn default_avatar_url(user_id: u64) -> String {
    format!("https://cdn.discordapp.com/embed/avatars/{}.png", user_id % 5)
}

#[derive(Clone)]
pub struct CaseLedger {
    store: JsonStore,
    exporter: Option<Arc<dyn CaseExporter>>,
    /// Held across a mutation and its export so exports land in mutation
    /// order.
    export_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for CaseLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseLedger")
            .field("store", &self.store)
            .field("exporter", &self.exporter.is_some())
            .finish()
    }
}

impl CaseLedger {
    pub fn new(store: JsonStore, exporter: Option<Arc<dyn CaseExporter>>) -> Self {
        Self {
            store,
            exporter,
            export_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Make sure the guild has a ledger on disk and return it.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn ensure_guild_ledger(&self, guild_id: u64) -> StoreResult<GuildCaseLedger> {
        self.store
            .update(CASES_DOCUMENT, |doc: &mut CasesDocument| {
                doc.entry(guild_id).or_default().clone()
            })
            .await
    }

    /// Record a new case and return its number.
    ///
    /// # Errors
    /// Propagates storage failures. Export failures are only logged.
    pub async fn create_case(&self, guild_id: u64, new_case: NewCase) -> StoreResult<u64> {
        let user_avatar = new_case
            .user_avatar
            .unwrap_or_else(|| default_avatar_url(new_case.user_id));
        let moderator_avatar = new_case
            .moderator_avatar
            .unwrap_or_else(|| default_avatar_url(new_case.moderator_id));
        let timestamp = Utc::now();

        let _exporting = self.export_lock.lock().await;
        let (number, snapshot) = self
            .store
            .update(CASES_DOCUMENT, |doc: &mut CasesDocument| {
                let ledger = doc.entry(guild_id).or_default();
                let number = ledger.next_case_number;
                ledger.next_case_number += 1;
                ledger.cases.push(Case {
                    case_number: number,
                    kind: new_case.kind,
                    user_id: new_case.user_id,
                    username: new_case.username,
                    user_avatar,
                    moderator_id: new_case.moderator_id,
                    moderator_name: new_case.moderator_name,
                    moderator_avatar,
                    reason: new_case.reason,
                    severity: new_case.severity,
                    duration: new_case.duration,
                    timestamp,
                    guild_id,
                });
                ledger.cases.sort_by_key(|case| case.case_number);
                (number, doc.clone())
            })
            .await?;

        info!(guild_id, case_number = number, "Case created");
        self.export(&snapshot).await;
        Ok(number)
    }

    /// # Errors
    /// Propagates storage failures.
    pub async fn find_by_number(&self, guild_id: u64, case_number: u64) -> StoreResult<Option<Case>> {
        Ok(self
            .guild_cases(guild_id)
            .await?
            .into_iter()
            .find(|case| case.case_number == case_number))
    }

    /// # Errors
    /// Propagates storage failures.
    pub async fn find_by_user(&self, guild_id: u64, user_id: u64) -> StoreResult<Vec<Case>> {
        let mut cases = self.guild_cases(guild_id).await?;
        cases.retain(|case| case.user_id == user_id);
        Ok(cases)
    }

    /// Case-insensitive match on the severity name. Cases without a severity
    /// never match.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn find_by_severity(&self, guild_id: u64, severity: &str) -> StoreResult<Vec<Case>> {
        let wanted = severity.trim();
        let mut cases = self.guild_cases(guild_id).await?;
        cases.retain(|case| {
            case.severity
                .is_some_and(|s| s.to_string().eq_ignore_ascii_case(wanted))
        });
        Ok(cases)
    }

    /// Remove a case by number, returning the removed record.
    ///
    /// # Errors
    /// Propagates storage failures. Export failures are only logged.
    pub async fn delete_case(&self, guild_id: u64, case_number: u64) -> StoreResult<Option<Case>> {
        let _exporting = self.export_lock.lock().await;
        let (removed, snapshot) = self
            .store
            .update(CASES_DOCUMENT, |doc: &mut CasesDocument| {
                let removed = doc.get_mut(&guild_id).and_then(|ledger| {
                    let index = ledger
                        .cases
                        .iter()
                        .position(|case| case.case_number == case_number)?;
                    Some(ledger.cases.remove(index))
                });
                (removed, doc.clone())
            })
            .await?;

        if removed.is_some() {
            info!(guild_id, case_number, "Case deleted");
            self.export(&snapshot).await;
        }
        Ok(removed)
    }

    /// # Errors
    /// Propagates storage failures.
    pub async fn all(&self) -> StoreResult<CasesDocument> {
        self.store.load(CASES_DOCUMENT).await
    }

    /// Push the current ledger through the exporter, if one is configured.
    ///
    /// # Errors
    /// Propagates storage failures while loading the ledger.
    pub async fn export_now(&self) -> StoreResult<()> {
        if self.exporter.is_some() {
            let _exporting = self.export_lock.lock().await;
            let snapshot = self.all().await?;
            self.export(&snapshot).await;
        }
        Ok(())
    }

    async fn guild_cases(&self, guild_id: u64) -> StoreResult<Vec<Case>> {
        let mut doc: CasesDocument = self.store.load(CASES_DOCUMENT).await?;
        Ok(doc.remove(&guild_id).map(|ledger| ledger.cases).unwrap_or_default())
    }

    async fn export(&self, snapshot: &CasesDocument) {
        let Some(exporter) = &self.exporter else {
            return;
        };
        if let Err(e) = exporter.export(snapshot).await {
            warn!("Case export failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::export::MockCaseExporter;
    use crate::ledger::export::ExportSummary;
    use crate::storage::StoreError;

    const GUILD: u64 = 10;

    fn new_case(kind: CaseType, user_id: u64, severity: Option<Severity>) -> NewCase {
        NewCase {
            kind,
            user_id,
            username: format!("user{user_id}"),
            user_avatar: None,
            moderator_id: 7,
            moderator_name: "mod#0001".to_string(),
            moderator_avatar: Some("https://example.invalid/mod.png".to_string()),
            reason: "rule 1".to_string(),
            severity,
            duration: None,
        }
    }

    fn ledger(dir: &tempfile::TempDir) -> CaseLedger {
        CaseLedger::new(JsonStore::new(dir.path()), None)
    }

    #[tokio::test]
    async fn test_first_case_is_number_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);

        let shell = ledger.ensure_guild_ledger(GUILD).await.expect("ensure");
        assert_eq!(shell.next_case_number, 1);
        assert!(shell.cases.is_empty());

        let number = ledger
            .create_case(GUILD, new_case(CaseType::Warn, 1, Some(Severity::Minor)))
            .await
            .expect("create");
        assert_eq!(number, 1);

        let shell = ledger.ensure_guild_ledger(GUILD).await.expect("ensure");
        assert_eq!(shell.next_case_number, 2);
        assert_eq!(shell.cases.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_persists_shell() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);
        ledger.ensure_guild_ledger(GUILD).await.expect("ensure");

        let raw = std::fs::read_to_string(dir.path().join("cases.json")).expect("read");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(json["10"]["nextCaseNumber"], 1);
        assert_eq!(json["10"]["cases"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_numbers_never_reused_after_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);

        for user in 1..=3 {
            ledger
                .create_case(GUILD, new_case(CaseType::Kick, user, None))
                .await
                .expect("create");
        }

        let removed = ledger.delete_case(GUILD, 3).await.expect("delete");
        assert_eq!(removed.map(|case| case.user_id), Some(3));

        let number = ledger
            .create_case(GUILD, new_case(CaseType::Kick, 4, None))
            .await
            .expect("create");
        assert_eq!(number, 4);

        let numbers: Vec<u64> = ledger
            .ensure_guild_ledger(GUILD)
            .await
            .expect("ensure")
            .cases
            .iter()
            .map(|case| case.case_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);

        ledger
            .create_case(GUILD, new_case(CaseType::Warn, 1, Some(Severity::Minor)))
            .await
            .expect("create");
        ledger
            .create_case(GUILD, new_case(CaseType::Warn, 2, Some(Severity::Minor)))
            .await
            .expect("create");

        assert!(ledger.delete_case(GUILD, 1).await.expect("delete").is_some());
        assert!(ledger.delete_case(GUILD, 1).await.expect("delete").is_none());

        let remaining = ledger.ensure_guild_ledger(GUILD).await.expect("ensure");
        assert_eq!(remaining.cases.len(), 1);
        assert_eq!(remaining.cases[0].case_number, 2);
    }

    #[tokio::test]
    async fn test_lookups() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);

        ledger
            .create_case(GUILD, new_case(CaseType::Warn, 1, Some(Severity::Severe)))
            .await
            .expect("create");
        ledger
            .create_case(GUILD, new_case(CaseType::Timeout, 1, None))
            .await
            .expect("create");
        ledger
            .create_case(GUILD, new_case(CaseType::Warn, 2, Some(Severity::Minor)))
            .await
            .expect("create");

        let found = ledger.find_by_number(GUILD, 2).await.expect("find").expect("case");
        assert_eq!(found.kind, CaseType::Timeout);
        assert!(ledger.find_by_number(GUILD, 9).await.expect("find").is_none());
        assert!(ledger.find_by_number(GUILD + 1, 1).await.expect("find").is_none());

        assert_eq!(ledger.find_by_user(GUILD, 1).await.expect("find").len(), 2);
        assert!(ledger.find_by_user(GUILD, 3).await.expect("find").is_empty());

        let severe = ledger.find_by_severity(GUILD, "SEVERE").await.expect("find");
        assert_eq!(severe.len(), 1);
        assert_eq!(severe[0].case_number, 1);
    }

    #[tokio::test]
    async fn test_avatar_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);

        ledger
            .create_case(GUILD, new_case(CaseType::Ban, 12, None))
            .await
            .expect("create");
        let case = ledger.find_by_number(GUILD, 1).await.expect("find").expect("case");
        assert_eq!(case.user_avatar, "https://cdn.discordapp.com/embed/avatars/2.png");
        assert_eq!(case.moderator_avatar, "https://example.invalid/mod.png");
    }

    #[tokio::test]
    async fn test_exporter_runs_after_mutations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut exporter = MockCaseExporter::new();
        exporter
            .expect_export()
            .times(2)
            .returning(|doc| {
                Ok(ExportSummary {
                    total_users: 1,
                    total_cases: doc.values().map(|ledger| ledger.cases.len()).sum(),
                })
            });
        let ledger = CaseLedger::new(JsonStore::new(dir.path()), Some(Arc::new(exporter)));

        ledger
            .create_case(GUILD, new_case(CaseType::Kick, 1, None))
            .await
            .expect("create");
        ledger.delete_case(GUILD, 1).await.expect("delete");
        // Nothing removed, nothing exported.
        ledger.delete_case(GUILD, 1).await.expect("delete");
    }

    /// Records the case count of every export. The first export stalls so a
    /// later mutation has the chance to overtake it.
    #[derive(Default)]
    struct SlowFirstExporter {
        seen: std::sync::Mutex<Vec<usize>>,
        started: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl CaseExporter for SlowFirstExporter {
        async fn export(&self, cases: &CasesDocument) -> StoreResult<ExportSummary> {
            if !self.started.swap(true, std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            let total_cases = cases.values().map(|ledger| ledger.cases.len()).sum();
            self.seen.lock().expect("lock").push(total_cases);
            Ok(ExportSummary {
                total_users: 0,
                total_cases,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_exports_land_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exporter = Arc::new(SlowFirstExporter::default());
        let ledger = CaseLedger::new(
            JsonStore::new(dir.path()),
            Some(exporter.clone() as Arc<dyn CaseExporter>),
        );

        let first = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.create_case(GUILD, new_case(CaseType::Kick, 1, None)).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.create_case(GUILD, new_case(CaseType::Kick, 2, None)).await })
        };
        first.await.expect("join").expect("create");
        second.await.expect("join").expect("create");

        assert_eq!(*exporter.seen.lock().expect("lock"), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_export_failure_does_not_fail_mutation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut exporter = MockCaseExporter::new();
        exporter.expect_export().returning(|_| {
            Err(StoreError::Io {
                path: "cases".into(),
                source: std::io::Error::other("disk full"),
            })
        });
        let ledger = CaseLedger::new(JsonStore::new(dir.path()), Some(Arc::new(exporter)));

        let number = ledger
            .create_case(GUILD, new_case(CaseType::Kick, 1, None))
            .await
            .expect("create");
        assert_eq!(number, 1);
    }
}
