//! Mirror of the case ledger as one JSON file per sanctioned user
//!
//! The folder holds `<username>-<user id>.json` for every user with at least
//! one case plus an `index.json` listing them by case count. Files for users who no
//! longer have cases are removed on each run.

use super::cases::{Case, CasesDocument};
use crate::storage::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub total_users: usize,
    pub total_cases: usize,
}

/// Receives the full case ledger after every mutation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaseExporter: Send + Sync {
    async fn export(&self, cases: &CasesDocument) -> StoreResult<ExportSummary>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserCaseFile<'a> {
    username: &'a str,
    user_id: u64,
    total_cases: usize,
    cases: &'a [Case],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    username: String,
    user_id: u64,
    filename: String,
    total_cases: usize,
    latest_case: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Index {
    total_users: usize,
    total_cases: usize,
    last_updated: DateTime<Utc>,
    users: Vec<IndexEntry>,
}

/// Name of the export file for one user. The id keeps users whose names
/// sanitize alike apart.
#[must_use]
pub fn user_filename(username: &str, user_id: u64) -> String {
    format!("{}-{user_id}.json", sanitize_filename(username))
}

/// Replace anything outside `[A-Za-z0-9_-]` with an underscore.
#[must_use]
pub fn sanitize_filename(username: &str) -> String {
    username
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct FolderCaseExporter {
    dir: PathBuf,
}

impl FolderCaseExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    async fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tokio::fs::write(path, json).await.map_err(Self::io_error(path))
    }

    async fn existing_user_files(&self) -> StoreResult<Vec<String>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(Self::io_error(&self.dir))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(Self::io_error(&self.dir))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") && name != INDEX_FILE {
                files.push(name);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl CaseExporter for FolderCaseExporter {
    async fn export(&self, cases: &CasesDocument) -> StoreResult<ExportSummary> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(Self::io_error(&self.dir))?;
        let stale_candidates = self.existing_user_files().await?;

        let mut by_user: BTreeMap<u64, Vec<Case>> = BTreeMap::new();
        let mut total_cases = 0;
        for ledger in cases.values() {
            for case in &ledger.cases {
                by_user.entry(case.user_id).or_default().push(case.clone());
                total_cases += 1;
            }
        }

        let mut written = HashSet::new();
        let mut users = Vec::with_capacity(by_user.len());
        for (user_id, mut user_cases) in by_user {
            user_cases.sort_by_key(|case| case.case_number);
            let Some(latest) = user_cases.last() else {
                continue;
            };
            let latest_case = latest.case_number;
            let username = latest.username.clone();
            let filename = user_filename(&username, user_id);

            let file = UserCaseFile {
                username: &username,
                user_id,
                total_cases: user_cases.len(),
                cases: &user_cases,
            };
            Self::write_json(&self.dir.join(&filename), &file).await?;
            debug!(file = %filename, cases = user_cases.len(), "Synced case file");

            users.push(IndexEntry {
                username,
                user_id,
                filename: filename.clone(),
                total_cases: user_cases.len(),
                latest_case,
            });
            written.insert(filename);
        }

        for stale in stale_candidates.iter().filter(|name| !written.contains(*name)) {
            let path = self.dir.join(stale);
            tokio::fs::remove_file(&path)
                .await
                .map_err(Self::io_error(&path))?;
            debug!(file = %stale, "Removed case file with no remaining cases");
        }

        users.sort_by(|a, b| b.total_cases.cmp(&a.total_cases));
        let summary = ExportSummary {
            total_users: users.len(),
            total_cases,
        };
        let index = Index {
            total_users: summary.total_users,
            total_cases,
            last_updated: Utc::now(),
            users,
        };
        Self::write_json(&self.dir.join(INDEX_FILE), &index).await?;

        info!(
            users = summary.total_users,
            cases = summary.total_cases,
            "Cases synced to folder"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::cases::{CaseType, GuildCaseLedger};

    fn case(number: u64, user_id: u64, username: &str) -> Case {
        Case {
            case_number: number,
            kind: CaseType::Warn,
            user_id,
            username: username.to_string(),
            user_avatar: String::new(),
            moderator_id: 1,
            moderator_name: "mod".to_string(),
            moderator_avatar: String::new(),
            reason: "reason".to_string(),
            severity: None,
            duration: None,
            timestamp: Utc::now(),
            guild_id: 1,
        }
    }

    fn document(cases: Vec<Case>) -> CasesDocument {
        let mut doc = CasesDocument::new();
        doc.insert(
            1,
            GuildCaseLedger {
                next_case_number: cases.len() as u64 + 1,
                cases,
            },
        );
        doc
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("cool_user-9"), "cool_user-9");
        assert_eq!(sanitize_filename("dots.and spaces!"), "dots_and_spaces_");
        assert_eq!(sanitize_filename("ünï"), "___");
        assert_eq!(user_filename("dots.and", 42), "dots_and-42.json");
    }

    #[tokio::test]
    async fn test_users_with_clashing_names_keep_separate_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exporter = FolderCaseExporter::new(dir.path());

        let summary = exporter
            .export(&document(vec![case(1, 10, "a.b"), case(2, 20, "a b")]))
            .await
            .expect("export");
        assert_eq!(summary.total_users, 2);

        let first: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("a_b-10.json")).expect("read"),
        )
        .expect("json");
        let second: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("a_b-20.json")).expect("read"),
        )
        .expect("json");
        assert_eq!(first["username"], "a.b");
        assert_eq!(second["username"], "a b");
    }

    #[tokio::test]
    async fn test_writes_user_files_and_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exporter = FolderCaseExporter::new(dir.path().join("cases"));

        let doc = document(vec![
            case(1, 10, "alice"),
            case(2, 20, "bob"),
            case(3, 10, "alice"),
        ]);
        let summary = exporter.export(&doc).await.expect("export");
        assert_eq!(summary, ExportSummary { total_users: 2, total_cases: 3 });

        let alice: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(exporter.dir().join("alice-10.json")).expect("read"),
        )
        .expect("json");
        assert_eq!(alice["userId"], 10);
        assert_eq!(alice["totalCases"], 2);
        assert_eq!(alice["cases"][1]["caseNumber"], 3);

        let index: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(exporter.dir().join(INDEX_FILE)).expect("read"),
        )
        .expect("json");
        assert_eq!(index["totalUsers"], 2);
        assert_eq!(index["users"][0]["username"], "alice");
        assert_eq!(index["users"][0]["latestCase"], 3);
    }

    #[tokio::test]
    async fn test_removes_stale_user_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exporter = FolderCaseExporter::new(dir.path());

        exporter
            .export(&document(vec![case(1, 10, "alice"), case(2, 20, "bob")]))
            .await
            .expect("export");
        assert!(dir.path().join("bob-20.json").exists());

        exporter
            .export(&document(vec![case(1, 10, "alice")]))
            .await
            .expect("export");
        assert!(!dir.path().join("bob-20.json").exists());
        assert!(dir.path().join("alice-10.json").exists());
        assert!(dir.path().join(INDEX_FILE).exists());
    }
}
