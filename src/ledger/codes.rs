//! One-time ban override codes
//!
//! A code lets an actor without the ban permission run a ban once. Codes are
//! consumed exactly once and never deleted. When one is consumed a
//! replacement is minted with `auto_generated` set; replacements stay
//! private until the disclosure sweep publishes them after a delay.

use crate::permissions::CommandName;
use crate::storage::{JsonStore, StoreResult};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CODES_DOCUMENT: &str = "override-codes";
pub const CODE_LENGTH: usize = 8;
pub const CODE_ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ123456789!§$%&/()=?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideCode {
    pub code: String,
    pub command: CommandName,
    pub generated_by: String,
    pub generated_by_id: Option<u64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub generated_at: DateTime<Utc>,
    pub used: bool,
    pub used_by: Option<u64>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub used_at: Option<DateTime<Utc>>,
    pub auto_generated: bool,
    pub sent_to_channel: bool,
    /// Minted for an actor whose actions leave no trace. Private codes are
    /// never handed to other staff or disclosed, and their generator is
    /// never named.
    #[serde(default)]
    pub private: bool,
}

pub const PRIVATE_GENERATOR: &str = "Unknown";

impl OverrideCode {
    /// Auto-generated codes waiting for their delayed disclosure.
    #[must_use]
    pub fn is_held_back(&self) -> bool {
        self.auto_generated && !self.sent_to_channel
    }

    /// Generator name safe to show in public channels.
    #[must_use]
    pub fn public_generator(&self) -> &str {
        if self.private {
            PRIVATE_GENERATOR
        } else {
            &self.generated_by
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodesDocument {
    #[serde(default)]
    pub codes: Vec<OverrideCode>,
}

/// Draw a random code from the fixed alphabet.
pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let alphabet: Vec<char> = CODE_ALPHABET.chars().collect();
    (0..CODE_LENGTH)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())])
        .collect()
}

fn mint(
    doc: &mut CodesDocument,
    generated_by: &str,
    generated_by_id: Option<u64>,
    auto_generated: bool,
    private: bool,
) -> OverrideCode {
    let mut rng = rand::rng();
    let code = loop {
        let candidate = random_code(&mut rng);
        if !doc.codes.iter().any(|existing| existing.code == candidate) {
            break candidate;
        }
    };

    let entry = OverrideCode {
        code,
        command: CommandName::Ban,
        generated_by: generated_by.to_string(),
        generated_by_id,
        generated_at: Utc::now(),
        used: false,
        used_by: None,
        used_at: None,
        auto_generated,
        sent_to_channel: false,
        private,
    };
    doc.codes.push(entry.clone());
    entry
}

#[derive(Clone, Debug)]
pub struct OverrideCodeLedger {
    store: JsonStore,
}

impl OverrideCodeLedger {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    /// Mint a fresh, unique code bound to the ban command.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn generate(
        &self,
        generated_by: &str,
        generated_by_id: Option<u64>,
        auto_generated: bool,
    ) -> StoreResult<OverrideCode> {
        let entry = self
            .store
            .update(CODES_DOCUMENT, |doc: &mut CodesDocument| {
                mint(doc, generated_by, generated_by_id, auto_generated, false)
            })
            .await?;
        info!(
            generated_by,
            auto_generated, "New override code generated"
        );
        Ok(entry)
    }

    /// Mint the held-back successor of a consumed code. It keeps the
    /// original generator and privacy.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn generate_replacement(&self, consumed: &OverrideCode) -> StoreResult<OverrideCode> {
        let entry = self
            .store
            .update(CODES_DOCUMENT, |doc: &mut CodesDocument| {
                mint(
                    doc,
                    &consumed.generated_by,
                    consumed.generated_by_id,
                    true,
                    consumed.private,
                )
            })
            .await?;
        info!(private = entry.private, "Replacement override code generated");
        Ok(entry)
    }

    /// Consume `code` for `command` on behalf of `user_id`.
    ///
    /// Returns the code as it was before consumption, or `None` if it does
    /// not exist, was already used, or is bound to another command. The check
    /// and the mark happen under one document lock, so a code can succeed
    /// here at most once.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn validate_and_consume(
        &self,
        code: &str,
        command: CommandName,
        user_id: u64,
    ) -> StoreResult<Option<OverrideCode>> {
        let wanted = code.trim();
        let now = Utc::now();
        self.store
            .update(CODES_DOCUMENT, |doc: &mut CodesDocument| {
                let entry = doc
                    .codes
                    .iter_mut()
                    .find(|entry| entry.code == wanted && !entry.used && entry.command == command)?;
                let before = entry.clone();
                entry.used = true;
                entry.used_by = Some(user_id);
                entry.used_at = Some(now);
                Some(before)
            })
            .await
    }

    /// The code staff should currently be using, minting a manual one when
    /// none is available. Auto-generated codes still inside their disclosure
    /// delay and private codes are never handed out. A `private` caller gets
    /// a private code when one has to be minted. The flag is `true` when the
    /// code was minted by this call.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn current_or_generate(
        &self,
        generated_by: &str,
        generated_by_id: Option<u64>,
        private: bool,
    ) -> StoreResult<(OverrideCode, bool)> {
        self.store
            .update(CODES_DOCUMENT, |doc: &mut CodesDocument| {
                if let Some(existing) = doc
                    .codes
                    .iter()
                    .find(|entry| !entry.used && !entry.private && !entry.is_held_back())
                {
                    return (existing.clone(), false);
                }
                (mint(doc, generated_by, generated_by_id, false, private), true)
            })
            .await
    }

    /// Held-back codes whose delay has elapsed at `now`.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn pending_disclosures(
        &self,
        now: DateTime<Utc>,
        delay: Duration,
    ) -> StoreResult<Vec<OverrideCode>> {
        let doc: CodesDocument = self.store.load(CODES_DOCUMENT).await?;
        Ok(doc
            .codes
            .into_iter()
            .filter(|entry| {
                entry.is_held_back()
                    && !entry.used
                    && !entry.private
                    && now - entry.generated_at >= delay
            })
            .collect())
    }

    /// Flag a code as published. Returns `false` for unknown codes.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn mark_disclosed(&self, code: &str) -> StoreResult<bool> {
        self.store
            .update(CODES_DOCUMENT, |doc: &mut CodesDocument| {
                doc.codes
                    .iter_mut()
                    .find(|entry| entry.code == code)
                    .map(|entry| entry.sent_to_channel = true)
                    .is_some()
            })
            .await
    }

    /// # Errors
    /// Propagates storage failures.
    pub async fn all(&self) -> StoreResult<Vec<OverrideCode>> {
        let doc: CodesDocument = self.store.load(CODES_DOCUMENT).await?;
        Ok(doc.codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ledger(dir: &tempfile::TempDir) -> OverrideCodeLedger {
        OverrideCodeLedger::new(JsonStore::new(dir.path()))
    }

    #[test]
    fn test_random_code_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = random_code(&mut rng);
            assert_eq!(code.chars().count(), CODE_LENGTH);
            assert!(code.chars().all(|c| CODE_ALPHABET.contains(c)));
            assert!(!code.contains('I') && !code.contains('O') && !code.contains('0'));
        }
    }

    #[tokio::test]
    async fn test_generated_codes_are_unique() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);

        for _ in 0..25 {
            ledger.generate("mod#1", Some(1), false).await.expect("generate");
        }
        let codes = ledger.all().await.expect("all");
        let mut tokens: Vec<&str> = codes.iter().map(|c| c.code.as_str()).collect();
        tokens.sort_unstable();
        tokens.dedup();
        assert_eq!(tokens.len(), 25);
    }

    #[tokio::test]
    async fn test_code_consumed_at_most_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);
        let code = ledger.generate("mod#1", Some(1), false).await.expect("generate");

        let first = ledger
            .validate_and_consume(&code.code, CommandName::Ban, 99)
            .await
            .expect("consume");
        let before = first.expect("valid code");
        assert!(!before.used);

        let second = ledger
            .validate_and_consume(&code.code, CommandName::Ban, 98)
            .await
            .expect("consume");
        assert!(second.is_none());

        let stored = ledger.all().await.expect("all");
        assert!(stored[0].used);
        assert_eq!(stored[0].used_by, Some(99));
        assert!(stored[0].used_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumers_race_for_one_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);
        let code = ledger.generate("mod#1", None, false).await.expect("generate");

        let mut tasks = Vec::new();
        for user in 0..8 {
            let ledger = ledger.clone();
            let token = code.code.clone();
            tasks.push(tokio::spawn(async move {
                ledger.validate_and_consume(&token, CommandName::Ban, user).await
            }));
        }
        let mut winners = 0;
        for task in tasks {
            if task.await.expect("join").expect("consume").is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_unknown_or_mismatched_codes_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);
        let code = ledger.generate("mod#1", None, false).await.expect("generate");

        assert!(ledger
            .validate_and_consume("nope", CommandName::Ban, 1)
            .await
            .expect("consume")
            .is_none());
        assert!(ledger
            .validate_and_consume(&code.code, CommandName::Kick, 1)
            .await
            .expect("consume")
            .is_none());
        assert!(!ledger.all().await.expect("all")[0].used);
    }

    #[tokio::test]
    async fn test_current_or_generate_reuses_unused_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);

        let (first, fresh) = ledger.current_or_generate("mod#1", Some(1), false).await.expect("code");
        assert!(fresh);
        assert!(!first.auto_generated);

        let (again, fresh) = ledger.current_or_generate("mod#2", Some(2), false).await.expect("code");
        assert!(!fresh);
        assert_eq!(again.code, first.code);
    }

    #[tokio::test]
    async fn test_current_or_generate_skips_held_back_codes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);

        let held = ledger.generate("mod#1", Some(1), true).await.expect("generate");
        let (code, fresh) = ledger.current_or_generate("mod#2", Some(2), false).await.expect("code");
        assert!(fresh);
        assert_ne!(code.code, held.code);
    }

    #[tokio::test]
    async fn test_private_codes_are_never_shared() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);

        let (hidden, fresh) = ledger.current_or_generate("ghost", Some(9), true).await.expect("code");
        assert!(fresh);
        assert!(hidden.private);
        assert_eq!(hidden.public_generator(), PRIVATE_GENERATOR);

        let (staff, fresh) = ledger.current_or_generate("mod#2", Some(2), false).await.expect("code");
        assert!(fresh);
        assert!(!staff.private);
        assert_ne!(staff.code, hidden.code);
        assert_eq!(staff.public_generator(), "mod#2");

        // A private caller may still reuse a public code.
        let (again, fresh) = ledger.current_or_generate("ghost", Some(9), true).await.expect("code");
        assert!(!fresh);
        assert_eq!(again.code, staff.code);
    }

    #[tokio::test]
    async fn test_replacement_keeps_privacy_and_is_never_disclosed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);
        let delay = Duration::hours(24);

        let (hidden, _) = ledger.current_or_generate("ghost", Some(9), true).await.expect("code");
        let consumed = ledger
            .validate_and_consume(&hidden.code, CommandName::Ban, 3)
            .await
            .expect("consume")
            .expect("valid code");
        let replacement = ledger.generate_replacement(&consumed).await.expect("replace");

        assert!(replacement.auto_generated);
        assert!(replacement.private);
        assert_eq!(replacement.generated_by_id, Some(9));
        assert!(ledger
            .pending_disclosures(replacement.generated_at + delay, delay)
            .await
            .expect("pending")
            .is_empty());
    }

    #[tokio::test]
    async fn test_pending_disclosures_respect_delay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);
        let delay = Duration::hours(24);

        let code = ledger.generate("mod#1", Some(1), true).await.expect("generate");
        assert!(!code.sent_to_channel);
        assert!(ledger
            .pending_disclosures(code.generated_at, delay)
            .await
            .expect("pending")
            .is_empty());

        let due = ledger
            .pending_disclosures(code.generated_at + delay, delay)
            .await
            .expect("pending");
        assert_eq!(due.len(), 1);

        assert!(ledger.mark_disclosed(&code.code).await.expect("mark"));
        assert!(ledger
            .pending_disclosures(code.generated_at + delay, delay)
            .await
            .expect("pending")
            .is_empty());
        assert!(!ledger.mark_disclosed("missing").await.expect("mark"));
    }

    #[tokio::test]
    async fn test_persisted_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(&dir);
        ledger.generate("mod#1", None, true).await.expect("generate");

        let raw = std::fs::read_to_string(dir.path().join("override-codes.json")).expect("read");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
        let entry = &json["codes"][0];
        assert_eq!(entry["command"], "ban");
        assert_eq!(entry["generatedBy"], "mod#1");
        assert!(entry["generatedById"].is_null());
        assert!(entry["generatedAt"].is_i64());
        assert_eq!(entry["autoGenerated"], true);
        assert_eq!(entry["sentToChannel"], false);
        assert!(entry["usedAt"].is_null());
        assert_eq!(entry["private"], false);
    }
}
