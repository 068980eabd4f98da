//! Durable moderation state: warnings, cases and override codes

pub mod cases;
pub mod codes;
pub mod export;
pub mod warnings;

pub use cases::{Case, CaseLedger, CaseType, CasesDocument, GuildCaseLedger, NewCase, default_avatar_url};
pub use codes::{OverrideCode, OverrideCodeLedger, PRIVATE_GENERATOR};
pub use export::{CaseExporter, ExportSummary, FolderCaseExporter};
pub use warnings::{Severity, WarningLedger, WarningRecord};

use crate::storage::JsonStore;
use std::sync::Arc;

/// The three ledgers sharing one store
#[derive(Clone, Debug)]
pub struct Ledgers {
    pub warnings: WarningLedger,
    pub cases: CaseLedger,
    pub codes: OverrideCodeLedger,
}

impl Ledgers {
    pub fn open(store: &JsonStore, exporter: Option<Arc<dyn CaseExporter>>) -> Self {
        Self {
            warnings: WarningLedger::new(store.clone()),
            cases: CaseLedger::new(store.clone(), exporter),
            codes: OverrideCodeLedger::new(store.clone()),
        }
    }
}
