//! Sync report types
//!
//! A [`SyncReport`] records what happened to every resource the run looked
//! at, plus the services that were skipped because their live state could
//! not be read.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use arrsync_model::ResourceKind;

use crate::apply::{OpResult, Outcome};
use crate::fetch::FetchFailure;
use crate::plan::Operation;

/// One reconciled resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub service: String,
    pub kind: ResourceKind,
    pub key: String,
    pub operation: Operation,
    pub outcome: Outcome,
    /// Top-level fields an update touched
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,
}

impl From<OpResult> for ReportEntry {
    fn from(result: OpResult) -> Self {
        Self {
            service: result.id.service,
            kind: result.id.kind,
            key: result.id.key,
            operation: result.operation,
            outcome: result.outcome,
            changed: result.changed,
        }
    }
}

/// Compact per-resource line of the structured view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub operation: Operation,
    pub outcome: Outcome,
}

/// Counts of entries by outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub applied: usize,
    pub unchanged: usize,
    pub planned: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
    pub skipped_services: usize,
}

/// Result of one sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub entries: Vec<ReportEntry>,
    pub skipped: Vec<FetchFailure>,
}

impl SyncReport {
    /// Create an empty report for a run that starts now
    pub fn new(run_id: Uuid, dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            started_at: now,
            finished_at: now,
            dry_run,
            cancelled: false,
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Stamp the finish time
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            skipped_services: self.skipped_services().len(),
            ..Summary::default()
        };
        for entry in &self.entries {
            match entry.outcome {
                Outcome::Applied => summary.applied += 1,
                Outcome::Unchanged => summary.unchanged += 1,
                Outcome::Planned => summary.planned += 1,
                Outcome::Failed { .. } => summary.failed += 1,
                Outcome::Blocked { .. } => summary.blocked += 1,
                Outcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    /// Names of skipped services, without repeats
    pub fn skipped_services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skipped.iter().map(|f| f.service.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Entries grouped as `service → kind → key`
    pub fn by_service(&self) -> BTreeMap<&str, BTreeMap<ResourceKind, BTreeMap<&str, EntrySummary>>> {
        let mut view: BTreeMap<&str, BTreeMap<ResourceKind, BTreeMap<&str, EntrySummary>>> =
            BTreeMap::new();
        for entry in &self.entries {
            view.entry(entry.service.as_str())
                .or_default()
                .entry(entry.kind)
                .or_default()
                .insert(
                    entry.key.as_str(),
                    EntrySummary {
                        operation: entry.operation,
                        outcome: entry.outcome.clone(),
                    },
                );
        }
        view
    }

    /// Entries that did not reach their desired state
    pub fn problems(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| !e.outcome.is_success())
    }

    /// True when every entry succeeded and no service was skipped
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.skipped.is_empty() && self.problems().next().is_none()
    }

    /// Process exit code: 0 on success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Render as pretty JSON, including the structured view
    pub fn to_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Rendered<'a> {
            #[serde(flatten)]
            report: &'a SyncReport,
            summary: Summary,
            services: BTreeMap<&'a str, BTreeMap<ResourceKind, BTreeMap<&'a str, EntrySummary>>>,
        }

        serde_json::to_string_pretty(&Rendered {
            report: self,
            summary: self.summary(),
            services: self.by_service(),
        })
    }
}
