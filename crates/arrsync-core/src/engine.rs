//! SyncEngine implementation
//!
//! The SyncEngine drives one reconciliation run from the parsed document to
//! the report: load and validate, fetch live state, diff, schedule, apply.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, instrument};
use uuid::Uuid;

use arrsync_client::ServiceAdapter;

use crate::Result;
use crate::apply::{ApplyPolicy, Executor};
use crate::config::{DesiredState, Document};
use crate::error::Error;
use crate::fetch::{LiveState, fetch_live};
use crate::plan::{Schedule, check_acyclic, diff, fill_live_defaults, schedule};
use crate::report::{ReportEntry, SyncReport};

/// Options for a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Force pruning on or off for every managed kind, overriding the document
    pub prune: Option<bool>,
    /// Retry and dry-run settings for the apply phase
    pub policy: ApplyPolicy,
}

impl SyncOptions {
    pub fn dry_run(&self) -> bool {
        self.policy.dry_run
    }
}

/// A planned run: everything needed to apply, nothing applied yet
#[derive(Debug)]
pub struct SyncRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub desired: DesiredState,
    pub live: LiveState,
    pub schedule: Schedule,
}

impl SyncRun {
    /// Number of operations that would touch a service
    pub fn mutation_count(&self) -> usize {
        self.schedule
            .ops
            .iter()
            .filter(|s| s.op.is_mutation())
            .count()
    }
}

/// Engine for reconciling services against a document
///
/// Holds one adapter per declared service. The engine itself keeps no state
/// between runs; every run starts from a fresh live fetch.
pub struct SyncEngine {
    adapters: BTreeMap<String, Arc<dyn ServiceAdapter>>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(options: SyncOptions) -> Self {
        Self {
            adapters: BTreeMap::new(),
            options,
        }
    }

    /// Register the adapter for a named service
    pub fn with_adapter(mut self, service: impl Into<String>, adapter: Arc<dyn ServiceAdapter>) -> Self {
        self.register(service, adapter);
        self
    }

    pub fn register(&mut self, service: impl Into<String>, adapter: Arc<dyn ServiceAdapter>) {
        self.adapters.insert(service.into(), adapter);
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Load and statically validate a document. Makes no network call.
    ///
    /// # Errors
    ///
    /// Returns a document error for unresolved references, dependency
    /// cycles, unsupported kinds or malformed declarations.
    #[instrument(skip_all)]
    pub fn prepare(&self, document: &Document) -> Result<DesiredState> {
        let mut desired = DesiredState::load(document)?;
        desired.validate_references()?;
        check_acyclic(&desired.graph, &desired.service_types())?;
        if let Some(prune) = self.options.prune {
            desired.override_prune(prune);
        }
        info!(
            services = desired.services.len(),
            resources = desired.graph.len(),
            "document loaded"
        );
        Ok(desired)
    }

    /// Fetch live state, fill in live defaults, diff and schedule.
    ///
    /// # Errors
    ///
    /// Fails when a declared service has no adapter, or when scheduling
    /// finds a cycle the static check could not see.
    pub async fn plan(&self, desired: DesiredState) -> Result<SyncRun> {
        if let Some(missing) = desired
            .services
            .keys()
            .find(|name| !self.adapters.contains_key(*name))
        {
            return Err(Error::MissingAdapter(missing.clone()));
        }

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("sync", run_id = %id);

        async move {
            let mut desired = desired;
            let live = fetch_live(&desired.graph, &desired.services, &self.adapters).await;
            fill_live_defaults(&mut desired.graph, &live.graph, &desired.services);
            let skipped = live.skipped();
            let ops = diff(&desired.graph, &live.graph, &desired.services, &skipped);

            let schedule = schedule(ops, &desired.service_types())?;

            let run = SyncRun {
                id,
                started_at,
                desired,
                live,
                schedule,
            };
            info!(
                operations = run.schedule.len(),
                mutations = run.mutation_count(),
                skipped = skipped.len(),
                "plan ready"
            );
            Ok::<_, Error>(run)
        }
        .instrument(span)
        .await
    }

    /// Execute a planned run and build its report.
    ///
    /// Never fails: per-resource problems end up in the report.
    pub async fn apply(&self, run: SyncRun, cancel: CancellationToken) -> SyncReport {
        let SyncRun {
            id,
            started_at,
            live,
            schedule,
            ..
        } = run;
        let span = info_span!("sync", run_id = %id);

        let executor = Executor::new(self.adapters.clone(), self.options.policy.clone(), cancel.clone());
        let results = executor
            .execute(schedule, Arc::new(live.graph))
            .instrument(span)
            .await;

        let mut report = SyncReport::new(id, self.options.dry_run());
        report.started_at = started_at;
        report.entries = results.into_iter().map(ReportEntry::from).collect();
        report.skipped = live.failures;
        report.cancelled = cancel.is_cancelled();
        let report = report.finish();

        let summary = report.summary();
        info!(
            run_id = %report.run_id,
            applied = summary.applied,
            unchanged = summary.unchanged,
            failed = summary.failed,
            blocked = summary.blocked,
            cancelled = summary.cancelled,
            "sync finished"
        );
        report
    }

    /// One complete run: prepare, plan, apply.
    ///
    /// Cancellation before the fetch yields an empty report flagged as
    /// cancelled. Once fetching has started it runs to completion, so no
    /// request is abandoned midway; the apply phase then dispatches nothing.
    ///
    /// # Errors
    ///
    /// Returns document errors and missing adapters; nothing has been sent
    /// to any service in that case.
    pub async fn run(&self, document: &Document, cancel: CancellationToken) -> Result<SyncReport> {
        let desired = self.prepare(document)?;
        if cancel.is_cancelled() {
            let mut report = SyncReport::new(Uuid::new_v4(), self.options.dry_run());
            report.cancelled = true;
            return Ok(report.finish());
        }
        let run = self.plan(desired).await?;
        Ok(self.apply(run, cancel).await)
    }
}
