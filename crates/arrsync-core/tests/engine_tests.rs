//! Engine behaviour across services: isolation, ordering, pruning, retries,
//! dry runs and cancellation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use arrsync_client::{AdapterResult, Applied, ServiceAdapter};
use arrsync_core::{
    ApplyPolicy, Document, DocumentFormat, Operation, Outcome, SyncEngine, SyncOptions, SyncReport,
};
use arrsync_model::{Resource, ResourceId, ResourceKind, ServiceType};
use arrsync_test_utils::documents::{HDR_PROFILE, MULTI_SERVICE};
use arrsync_test_utils::{Action, FakeService, Journal};

fn document(yaml: &str) -> Document {
    Document::parse(yaml, DocumentFormat::Yaml).unwrap()
}

fn options() -> SyncOptions {
    SyncOptions {
        prune: None,
        policy: ApplyPolicy {
            base_backoff: Duration::from_millis(1),
            ..ApplyPolicy::default()
        },
    }
}

fn outcome_of<'a>(report: &'a SyncReport, service: &str, kind: ResourceKind, key: &str) -> &'a Outcome {
    &report
        .entries
        .iter()
        .find(|e| e.service == service && e.kind == kind && e.key == key)
        .unwrap_or_else(|| panic!("no entry for {service}:{kind}/{key}"))
        .outcome
}

struct Fleet {
    journal: Journal,
    indexers: Arc<FakeService>,
    tv: Arc<FakeService>,
    movies: Arc<FakeService>,
}

impl Fleet {
    fn new() -> Self {
        let journal = Journal::new();
        let indexers = FakeService::new("indexers", ServiceType::Prowlarr, &journal).with_template(
            ResourceKind::Indexer,
            json!({
                "definitionName": "nyaasi",
                "implementation": "Cardigann",
                "configContract": "CardigannSettings",
                "enable": false,
                "priority": 25,
                "fields": [{"name": "baseUrl", "value": "https://nyaa.si"}]
            }),
        );
        Self {
            indexers: Arc::new(indexers),
            tv: Arc::new(FakeService::new("tv", ServiceType::Sonarr, &journal)),
            movies: Arc::new(FakeService::new("movies", ServiceType::Radarr, &journal)),
            journal,
        }
    }

    fn engine(&self, options: SyncOptions) -> SyncEngine {
        SyncEngine::new(options)
            .with_adapter("indexers", self.indexers.clone())
            .with_adapter("tv", self.tv.clone())
            .with_adapter("movies", self.movies.clone())
    }
}

#[tokio::test]
async fn test_multi_service_run_converges() {
    let fleet = Fleet::new();
    let engine = fleet.engine(options());
    let doc = document(MULTI_SERVICE);

    let first = engine.run(&doc, CancellationToken::new()).await.unwrap();
    assert_eq!(first.exit_code(), 0, "{:#?}", first.entries);

    let nyaa = fleet.indexers.find(ResourceKind::Indexer, "Nyaa").unwrap();
    let standard = fleet.indexers.find(ResourceKind::AppProfile, "Standard").unwrap();
    let anime = fleet.indexers.find(ResourceKind::Tag, "anime").unwrap();
    assert_eq!(nyaa["appProfileId"], standard["id"]);
    assert_eq!(nyaa["tags"], json!([anime["id"]]));
    assert_eq!(nyaa["implementation"], json!("Cardigann"));
    assert_eq!(nyaa["enable"], json!(true));

    let second = engine.run(&doc, CancellationToken::new()).await.unwrap();
    let changed: Vec<_> = second
        .entries
        .iter()
        .filter(|e| e.outcome != Outcome::Unchanged)
        .collect();
    assert!(changed.is_empty(), "second run changed {changed:#?}");
}

#[tokio::test]
async fn test_release_profiles_wait_for_indexers() {
    let fleet = Fleet::new();
    let report = fleet
        .engine(options())
        .run(&document(MULTI_SERVICE), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.exit_code(), 0);

    let indexer = fleet
        .journal
        .position("indexers", Action::Create, ResourceKind::Indexer, "Nyaa")
        .unwrap();
    let profile = fleet
        .journal
        .position("tv", Action::Create, ResourceKind::ReleaseProfile, "Anime subs")
        .unwrap();
    let tag = fleet
        .journal
        .position("tv", Action::Create, ResourceKind::Tag, "anime")
        .unwrap();
    assert!(indexer < profile);
    assert!(tag < profile);
}

#[tokio::test]
async fn test_unreachable_service_is_skipped_alone() {
    let fleet = Fleet::new();
    fleet.movies.fail_ping();

    let report = fleet
        .engine(options())
        .run(&document(MULTI_SERVICE), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.skipped_services(), vec!["movies"]);
    assert_eq!(report.exit_code(), 1);
    assert!(report.entries.iter().all(|e| e.service != "movies"));
    assert_eq!(
        outcome_of(&report, "tv", ResourceKind::ReleaseProfile, "Anime subs"),
        &Outcome::Applied
    );
    assert_eq!(
        outcome_of(&report, "indexers", ResourceKind::Indexer, "Nyaa"),
        &Outcome::Applied
    );
    assert_eq!(fleet.journal.calls_for("movies").len(), 1);
}

#[tokio::test]
async fn test_fetch_failure_discards_the_whole_service() {
    let fleet = Fleet::new();
    fleet.tv.fail_fetch(ResourceKind::ReleaseProfile);

    let report = fleet
        .engine(options())
        .run(&document(MULTI_SERVICE), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].service, "tv");
    assert_eq!(report.skipped[0].kind, Some(ResourceKind::ReleaseProfile));
    assert!(fleet.journal.mutations().iter().all(|c| c.service != "tv"));
    assert_eq!(
        outcome_of(&report, "movies", ResourceKind::CustomFormat, "Remux"),
        &Outcome::Applied
    );
}

/// Live state with one unmanaged custom format and a profile scoring it
fn seed_leftovers(tv: &FakeService) {
    let old = tv.seed(
        ResourceKind::CustomFormat,
        json!({"name": "Old", "includeCustomFormatWhenRenaming": false, "specifications": []}),
    );
    tv.seed(
        ResourceKind::QualityProfile,
        json!({"name": "Legacy", "formatItems": [{"format": old, "score": 5}]}),
    );
}

#[tokio::test]
async fn test_live_only_resources_kept_without_prune() {
    let journal = Journal::new();
    let tv = Arc::new(FakeService::new("tv", ServiceType::Sonarr, &journal));
    seed_leftovers(&tv);

    let engine = SyncEngine::new(options()).with_adapter("tv", tv.clone());
    let report = engine
        .run(&document(HDR_PROFILE), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(journal.count(Action::Delete), 0);
    let old = report
        .entries
        .iter()
        .find(|e| e.key == "Old")
        .unwrap();
    assert_eq!(old.operation, Operation::Noop);
    assert_eq!(old.outcome, Outcome::Unchanged);
    assert!(tv.find(ResourceKind::CustomFormat, "Old").is_some());
}

#[tokio::test]
async fn test_prune_deletes_referrers_first() {
    let journal = Journal::new();
    let tv = Arc::new(FakeService::new("tv", ServiceType::Sonarr, &journal));
    seed_leftovers(&tv);

    let engine = SyncEngine::new(SyncOptions {
        prune: Some(true),
        ..options()
    })
    .with_adapter("tv", tv.clone());
    let report = engine
        .run(&document(HDR_PROFILE), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 0, "{:#?}", report.entries);
    let legacy = journal
        .position("tv", Action::Delete, ResourceKind::QualityProfile, "Legacy")
        .unwrap();
    let old = journal
        .position("tv", Action::Delete, ResourceKind::CustomFormat, "Old")
        .unwrap();
    assert!(legacy < old);
    assert!(tv.find(ResourceKind::CustomFormat, "Old").is_none());
    assert!(tv.find(ResourceKind::CustomFormat, "HDR").is_some());
}

#[tokio::test]
async fn test_failed_create_blocks_referrers() {
    let journal = Journal::new();
    let tv = Arc::new(FakeService::new("tv", ServiceType::Sonarr, &journal));
    tv.fail(Action::Create, ResourceKind::CustomFormat, "HDR");

    let report = SyncEngine::new(options())
        .with_adapter("tv", tv.clone())
        .run(&document(HDR_PROFILE), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(
        outcome_of(&report, "tv", ResourceKind::CustomFormat, "HDR"),
        Outcome::Failed { .. }
    ));
    assert_eq!(
        outcome_of(&report, "tv", ResourceKind::QualityProfile, "UHD"),
        &Outcome::Blocked {
            by: ResourceId::new("tv", ResourceKind::CustomFormat, "HDR")
        }
    );
    assert!(journal.position("tv", Action::Create, ResourceKind::QualityProfile, "UHD").is_none());
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let journal = Journal::new();
    let tv = Arc::new(FakeService::new("tv", ServiceType::Sonarr, &journal));
    tv.fail_transiently(Action::Create, ResourceKind::CustomFormat, "HDR", 2);

    let report = SyncEngine::new(options())
        .with_adapter("tv", tv.clone())
        .run(&document(HDR_PROFILE), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 0);
    let hdr_attempts = journal
        .mutations()
        .iter()
        .filter(|c| c.kind == Some(ResourceKind::CustomFormat))
        .count();
    assert_eq!(hdr_attempts, 3);
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let journal = Journal::new();
    let tv = Arc::new(FakeService::new("tv", ServiceType::Sonarr, &journal));
    tv.fail_transiently(Action::Create, ResourceKind::CustomFormat, "HDR", 10);

    let report = SyncEngine::new(options())
        .with_adapter("tv", tv.clone())
        .run(&document(HDR_PROFILE), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(
        outcome_of(&report, "tv", ResourceKind::CustomFormat, "HDR"),
        Outcome::Failed { .. }
    ));
    assert_eq!(journal.count(Action::Create), 3);
}

#[tokio::test]
async fn test_dry_run_makes_no_mutations() {
    let fleet = Fleet::new();
    let mut opts = options();
    opts.policy.dry_run = true;

    let report = fleet
        .engine(opts)
        .run(&document(MULTI_SERVICE), CancellationToken::new())
        .await
        .unwrap();

    assert!(report.dry_run);
    assert!(fleet.journal.mutations().is_empty());
    assert!(report.entries.iter().all(|e| e.outcome == Outcome::Planned));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_touches_nothing() {
    let fleet = Fleet::new();
    let token = CancellationToken::new();
    token.cancel();

    let report = fleet
        .engine(options())
        .run(&document(MULTI_SERVICE), token)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.entries.is_empty());
    assert!(fleet.journal.calls().is_empty());
    assert_eq!(report.exit_code(), 1);
}

/// Cancels the run as soon as the first call of `action` is dispatched,
/// then lets that call finish.
struct CancelOn {
    inner: Arc<FakeService>,
    token: CancellationToken,
    action: Action,
}

impl CancelOn {
    fn trip(&self, action: Action) {
        if self.action == action {
            self.token.cancel();
        }
    }
}

#[async_trait]
impl ServiceAdapter for CancelOn {
    fn service(&self) -> &str {
        self.inner.service()
    }

    fn service_type(&self) -> ServiceType {
        self.inner.service_type()
    }

    async fn ping(&self) -> AdapterResult<()> {
        self.inner.ping().await
    }

    async fn fetch_all(&self, kind: ResourceKind) -> AdapterResult<Vec<Resource>> {
        self.trip(Action::Fetch);
        self.inner.fetch_all(kind).await
    }

    async fn create(&self, resource: &Resource) -> AdapterResult<Applied> {
        self.trip(Action::Create);
        self.inner.create(resource).await
    }

    async fn update(&self, resource: &Resource, changed: &[String]) -> AdapterResult<Applied> {
        self.inner.update(resource, changed).await
    }

    async fn delete(&self, resource: &Resource) -> AdapterResult<()> {
        self.inner.delete(resource).await
    }
}

#[tokio::test]
async fn test_cancellation_lets_in_flight_call_finish() {
    let journal = Journal::new();
    let tv = Arc::new(FakeService::new("tv", ServiceType::Sonarr, &journal));
    let token = CancellationToken::new();
    let adapter = Arc::new(CancelOn {
        inner: tv.clone(),
        token: token.clone(),
        action: Action::Create,
    });

    let report = SyncEngine::new(options())
        .with_adapter("tv", adapter)
        .run(&document(HDR_PROFILE), token)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(
        outcome_of(&report, "tv", ResourceKind::CustomFormat, "HDR"),
        &Outcome::Applied
    );
    assert_eq!(
        outcome_of(&report, "tv", ResourceKind::QualityProfile, "UHD"),
        &Outcome::Cancelled
    );
    assert!(tv.find(ResourceKind::CustomFormat, "HDR").is_some());
    assert_eq!(journal.count(Action::Create), 1);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_cancellation_during_fetch_keeps_fetch_results() {
    let journal = Journal::new();
    let tv = Arc::new(FakeService::new("tv", ServiceType::Sonarr, &journal));
    let movies = Arc::new(FakeService::new("movies", ServiceType::Radarr, &journal));
    movies.fail_ping();
    let token = CancellationToken::new();
    let adapter = Arc::new(CancelOn {
        inner: tv.clone(),
        token: token.clone(),
        action: Action::Fetch,
    });
    let doc = document(
        r#"
services:
  tv:
    type: sonarr
    url: http://sonarr.invalid
    resources:
      customFormat:
        HDR: {}
      qualityProfile:
        UHD: {}
  movies:
    type: radarr
    url: http://radarr.invalid
    resources:
      customFormat:
        Remux: {}
"#,
    );

    let report = SyncEngine::new(options())
        .with_adapter("tv", adapter)
        .with_adapter("movies", movies)
        .run(&doc, token)
        .await
        .unwrap();

    assert!(report.cancelled);
    // Fetching went on after the first fetch tripped the token
    assert!(journal.count(Action::Fetch) >= 2);
    assert!(journal.mutations().is_empty());
    assert_eq!(report.skipped_services(), vec!["movies"]);
    assert_eq!(report.entries.len(), 2);
    assert!(report.entries.iter().all(|e| e.outcome == Outcome::Cancelled));
}

#[tokio::test]
async fn test_calls_to_one_service_never_overlap() {
    let journal = Journal::new();
    let tv = Arc::new(
        FakeService::new("tv", ServiceType::Sonarr, &journal).with_latency(Duration::from_millis(2)),
    );
    let doc = document(
        r#"
services:
  tv:
    type: sonarr
    url: http://sonarr.invalid
    resources:
      tag: [a, b, c, d, e]
      customFormat:
        HDR: {}
        DV: {}
"#,
    );

    let report = SyncEngine::new(options())
        .with_adapter("tv", tv.clone())
        .run(&doc, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.summary().applied, 7);
    assert_eq!(tv.max_in_flight(), 1);
}

#[tokio::test]
async fn test_missing_adapter_is_an_error() {
    let err = SyncEngine::new(options())
        .run(&document(HDR_PROFILE), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no adapter configured for service 'tv'");
}
