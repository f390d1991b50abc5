//! End-to-end runs over HTTP
//!
//! The real [`ArrAdapter`] talks to wiremock servers standing in for the
//! services: document -> prepare -> fetch -> diff -> schedule -> apply.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use arrsync_client::{ArrAdapter, ServiceEndpoint};
use arrsync_core::{
    ApplyPolicy, Document, DocumentFormat, Operation, Outcome, SyncEngine, SyncOptions,
};
use arrsync_model::{ResourceKind, ServiceType};
use arrsync_test_utils::documents::HDR_PROFILE;

fn options(prune: Option<bool>) -> SyncOptions {
    SyncOptions {
        prune,
        policy: ApplyPolicy {
            base_backoff: Duration::from_millis(1),
            ..ApplyPolicy::default()
        },
    }
}

fn adapter(name: &str, service_type: ServiceType, server: &MockServer, key: &str) -> Arc<ArrAdapter> {
    let endpoint = ServiceEndpoint::new(name, service_type, server.uri(), key);
    Arc::new(ArrAdapter::new(endpoint).unwrap())
}

async fn mock_get(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn healthy(server: &MockServer) {
    mock_get(server, "/ping", json!({"status": "OK"})).await;
}

fn requests_with<'a>(requests: &'a [Request], verb: &str, route: &str) -> Vec<&'a Request> {
    requests
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .collect()
}

fn hdr_document(server: &MockServer) -> Document {
    let yaml = HDR_PROFILE.replace("http://sonarr.invalid", &server.uri());
    Document::parse(&yaml, DocumentFormat::Yaml).unwrap()
}

// ============================================================================
// Single service
// ============================================================================

#[tokio::test]
async fn test_fresh_sonarr_gets_format_then_profile() {
    let server = MockServer::start().await;
    healthy(&server).await;
    mock_get(&server, "/api/v3/customformat", json!([])).await;
    mock_get(&server, "/api/v3/qualityprofile", json!([])).await;

    Mock::given(method("POST"))
        .and(path("/api/v3/customformat"))
        .and(header("X-Api-Key", "tv-key"))
        .and(body_partial_json(json!({"name": "HDR"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7, "name": "HDR"})))
        .expect(1)
        .mount(&server)
        .await;
    // Only matches when the profile carries the id the format was given
    Mock::given(method("POST"))
        .and(path("/api/v3/qualityprofile"))
        .and(body_partial_json(json!({
            "name": "UHD",
            "formatItems": [{"format": 7, "score": 100}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 3, "name": "UHD"})))
        .expect(1)
        .mount(&server)
        .await;

    let engine = SyncEngine::new(options(None)).with_adapter(
        "tv",
        adapter("tv", ServiceType::Sonarr, &server, "tv-key"),
    );
    let report = engine
        .run(&hdr_document(&server), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 0, "{}", report.to_json().unwrap());
    assert_eq!(report.summary().applied, 2);

    let requests = server.received_requests().await.unwrap();
    let created: Vec<&str> = requests
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| r.url.path())
        .collect();
    assert_eq!(created, vec!["/api/v3/customformat", "/api/v3/qualityprofile"]);

    let format: Value = serde_json::from_slice(&requests_with(&requests, "POST", "/api/v3/customformat")[0].body).unwrap();
    // Specification fields go out in the list form the services expect
    assert_eq!(
        format["specifications"][0]["fields"],
        json!([{"name": "value", "value": "\\bHDR(10)?\\b"}])
    );
}

#[tokio::test]
async fn test_update_preserves_undeclared_fields() {
    let server = MockServer::start().await;
    healthy(&server).await;
    mock_get(
        &server,
        "/api/v3/customformat",
        json!([{
            "id": 7,
            "name": "HDR",
            "includeCustomFormatWhenRenaming": false,
            "specifications": [{
                "name": "HDR10",
                "implementation": "ReleaseTitleSpecification",
                "negate": false,
                "required": true,
                "fields": [{"name": "value", "value": "\\bHDR(10)?\\b"}]
            }]
        }]),
    )
    .await;
    mock_get(
        &server,
        "/api/v3/qualityprofile",
        json!([{
            "id": 3,
            "name": "UHD",
            "upgradeAllowed": true,
            "cutoff": 19,
            "minFormatScore": 25,
            "formatItems": [{"format": 7, "name": "HDR", "score": 100}]
        }]),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path("/api/v3/qualityprofile/3"))
        .and(body_partial_json(json!({"id": 3, "cutoff": 19, "minFormatScore": 0})))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": 3, "name": "UHD"})))
        .expect(1)
        .mount(&server)
        .await;

    let engine = SyncEngine::new(options(None)).with_adapter(
        "tv",
        adapter("tv", ServiceType::Sonarr, &server, "tv-key"),
    );
    let report = engine
        .run(&hdr_document(&server), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 0, "{}", report.to_json().unwrap());
    let update = report
        .entries
        .iter()
        .find(|e| e.operation == Operation::Update)
        .unwrap();
    assert_eq!(update.key, "UHD");
    assert_eq!(update.changed, vec!["minFormatScore".to_string()]);
    assert_eq!(report.summary().unchanged, 1);
}

#[tokio::test]
async fn test_prune_deletes_undeclared_tag() {
    let server = MockServer::start().await;
    healthy(&server).await;
    mock_get(
        &server,
        "/api/v3/tag",
        json!([{"id": 1, "label": "anime"}, {"id": 5, "label": "old"}]),
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v3/tag/5"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let yaml = format!(
        "services:\n  tv:\n    type: sonarr\n    url: {}\n    apiKey: tv-key\n    prune: true\n    resources:\n      tag: [anime]\n",
        server.uri()
    );
    let document = Document::parse(&yaml, DocumentFormat::Yaml).unwrap();

    // Without pruning nothing is removed
    let keeping = SyncEngine::new(options(Some(false))).with_adapter(
        "tv",
        adapter("tv", ServiceType::Sonarr, &server, "tv-key"),
    );
    let kept = keeping.run(&document, CancellationToken::new()).await.unwrap();
    assert!(kept.entries.iter().all(|e| e.operation == Operation::Noop));

    let engine = SyncEngine::new(options(None)).with_adapter(
        "tv",
        adapter("tv", ServiceType::Sonarr, &server, "tv-key"),
    );
    let report = engine.run(&document, CancellationToken::new()).await.unwrap();

    assert_eq!(report.exit_code(), 0, "{}", report.to_json().unwrap());
    let deleted = report
        .entries
        .iter()
        .find(|e| e.operation == Operation::Delete)
        .unwrap();
    assert_eq!(deleted.key, "old");
    assert_eq!(deleted.outcome, Outcome::Applied);
}

#[tokio::test]
async fn test_rejected_create_reports_service_message() {
    let server = MockServer::start().await;
    healthy(&server).await;
    mock_get(&server, "/api/v3/customformat", json!([])).await;
    mock_get(&server, "/api/v3/qualityprofile", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/api/v3/customformat"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!([{"propertyName": "Name", "errorMessage": "Must be unique"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = SyncEngine::new(options(None)).with_adapter(
        "tv",
        adapter("tv", ServiceType::Sonarr, &server, "tv-key"),
    );
    let report = engine
        .run(&hdr_document(&server), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 1);
    let by_kind: Vec<(ResourceKind, &Outcome)> = report
        .entries
        .iter()
        .map(|e| (e.kind, &e.outcome))
        .collect();
    assert!(matches!(
        by_kind[0],
        (ResourceKind::CustomFormat, Outcome::Failed { error }) if error.contains("Must be unique")
    ));
    assert!(matches!(
        by_kind[1],
        (ResourceKind::QualityProfile, Outcome::Blocked { .. })
    ));
    // The profile was never sent
    let requests = server.received_requests().await.unwrap();
    assert!(requests_with(&requests, "POST", "/api/v3/qualityprofile").is_empty());
}

// ============================================================================
// Indexer manager feeding a library manager
// ============================================================================

#[tokio::test]
async fn test_indexer_built_from_template_with_bound_references() {
    let prowlarr = MockServer::start().await;
    let sonarr = MockServer::start().await;

    healthy(&prowlarr).await;
    for route in ["/api/v1/tag", "/api/v1/appprofile", "/api/v1/indexer"] {
        mock_get(&prowlarr, route, json!([])).await;
    }
    mock_get(
        &prowlarr,
        "/api/v1/indexer/schema",
        json!([
            {"definitionName": "nyaasi", "implementation": "Cardigann", "configContract": "CardigannSettings", "enable": false, "fields": [{"name": "baseUrl", "value": "https://nyaa.si"}]},
            {"definitionName": "1337x", "implementation": "Cardigann", "configContract": "CardigannSettings", "enable": false, "fields": []}
        ]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/tag"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 4, "label": "anime"})))
        .expect(1)
        .mount(&prowlarr)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/appprofile"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1, "name": "Standard"})))
        .expect(1)
        .mount(&prowlarr)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/indexer"))
        .and(body_partial_json(json!({
            "name": "Nyaa",
            "implementation": "Cardigann",
            "definitionName": "nyaasi",
            "enable": true,
            "appProfileId": 1,
            "tags": [4],
            "fields": [{"name": "baseUrl", "value": "https://nyaa.si"}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 30, "name": "Nyaa"})))
        .expect(1)
        .mount(&prowlarr)
        .await;

    healthy(&sonarr).await;
    mock_get(&sonarr, "/api/v3/tag", json!([])).await;
    mock_get(&sonarr, "/api/v3/releaseprofile", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/api/v3/tag"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9, "label": "anime"})))
        .expect(1)
        .mount(&sonarr)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/releaseprofile"))
        .and(body_partial_json(json!({"name": "Anime subs", "tags": [9]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 2, "name": "Anime subs"})))
        .expect(1)
        .mount(&sonarr)
        .await;

    let yaml = format!(
        r#"
services:
  indexers:
    type: prowlarr
    url: {prowlarr}
    apiKey: idx-key
    resources:
      appProfile:
        Standard:
          enableRss: true
      indexer:
        Nyaa:
          definitionName: nyaasi
          appProfileId: Standard
          tags: [anime]
  tv:
    type: sonarr
    url: {sonarr}
    apiKey: tv-key
    resources:
      releaseProfile:
        Anime subs:
          required: [subs]
          tags: [anime]
"#,
        prowlarr = prowlarr.uri(),
        sonarr = sonarr.uri()
    );
    let document = Document::parse(&yaml, DocumentFormat::Yaml).unwrap();

    let engine = SyncEngine::new(options(None))
        .with_adapter("indexers", adapter("indexers", ServiceType::Prowlarr, &prowlarr, "idx-key"))
        .with_adapter("tv", adapter("tv", ServiceType::Sonarr, &sonarr, "tv-key"));
    let report = engine.run(&document, CancellationToken::new()).await.unwrap();

    assert_eq!(report.exit_code(), 0, "{}", report.to_json().unwrap());
    assert_eq!(report.summary().applied, 5);
    let positions: Vec<(String, ResourceKind)> = report
        .entries
        .iter()
        .map(|e| (e.service.clone(), e.kind))
        .collect();
    let indexer_at = positions
        .iter()
        .position(|p| *p == ("indexers".to_string(), ResourceKind::Indexer))
        .unwrap();
    let release_at = positions
        .iter()
        .position(|p| *p == ("tv".to_string(), ResourceKind::ReleaseProfile))
        .unwrap();
    assert!(indexer_at < release_at);
}
