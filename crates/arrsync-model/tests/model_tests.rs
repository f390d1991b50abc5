//! Model behaviour exercised through the public API only

use std::collections::BTreeMap;

use arrsync_model::{
    Error, FieldValue, Origin, RemoteHandle, Resource, ResourceGraph, ResourceId, ResourceKind,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

#[rstest]
#[case("customFormat/HDR", "tv", "tv:customFormat/HDR")]
#[case("indexers:tag/Anime", "tv", "indexers:tag/anime")]
#[case("rootFolder//data/tv", "tv", "tv:rootFolder//data/tv")]
fn test_parse_reference(#[case] input: &str, #[case] default: &str, #[case] expected: &str) {
    assert_eq!(ResourceId::parse(input, default).unwrap().to_string(), expected);
}

#[rstest]
#[case("customFormat")]
#[case("customFormat/")]
#[case(":customFormat/HDR")]
#[case("widget/HDR")]
fn test_parse_reference_rejects(#[case] input: &str) {
    assert!(ResourceId::parse(input, "tv").is_err());
}

#[test]
fn test_ids_order_by_service_then_kind_rank() {
    let mut ids = vec![
        ResourceId::new("tv", ResourceKind::QualityProfile, "UHD"),
        ResourceId::new("tv", ResourceKind::CustomFormat, "HDR"),
        ResourceId::new("movies", ResourceKind::RootFolder, "/data"),
        ResourceId::new("tv", ResourceKind::Tag, "anime"),
    ];
    ids.sort();
    let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            "movies:rootFolder//data",
            "tv:tag/anime",
            "tv:customFormat/HDR",
            "tv:qualityProfile/UHD",
        ]
    );
}

#[test]
fn test_bind_then_payload() {
    let profile = Resource::desired(
        ResourceId::new("tv", ResourceKind::QualityProfile, "UHD"),
        BTreeMap::new(),
    )
    .with_field("minFormatScore", 0i64)
    .with_field(
        "formatItems",
        FieldValue::List(vec![FieldValue::map([
            (
                "format",
                FieldValue::Ref(ResourceId::new("tv", ResourceKind::CustomFormat, "HDR")),
            ),
            ("score", FieldValue::from(100i64)),
        ])]),
    );

    let bound = profile.bind(|_| Some(FieldValue::from(12i64))).unwrap();
    assert_eq!(
        bound.to_payload(),
        json!({
            "name": "UHD",
            "minFormatScore": 0,
            "formatItems": [{"format": 12, "score": 100}]
        })
    );

    let err = profile.bind(|_| None).unwrap_err();
    assert!(matches!(err, Error::UnboundReference { .. }));
}

#[test]
fn test_graph_rejects_duplicates_and_finds_remote_ids() {
    let mut graph = ResourceGraph::new(Origin::Live);
    let tag = |label: &str, id: i64| {
        Resource::live(
            ResourceId::new("tv", ResourceKind::Tag, label),
            BTreeMap::new(),
            RemoteHandle {
                id: Some(id),
                raw: json!({"id": id, "label": label}),
            },
        )
    };
    graph.insert(tag("anime", 1)).unwrap();
    graph.insert(tag("uhd", 2)).unwrap();

    assert!(matches!(
        graph.insert(tag("ANIME", 3)),
        Err(Error::DuplicateKey { .. })
    ));
    assert_eq!(
        graph
            .find_by_remote_id("tv", ResourceKind::Tag, 2)
            .map(|r| r.key().to_string()),
        Some("uhd".to_string())
    );
    assert_eq!(graph.kinds_for("tv").len(), 1);
}
