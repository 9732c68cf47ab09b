use std::fs;
use std::sync::Arc;

use capacity_core::AnalysisParameters;
use capacity_layer::{load_comparison, DatasetSettings, InMemoryLayer};
use serde_json::{json, Value};

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn layer(name: &str) -> InMemoryLayer {
    let data = fs::read_to_string(fixture_path(name)).expect("could not read fixture layer");
    InMemoryLayer::from_json_str(&data).expect("fixture layer is not a feature set")
}

#[tokio::test]
async fn comparison_matches_golden() {
    let sides = [
        (DatasetSettings::new("left", "Model A"), layer("left_model.json")),
        (DatasetSettings::new("right", "Model B"), layer("right_model.json")),
    ];

    let mut load = load_comparison(Arc::new(AnalysisParameters::default()), &sides).await;
    assert!(load.failures.is_empty(), "{:?}", load.failures);

    let index = &mut load.index;
    let default_sources = serde_json::to_value(index.default_sources().expect("default sources"))
        .expect("could not serialize default sources");
    let feature_sources = serde_json::to_value(index.feature_sources("101").expect("feature 101"))
        .expect("could not serialize feature sources");
    let summaries = serde_json::to_value(
        index
            .count_summaries("Hospitalized", 1, None)
            .expect("summaries"),
    )
    .expect("could not serialize summaries");

    let actual = json!({
        "days": index.days(),
        "first_day": index.first_day(),
        "overall_overage_max": index.overall_overage_max(),
        "default_sources": default_sources,
        "feature_sources": feature_sources,
        "summaries": summaries,
    });

    let expected = fs::read_to_string(fixture_path("comparison_snapshot.json"))
        .expect("could not read golden snapshot");
    let expected: Value = serde_json::from_str(&expected).expect("golden snapshot is not JSON");

    assert_eq!(actual, expected);
}

#[tokio::test]
async fn features_missing_from_one_side_are_not_found() {
    let sides = [
        (DatasetSettings::new("left", "Model A"), layer("left_model.json")),
        (DatasetSettings::new("right", "Model B"), layer("right_model.json")),
    ];

    let mut load = load_comparison(Arc::new(AnalysisParameters::default()), &sides).await;

    let err = load
        .index
        .feature_sources("999")
        .expect_err("feature 999 does not exist");
    assert!(err.to_string().contains("999"));
}
