//! Feature-layer rows to `DatasetAggregate` converter with overage statistics.

use std::collections::BTreeMap;

use capacity_core::{
    parse_counts, AnalysisParameters, CapacityError, DatasetAggregate, EntityResult, DEFAULT_DAYS,
    MAX_DAYS,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod feature;
pub mod load;
pub mod overage;

pub use feature::{FeatureRow, FeatureSet, FieldInfo};
pub use load::{
    load_comparison, load_dataset, ComparisonLoad, FeatureSource, InMemoryLayer, SideFailure,
};
pub use overage::{
    compute_overage_max, overage_ceiling, overage_statistics, OverageQuery, RowStatistics,
    StatisticsProvider, SummaryStatistics,
};

/// Identity and display settings for one compared layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetSettings {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_color: Option<String>,
}

impl DatasetSettings {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            data_color: None,
        }
    }
}

/// Aggregate a feature set from a JSON string.
pub fn aggregate_feature_set_str(
    feature_set_json: &str,
    settings: &DatasetSettings,
    parameters: &AnalysisParameters,
) -> Result<DatasetAggregate, CapacityError> {
    let feature_set: FeatureSet = serde_json::from_str(feature_set_json)
        .map_err(|err| CapacityError::Parse(err.to_string()))?;
    aggregate_feature_set(&feature_set, settings, parameters)
}

/// Aggregate a feature set from a `serde_json::Value`.
pub fn aggregate_feature_set_value(
    feature_set: &Value,
    settings: &DatasetSettings,
    parameters: &AnalysisParameters,
) -> Result<DatasetAggregate, CapacityError> {
    let feature_set = FeatureSet::deserialize(feature_set)
        .map_err(|err| CapacityError::Parse(err.to_string()))?;
    aggregate_feature_set(&feature_set, settings, parameters)
}

/// Validate the declared schema (when present) and aggregate the rows.
pub fn aggregate_feature_set(
    feature_set: &FeatureSet,
    settings: &DatasetSettings,
    parameters: &AnalysisParameters,
) -> Result<DatasetAggregate, CapacityError> {
    if !feature_set.fields.is_empty() {
        parameters.validate_layer(&settings.title, &feature_set.field_names())?;
    }
    aggregate_rows(&feature_set.features, settings, parameters)
}

/// Build per-feature results and the layer totals.
///
/// The day count and first day are read from the first row; later rows are
/// expected to agree and are counted in `mismatched_rows` when they do not.
/// The returned aggregate's `overage_max` is `-inf` until statistics run.
pub fn aggregate_rows(
    rows: &[FeatureRow],
    settings: &DatasetSettings,
    parameters: &AnalysisParameters,
) -> Result<DatasetAggregate, CapacityError> {
    let first = rows
        .first()
        .ok_or_else(|| CapacityError::NoData(settings.title.clone()))?;

    let source = parameters.source_fields();
    let days = row_days(first, &source.days)
        .map_err(|detail| CapacityError::InvalidField {
            field: source.days.clone(),
            dataset: settings.title.clone(),
            detail,
        })?
        .unwrap_or(DEFAULT_DAYS);
    let first_day = first
        .date(&source.first_day)
        .ok_or_else(|| CapacityError::InvalidField {
            field: source.first_day.clone(),
            dataset: settings.title.clone(),
            detail: format!("{:?} is not a date", first.get(&source.first_day)),
        })?;

    let mut aggregate = AggregateData::new(parameters, &settings.title, days);
    for row in rows {
        aggregate.handle_row(row);
    }

    tracing::debug!(
        dataset = %settings.title,
        rows = rows.len(),
        features = aggregate.features.len(),
        days,
        "aggregated layer"
    );

    Ok(aggregate.finalize(settings, first_day))
}

struct AggregateData<'a> {
    parameters: &'a AnalysisParameters,
    title: &'a str,
    days: usize,
    layer: EntityResult,
    features: BTreeMap<String, EntityResult>,
    mismatched_rows: usize,
}

impl<'a> AggregateData<'a> {
    fn new(parameters: &'a AnalysisParameters, title: &'a str, days: usize) -> Self {
        Self {
            parameters,
            title,
            days,
            layer: EntityResult::new(title, days, parameters.variables()),
            features: BTreeMap::new(),
            mismatched_rows: 0,
        }
    }

    fn handle_row(&mut self, row: &FeatureRow) {
        let source = self.parameters.source_fields();
        let Some(feature_id) = row.text(&source.id).filter(|id| !id.is_empty()) else {
            tracing::warn!(
                dataset = %self.title,
                field = %source.id,
                "skipping row without feature id"
            );
            return;
        };

        if self.features.contains_key(&feature_id) {
            tracing::warn!(dataset = %self.title, %feature_id, "skipping duplicate feature id");
            return;
        }

        match row_days(row, &source.days) {
            Ok(Some(row_days)) if row_days != self.days => {
                self.mismatched_rows += 1;
                tracing::warn!(
                    dataset = %self.title,
                    %feature_id,
                    row_days,
                    layer_days = self.days,
                    "row day count differs from first row"
                );
            }
            Err(detail) => {
                self.mismatched_rows += 1;
                tracing::warn!(
                    dataset = %self.title,
                    %feature_id,
                    %detail,
                    "unusable row day count"
                );
            }
            Ok(_) => {}
        }

        let title = row
            .text(&source.name)
            .unwrap_or_else(|| feature_id.clone());
        let mut feature = EntityResult::new(title, self.days, self.parameters.variables());

        for variable in self.parameters.variables() {
            let Ok(definition) = self.parameters.variable(variable) else {
                continue;
            };
            let Some(series) = feature.series_mut(variable) else {
                continue;
            };

            series.capacity = row.number(&definition.capacity_field).unwrap_or_else(|| {
                tracing::warn!(
                    dataset = %self.title,
                    %feature_id,
                    field = %definition.capacity_field,
                    "missing capacity, using 0"
                );
                0.0
            });
            series.counts = match row.text(&definition.counts_field) {
                Some(raw) => parse_counts(&raw, self.parameters.separator(), self.days),
                None => vec![None; self.days],
            };
        }

        self.layer.accumulate(&feature, self.parameters.no_data_policy());
        self.features.insert(feature_id, feature);
    }

    fn finalize(self, settings: &DatasetSettings, first_day: DateTime<Utc>) -> DatasetAggregate {
        DatasetAggregate {
            id: settings.id.clone(),
            title: settings.title.clone(),
            description: settings.description.clone(),
            data_color: settings.data_color.clone(),
            days: self.days,
            first_day,
            layer_result: self.layer,
            feature_results: self.features,
            mismatched_rows: self.mismatched_rows,
            overage_max: f64::NEG_INFINITY,
        }
    }
}

/// Day count of a row. Missing or non-positive counts are `None`; counts
/// that are fractional or above `MAX_DAYS` are rejected.
fn row_days(row: &FeatureRow, field: &str) -> Result<Option<usize>, String> {
    let Some(days) = row.number(field) else {
        return Ok(None);
    };
    if days < 1.0 {
        return Ok(None);
    }
    if days.fract() != 0.0 || days > MAX_DAYS as f64 {
        return Err(format!("{days} is not a day count between 1 and {MAX_DAYS}"));
    }
    Ok(Some(days as usize))
}

#[cfg(test)]
mod tests {
    use capacity_core::NoDataPolicy;
    use serde_json::json;

    use super::*;

    fn settings() -> DatasetSettings {
        DatasetSettings::new("left", "Model A")
    }

    fn row(id: Value, name: &str, days: Value, capacity: f64, counts: &str) -> FeatureRow {
        serde_json::from_value(json!({
            "attributes": {
                "SOURCE_ID": id,
                "web_name": name,
                "web_days": days,
                "web_date": "2020-04-07",
                "hcap_input": capacity,
                "web_chosp": counts,
                "icap_input": capacity / 5.0,
                "web_cicu": counts,
                "vcap_input": capacity / 10.0,
                "web_cvent": counts
            }
        }))
        .expect("row")
    }

    #[test]
    fn empty_layer_is_no_data() {
        let err = aggregate_rows(&[], &settings(), &AnalysisParameters::default())
            .expect_err("no rows");
        assert_eq!(err, CapacityError::NoData("Model A".to_string()));
    }

    #[test]
    fn malformed_tokens_poison_layer_totals() {
        let rows = vec![
            row(json!("A"), "Alpha", json!(3), 15.0, "10|20|x"),
            row(json!("B"), "Beta", json!(3), 10.0, "5|NODATA|8"),
        ];

        let aggregate =
            aggregate_rows(&rows, &settings(), &AnalysisParameters::default()).expect("aggregate");
        let layer = aggregate
            .layer_result
            .series("Hospitalized")
            .expect("layer series");

        assert_eq!(aggregate.days, 3);
        assert_eq!(layer.capacity, 25.0);
        assert_eq!(layer.counts, vec![Some(15), None, None]);

        let alpha = aggregate.feature("A").expect("feature A");
        assert_eq!(alpha.title, "Alpha");
        let alpha_beds = alpha.series("Hospitalized").expect("series");
        assert_eq!(alpha_beds.capacity, 15.0);
        assert_eq!(alpha_beds.counts, vec![Some(10), Some(20), None]);
    }

    #[test]
    fn treat_as_zero_policy_keeps_present_values() {
        let params: AnalysisParameters =
            serde_json::from_value(json!({ "no_data_policy": "treat_as_zero" })).expect("params");
        let rows = vec![
            row(json!("A"), "Alpha", json!(3), 15.0, "10|20|x"),
            row(json!("B"), "Beta", json!(3), 10.0, "5|NODATA|8"),
        ];

        let aggregate = aggregate_rows(&rows, &settings(), &params).expect("aggregate");
        let layer = aggregate.layer_result.series("ICU").expect("layer series");

        assert_eq!(params.no_data_policy(), NoDataPolicy::TreatAsZero);
        assert_eq!(layer.counts, vec![Some(15), Some(20), Some(8)]);
    }

    #[test]
    fn layer_totals_equal_sum_of_features() {
        let rows = vec![
            row(json!(1), "One", json!(4), 40.0, "1|2|3|4"),
            row(json!(2), "Two", json!(4), 25.0, "10|-1|30"),
            row(json!(3), "Three", json!(4), 5.0, "7|7|7|7|7"),
        ];
        let params = AnalysisParameters::default();
        let aggregate = aggregate_rows(&rows, &settings(), &params).expect("aggregate");

        for variable in params.variables() {
            let layer = aggregate.layer_result.series(variable).expect("layer");
            let capacity: f64 = aggregate
                .feature_results
                .values()
                .map(|feature| feature.series(variable).expect("series").capacity)
                .sum();
            assert_eq!(layer.capacity, capacity);

            for day in 0..aggregate.days {
                let expected = aggregate
                    .feature_results
                    .values()
                    .map(|feature| feature.series(variable).expect("series").count(day))
                    .try_fold(0_u64, |total, count| count.map(|value| total + value));
                assert_eq!(layer.count(day), expected, "{variable} day {day}");
            }
        }

        let layer = aggregate.layer_result.series("Hospitalized").expect("layer");
        assert_eq!(layer.counts, vec![Some(18), None, Some(40), None]);
        let three = aggregate.feature("3").expect("numeric id keyed as text");
        assert_eq!(three.series("ICU").expect("series").counts.len(), 5);
    }

    #[test]
    fn first_row_sets_days_and_mismatches_are_counted() {
        let rows = vec![
            row(json!("A"), "Alpha", json!(2), 1.0, "1|2"),
            row(json!("B"), "Beta", json!(3), 1.0, "1|2|3"),
        ];

        let aggregate =
            aggregate_rows(&rows, &settings(), &AnalysisParameters::default()).expect("aggregate");
        assert_eq!(aggregate.days, 2);
        assert_eq!(aggregate.mismatched_rows, 1);
        assert_eq!(
            aggregate.layer_result.series("ICU").expect("series").counts,
            vec![Some(2), Some(4)]
        );
    }

    #[test]
    fn missing_day_count_falls_back_to_a_year() {
        let rows = vec![row(json!("A"), "Alpha", Value::Null, 1.0, "1|2")];

        let aggregate =
            aggregate_rows(&rows, &settings(), &AnalysisParameters::default()).expect("aggregate");
        assert_eq!(aggregate.days, DEFAULT_DAYS);
        let feature = aggregate.feature("A").expect("feature");
        let counts = &feature.series("ICU").expect("series").counts;
        assert_eq!(counts.len(), DEFAULT_DAYS);
        assert_eq!(counts[2], None);
    }

    #[test]
    fn oversized_day_count_fails_the_layer() {
        let rows = vec![row(json!("A"), "Alpha", json!(1e19), 1.0, "1|2")];

        let err = aggregate_rows(&rows, &settings(), &AnalysisParameters::default())
            .expect_err("day count too large");
        assert!(matches!(
            err,
            CapacityError::InvalidField { ref field, .. } if field == "web_days"
        ));
        assert!(err.is_fatal_to_load());
    }

    #[test]
    fn fractional_day_count_fails_the_layer() {
        let rows = vec![row(json!("A"), "Alpha", json!(2.5), 1.0, "1|2")];

        let err = aggregate_rows(&rows, &settings(), &AnalysisParameters::default())
            .expect_err("fractional day count");
        assert!(matches!(err, CapacityError::InvalidField { .. }));
    }

    #[test]
    fn unusable_day_count_on_later_row_is_a_mismatch() {
        let rows = vec![
            row(json!("A"), "Alpha", json!(2), 1.0, "1|2"),
            row(json!("B"), "Beta", json!(1e19), 1.0, "3|4"),
        ];

        let aggregate =
            aggregate_rows(&rows, &settings(), &AnalysisParameters::default()).expect("aggregate");
        assert_eq!(aggregate.days, 2);
        assert_eq!(aggregate.feature_count(), 2);
        assert_eq!(aggregate.mismatched_rows, 1);
    }

    #[test]
    fn duplicate_ids_keep_the_first_row() {
        let rows = vec![
            row(json!("A"), "Alpha", json!(2), 10.0, "1|2"),
            row(json!("A"), "Alpha again", json!(2), 99.0, "50|50"),
        ];

        let aggregate =
            aggregate_rows(&rows, &settings(), &AnalysisParameters::default()).expect("aggregate");
        assert_eq!(aggregate.feature_count(), 1);
        let layer = aggregate.layer_result.series("Hospitalized").expect("layer");
        assert_eq!(layer.capacity, 10.0);
        assert_eq!(layer.counts, vec![Some(1), Some(2)]);
    }

    #[test]
    fn unreadable_first_day_is_rejected() {
        let mut first = row(json!("A"), "Alpha", json!(2), 10.0, "1|2");
        first
            .attributes
            .insert("web_date".to_string(), json!("next tuesday"));

        let err = aggregate_rows(&[first], &settings(), &AnalysisParameters::default())
            .expect_err("bad date");
        assert!(matches!(err, CapacityError::InvalidField { field, .. } if field == "web_date"));
    }

    #[test]
    fn declared_schema_is_validated_before_aggregation() {
        let feature_set = json!({
            "fields": [{ "name": "SOURCE_ID" }, { "name": "web_name" }],
            "features": []
        });

        let params = AnalysisParameters::default();
        let err = aggregate_feature_set_value(&feature_set, &settings(), &params)
            .expect_err("schema incomplete");
        assert_eq!(
            err,
            CapacityError::MissingField {
                field: "web_days".to_string(),
                dataset: "Model A".to_string(),
            }
        );

        let err = aggregate_feature_set_str("{ not json", &settings(), &params)
            .expect_err("bad json");
        assert!(matches!(err, CapacityError::Parse(_)));
    }
}
