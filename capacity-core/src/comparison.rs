//! Two-sided comparison index feeding the chart, renderers and indicators.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::params::AnalysisParameters;
use crate::results::{DatasetAggregate, EntityResult};
use crate::summary::CountSummary;
use crate::CapacityError;

pub const LEFT_SIDE: &str = "left";
pub const RIGHT_SIDE: &str = "right";

/// Series key of the constant capacity line.
pub const CAPACITY_SERIES_KEY: &str = "Hospital Capacity";

/// One line on the chart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartSeries {
    pub id: String,
    pub title: String,
    pub series: Vec<Option<f64>>,
}

/// Chart input: variable -> series key -> series, plus the feature name when
/// scoped to one location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChartSources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub variables: BTreeMap<String, BTreeMap<String, ChartSeries>>,
}

impl ChartSources {
    pub fn variable(&self, variable: &str) -> Option<&BTreeMap<String, ChartSeries>> {
        self.variables.get(variable)
    }

    pub fn series(&self, variable: &str, key: &str) -> Option<&ChartSeries> {
        self.variables.get(variable)?.get(key)
    }
}

/// Holds both compared datasets and memoizes the chart views built from them.
///
/// Per-feature views are cached for the whole session with no eviction; the
/// feature set is finite and read-only once loaded.
#[derive(Debug)]
pub struct ComparisonIndex {
    parameters: Arc<AnalysisParameters>,
    side_ids: [String; 2],
    datasets: BTreeMap<String, DatasetAggregate>,
    first_day: Option<DateTime<Utc>>,
    days: usize,
    overall_overage_max: f64,
    default_sources: Option<ChartSources>,
    feature_sources: HashMap<String, ChartSources>,
}

impl ComparisonIndex {
    /// The first side id is the primary side: capacity lines and location
    /// names are read from it.
    pub fn new(parameters: Arc<AnalysisParameters>, side_ids: [String; 2]) -> Self {
        Self {
            parameters,
            side_ids,
            datasets: BTreeMap::new(),
            first_day: None,
            days: 0,
            overall_overage_max: f64::NEG_INFINITY,
            default_sources: None,
            feature_sources: HashMap::new(),
        }
    }

    pub fn left_right(parameters: Arc<AnalysisParameters>) -> Self {
        Self::new(parameters, [LEFT_SIDE.to_string(), RIGHT_SIDE.to_string()])
    }

    pub fn parameters(&self) -> &AnalysisParameters {
        &self.parameters
    }

    pub fn side_ids(&self) -> &[String; 2] {
        &self.side_ids
    }

    /// Register one side's aggregate and fold it into the shared time axis and scale.
    pub fn add_dataset(&mut self, aggregate: DatasetAggregate) -> Result<(), CapacityError> {
        if !self.side_ids.contains(&aggregate.id) {
            return Err(CapacityError::Configuration(format!(
                "unknown comparison side '{}', expected one of {:?}",
                aggregate.id, self.side_ids
            )));
        }
        if self.datasets.contains_key(&aggregate.id) {
            return Err(CapacityError::Configuration(format!(
                "comparison side '{}' is already registered",
                aggregate.id
            )));
        }

        self.first_day = Some(match self.first_day {
            Some(current) => current.min(aggregate.first_day),
            None => aggregate.first_day,
        });
        self.days = self.days.max(aggregate.days);
        self.overall_overage_max = self.overall_overage_max.max(aggregate.overage_max);

        tracing::debug!(
            side = %aggregate.id,
            days = self.days,
            overage_max = self.overall_overage_max,
            "registered comparison dataset"
        );

        self.datasets.insert(aggregate.id.clone(), aggregate);
        self.default_sources = None;
        self.feature_sources.clear();
        Ok(())
    }

    pub fn dataset(&self, side: &str) -> Option<&DatasetAggregate> {
        self.datasets.get(side)
    }

    /// Registered datasets in side order.
    pub fn datasets(&self) -> impl Iterator<Item = &DatasetAggregate> {
        self.side_ids
            .iter()
            .filter_map(|side| self.datasets.get(side))
    }

    pub fn is_complete(&self) -> bool {
        self.side_ids
            .iter()
            .all(|side| self.datasets.contains_key(side))
    }

    pub fn first_day(&self) -> Option<DateTime<Utc>> {
        self.first_day
    }

    pub fn days(&self) -> usize {
        self.days
    }

    pub fn overall_overage_max(&self) -> f64 {
        self.overall_overage_max
    }

    /// Calendar date of a slider position.
    pub fn date_for_day(&self, day: usize) -> Option<DateTime<Utc>> {
        let offset = Duration::try_days(i64::try_from(day).ok()?)?;
        self.first_day?.checked_add_signed(offset)
    }

    fn primary(&self) -> Result<&DatasetAggregate, CapacityError> {
        self.datasets().next().ok_or_else(|| {
            CapacityError::Configuration("no comparison dataset has been registered".to_string())
        })
    }

    /// Layer-wide chart sources, built on first use.
    pub fn default_sources(&mut self) -> Result<&ChartSources, CapacityError> {
        if self.default_sources.is_none() {
            let primary = self.primary()?;
            let layers: Vec<(&DatasetAggregate, &EntityResult)> = self
                .datasets()
                .map(|dataset| (dataset, &dataset.layer_result))
                .collect();
            let sources = self.build_sources(None, &primary.layer_result, &layers);
            tracing::debug!(variables = sources.variables.len(), "built default chart sources");
            self.default_sources = Some(sources);
        }

        self.default_sources
            .as_ref()
            .ok_or_else(|| CapacityError::Configuration("default sources unavailable".to_string()))
    }

    /// Chart sources for one feature, memoized per feature id.
    pub fn feature_sources(&mut self, feature_id: &str) -> Result<&ChartSources, CapacityError> {
        if !self.feature_sources.contains_key(feature_id) {
            let primary = self.primary()?;
            let mut features = Vec::with_capacity(self.side_ids.len());
            for dataset in self.datasets() {
                let feature = dataset.feature(feature_id).ok_or_else(|| {
                    CapacityError::FeatureNotFound {
                        feature_id: feature_id.to_string(),
                        side: dataset.id.clone(),
                    }
                })?;
                features.push((dataset, feature));
            }
            let primary_feature =
                primary
                    .feature(feature_id)
                    .ok_or_else(|| CapacityError::FeatureNotFound {
                        feature_id: feature_id.to_string(),
                        side: primary.id.clone(),
                    })?;

            let sources = self.build_sources(
                Some(primary_feature.title.clone()),
                primary_feature,
                &features,
            );
            tracing::debug!(feature_id, "cached feature chart sources");
            self.feature_sources.insert(feature_id.to_string(), sources);
        }

        self.feature_sources
            .get(feature_id)
            .ok_or_else(|| CapacityError::FeatureNotFound {
                feature_id: feature_id.to_string(),
                side: self.side_ids[0].clone(),
            })
    }

    /// Number of memoized per-feature views.
    pub fn cached_feature_count(&self) -> usize {
        self.feature_sources.len()
    }

    fn build_sources(
        &self,
        location: Option<String>,
        capacity_entity: &EntityResult,
        entities: &[(&DatasetAggregate, &EntityResult)],
    ) -> ChartSources {
        let mut variables = BTreeMap::new();

        for variable in self.parameters.variables() {
            let mut by_key = BTreeMap::new();

            let capacity = capacity_entity
                .series(variable)
                .map(|series| series.capacity)
                .unwrap_or_default();
            by_key.insert(
                CAPACITY_SERIES_KEY.to_string(),
                ChartSeries {
                    id: CAPACITY_SERIES_KEY.to_string(),
                    title: CAPACITY_SERIES_KEY.to_string(),
                    series: vec![Some(capacity); self.days],
                },
            );

            for (dataset, entity) in entities {
                let series = entity
                    .series(variable)
                    .map(|series| {
                        series
                            .counts
                            .iter()
                            .map(|count| count.map(|value| value as f64))
                            .collect()
                    })
                    .unwrap_or_default();
                by_key.insert(
                    dataset.id.clone(),
                    ChartSeries {
                        id: dataset.id.clone(),
                        title: dataset.title.clone(),
                        series,
                    },
                );
            }

            variables.insert(variable.clone(), by_key);
        }

        ChartSources {
            location,
            variables,
        }
    }

    /// Selected day and variable for every registered side, at layer level or
    /// for one feature.
    pub fn count_summaries(
        &mut self,
        variable: &str,
        day: usize,
        feature_id: Option<&str>,
    ) -> Result<Vec<CountSummary>, CapacityError> {
        let parameters = Arc::clone(&self.parameters);
        let units = parameters.unit(variable)?.to_string();
        let stops = parameters.color_data_stops();
        let colors = parameters.renderer_colors();
        let side_ids = self.side_ids.clone();

        let sources = match feature_id {
            Some(feature_id) => self.feature_sources(feature_id)?,
            None => self.default_sources()?,
        };
        let by_key = sources
            .variable(variable)
            .ok_or_else(|| CapacityError::UnknownVariable(variable.to_string()))?;
        let capacity = by_key
            .get(CAPACITY_SERIES_KEY)
            .and_then(|line| line.series.get(day).copied().flatten());

        let summaries = side_ids
            .iter()
            .filter_map(|side| by_key.get(side))
            .map(|line| {
                let count = line.series.get(day).copied().flatten();
                CountSummary::new(&line.id, &line.title, count, capacity, &units, stops, colors)
            })
            .collect();

        Ok(summaries)
    }
}
