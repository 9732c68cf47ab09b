//! Loading one compared layer, and both sides of a comparison concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use capacity_core::{AnalysisParameters, CapacityError, ComparisonIndex, DatasetAggregate};
use futures::future::join_all;

use crate::feature::{FeatureRow, FeatureSet};
use crate::overage::{
    compute_overage_max, OverageQuery, RowStatistics, StatisticsProvider, SummaryStatistics,
};
use crate::{aggregate_rows, DatasetSettings};

/// A queryable feature layer that can also summarise its own features.
#[async_trait]
pub trait FeatureSource: StatisticsProvider {
    /// Names of the fields the layer declares; empty when it declares none.
    async fn field_names(&self) -> Result<Vec<String>, CapacityError>;

    /// Every feature row, restricted to `out_fields`.
    async fn query_rows(&self, out_fields: &[String]) -> Result<Vec<FeatureRow>, CapacityError>;
}

/// A feature set already held in memory (parsed from a file or passed from JS).
#[derive(Debug, Clone, Default)]
pub struct InMemoryLayer {
    feature_set: FeatureSet,
}

impl InMemoryLayer {
    pub fn new(feature_set: FeatureSet) -> Self {
        Self { feature_set }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CapacityError> {
        serde_json::from_str(json)
            .map(Self::new)
            .map_err(|err| CapacityError::Parse(err.to_string()))
    }

    pub fn feature_set(&self) -> &FeatureSet {
        &self.feature_set
    }
}

#[async_trait]
impl StatisticsProvider for InMemoryLayer {
    async fn summary_statistics(
        &self,
        query: &OverageQuery,
    ) -> Result<SummaryStatistics, CapacityError> {
        RowStatistics::new(&self.feature_set.features)
            .summary_statistics(query)
            .await
    }
}

#[async_trait]
impl FeatureSource for InMemoryLayer {
    async fn field_names(&self) -> Result<Vec<String>, CapacityError> {
        Ok(self.feature_set.field_names())
    }

    async fn query_rows(&self, out_fields: &[String]) -> Result<Vec<FeatureRow>, CapacityError> {
        let rows = self
            .feature_set
            .features
            .iter()
            .map(|row| {
                let attributes = row
                    .attributes
                    .iter()
                    .filter(|(name, _)| out_fields.contains(name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                FeatureRow::new(attributes)
            })
            .collect();
        Ok(rows)
    }
}

/// Validate, query, aggregate and compute the overage ceiling for one layer.
pub async fn load_dataset<S>(
    settings: &DatasetSettings,
    source: &S,
    parameters: &AnalysisParameters,
) -> Result<DatasetAggregate, CapacityError>
where
    S: FeatureSource + ?Sized,
{
    // Without a schema the returned rows are validated instead.
    let fields = source.field_names().await?;
    if !fields.is_empty() {
        parameters.validate_layer(&settings.title, &fields)?;
    }

    let rows = source.query_rows(parameters.required_fields()).await?;
    if fields.is_empty() {
        if let Some(first) = rows.first() {
            let returned: Vec<&String> = first.attributes.keys().collect();
            parameters.validate_layer(&settings.title, &returned)?;
        }
    }
    let mut aggregate = aggregate_rows(&rows, settings, parameters)?;
    aggregate.overage_max = compute_overage_max(parameters, source).await;

    tracing::info!(
        side = %settings.id,
        dataset = %settings.title,
        features = aggregate.feature_count(),
        days = aggregate.days,
        overage_max = aggregate.overage_max,
        "loaded dataset"
    );
    Ok(aggregate)
}

/// A side whose load did not make it into the comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct SideFailure {
    pub side: String,
    pub error: CapacityError,
}

/// Outcome of loading both sides: the index holds every side that loaded.
#[derive(Debug)]
pub struct ComparisonLoad {
    pub index: ComparisonIndex,
    pub failures: Vec<SideFailure>,
}

impl ComparisonLoad {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.index.is_complete()
    }
}

/// Load both sides concurrently and wait for both to settle before building
/// the index. A failed side is reported, never retried, and does not undo the
/// other side.
pub async fn load_comparison<S>(
    parameters: Arc<AnalysisParameters>,
    sides: &[(DatasetSettings, S); 2],
) -> ComparisonLoad
where
    S: FeatureSource,
{
    let side_ids = [sides[0].0.id.clone(), sides[1].0.id.clone()];
    let loads = join_all(
        sides
            .iter()
            .map(|(settings, source)| load_dataset(settings, source, &parameters)),
    )
    .await;

    let mut index = ComparisonIndex::new(Arc::clone(&parameters), side_ids);
    let mut failures = Vec::new();

    for ((settings, _), load) in sides.iter().zip(loads) {
        let registered = load.and_then(|aggregate| index.add_dataset(aggregate));
        if let Err(error) = registered {
            if error.is_fatal_to_load() {
                tracing::error!(side = %settings.id, %error, "dataset load failed");
            } else {
                tracing::warn!(side = %settings.id, %error, "dataset not registered");
            }
            failures.push(SideFailure {
                side: settings.id.clone(),
                error,
            });
        }
    }

    ComparisonLoad { index, failures }
}
