//! Overage ceiling used to scale overage symbology across both layers.

use std::collections::HashSet;

use async_trait::async_trait;
use capacity_core::{AnalysisParameters, CapacityError, VariableDefinition};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::feature::FeatureRow;

/// Statistics request for one variable's peak-over-capacity quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverageQuery {
    pub variable: String,
    pub peak_field: String,
    pub capacity_field: String,
    /// When set, only the first row per non-empty id is counted.
    pub id_field: Option<String>,
    /// Arcade value expression for services that evaluate it themselves.
    pub expression: String,
}

impl OverageQuery {
    pub fn new(variable: &str, definition: &VariableDefinition) -> Self {
        let peak = &definition.peak_field;
        let capacity = &definition.capacity_field;
        Self {
            variable: variable.to_string(),
            peak_field: peak.clone(),
            capacity_field: capacity.clone(),
            id_field: None,
            expression: format!(
                "IIF($feature.{peak} - $feature.{capacity} > 0, $feature.{peak} - $feature.{capacity}, 0)"
            ),
        }
    }

    /// Count the same rows aggregation ingests: one per distinct feature id.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }
}

/// Mean and standard deviation of a value across a layer's features.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SummaryStatistics {
    pub avg: f64,
    pub stddev: f64,
    pub count: usize,
}

impl SummaryStatistics {
    /// Sample statistics; a single value has zero deviation. `None` when empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let avg = values.iter().sum::<f64>() / count as f64;
        let stddev = if count > 1 {
            let squares: f64 = values.iter().map(|value| (value - avg).powi(2)).sum();
            (squares / (count - 1) as f64).sqrt()
        } else {
            0.0
        };
        Some(Self { avg, stddev, count })
    }
}

/// Source of layer-wide summary statistics (a feature service, or local rows).
#[async_trait]
pub trait StatisticsProvider: Send + Sync {
    async fn summary_statistics(
        &self,
        query: &OverageQuery,
    ) -> Result<SummaryStatistics, CapacityError>;
}

/// Statistics computed in process from already-queried rows.
#[derive(Debug, Clone, Copy)]
pub struct RowStatistics<'a> {
    rows: &'a [FeatureRow],
}

impl<'a> RowStatistics<'a> {
    pub fn new(rows: &'a [FeatureRow]) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl StatisticsProvider for RowStatistics<'_> {
    async fn summary_statistics(
        &self,
        query: &OverageQuery,
    ) -> Result<SummaryStatistics, CapacityError> {
        overage_statistics(self.rows, query)
    }
}

/// Per-feature `max(peak - capacity, 0)`, skipping rows lacking either field.
pub fn overage_statistics(
    rows: &[FeatureRow],
    query: &OverageQuery,
) -> Result<SummaryStatistics, CapacityError> {
    let mut seen = HashSet::new();
    let values: Vec<f64> = rows
        .iter()
        .filter(|row| match &query.id_field {
            Some(field) => row
                .text(field)
                .filter(|id| !id.is_empty())
                .is_some_and(|id| seen.insert(id)),
            None => true,
        })
        .filter_map(|row| {
            let peak = row.number(&query.peak_field)?;
            let capacity = row.number(&query.capacity_field)?;
            Some((peak - capacity).max(0.0))
        })
        .collect();

    SummaryStatistics::from_values(&values).ok_or_else(|| CapacityError::Statistics {
        variable: query.variable.clone(),
        detail: format!(
            "no feature has both '{}' and '{}'",
            query.peak_field, query.capacity_field
        ),
    })
}

/// One variable's ceiling: mean plus one standard deviation, rounded.
pub fn overage_ceiling(stats: &SummaryStatistics) -> f64 {
    (stats.avg + stats.stddev).round()
}

/// Largest per-variable ceiling. Every variable is queried concurrently and
/// all queries are awaited; a failed variable is logged and counts as `-inf`.
pub async fn compute_overage_max<P>(parameters: &AnalysisParameters, provider: &P) -> f64
where
    P: StatisticsProvider + ?Sized,
{
    let queries: Vec<OverageQuery> = parameters
        .variables()
        .iter()
        .filter_map(|variable| {
            parameters
                .variable(variable)
                .ok()
                .map(|definition| {
                    OverageQuery::new(variable, definition)
                        .with_id_field(&parameters.source_fields().id)
                })
        })
        .collect();

    let responses = join_all(
        queries
            .iter()
            .map(|query| provider.summary_statistics(query)),
    )
    .await;

    queries
        .iter()
        .zip(responses)
        .map(|(query, response)| match response {
            Ok(stats) => {
                let ceiling = overage_ceiling(&stats);
                tracing::debug!(variable = %query.variable, ceiling, "overage ceiling");
                ceiling
            }
            Err(err) => {
                tracing::warn!(
                    variable = %query.variable,
                    error = %err,
                    "overage statistics failed"
                );
                f64::NEG_INFINITY
            }
        })
        .fold(f64::NEG_INFINITY, f64::max)
}
