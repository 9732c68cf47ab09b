//! Per-entity result containers: one series per variable, per feature or layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::counts::DailyCount;
use crate::params::NoDataPolicy;

/// Series length used when a layer does not report its day count.
pub const DEFAULT_DAYS: usize = 366;

/// Largest day count a layer may report (ten years of daily values).
pub const MAX_DAYS: usize = 3660;

/// Capacity and daily counts for one (entity, variable) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesResult {
    pub capacity: f64,
    pub counts: Vec<DailyCount>,
}

impl SeriesResult {
    /// Zero capacity and `days` zero counts.
    pub fn new(days: usize) -> Self {
        Self {
            capacity: 0.0,
            counts: vec![Some(0); days],
        }
    }

    pub fn reset(&mut self, days: usize) {
        *self = Self::new(days);
    }

    /// Count for `day`; days past the end of the series are no-data.
    pub fn count(&self, day: usize) -> DailyCount {
        self.counts.get(day).copied().flatten()
    }

    /// Highest present count.
    pub fn peak(&self) -> Option<u64> {
        self.counts.iter().flatten().copied().max()
    }

    /// Share of capacity used on `day`, in percent. Capacity below one counts as one.
    pub fn percent_of_capacity(&self, day: usize) -> Option<f64> {
        let count = self.count(day)? as f64;
        Some(count / self.capacity.max(1.0) * 100.0)
    }

    /// Patients above capacity on `day` (negative while under capacity).
    pub fn overage(&self, day: usize) -> Option<f64> {
        let count = self.count(day)? as f64;
        Some(count - self.capacity.max(1.0))
    }

    /// Add another series into this one over this series' length.
    pub fn accumulate(&mut self, other: &SeriesResult, policy: NoDataPolicy) {
        self.capacity += other.capacity;
        for (day, total) in self.counts.iter_mut().enumerate() {
            *total = policy.combine(*total, other.count(day));
        }
    }
}

/// Results for one feature, or the synthetic whole-layer entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityResult {
    pub title: String,
    pub days: usize,
    pub series: BTreeMap<String, SeriesResult>,
}

impl EntityResult {
    pub fn new<S: AsRef<str>>(title: impl Into<String>, days: usize, variables: &[S]) -> Self {
        let series = variables
            .iter()
            .map(|variable| (variable.as_ref().to_string(), SeriesResult::new(days)))
            .collect();
        Self {
            title: title.into(),
            days,
            series,
        }
    }

    /// Change the series length; every child series is recreated empty.
    pub fn set_days(&mut self, days: usize) {
        self.days = days;
        for series in self.series.values_mut() {
            series.reset(days);
        }
    }

    pub fn series(&self, variable: &str) -> Option<&SeriesResult> {
        self.series.get(variable)
    }

    pub fn series_mut(&mut self, variable: &str) -> Option<&mut SeriesResult> {
        self.series.get_mut(variable)
    }

    /// Add every variable of `other` that this entity also tracks.
    pub fn accumulate(&mut self, other: &EntityResult, policy: NoDataPolicy) {
        for (variable, series) in self.series.iter_mut() {
            if let Some(addend) = other.series.get(variable) {
                series.accumulate(addend, policy);
            }
        }
    }
}

/// Aggregated results for one compared layer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetAggregate {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub data_color: Option<String>,
    pub days: usize,
    pub first_day: DateTime<Utc>,
    pub layer_result: EntityResult,
    pub feature_results: BTreeMap<String, EntityResult>,
    /// Rows whose day count differed from the first row or was unusable.
    pub mismatched_rows: usize,
    /// Normalisation ceiling for overage symbology; `-inf` until computed,
    /// which serializes as `null`. Output only, never read back.
    pub overage_max: f64,
}

impl DatasetAggregate {
    pub fn feature(&self, feature_id: &str) -> Option<&EntityResult> {
        self.feature_results.get(feature_id)
    }

    pub fn feature_count(&self) -> usize {
        self.feature_results.len()
    }
}
