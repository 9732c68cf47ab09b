//! Core data model for comparing two layers of hospital-capacity model output.
//!
//! The crate owns the analysis parameters, the per-entity result containers,
//! the delimited daily-count format and the two-sided comparison index that
//! chart, renderer and popup consumers query.

pub mod comparison;
pub mod counts;
pub mod params;
pub mod results;
pub mod summary;

pub use comparison::{
    ChartSeries, ChartSources, ComparisonIndex, CAPACITY_SERIES_KEY, LEFT_SIDE, RIGHT_SIDE,
};
pub use counts::{join_counts, parse_count, parse_counts, split_counts, DailyCount};
pub use params::{AnalysisParameters, NoDataPolicy, SourceFields, VariableDefinition};
pub use results::{DatasetAggregate, EntityResult, SeriesResult, DEFAULT_DAYS, MAX_DAYS};
pub use summary::{CountSummary, IndicatorFill};

/// Errors raised while validating, loading or querying capacity results.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CapacityError {
    #[error("MISSING FIELD: '{field}' in {dataset}")]
    MissingField { field: String, dataset: String },
    #[error("could not retrieve any features from this layer: {0}")]
    NoData(String),
    #[error("statistics unavailable for {variable}: {detail}")]
    Statistics { variable: String, detail: String },
    #[error("feature '{feature_id}' not found in '{side}'")]
    FeatureNotFound { feature_id: String, side: String },
    #[error("invalid value for '{field}' in {dataset}: {detail}")]
    InvalidField {
        field: String,
        dataset: String,
        detail: String,
    },
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("could not read data: {0}")]
    Parse(String),
}

impl CapacityError {
    /// Fatal errors abort the owning dataset's load; the rest are scoped to one lookup or variable.
    pub fn is_fatal_to_load(&self) -> bool {
        matches!(
            self,
            CapacityError::MissingField { .. }
                | CapacityError::NoData(_)
                | CapacityError::InvalidField { .. }
                | CapacityError::Parse(_)
        )
    }
}
