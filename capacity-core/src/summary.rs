//! Count/capacity summaries that drive the per-side indicator.

use serde::{Deserialize, Serialize};

/// Gradient fill for the capacity indicator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorFill {
    pub color: String,
    /// Fill offset in percent within the active band.
    pub offset: f64,
}

impl IndicatorFill {
    /// Pick the colour band for `capacity_percent` using three ascending stops.
    pub fn for_percent(capacity_percent: f64, stops: &[f64; 3], colors: &[String; 3]) -> Self {
        let (band, offset) = if capacity_percent < stops[1] {
            (0, capacity_percent)
        } else if capacity_percent < stops[2] {
            (1, capacity_percent - stops[1])
        } else {
            (2, capacity_percent - stops[2])
        };

        Self {
            color: colors[band].clone(),
            offset,
        }
    }
}

/// Selected-day count for one side of the comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CountSummary {
    pub side: String,
    pub title: String,
    pub count: Option<f64>,
    pub capacity: Option<f64>,
    pub units: String,
    pub capacity_percent: Option<i64>,
    pub indicator: Option<IndicatorFill>,
}

impl CountSummary {
    pub fn new(
        side: &str,
        title: &str,
        count: Option<f64>,
        capacity: Option<f64>,
        units: &str,
        stops: &[f64; 3],
        colors: &[String; 3],
    ) -> Self {
        let capacity_percent = match (count, capacity) {
            (Some(count), Some(capacity)) if capacity > 0.0 => {
                Some((count / capacity * 100.0).round() as i64)
            }
            _ => None,
        };
        let indicator = capacity_percent
            .map(|percent| IndicatorFill::for_percent(percent as f64, stops, colors));

        Self {
            side: side.to_string(),
            title: title.to_string(),
            count,
            capacity,
            units: units.to_string(),
            capacity_percent,
            indicator,
        }
    }

    /// Short text for the indicator panel, e.g. `"120 beds | 80% capacity"`.
    pub fn label(&self) -> String {
        let count = self
            .count
            .map(|value| format!("{} {}", value.abs(), self.units))
            .unwrap_or_else(|| format!("-- {}", self.units));
        let percent = self
            .capacity_percent
            .map(|value| format!("{}% capacity", value.abs()))
            .unwrap_or_else(|| "--% capacity".to_string());
        format!("{count} | {percent}")
    }
}
