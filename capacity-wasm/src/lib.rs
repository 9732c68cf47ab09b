//! Framework-neutral WASM <-> JavaScript bridge for the capacity comparison.

use std::sync::Arc;

use capacity_core::{AnalysisParameters, CapacityError, ComparisonIndex};
use capacity_layer::{DatasetSettings, FeatureSet, InMemoryLayer, SideFailure};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

/// One side as passed from JS; keys are snake_case like the nested settings.
#[derive(Debug, Deserialize)]
struct JsSide {
    settings: DatasetSettings,
    feature_set: FeatureSet,
}

#[derive(Serialize)]
struct JsFailure<'a> {
    side: &'a str,
    error: String,
}

/// Both loaded sides of a comparison, queried by the chart, renderers and indicators.
#[wasm_bindgen]
pub struct CapacityComparison {
    index: ComparisonIndex,
    failures: Vec<SideFailure>,
}

#[wasm_bindgen]
impl CapacityComparison {
    pub fn days(&self) -> usize {
        self.index.days()
    }

    #[wasm_bindgen(js_name = firstDay)]
    pub fn first_day(&self) -> Option<String> {
        self.index.first_day().map(|day| day.to_rfc3339())
    }

    #[wasm_bindgen(js_name = overallOverageMax)]
    pub fn overall_overage_max(&self) -> f64 {
        self.index.overall_overage_max()
    }

    pub fn failures(&self) -> Result<JsValue, JsValue> {
        let failures: Vec<JsFailure<'_>> = self
            .failures
            .iter()
            .map(|failure| JsFailure {
                side: &failure.side,
                error: format_capacity_error(&failure.error),
            })
            .collect();
        to_js(&failures)
    }

    #[wasm_bindgen(js_name = defaultSources)]
    pub fn default_sources(&mut self) -> Result<JsValue, JsValue> {
        let sources = self.index.default_sources().map_err(to_js_error)?;
        to_js(sources)
    }

    #[wasm_bindgen(js_name = featureSources)]
    pub fn feature_sources(&mut self, feature_id: &str) -> Result<JsValue, JsValue> {
        let sources = self.index.feature_sources(feature_id).map_err(to_js_error)?;
        to_js(sources)
    }

    #[wasm_bindgen(js_name = countSummaries)]
    pub fn count_summaries(
        &mut self,
        variable: &str,
        day: usize,
        feature_id: Option<String>,
    ) -> Result<JsValue, JsValue> {
        let summaries = self
            .index
            .count_summaries(variable, day, feature_id.as_deref())
            .map_err(to_js_error)?;
        to_js(&summaries)
    }
}

/// Load both sides (`{ settings, feature_set }`) and build the comparison.
#[wasm_bindgen(js_name = loadComparison)]
pub async fn load_comparison(
    left: JsValue,
    right: JsValue,
    parameters: Option<JsValue>,
) -> Result<CapacityComparison, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let parameters = parse_parameters(parameters)?;
    let sides = [parse_side(left, "left")?, parse_side(right, "right")?];

    let load = capacity_layer::load_comparison(parameters, &sides).await;
    Ok(CapacityComparison {
        index: load.index,
        failures: load.failures,
    })
}

/// Check a layer's field names; rejects with the first missing field.
#[wasm_bindgen(js_name = validateLayer)]
pub fn validate_layer(
    title: &str,
    fields: JsValue,
    parameters: Option<JsValue>,
) -> Result<(), JsValue> {
    let parameters = parse_parameters(parameters)?;
    let fields: Vec<String> = from_value(fields)
        .map_err(|err| JsValue::from_str(&format!("Could not read field names: {err}")))?;
    parameters.validate_layer(title, &fields).map_err(to_js_error)
}

fn parse_parameters(parameters: Option<JsValue>) -> Result<Arc<AnalysisParameters>, JsValue> {
    let parameters = match parameters {
        Some(js_params) if !js_params.is_undefined() && !js_params.is_null() => {
            from_value::<AnalysisParameters>(js_params)
                .map_err(|err| JsValue::from_str(&format!("Could not read parameters: {err}")))?
        }
        _ => AnalysisParameters::default(),
    };
    Ok(Arc::new(parameters))
}

fn parse_side(value: JsValue, label: &str) -> Result<(DatasetSettings, InMemoryLayer), JsValue> {
    let side: JsSide = from_value(value)
        .map_err(|err| JsValue::from_str(&format!("Could not read {label} side: {err}")))?;
    Ok((side.settings, InMemoryLayer::new(side.feature_set)))
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(|err| JsValue::from_str(&format!("Could not serialize result: {err}")))
}

fn to_js_error(err: CapacityError) -> JsValue {
    JsValue::from_str(&format_capacity_error(&err))
}

fn format_capacity_error(err: &CapacityError) -> String {
    format!("Capacity error: {err}")
}

#[cfg(test)]
mod tests {
    use capacity_core::NoDataPolicy;
    use serde_json::json;

    use super::*;

    #[test]
    fn side_keys_share_one_convention() {
        let side: JsSide = serde_json::from_value(json!({
            "settings": { "id": "left", "title": "Model A", "data_color": "#0571b0" },
            "feature_set": { "features": [{ "attributes": { "SOURCE_ID": 1 } }] }
        }))
        .expect("side");

        assert_eq!(side.settings.data_color.as_deref(), Some("#0571b0"));
        assert_eq!(side.feature_set.features.len(), 1);

        let camel = serde_json::from_value::<JsSide>(json!({
            "settings": { "id": "left", "title": "Model A" },
            "featureSet": { "features": [] }
        }));
        assert!(camel.is_err());
    }

    #[test]
    fn parameters_use_the_same_keys_as_settings() {
        let params: AnalysisParameters =
            serde_json::from_value(json!({ "no_data_policy": "treat_as_zero" })).expect("params");
        assert_eq!(params.no_data_policy(), NoDataPolicy::TreatAsZero);
    }
}
