//! Analysis parameters: field bindings, units and indicator colour stops.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CapacityError;

const DEFAULT_RENDERER_COLORS: [&str; 3] = ["#bababa", "#f4a582", "#ca0020"];
const DEFAULT_COLOR_DATA_STOPS: [f64; 3] = [0.0, 100.0, 200.0];

/// Field bindings for one tracked clinical variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariableDefinition {
    pub capacity_field: String,
    pub counts_field: String,
    pub peak_field: String,
    pub over_max_field: String,
    pub unit: String,
}

impl VariableDefinition {
    fn new(capacity: &str, counts: &str, peak: &str, over_max: &str, unit: &str) -> Self {
        Self {
            capacity_field: capacity.to_string(),
            counts_field: counts.to_string(),
            peak_field: peak.to_string(),
            over_max_field: over_max.to_string(),
            unit: unit.to_string(),
        }
    }

    fn field_names(&self) -> [&str; 4] {
        [
            &self.capacity_field,
            &self.counts_field,
            &self.peak_field,
            &self.over_max_field,
        ]
    }
}

/// Fields identifying a feature and its time axis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFields {
    pub id: String,
    pub name: String,
    pub days: String,
    pub first_day: String,
}

impl Default for SourceFields {
    fn default() -> Self {
        Self {
            id: "SOURCE_ID".to_string(),
            name: "web_name".to_string(),
            days: "web_days".to_string(),
            first_day: "web_date".to_string(),
        }
    }
}

impl SourceFields {
    fn field_names(&self) -> [&str; 4] {
        [
            self.id.as_str(),
            self.name.as_str(),
            self.days.as_str(),
            self.first_day.as_str(),
        ]
    }
}

/// How a no-data day combines with other values when summing a layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NoDataPolicy {
    /// Any no-data value makes the day's total no-data.
    #[default]
    Propagate,
    /// No-data values are summed as zero.
    TreatAsZero,
}

impl NoDataPolicy {
    /// Combine a running total with one more value.
    pub fn combine(self, total: Option<u64>, value: Option<u64>) -> Option<u64> {
        match self {
            NoDataPolicy::Propagate => Some(total?.saturating_add(value?)),
            NoDataPolicy::TreatAsZero => match (total, value) {
                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                (Some(a), None) | (None, Some(a)) => Some(a),
                (None, None) => None,
            },
        }
    }
}

/// Immutable analysis configuration shared by every component.
///
/// `required_fields` is derived once at construction, so the struct only
/// deserializes through [`AnalysisParametersConfig`] to keep it consistent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "AnalysisParametersConfig", into = "AnalysisParametersConfig")]
pub struct AnalysisParameters {
    variables: Vec<String>,
    source_fields: SourceFields,
    variable_fields: BTreeMap<String, VariableDefinition>,
    separator: char,
    renderer_colors: [String; 3],
    color_data_stops: [f64; 3],
    no_data_policy: NoDataPolicy,
    required_fields: Vec<String>,
}

/// Serialized form of [`AnalysisParameters`]. Missing keys fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParametersConfig {
    pub variables: Vec<String>,
    pub source_fields: SourceFields,
    pub variable_fields: BTreeMap<String, VariableDefinition>,
    pub separator: char,
    pub renderer_colors: Vec<String>,
    pub color_data_stops: Vec<f64>,
    pub no_data_policy: NoDataPolicy,
}

impl Default for AnalysisParametersConfig {
    fn default() -> Self {
        let mut variable_fields = BTreeMap::new();
        variable_fields.insert(
            "Hospitalized".to_string(),
            VariableDefinition::new("hcap_input", "web_chosp", "pk_hsp", "oc_hos_max", "beds"),
        );
        variable_fields.insert(
            "ICU".to_string(),
            VariableDefinition::new("icap_input", "web_cicu", "pk_icu", "oc_icu_max", "beds"),
        );
        variable_fields.insert(
            "Ventilated".to_string(),
            VariableDefinition::new(
                "vcap_input",
                "web_cvent",
                "pk_vnt",
                "oc_vnt_max",
                "ventilators",
            ),
        );

        Self {
            variables: vec![
                "Hospitalized".to_string(),
                "ICU".to_string(),
                "Ventilated".to_string(),
            ],
            source_fields: SourceFields::default(),
            variable_fields,
            separator: '|',
            renderer_colors: DEFAULT_RENDERER_COLORS.map(str::to_string).to_vec(),
            color_data_stops: DEFAULT_COLOR_DATA_STOPS.to_vec(),
            no_data_policy: NoDataPolicy::default(),
        }
    }
}

impl TryFrom<AnalysisParametersConfig> for AnalysisParameters {
    type Error = CapacityError;

    fn try_from(config: AnalysisParametersConfig) -> Result<Self, Self::Error> {
        let renderer_colors: [String; 3] =
            config
                .renderer_colors
                .try_into()
                .map_err(|colors: Vec<String>| {
                    CapacityError::Configuration(format!(
                        "expected 3 renderer colors, received {}",
                        colors.len()
                    ))
                })?;
        let color_data_stops: [f64; 3] =
            config
                .color_data_stops
                .try_into()
                .map_err(|stops: Vec<f64>| {
                    CapacityError::Configuration(format!(
                        "expected 3 color data stops, received {}",
                        stops.len()
                    ))
                })?;

        AnalysisParameters::new(
            config.variables,
            config.source_fields,
            config.variable_fields,
            config.separator,
            renderer_colors,
            color_data_stops,
            config.no_data_policy,
        )
    }
}

impl From<AnalysisParameters> for AnalysisParametersConfig {
    fn from(params: AnalysisParameters) -> Self {
        Self {
            variables: params.variables,
            source_fields: params.source_fields,
            variable_fields: params.variable_fields,
            separator: params.separator,
            renderer_colors: params.renderer_colors.into(),
            color_data_stops: params.color_data_stops.into(),
            no_data_policy: params.no_data_policy,
        }
    }
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        let config = AnalysisParametersConfig::default();
        let required_fields = derive_required_fields(
            &config.variables,
            &config.source_fields,
            &config.variable_fields,
        );
        Self {
            variables: config.variables,
            source_fields: config.source_fields,
            variable_fields: config.variable_fields,
            separator: config.separator,
            renderer_colors: DEFAULT_RENDERER_COLORS.map(str::to_string),
            color_data_stops: DEFAULT_COLOR_DATA_STOPS,
            no_data_policy: config.no_data_policy,
            required_fields,
        }
    }
}

impl AnalysisParameters {
    /// Build a validated parameter set and derive its required fields.
    pub fn new(
        variables: Vec<String>,
        source_fields: SourceFields,
        variable_fields: BTreeMap<String, VariableDefinition>,
        separator: char,
        renderer_colors: [String; 3],
        color_data_stops: [f64; 3],
        no_data_policy: NoDataPolicy,
    ) -> Result<Self, CapacityError> {
        if variables.is_empty() {
            return Err(CapacityError::Configuration(
                "at least one variable is required".to_string(),
            ));
        }

        for (position, variable) in variables.iter().enumerate() {
            if !variable_fields.contains_key(variable) {
                return Err(CapacityError::Configuration(format!(
                    "variable '{variable}' has no field definition"
                )));
            }
            if variables[..position].contains(variable) {
                return Err(CapacityError::Configuration(format!(
                    "variable '{variable}' is listed twice"
                )));
            }
        }

        if separator.is_ascii_digit() || separator == '-' {
            return Err(CapacityError::Configuration(format!(
                "separator '{separator}' would collide with count values"
            )));
        }

        if !color_data_stops.windows(2).all(|pair| pair[0] <= pair[1]) {
            return Err(CapacityError::Configuration(
                "color data stops must be ascending".to_string(),
            ));
        }

        let required_fields = derive_required_fields(&variables, &source_fields, &variable_fields);

        Ok(Self {
            variables,
            source_fields,
            variable_fields,
            separator,
            renderer_colors,
            color_data_stops,
            no_data_policy,
            required_fields,
        })
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn source_fields(&self) -> &SourceFields {
        &self.source_fields
    }

    pub fn variable_fields(&self) -> &BTreeMap<String, VariableDefinition> {
        &self.variable_fields
    }

    /// Field bindings for one variable.
    pub fn variable(&self, name: &str) -> Result<&VariableDefinition, CapacityError> {
        self.variable_fields
            .get(name)
            .ok_or_else(|| CapacityError::UnknownVariable(name.to_string()))
    }

    pub fn unit(&self, variable: &str) -> Result<&str, CapacityError> {
        self.variable(variable).map(|definition| definition.unit.as_str())
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn renderer_colors(&self) -> &[String; 3] {
        &self.renderer_colors
    }

    pub fn color_data_stops(&self) -> &[f64; 3] {
        &self.color_data_stops
    }

    pub fn no_data_policy(&self) -> NoDataPolicy {
        self.no_data_policy
    }

    /// Every field a layer must expose, in validation order.
    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Check a layer's schema, reporting only the first missing field.
    pub fn validate_layer<S: AsRef<str>>(
        &self,
        title: &str,
        layer_fields: &[S],
    ) -> Result<(), CapacityError> {
        let missing = self.required_fields.iter().find(|required| {
            !layer_fields
                .iter()
                .any(|field| field.as_ref() == required.as_str())
        });

        match missing {
            Some(field) => Err(CapacityError::MissingField {
                field: field.clone(),
                dataset: title.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn derive_required_fields(
    variables: &[String],
    source_fields: &SourceFields,
    variable_fields: &BTreeMap<String, VariableDefinition>,
) -> Vec<String> {
    let mut required: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !required.iter().any(|existing| existing == name) {
            required.push(name.to_string());
        }
    };

    for name in source_fields.field_names() {
        push(name);
    }
    for definition in variables.iter().filter_map(|v| variable_fields.get(v)) {
        for name in definition.field_names() {
            push(name);
        }
    }

    required
}
