//! Feature rows as returned by a feature-layer query (Esri JSON feature set).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One feature with its attribute table row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureRow {
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl FeatureRow {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field).filter(|value| !value.is_null())
    }

    /// Attribute as text; numbers are formatted, so numeric ids become keys.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    /// Attribute as a finite number; numeric strings are accepted.
    pub fn number(&self, field: &str) -> Option<f64> {
        let value = match self.get(field)? {
            Value::Number(number) => number.as_f64()?,
            Value::String(text) => text.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Attribute as a date: epoch milliseconds, RFC 3339, `YYYY-MM-DD` or `MM/DD/YYYY`.
    pub fn date(&self, field: &str) -> Option<DateTime<Utc>> {
        match self.get(field)? {
            Value::Number(number) => {
                let millis = number
                    .as_i64()
                    .or_else(|| number.as_f64().map(|value| value as i64))?;
                DateTime::from_timestamp_millis(millis)
            }
            Value::String(text) => parse_datetime(text.trim()),
            _ => None,
        }
    }
}

/// Field metadata of a layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
}

/// A queried layer: optional schema plus feature rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureSet {
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
    #[serde(default)]
    pub features: Vec<FeatureRow>,
}

impl FeatureSet {
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.name.clone()).collect()
    }
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> FeatureRow {
        serde_json::from_value(json!({ "attributes": value })).expect("row")
    }

    #[test]
    fn reads_numbers_and_numeric_strings() {
        let row = row(json!({ "cap": 12, "text_cap": " 7.5 ", "nan": "beds", "empty": null }));

        assert_eq!(row.number("cap"), Some(12.0));
        assert_eq!(row.number("text_cap"), Some(7.5));
        assert_eq!(row.number("nan"), None);
        assert_eq!(row.number("empty"), None);
        assert_eq!(row.number("missing"), None);
    }

    #[test]
    fn ids_become_text_keys() {
        let row = row(json!({ "id": 42, "name": " Mercy " }));

        assert_eq!(row.text("id").as_deref(), Some("42"));
        assert_eq!(row.text("name").as_deref(), Some("Mercy"));
    }

    #[test]
    fn dates_accept_epoch_millis_and_text() {
        let expected = Utc
            .with_ymd_and_hms(2020, 4, 7, 0, 0, 0)
            .single()
            .expect("valid date");
        let row = row(json!({
            "millis": 1586217600000_i64,
            "iso": "2020-04-07",
            "us": "04/07/2020",
            "rfc": "2020-04-07T00:00:00Z",
            "junk": "soon"
        }));

        assert_eq!(row.date("millis"), Some(expected));
        assert_eq!(row.date("iso"), Some(expected));
        assert_eq!(row.date("us"), Some(expected));
        assert_eq!(row.date("rfc"), Some(expected));
        assert_eq!(row.date("junk"), None);
    }
}
