// Sensor mapping: external sensor/line id -> region name.
// Authored as a JSON array of `[source, region]` pairs.

use std::collections::HashMap;

use log::{debug, warn};
use serde_json::Value;

use crate::error::EngineError;
use crate::telemetry::value_as_id;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorMapping {
    entries: HashMap<String, String>,
}

impl SensorMapping {
    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        SensorMapping {
            entries: pairs
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
        }
    }

    /// Strict parse. Later duplicates of a source id replace earlier ones.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Array(items) = value else {
            return Err(EngineError::InvalidMapping(
                "expected an array of [source, region] pairs".to_string(),
            ));
        };

        let mut entries = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let pair = item.as_array().filter(|p| p.len() >= 2).ok_or_else(|| {
                EngineError::InvalidMapping(format!("entry {} is not a [source, region] pair", i))
            })?;
            let (Some(source), Some(region)) = (key_text(&pair[0]), key_text(&pair[1])) else {
                return Err(EngineError::InvalidMapping(format!(
                    "entry {} has a non-text id",
                    i
                )));
            };
            entries.insert(source, region);
        }
        Ok(SensorMapping { entries })
    }

    /// Parse, treating absent or invalid JSON as an empty mapping.
    pub fn from_json_lenient(json: &str) -> Self {
        if json.trim().is_empty() {
            debug!("no sensor mapping configured");
            return SensorMapping::default();
        }
        match Self::from_json(json) {
            Ok(mapping) => mapping,
            Err(err) => {
                warn!("sensor mapping ignored: {}", err);
                SensorMapping::default()
            }
        }
    }

    /// Target region for a source id. `None` is normal: not every sensor is mapped.
    pub fn resolve(&self, source_id: &str) -> Option<&str> {
        self.entries.get(source_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mapping keys are formatted exactly like id cells in the data frames.
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(_) | Value::Number(_) => value_as_id(value),
        _ => None,
    }
}
