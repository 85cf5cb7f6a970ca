// Shared data model and configuration. Everything crossing the JS boundary derives serde.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A named zone of the floor plan, carrying the animated quality value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    /// Displayed quality, 0-100. Moves toward the target one step per tick.
    pub quality: f64,
    pub temperature: f64,
    pub humidity: f64,
}

impl Region {
    pub fn new(name: impl Into<String>, quality: f64) -> Self {
        Region {
            name: name.into(),
            quality,
            temperature: 0.0,
            humidity: 0.0,
        }
    }
}

/// Latest resolved readings for a region. Valid until the next ingestion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub normalized: f64,
    pub temperature: f64,
    pub humidity: f64,
}

/// How incoming rows are interpreted and how regions are colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryMode {
    /// Continuous readings, gradient coloring.
    #[default]
    Continuous,
    /// Line-status numbers, discrete palette coloring.
    Categorical,
}

impl TelemetryMode {
    pub fn from_gradient_flag(gradient_mode: bool) -> Self {
        if gradient_mode {
            TelemetryMode::Continuous
        } else {
            TelemetryMode::Categorical
        }
    }
}

/// One column of a query-result frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub values: Vec<serde_json::Value>,
}

/// A columnar query-result frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Series {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// First field whose name matches any of the given aliases, in alias order.
    pub fn field_any(&self, aliases: &[String]) -> Option<&Field> {
        aliases.iter().find_map(|alias| self.field(alias))
    }
}

/// Normalized per-source record produced by a telemetry strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub id: String,
    pub time: Option<f64>,
    /// Field name to value. Unparsable text is stored as NaN.
    pub values: HashMap<String, f64>,
}

impl TelemetryRecord {
    /// Value for `key`, or `None` when missing or not a finite number.
    pub fn finite(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().filter(|v| v.is_finite())
    }
}

/// Threshold step as authored in the host's field config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStep {
    pub color: String,
    /// The base step carries no value (it means negative infinity).
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ThresholdsConfig {
    #[serde(default)]
    pub steps: Vec<ThresholdStep>,
}

/// Persisted panel options, owned by the host's configuration subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelOptions {
    #[serde(default)]
    pub sensor_mappings: String,
    #[serde(default)]
    pub svg: String,
    #[serde(default = "default_true", alias = "colorMode")]
    pub gradient_mode: bool,
    #[serde(default)]
    pub thresholds: Option<ThresholdsConfig>,
}

impl Default for PanelOptions {
    fn default() -> Self {
        PanelOptions {
            sensor_mappings: String::new(),
            svg: String::new(),
            gradient_mode: true,
            thresholds: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Presentation of a region that has no current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectedStyle {
    #[serde(default = "default_disconnected_text")]
    pub text: String,
    #[serde(default = "default_disconnected_color")]
    pub text_color: String,
    #[serde(default = "default_disconnected_color")]
    pub name_color: String,
    /// Shape fill override. `None` leaves the shape as it is.
    #[serde(default)]
    pub fill: Option<String>,
    #[serde(default)]
    pub fill_opacity: Option<f64>,
}

impl Default for DisconnectedStyle {
    fn default() -> Self {
        DisconnectedStyle {
            text: default_disconnected_text(),
            text_color: default_disconnected_color(),
            name_color: default_disconnected_color(),
            fill: None,
            fill_opacity: None,
        }
    }
}

fn default_disconnected_text() -> String {
    "Disconnected".to_string()
}

fn default_disconnected_color() -> String {
    "black".to_string()
}

/// Column names for continuous (field/value pair) frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousColumns {
    #[serde(default = "default_time_column")]
    pub time: String,
    #[serde(default = "default_field_column")]
    pub field: String,
    #[serde(default = "default_value_column")]
    pub value: String,
    /// Label on the field column that carries the sensor id.
    #[serde(default = "default_sensor_label")]
    pub sensor_label: String,
}

impl Default for ContinuousColumns {
    fn default() -> Self {
        ContinuousColumns {
            time: default_time_column(),
            field: default_field_column(),
            value: default_value_column(),
            sensor_label: default_sensor_label(),
        }
    }
}

fn default_time_column() -> String {
    "_time".to_string()
}

fn default_field_column() -> String {
    "_field".to_string()
}

fn default_value_column() -> String {
    "_value".to_string()
}

fn default_sensor_label() -> String {
    "sensor_id".to_string()
}

/// Column aliases for categorical (three parallel columns) frames.
/// The first alias present in a frame wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumns {
    #[serde(default = "default_timestamp_aliases")]
    pub timestamp: Vec<String>,
    #[serde(default = "default_line_aliases")]
    pub line: Vec<String>,
    #[serde(default = "default_number_aliases")]
    pub number: Vec<String>,
}

impl Default for CategoricalColumns {
    fn default() -> Self {
        CategoricalColumns {
            timestamp: default_timestamp_aliases(),
            line: default_line_aliases(),
            number: default_number_aliases(),
        }
    }
}

fn default_timestamp_aliases() -> Vec<String> {
    vec!["timestamp".to_string(), "timestamp (last)".to_string()]
}

fn default_line_aliases() -> Vec<String> {
    vec!["line".to_string(), "line (last)".to_string()]
}

fn default_number_aliases() -> Vec<String> {
    vec!["number".to_string(), "number (last)".to_string()]
}

/// Where a continuous record's `normalized` value comes from when the row lacks one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedFallback {
    /// Rows without `normalized` are not stored.
    #[default]
    None,
    /// Indoor air quality index from `co2` (and `voc` when present).
    AirQuality,
    /// Mean position of temperature and humidity inside their comfort bands.
    Comfort {
        #[serde(default = "default_temperature_band")]
        temperature: [f64; 2],
        #[serde(default = "default_humidity_band")]
        humidity: [f64; 2],
    },
}

fn default_temperature_band() -> [f64; 2] {
    [20.0, 30.0]
}

fn default_humidity_band() -> [f64; 2] {
    [60.0, 80.0]
}

impl NormalizedFallback {
    pub fn comfort() -> Self {
        NormalizedFallback::Comfort {
            temperature: default_temperature_band(),
            humidity: default_humidity_band(),
        }
    }
}

/// Engine tuning passed from JS. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Minimum wall-clock gap between two ingestion cycles (milliseconds).
    #[serde(default = "default_ingestion_interval")]
    pub ingestion_interval_ms: f64,
    /// Convergence tick period (milliseconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: f64,
    #[serde(default = "default_quality")]
    pub default_quality: f64,
    /// Largest change of a region's quality per tick.
    #[serde(default = "default_max_step")]
    pub max_step: f64,
    #[serde(default = "default_line_height")]
    pub label_line_height_em: f64,
    #[serde(default = "default_region_prefix")]
    pub region_prefix: String,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_fallback_color")]
    pub fallback_color: String,
    #[serde(default)]
    pub disconnected: DisconnectedStyle,
    #[serde(default)]
    pub continuous_columns: ContinuousColumns,
    #[serde(default)]
    pub categorical_columns: CategoricalColumns,
    #[serde(default)]
    pub normalized_fallback: NormalizedFallback,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            ingestion_interval_ms: default_ingestion_interval(),
            tick_interval_ms: default_tick_interval(),
            default_quality: default_quality(),
            max_step: default_max_step(),
            label_line_height_em: default_line_height(),
            region_prefix: default_region_prefix(),
            name_prefix: default_name_prefix(),
            fallback_color: default_fallback_color(),
            disconnected: DisconnectedStyle::default(),
            continuous_columns: ContinuousColumns::default(),
            categorical_columns: CategoricalColumns::default(),
            normalized_fallback: NormalizedFallback::default(),
        }
    }
}

impl EngineSettings {
    /// Parse and validate settings. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let settings: EngineSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.ingestion_interval_ms > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "ingestion_interval_ms must be positive, got {}",
                self.ingestion_interval_ms
            )));
        }
        if !(self.tick_interval_ms > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "tick_interval_ms must be positive, got {}",
                self.tick_interval_ms
            )));
        }
        if !(self.max_step > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "max_step must be positive, got {}",
                self.max_step
            )));
        }
        if self.region_prefix.is_empty() {
            return Err(EngineError::InvalidConfig("region_prefix must not be empty".into()));
        }
        Ok(())
    }
}

fn default_ingestion_interval() -> f64 {
    3000.0 // 3s
}

fn default_tick_interval() -> f64 {
    50.0 // 50ms
}

fn default_quality() -> f64 {
    80.0
}

fn default_max_step() -> f64 {
    1.0
}

fn default_line_height() -> f64 {
    1.2
}

fn default_region_prefix() -> String {
    "room:".to_string()
}

fn default_name_prefix() -> String {
    "name:".to_string()
}

fn default_fallback_color() -> String {
    "#808080".to_string()
}
