// Telemetry adapters: turn query-result frames into per-source records.
// Continuous frames carry field/value pairs per sensor; categorical frames carry three
// parallel columns (timestamp, line id, number).

use std::collections::HashMap;

use serde_json::Value;

use crate::types::*;

/// Key under which categorical values (and the continuous quality field) are stored.
pub const NORMALIZED: &str = "normalized";
pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";

/// Row interpretation, selected once per configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryStrategy {
    Continuous { columns: ContinuousColumns },
    Categorical { columns: CategoricalColumns },
}

impl TelemetryStrategy {
    pub fn for_mode(mode: TelemetryMode, settings: &EngineSettings) -> Self {
        match mode {
            TelemetryMode::Continuous => TelemetryStrategy::Continuous {
                columns: settings.continuous_columns.clone(),
            },
            TelemetryMode::Categorical => TelemetryStrategy::Categorical {
                columns: settings.categorical_columns.clone(),
            },
        }
    }

    pub fn mode(&self) -> TelemetryMode {
        match self {
            TelemetryStrategy::Continuous { .. } => TelemetryMode::Continuous,
            TelemetryStrategy::Categorical { .. } => TelemetryMode::Categorical,
        }
    }

    /// Adapt a batch of frames into records. Frames that do not fit the layout are skipped.
    pub fn adapt(&self, batch: &[Series]) -> Vec<TelemetryRecord> {
        match self {
            TelemetryStrategy::Continuous { columns } => batch
                .iter()
                .filter_map(|series| adapt_continuous(series, columns))
                .collect(),
            TelemetryStrategy::Categorical { columns } => batch
                .iter()
                .flat_map(|series| adapt_categorical(series, columns))
                .collect(),
        }
    }
}

fn adapt_continuous(series: &Series, columns: &ContinuousColumns) -> Option<TelemetryRecord> {
    let field_column = series.field(&columns.field)?;
    let id = field_column.labels.get(&columns.sensor_label)?.clone();

    let time = series
        .field(&columns.time)
        .and_then(|f| f.values.first())
        .map(parse_permissive)
        .filter(|t| t.is_finite());

    let empty = Vec::new();
    let field_values = series
        .field(&columns.value)
        .map(|f| &f.values)
        .unwrap_or(&empty);

    let mut values = HashMap::with_capacity(field_column.values.len());
    for (i, name) in field_column.values.iter().enumerate() {
        let Some(name) = value_as_id(name) else {
            continue;
        };
        let value = field_values.get(i).map(parse_permissive).unwrap_or(f64::NAN);
        values.insert(name, value);
    }

    Some(TelemetryRecord { id, time, values })
}

fn adapt_categorical(series: &Series, columns: &CategoricalColumns) -> Vec<TelemetryRecord> {
    let (Some(timestamps), Some(lines), Some(numbers)) = (
        series.field_any(&columns.timestamp),
        series.field_any(&columns.line),
        series.field_any(&columns.number),
    ) else {
        return Vec::new();
    };

    timestamps
        .values
        .iter()
        .zip(&lines.values)
        .zip(&numbers.values)
        .filter_map(|((ts, line), number)| {
            let id = value_as_id(line)?;
            let time = Some(parse_permissive(ts)).filter(|t| t.is_finite());
            let mut values = HashMap::with_capacity(1);
            values.insert(NORMALIZED.to_string(), parse_permissive(number));
            Some(TelemetryRecord { id, time, values })
        })
        .collect()
}

/// Parse a cell as a number without ever failing. Unusable cells become NaN.
/// Strings accept a leading numeric prefix, so `"21.5 C"` reads as 21.5.
pub fn parse_permissive(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_float_prefix(s),
        _ => f64::NAN,
    }
}

fn parse_float_prefix(text: &str) -> f64 {
    let text = text.trim_start();
    if let Ok(v) = text.trim_end().parse::<f64>() {
        if v.is_finite() {
            return v;
        }
        // Only the spelled-out `Infinity` counts; "inf" and "nan" are not numbers here.
        let unsigned = text.trim_end().trim_start_matches(&['+', '-'][..]);
        return if unsigned == "Infinity" { v } else { f64::NAN };
    }

    let bytes = text.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if !text[digits_start..end].bytes().any(|b| b.is_ascii_digit()) {
        return f64::NAN;
    }
    // Optional exponent, only taken when it has digits.
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    text[..end].parse::<f64>().unwrap_or(f64::NAN)
}

/// Identifier text for a cell. Whole numbers print without a fractional part,
/// so `7`, `7.0` and `"7"` all name the same source.
pub(crate) fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| f.to_string())
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
