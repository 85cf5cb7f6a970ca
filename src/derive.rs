// Derivation of a 0-100 `normalized` value for continuous rows that lack one.

use crate::telemetry::{HUMIDITY, NORMALIZED, TEMPERATURE};
use crate::types::{NormalizedFallback, TelemetryRecord};

pub const CO2: &str = "co2";
pub const VOC: &str = "voc";

/// Worst sub-index on the 1-6 scale.
const WORST_INDEX: f64 = 6.0;

/// Indoor air quality on a 0-100 scale (100 is best).
/// Each pollutant maps to a 0-6 index; the worse of the two drives the score.
pub fn air_quality_index(co2_ppm: f64, voc: Option<f64>) -> f64 {
    let co2_index = (co2_ppm / 400.0).round().min(WORST_INDEX);
    let worst = match voc {
        Some(voc) => co2_index.max((voc / 50.0).round().min(WORST_INDEX)),
        None => co2_index,
    };
    (100.0 - 100.0 * (worst / WORST_INDEX)).clamp(0.0, 100.0)
}

/// Mean relative position of temperature and humidity inside their bands, scaled to 0-100.
/// Readings outside a band extrapolate past the scale; color lookup clamps, the value does not.
pub fn comfort_index(temperature: f64, humidity: f64, temp_band: [f64; 2], hum_band: [f64; 2]) -> f64 {
    let t = (temperature - temp_band[0]) / (temp_band[1] - temp_band[0]);
    let h = (humidity - hum_band[0]) / (hum_band[1] - hum_band[0]);
    (t + h) / 2.0 * 100.0
}

impl NormalizedFallback {
    /// The record's `normalized` value, derived when the row carries none.
    pub fn normalized(&self, record: &TelemetryRecord) -> Option<f64> {
        if let Some(v) = record.finite(NORMALIZED) {
            return Some(v);
        }
        let derived = match self {
            NormalizedFallback::None => return None,
            NormalizedFallback::AirQuality => {
                air_quality_index(record.finite(CO2)?, record.finite(VOC))
            }
            NormalizedFallback::Comfort {
                temperature,
                humidity,
            } => comfort_index(
                record.finite(TEMPERATURE)?,
                record.finite(HUMIDITY)?,
                *temperature,
                *humidity,
            ),
        };
        Some(derived).filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(values: &[(&str, f64)]) -> TelemetryRecord {
        TelemetryRecord {
            id: "s".to_string(),
            time: None,
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn clean_air_scores_high() {
        // 400ppm -> index 1 -> 100 - 100/6
        let iaq = air_quality_index(400.0, None);
        assert!((iaq - 83.333).abs() < 0.01);
        assert_eq!(air_quality_index(0.0, None), 100.0);
    }

    #[test]
    fn saturated_co2_scores_zero() {
        assert_eq!(air_quality_index(5000.0, None), 0.0);
    }

    #[test]
    fn voc_can_dominate() {
        let co2_only = air_quality_index(400.0, None);
        let with_voc = air_quality_index(400.0, Some(300.0));
        assert!(with_voc < co2_only);
        assert_eq!(with_voc, 0.0);
    }

    #[test]
    fn comfort_band_midpoint_is_fifty() {
        let v = comfort_index(25.0, 70.0, [20.0, 30.0], [60.0, 80.0]);
        assert!((v - 50.0).abs() < 1e-9);
    }

    #[test]
    fn existing_normalized_wins() {
        let r = record(&[(NORMALIZED, 12.0), (CO2, 4000.0)]);
        assert_eq!(NormalizedFallback::AirQuality.normalized(&r), Some(12.0));
    }

    #[test]
    fn strict_fallback_derives_nothing() {
        let r = record(&[(TEMPERATURE, 25.0), (HUMIDITY, 70.0)]);
        assert_eq!(NormalizedFallback::None.normalized(&r), None);
    }

    #[test]
    fn comfort_fallback_uses_readings() {
        let r = record(&[(TEMPERATURE, 25.0), (HUMIDITY, 70.0), (NORMALIZED, f64::NAN)]);
        let v = NormalizedFallback::comfort().normalized(&r).unwrap();
        assert!((v - 50.0).abs() < 1e-9);
    }

    #[test]
    fn air_quality_fallback_needs_co2() {
        let r = record(&[(VOC, 10.0)]);
        assert_eq!(NormalizedFallback::AirQuality.normalized(&r), None);
    }

    #[test]
    fn degenerate_band_is_rejected() {
        let r = record(&[(TEMPERATURE, 25.0), (HUMIDITY, 70.0)]);
        let fallback = NormalizedFallback::Comfort {
            temperature: [20.0, 20.0],
            humidity: [60.0, 80.0],
        };
        // 5/0 is infinite, so no value is produced.
        assert_eq!(fallback.normalized(&r), None);
    }
}
