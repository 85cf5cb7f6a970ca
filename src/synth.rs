// Visual state synthesis: region + snapshot -> fill and label lines.

use serde::{Deserialize, Serialize};

use crate::color::{resolve_or, ColorResolver, ColorStop, Rgb, Spectrum};
use crate::types::*;

/// Width of one palette bucket on the 0-100 scale.
pub const BUCKET_WIDTH: f64 = 25.0;

/// How a region's fill is derived. Selected once per configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorPolicy {
    /// Interpolate along a spectrum at the animated quality.
    Gradient(Spectrum),
    /// Bucket the raw target into resolved palette colors.
    Palette(Vec<String>),
}

impl ColorPolicy {
    pub fn gradient(stops: &[ColorStop], resolver: &dyn ColorResolver, fallback: &str) -> Self {
        let fallback = Rgb::parse_hex(fallback).unwrap_or(Rgb::new(128, 128, 128));
        ColorPolicy::Gradient(Spectrum::from_stops(stops, resolver, fallback))
    }

    pub fn palette(stops: &[ColorStop], resolver: &dyn ColorResolver, fallback: &str) -> Self {
        let mut colors: Vec<String> = stops
            .iter()
            .map(|stop| resolve_or(resolver, &stop.label, fallback))
            .collect();
        if colors.is_empty() {
            colors.push(fallback.to_string());
        }
        ColorPolicy::Palette(colors)
    }

    pub fn for_mode(
        mode: TelemetryMode,
        stops: &[ColorStop],
        resolver: &dyn ColorResolver,
        fallback: &str,
    ) -> Self {
        match mode {
            TelemetryMode::Continuous => Self::gradient(stops, resolver, fallback),
            TelemetryMode::Categorical => Self::palette(stops, resolver, fallback),
        }
    }
}

/// Palette index for `value`: `floor(value / 25)` clamped to the palette. NaN maps to 0.
pub fn palette_bucket(value: f64, palette_len: usize) -> usize {
    if palette_len == 0 || !(value > 0.0) {
        return 0;
    }
    let bucket = (value / BUCKET_WIDTH).floor();
    (bucket as usize).min(palette_len - 1)
}

/// A region's fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fill {
    Solid { color: String },
    /// Radial gradient with a transparent center fading to `color` at the edge.
    RadialGradient { id: String, color: String },
}

impl Fill {
    /// Value for the shape's `fill` attribute.
    pub fn attribute(&self) -> String {
        match self {
            Fill::Solid { color } => color.clone(),
            Fill::RadialGradient { id, .. } => format!("url(#{})", id),
        }
    }
}

/// One line of a region's value label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelLine {
    pub text: String,
    /// Offset below the previous line, in em. `None` for the first line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dy_em: Option<f64>,
}

/// Target appearance of a region for the current tick.
#[derive(Debug, Clone, PartialEq)]
pub enum VisualState {
    Connected { fill: Fill, lines: Vec<LabelLine> },
    Disconnected,
}

/// Builds visual states for one panel instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesizer {
    pub policy: ColorPolicy,
    pub mode: TelemetryMode,
    pub instance_id: u64,
    pub line_height_em: f64,
}

impl Synthesizer {
    pub fn new(policy: ColorPolicy, mode: TelemetryMode, instance_id: u64, line_height_em: f64) -> Self {
        Synthesizer {
            policy,
            mode,
            instance_id,
            line_height_em,
        }
    }

    /// Id of the per-region radial gradient definition.
    pub fn gradient_id(&self, region: &str) -> String {
        format!("rg-{}-{}", self.instance_id, region)
    }

    pub fn visual(&self, region: &Region, snapshot: Option<&MetricSnapshot>) -> VisualState {
        let Some(snapshot) = snapshot else {
            return VisualState::Disconnected;
        };
        let fill = match &self.policy {
            ColorPolicy::Gradient(spectrum) => Fill::RadialGradient {
                id: self.gradient_id(&region.name),
                color: spectrum.color_at(region.quality).css(),
            },
            ColorPolicy::Palette(colors) => Fill::Solid {
                color: colors[palette_bucket(snapshot.normalized, colors.len())].clone(),
            },
        };
        VisualState::Connected {
            fill,
            lines: self.label_lines(snapshot),
        }
    }

    /// Temperature and humidity lines. Categorical snapshots carry no readings.
    pub fn label_lines(&self, snapshot: &MetricSnapshot) -> Vec<LabelLine> {
        match self.mode {
            TelemetryMode::Continuous => vec![
                LabelLine {
                    text: format!("{:.2}°C", snapshot.temperature),
                    dy_em: None,
                },
                LabelLine {
                    text: format!("{:.2}%", snapshot.humidity),
                    dy_em: Some(self.line_height_em),
                },
            ],
            TelemetryMode::Categorical => Vec::new(),
        }
    }
}
