// Color model: stops from the active scheme, name resolution, spectrum interpolation, legend.

use std::collections::HashMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::ThresholdsConfig;

/// RGB color, formatted as lowercase `rrggbb` (no leading `#`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Parse `#rgb`, `#rrggbb`, or either without the `#`.
    pub fn parse_hex(text: &str) -> Result<Self, EngineError> {
        let invalid = |message: &str| EngineError::InvalidColor {
            name: text.to_string(),
            message: message.to_string(),
        };
        let hex = text.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.is_ascii() {
            return Err(invalid("not a hex color"));
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid("not a hex color"));
        match hex.len() {
            3 => {
                let r = channel(&hex[0..1])?;
                let g = channel(&hex[1..2])?;
                let b = channel(&hex[2..3])?;
                Ok(Rgb::new(r * 17, g * 17, b * 17))
            }
            6 => Ok(Rgb::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            _ => Err(invalid("expected 3 or 6 hex digits")),
        }
    }

    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }

    /// CSS form with the leading `#`.
    pub fn css(&self) -> String {
        format!("#{}", self)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A palette color name at a position of the scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub label: String,
    pub position: f64,
}

impl ColorStop {
    pub fn new(label: impl Into<String>, position: f64) -> Self {
        ColorStop {
            label: label.into(),
            position,
        }
    }
}

/// The active color scheme, as supplied by the host theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColorScheme {
    /// Ordered palette color names (continuous schemes).
    Continuous { colors: Vec<String> },
    /// Threshold steps: color name plus numeric cutoff.
    Thresholds(ThresholdsConfig),
}

impl Default for ColorScheme {
    fn default() -> Self {
        ColorScheme::Continuous { colors: Vec::new() }
    }
}

impl ColorScheme {
    /// Ordered stops for this scheme. Never empty: falls back to a single transparent stop.
    pub fn stops(&self) -> Vec<ColorStop> {
        let mut stops: Vec<ColorStop> = match self {
            ColorScheme::Continuous { colors } => {
                let len = colors.len() as f64;
                colors
                    .iter()
                    .enumerate()
                    .map(|(i, name)| ColorStop::new(name.clone(), i as f64 / len))
                    .collect()
            }
            ColorScheme::Thresholds(config) => config
                .steps
                .iter()
                .map(|step| ColorStop::new(step.color.clone(), step.value.unwrap_or(0.0).max(0.0)))
                .collect(),
        };
        stops.sort_by(|a, b| a.position.total_cmp(&b.position));
        if stops.is_empty() {
            stops.push(ColorStop::new("transparent", 0.0));
        }
        stops
    }
}

/// Resolves a palette color name to a displayable CSS color.
pub trait ColorResolver {
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Theme palette backed by a name -> CSS color map. Hex names pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemePalette {
    #[serde(default)]
    pub colors: HashMap<String, String>,
}

impl ThemePalette {
    pub fn new<I, A, B>(colors: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        ThemePalette {
            colors: colors
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
        }
    }
}

impl ColorResolver for ThemePalette {
    fn resolve(&self, name: &str) -> Option<String> {
        if let Some(value) = self.colors.get(name) {
            return Some(value.clone());
        }
        if name.starts_with('#') {
            return Some(name.to_string());
        }
        None
    }
}

/// Resolve `name` to a CSS color, or return `fallback`.
pub fn resolve_or(resolver: &dyn ColorResolver, name: &str, fallback: &str) -> String {
    resolver.resolve(name).unwrap_or_else(|| {
        warn!("color {:?} not resolvable, using {}", name, fallback);
        fallback.to_string()
    })
}

/// Resolve `name` to RGB. Unresolvable or non-hex colors become `fallback`.
pub fn resolve_rgb(resolver: &dyn ColorResolver, name: &str, fallback: Rgb) -> Rgb {
    match resolver.resolve(name).map(|css| Rgb::parse_hex(&css)) {
        Some(Ok(rgb)) => rgb,
        Some(Err(err)) => {
            warn!("{}; using #{}", err, fallback);
            fallback
        }
        None => {
            warn!("color {:?} not resolvable, using #{}", name, fallback);
            fallback
        }
    }
}

/// Continuous color scale over quality 0-100.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// (position in 0..=1, color), sorted by position.
    stops: Vec<(f64, Rgb)>,
}

impl Spectrum {
    /// Build from ordered stops. Positions are used when already scaled (strictly increasing
    /// from 0 to 1); otherwise the colors are spread evenly over 0..1.
    pub fn from_stops(stops: &[ColorStop], resolver: &dyn ColorResolver, fallback: Rgb) -> Self {
        if stops.is_empty() {
            return Spectrum {
                stops: vec![(0.0, fallback)],
            };
        }
        let scaled = is_scaled(stops);
        let last = (stops.len() - 1).max(1) as f64;
        let stops = stops
            .iter()
            .enumerate()
            .map(|(i, stop)| {
                let position = if scaled { stop.position } else { i as f64 / last };
                (position, resolve_rgb(resolver, &stop.label, fallback))
            })
            .collect();
        Spectrum { stops }
    }

    /// Color at `quality` (0-100, clamped). NaN reads as 0.
    pub fn color_at(&self, quality: f64) -> Rgb {
        let t = if quality.is_nan() {
            0.0
        } else {
            (quality / 100.0).clamp(0.0, 1.0)
        };
        let first = self.stops[0];
        if self.stops.len() == 1 || t <= first.0 {
            return first.1;
        }
        for pair in self.stops.windows(2) {
            let (p0, c0) = pair[0];
            let (p1, c1) = pair[1];
            if t <= p1 {
                let span = p1 - p0;
                let local = if span > 0.0 { (t - p0) / span } else { 1.0 };
                return c0.lerp(c1, local);
            }
        }
        self.stops[self.stops.len() - 1].1
    }
}

fn is_scaled(stops: &[ColorStop]) -> bool {
    stops.len() >= 2
        && stops[0].position == 0.0
        && stops[stops.len() - 1].position == 1.0
        && stops.windows(2).all(|w| w[0].position < w[1].position)
}

/// One legend swatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swatch {
    pub color: String,
    /// Offset along the legend bar, percent.
    pub offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Gradient legend shown under the floor plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub swatches: Vec<Swatch>,
}

impl Legend {
    /// Legend for `stops`. Needs at least two stops. Fewer than five gives the
    /// Low/Good/High legend; five or more gives five swatches weighted toward the end.
    pub fn from_stops(stops: &[ColorStop], resolver: &dyn ColorResolver, fallback: &str) -> Option<Self> {
        let len = stops.len();
        if len < 2 {
            return None;
        }
        let color = |i: usize| resolve_or(resolver, &stops[i].label, fallback);
        let swatches = if len < 5 {
            vec![
                Swatch {
                    color: color(0),
                    offset: 0.0,
                    label: Some("Low".to_string()),
                },
                Swatch {
                    color: color(len - 2),
                    offset: 50.0,
                    label: Some("Good".to_string()),
                },
                Swatch {
                    color: color(len - 1),
                    offset: 100.0,
                    label: Some("High".to_string()),
                },
            ]
        } else {
            [0, len / 2, len - 3, len - 2, len - 1]
                .iter()
                .zip([0.0, 25.0, 50.0, 75.0, 100.0])
                .map(|(&i, offset)| Swatch {
                    color: color(i),
                    offset,
                    label: None,
                })
                .collect()
        };
        Some(Legend { swatches })
    }
}
