//! Style configuration for line and polygon overlays.
//!
//! A [`StyleSpec`] is plain data loaded with the layer descriptor. Map
//! backends never see it directly: the render adapter resolves it per
//! feature into a [`ResolvedStyle`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Attributes;

/// Color representation supporting multiple formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    /// "#RRGGBB", "#RRGGBBAA" or a CSS color name
    Text(String),

    /// RGB array: [r, g, b] or [r, g, b, a]
    Array(Vec<u8>),

    /// Explicit RGBA
    Rgba { r: u8, g: u8, b: u8, a: u8 },
}

impl Color {
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color::Rgba { r, g, b, a }
    }

    /// Convert to RGBA tuple.
    pub fn to_rgba(&self) -> (u8, u8, u8, u8) {
        match self {
            Color::Text(s) if s.starts_with('#') => parse_hex_color(s),
            Color::Text(s) => named_color(s),
            Color::Array(arr) => {
                let r = arr.first().copied().unwrap_or(0);
                let g = arr.get(1).copied().unwrap_or(0);
                let b = arr.get(2).copied().unwrap_or(0);
                let a = arr.get(3).copied().unwrap_or(255);
                (r, g, b, a)
            }
            Color::Rgba { r, g, b, a } => (*r, *g, *b, *a),
        }
    }
}

fn parse_hex_color(s: &str) -> (u8, u8, u8, u8) {
    let s = s.trim_start_matches('#');
    let channel = |i: usize, default: u8| {
        s.get(i..i + 2)
            .and_then(|c| u8::from_str_radix(c, 16).ok())
            .unwrap_or(default)
    };

    match s.len() {
        6 => (channel(0, 0), channel(2, 0), channel(4, 0), 255),
        8 => (channel(0, 0), channel(2, 0), channel(4, 0), channel(6, 255)),
        _ => (0, 0, 0, 255),
    }
}

fn named_color(name: &str) -> (u8, u8, u8, u8) {
    match name.to_lowercase().as_str() {
        "transparent" => (0, 0, 0, 0),
        "black" => (0, 0, 0, 255),
        "white" => (255, 255, 255, 255),
        "red" => (255, 0, 0, 255),
        "green" => (0, 128, 0, 255),
        "blue" => (0, 0, 255, 255),
        "yellow" => (255, 255, 0, 255),
        "cyan" => (0, 255, 255, 255),
        "magenta" => (255, 0, 255, 255),
        "orange" => (255, 165, 0, 255),
        "purple" => (128, 0, 128, 255),
        "brown" => (165, 42, 42, 255),
        "gray" | "grey" => (128, 128, 128, 255),
        _ => (0, 0, 0, 255),
    }
}

/// Style for a layer's line/polygon group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSpec {
    #[serde(default = "default_stroke")]
    pub stroke: Color,

    #[serde(default)]
    pub fill: Option<Color>,

    /// Stroke width in pixels
    #[serde(default = "default_weight")]
    pub weight: f32,

    #[serde(default = "default_opacity")]
    pub opacity: f32,

    #[serde(default = "default_fill_opacity")]
    pub fill_opacity: f32,

    /// Attribute-driven overrides, first match wins
    #[serde(default)]
    pub rules: Vec<StyleRule>,
}

fn default_stroke() -> Color {
    Color::Text("#3388ff".to_string())
}

fn default_weight() -> f32 {
    3.0
}

fn default_opacity() -> f32 {
    1.0
}

fn default_fill_opacity() -> f32 {
    0.2
}

impl Default for StyleSpec {
    fn default() -> Self {
        Self {
            stroke: default_stroke(),
            fill: None,
            weight: default_weight(),
            opacity: default_opacity(),
            fill_opacity: default_fill_opacity(),
            rules: Vec::new(),
        }
    }
}

/// Override applied when `attributes[attribute] == equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRule {
    pub attribute: String,
    pub equals: Value,
    #[serde(default)]
    pub stroke: Option<Color>,
    #[serde(default)]
    pub fill: Option<Color>,
    #[serde(default)]
    pub weight: Option<f32>,
}

impl StyleRule {
    fn matches(&self, attributes: &Attributes) -> bool {
        attributes
            .get(&self.attribute)
            .map(|v| values_match(v, &self.equals))
            .unwrap_or(false)
    }
}

/// Upstream records mix `"3"` and `3` for the same field.
fn values_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            match (s.trim().parse::<f64>(), n.as_f64()) {
                (Ok(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => actual == expected,
    }
}

/// Concrete style for one drawable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedStyle {
    pub stroke: (u8, u8, u8, u8),
    pub fill: Option<(u8, u8, u8, u8)>,
    pub weight: f32,
    pub opacity: f32,
    pub fill_opacity: f32,
}

impl StyleSpec {
    /// Resolve the style for a feature's attributes.
    pub fn resolve(&self, attributes: &Attributes) -> ResolvedStyle {
        let mut resolved = ResolvedStyle {
            stroke: self.stroke.to_rgba(),
            fill: self.fill.as_ref().map(Color::to_rgba),
            weight: self.weight,
            opacity: self.opacity,
            fill_opacity: self.fill_opacity,
        };

        if let Some(rule) = self.rules.iter().find(|r| r.matches(attributes)) {
            if let Some(stroke) = &rule.stroke {
                resolved.stroke = stroke.to_rgba();
            }
            if let Some(fill) = &rule.fill {
                resolved.fill = Some(fill.to_rgba());
            }
            if let Some(weight) = rule.weight {
                resolved.weight = weight;
            }
        }

        resolved
    }
}
