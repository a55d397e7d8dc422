//! Open key/value output settings.
//!
//! Settings are passed through to the demuxer and muxer untouched; the
//! engine itself only interprets the handful of keys listed in [`keys`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known setting names.
pub mod keys {
    pub const CODEC: &str = "codec";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const BITRATE: &str = "bitrate";
    pub const EXPECTED_SOURCE_FRAME_RATE: &str = "expected_source_frame_rate";
    pub const SAMPLE_RATE: &str = "sample_rate";
    pub const CHANNELS: &str = "channels";
    pub const PIXEL_FORMAT: &str = "pixel_format";
    pub const FORMAT: &str = "format";
}

/// A single setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Int(v) => Some(*v as f64),
            SettingValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            SettingValue::Int(v) => u32::try_from(*v).ok(),
            SettingValue::Float(v) if v.fract() == 0.0 && *v >= 0.0 && *v <= u32::MAX as f64 => {
                Some(*v as u32)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(v) => write!(f, "{v}"),
            SettingValue::Int(v) => write!(f, "{v}"),
            SettingValue::Float(v) => write!(f, "{v}"),
            SettingValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<u32> for SettingValue {
    fn from(v: u32) -> Self {
        SettingValue::Int(v as i64)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        SettingValue::Float(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::Text(v.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        SettingValue::Text(v)
    }
}

/// Mapping of setting name to value for one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputSettings(BTreeMap<String, SettingValue>);

impl OutputSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(SettingValue::as_u32)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(SettingValue::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SettingValue::as_str)
    }

    pub fn codec(&self) -> Option<&str> {
        self.get_str(keys::CODEC)
    }

    /// Requested output dimensions, when both are present and positive.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let width = self.get_u32(keys::WIDTH).filter(|w| *w > 0)?;
        let height = self.get_u32(keys::HEIGHT).filter(|h| *h > 0)?;
        Some((width, height))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
