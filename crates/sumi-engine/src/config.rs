//! Engine configuration.

use serde::Deserialize;
use sumi_buffer::{SplitOrientation, SplitSize};

/// How the `new` placement opens its split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SplitSettings {
    pub orientation: SplitOrientation,
    pub size: SplitSize,
}

/// Engine settings, loadable from TOML.
///
/// ```toml
/// send_code = true
///
/// [split]
/// orientation = "horizontal"
/// size = 0.3
///
/// [model_params]
/// temperature = 0.2
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether document code may be sent to the model. When false,
    /// code-bearing templates and the selection context are dropped
    /// from every prompt.
    #[serde(default = "default_send_code")]
    pub send_code: bool,

    /// Split behavior for the `new` placement.
    pub split: SplitSettings,

    /// Extra transport parameters merged into the adapter's request
    /// params (model knobs like temperature).
    pub model_params: serde_json::Value,
}

fn default_send_code() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Settings with defaults (`send_code = true`, vertical half split).
    pub fn new() -> Self {
        Self {
            send_code: true,
            split: SplitSettings::default(),
            model_params: serde_json::Value::Null,
        }
    }

    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Forbid sending document code to the model.
    pub fn without_code(mut self) -> Self {
        self.send_code = false;
        self
    }

    /// Set split behavior for the `new` placement.
    pub fn with_split(mut self, orientation: SplitOrientation, size: SplitSize) -> Self {
        self.split = SplitSettings { orientation, size };
        self
    }

    /// Overlay `model_params` onto the adapter's base request params.
    /// Top-level keys from `model_params` win.
    pub fn merged_params(&self, mut base: serde_json::Value) -> serde_json::Value {
        match (base.as_object_mut(), self.model_params.as_object()) {
            (Some(dst), Some(extra)) => {
                for (key, value) in extra {
                    dst.insert(key.clone(), value.clone());
                }
                base
            }
            (None, Some(_)) => self.model_params.clone(),
            _ => base,
        }
    }
}
