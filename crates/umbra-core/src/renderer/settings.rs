// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Renderer configuration.

use crate::renderer::filter::{BlurParameters, FxaaSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Tunables for a rendering context.
///
/// Every field has a default, so a configuration file only needs to list the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Maximum nesting depth of texture unit contexts, including the root.
    pub texture_unit_context_depth: usize,
    /// Render target pools evict unused targets down to this many bytes.
    pub pool_soft_limit_bytes: u64,
    /// Render target pools refuse to grow beyond this many bytes.
    pub pool_hard_limit_bytes: u64,
    /// Default minimum attenuation for variance shadows.
    pub shadow_minimum_factor: f32,
    /// Default blur applied by filters that blur.
    pub blur: BlurParameters,
    /// Default anti-aliasing configuration.
    pub fxaa: FxaaSettings,
    /// Capacity of the asynchronous GPU worker's task queue.
    pub async_queue_capacity: usize,
    /// How long shutting down the asynchronous GPU worker may take.
    pub async_shutdown_timeout_ms: u64,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            texture_unit_context_depth: 8,
            pool_soft_limit_bytes: 64 * 1024 * 1024,
            pool_hard_limit_bytes: 256 * 1024 * 1024,
            shadow_minimum_factor: 0.2,
            blur: BlurParameters::default(),
            fxaa: FxaaSettings::default(),
            async_queue_capacity: 64,
            async_shutdown_timeout_ms: 5000,
        }
    }
}

impl RendererSettings {
    /// Parses settings written in RON.
    pub fn from_ron_str(text: &str) -> Result<Self, SettingsError> {
        ron::from_str(text).map_err(SettingsError::Ron)
    }

    /// Parses settings written in JSON.
    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        serde_json::from_str(text).map_err(SettingsError::Json)
    }

    /// Serializes the settings to pretty-printed RON.
    pub fn to_ron_string(&self) -> Result<String, SettingsError> {
        let pretty_config = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty_config).map_err(SettingsError::RonWrite)
    }

    /// The asynchronous worker shutdown timeout.
    pub fn async_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.async_shutdown_timeout_ms)
    }
}

/// An error raised while reading or writing settings.
#[derive(Debug)]
pub enum SettingsError {
    /// The RON text could not be parsed.
    Ron(ron::error::SpannedError),
    /// The settings could not be written as RON.
    RonWrite(ron::Error),
    /// The JSON text could not be parsed.
    Json(serde_json::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Ron(err) => write!(f, "Invalid RON settings: {err}"),
            SettingsError::RonWrite(err) => write!(f, "Failed to write RON settings: {err}"),
            SettingsError::Json(err) => write!(f, "Invalid JSON settings: {err}"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Ron(err) => Some(err),
            SettingsError::RonWrite(err) => Some(err),
            SettingsError::Json(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::filter::FxaaQuality;

    #[test]
    fn missing_fields_use_defaults() {
        let settings = RendererSettings::from_ron_str("(texture_unit_context_depth: 4)").unwrap();
        assert_eq!(settings.texture_unit_context_depth, 4);
        assert_eq!(settings.shadow_minimum_factor, 0.2);
        assert_eq!(settings.async_shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn json_settings_override_nested_values() {
        let settings = RendererSettings::from_json_str(
            r#"{ "fxaa": { "quality": "Preset39" }, "async_queue_capacity": 8 }"#,
        )
        .unwrap();
        assert_eq!(settings.fxaa.quality, FxaaQuality::Preset39);
        assert_eq!(settings.fxaa.subpixel_aliasing_removal, 0.75);
        assert_eq!(settings.async_queue_capacity, 8);
    }

    #[test]
    fn ron_output_reads_back() {
        let settings = RendererSettings {
            pool_hard_limit_bytes: 1024,
            ..Default::default()
        };
        let text = settings.to_ron_string().unwrap();
        assert_eq!(RendererSettings::from_ron_str(&text).unwrap(), settings);
    }

    #[test]
    fn invalid_text_is_reported() {
        let err = RendererSettings::from_json_str("{ not json").unwrap_err();
        assert!(err.to_string().starts_with("Invalid JSON settings"));
    }
}
