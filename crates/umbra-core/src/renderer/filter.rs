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

//! Parameter types shared between filters, shadows and settings.

use crate::renderer::api::framebuffer::BlitFilter;
use crate::renderer::error::ParameterError;
use serde::{Deserialize, Serialize};

/// Parameters of a separable box blur.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurParameters {
    /// The blur radius in texels. Zero disables blurring and only rescales.
    pub blur_size: f32,
    /// The resolution of the intermediate buffers relative to the output.
    pub blur_scale: f32,
    /// The number of horizontal and vertical pass pairs. Zero copies.
    pub blur_passes: u32,
    /// The filter used when blitting into and out of the scaled buffers.
    pub blur_scale_filter: BlitFilter,
}

impl Default for BlurParameters {
    fn default() -> Self {
        Self {
            blur_size: 1.0,
            blur_scale: 0.5,
            blur_passes: 1,
            blur_scale_filter: BlitFilter::Linear,
        }
    }
}

impl BlurParameters {
    /// Checks that size and scale are usable.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.blur_size.is_nan() || self.blur_size < 0.0 {
            return Err(ParameterError::Invalid {
                name: "blur_size",
                reason: format!("{} is negative", self.blur_size),
            });
        }
        if self.blur_scale.is_nan() || self.blur_scale <= 0.0 {
            return Err(ParameterError::Invalid {
                name: "blur_scale",
                reason: format!("{} is not positive", self.blur_scale),
            });
        }
        Ok(())
    }
}

/// The FXAA quality preset, trading edge search length for speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FxaaQuality {
    /// Preset 10, the fastest.
    Preset10,
    /// Preset 15.
    Preset15,
    /// Preset 20.
    Preset20,
    /// Preset 25.
    #[default]
    Preset25,
    /// Preset 29.
    Preset29,
    /// Preset 39, the highest quality.
    Preset39,
}

impl FxaaQuality {
    /// Every preset, fastest first.
    pub const ALL: [FxaaQuality; 6] = [
        FxaaQuality::Preset10,
        FxaaQuality::Preset15,
        FxaaQuality::Preset20,
        FxaaQuality::Preset25,
        FxaaQuality::Preset29,
        FxaaQuality::Preset39,
    ];

    /// The FXAA preset number.
    pub fn preset(&self) -> u8 {
        match self {
            FxaaQuality::Preset10 => 10,
            FxaaQuality::Preset15 => 15,
            FxaaQuality::Preset20 => 20,
            FxaaQuality::Preset25 => 25,
            FxaaQuality::Preset29 => 29,
            FxaaQuality::Preset39 => 39,
        }
    }
}

/// FXAA tuning values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxaaSettings {
    /// The quality preset.
    pub quality: FxaaQuality,
    /// Amount of sub-pixel aliasing removal, in `[0, 1]`.
    pub subpixel_aliasing_removal: f32,
    /// Minimum local contrast required to process an edge, in `[0.063, 0.333]`.
    pub edge_threshold: f32,
    /// Contrast below which dark areas are skipped, in `[0.0312, 0.0833]`.
    pub edge_threshold_minimum: f32,
}

impl Default for FxaaSettings {
    fn default() -> Self {
        Self {
            quality: FxaaQuality::default(),
            subpixel_aliasing_removal: 0.75,
            edge_threshold: 0.166,
            edge_threshold_minimum: 0.0833,
        }
    }
}

impl FxaaSettings {
    /// Checks every value against its documented range.
    pub fn validate(&self) -> Result<(), ParameterError> {
        ParameterError::check_range_f32(
            "subpixel_aliasing_removal",
            self.subpixel_aliasing_removal,
            0.0,
            1.0,
        )?;
        ParameterError::check_range_f32("edge_threshold", self.edge_threshold, 0.063, 0.333)?;
        ParameterError::check_range_f32(
            "edge_threshold_minimum",
            self.edge_threshold_minimum,
            0.0312,
            0.0833,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_fxaa_numbers() {
        let presets: Vec<u8> = FxaaQuality::ALL.iter().map(FxaaQuality::preset).collect();
        assert_eq!(presets, vec![10, 15, 20, 25, 29, 39]);
    }

    #[test]
    fn default_fxaa_settings_are_valid() {
        assert!(FxaaSettings::default().validate().is_ok());
    }

    #[test]
    fn edge_threshold_minimum_is_range_checked() {
        let low = FxaaSettings {
            edge_threshold_minimum: 0.03,
            ..Default::default()
        };
        assert!(matches!(
            low.validate(),
            Err(ParameterError::OutOfRange {
                name: "edge_threshold_minimum",
                ..
            })
        ));

        let high = FxaaSettings {
            edge_threshold_minimum: 0.09,
            ..Default::default()
        };
        assert!(high.validate().is_err());

        for bound in [0.0312f32, 0.0833] {
            let edge = FxaaSettings {
                edge_threshold_minimum: bound,
                ..Default::default()
            };
            assert!(edge.validate().is_ok(), "{bound}");
        }
    }

    #[test]
    fn blur_defaults() {
        let blur = BlurParameters::default();
        assert_eq!(blur.blur_size, 1.0);
        assert_eq!(blur.blur_scale, 0.5);
        assert_eq!(blur.blur_passes, 1);
        assert!(blur.validate().is_ok());
        assert!(BlurParameters {
            blur_scale: 0.0,
            ..blur
        }
        .validate()
        .is_err());
    }
}
