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

//! Math types used across the renderer.
//!
//! Linear algebra is provided by `glam`. This module adds the pixel [`Area`]
//! used to size textures, render targets and viewports.

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use serde::{Deserialize, Serialize};

/// A width by height area in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Area {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Area {
    /// Creates a new area.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The number of pixels covered by the area.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns `true` if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Scales both dimensions by `factor`, rounding to the nearest pixel.
    ///
    /// The result is never smaller than 1x1, so a scaled render target is
    /// always allocatable.
    pub fn scaled(&self, factor: f64) -> Area {
        let scale = |v: u32| ((f64::from(v) * factor).round().max(1.0)).min(f64::from(u32::MAX)) as u32;
        Area::new(scale(self.width), scale(self.height))
    }

    /// The reciprocal of each dimension, as used for texel offsets in shaders.
    pub fn inverse(&self) -> Vec2 {
        Vec2::new(
            1.0 / self.width.max(1) as f32,
            1.0 / self.height.max(1) as f32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_area_rounds_and_clamps() {
        let area = Area::new(640, 480);
        assert_eq!(area.scaled(0.5), Area::new(320, 240));
        assert_eq!(area.scaled(0.25), Area::new(160, 120));
        assert_eq!(Area::new(3, 3).scaled(0.5), Area::new(2, 2));
        assert_eq!(Area::new(1, 1).scaled(0.01), Area::new(1, 1));
    }

    #[test]
    fn pixel_count_does_not_overflow() {
        let area = Area::new(u32::MAX, 2);
        assert_eq!(area.pixel_count(), u64::from(u32::MAX) * 2);
    }
}
