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
//! Full-screen filters.
//!
//! Filters read one or more textures and write into a [`FilterOutput`],
//! either a framebuffer or the default framebuffer. Filters that need
//! intermediate buffers take them from a caller-supplied pool and return them
//! before the call ends.

mod box_blur_lane;
mod compositor_lane;
mod emission_lane;
mod fog_lane;
mod fxaa_lane;
mod light_applicator_lane;
mod occlusion_applicator_lane;

pub use box_blur_lane::*;
pub use compositor_lane::*;
pub use emission_lane::*;
pub use fog_lane::*;
pub use fxaa_lane::*;
pub use light_applicator_lane::*;
pub use occlusion_applicator_lane::*;

use crate::UnitQuad;
use umbra_core::math::Area;
use umbra_core::renderer::api::{FramebufferId, RenderState};
use umbra_core::renderer::error::{RenderError, ResourceError};
use umbra_core::renderer::target::RenderTarget;
use umbra_core::renderer::traits::GraphicsDevice;

/// Where a filter writes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutput {
    /// A framebuffer of the given size.
    Framebuffer {
        /// The framebuffer.
        framebuffer: FramebufferId,
        /// Its size.
        area: Area,
    },
    /// The default framebuffer of the given size.
    Default(Area),
}

impl FilterOutput {
    /// The primary framebuffer of `target`.
    pub fn target<T: RenderTarget>(target: &T) -> Self {
        FilterOutput::Framebuffer {
            framebuffer: target.primary_framebuffer(),
            area: target.area(),
        }
    }

    /// The output size.
    pub fn area(&self) -> Area {
        match self {
            FilterOutput::Framebuffer { area, .. } | FilterOutput::Default(area) => *area,
        }
    }

    /// The output framebuffer, `None` for the default framebuffer.
    pub fn framebuffer(&self) -> Option<FramebufferId> {
        match self {
            FilterOutput::Framebuffer { framebuffer, .. } => Some(*framebuffer),
            FilterOutput::Default(_) => None,
        }
    }

    /// Binds the output for drawing and covers it with the viewport.
    pub fn bind(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        match self {
            FilterOutput::Framebuffer { framebuffer, .. } => device.bind_draw_framebuffer(*framebuffer)?,
            FilterOutput::Default(_) => device.unbind_draw_framebuffer(),
        }
        device.set_viewport(self.area());
        Ok(())
    }
}

/// Draws `quad` under `state` with the current program, then clears the
/// program. The caller has activated the program and uploaded its uniforms.
pub(crate) fn draw_fullscreen(
    device: &dyn GraphicsDevice,
    quad: &UnitQuad,
    state: &RenderState,
) -> Result<(), RenderError> {
    device.activate_render_state(state);
    quad.draw(device)?;
    device.deactivate_program();
    device.unbind_array_object();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_report_their_area() {
        let area = Area::new(320, 200);
        let output = FilterOutput::Framebuffer {
            framebuffer: FramebufferId(3),
            area,
        };
        assert_eq!(output.area(), area);
        assert_eq!(output.framebuffer(), Some(FramebufferId(3)));
        assert_eq!(FilterOutput::Default(area).framebuffer(), None);
    }
}
