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
//! Draws textures into rectangles of an output.

use super::{draw_fullscreen, FilterOutput};
use crate::render_lane::shaders::{self, COMPOSITE_VERT, TEXTURE_INTENSITY_FRAG};
use crate::render_lane::{check_live, LaneProgram, RenderLane};
use crate::UnitQuad;
use std::cell::Cell;
use std::rc::Rc;
use umbra_core::math::Vec4;
use umbra_core::renderer::api::{BlendState, RenderState, TextureId, UniformValue};
use umbra_core::renderer::error::{RenderError, ResourceError, ShaderError};
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;

/// One texture placed on the output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorItem {
    /// The texture drawn.
    pub texture: TextureId,
    /// Where it lands, as `(x, y, width, height)` in `[0, 1]` output
    /// coordinates with the origin at the bottom left.
    pub rectangle: Vec4,
    /// Multiplies the texture's color.
    pub intensity: f32,
    /// Blending with what the output already holds. `None` overwrites.
    pub blending: Option<BlendState>,
}

impl CompositorItem {
    /// `texture` covering the whole output at full intensity.
    pub fn fullscreen(texture: TextureId) -> Self {
        Self {
            texture,
            rectangle: Vec4::new(0.0, 0.0, 1.0, 1.0),
            intensity: 1.0,
            blending: None,
        }
    }
}

/// Composites textures onto an output in order.
#[derive(Debug)]
pub struct CompositorLane {
    program: LaneProgram,
    quad: Rc<UnitQuad>,
    deleted: Cell<bool>,
}

impl CompositorLane {
    /// Compiles the compositor program.
    pub fn new(device: &dyn GraphicsDevice, quad: Rc<UnitQuad>) -> Result<Self, ShaderError> {
        let program = LaneProgram::compile(
            device,
            &shaders::program("compositor", COMPOSITE_VERT, TEXTURE_INTENSITY_FRAG, &[]),
        )?;
        Ok(Self {
            program,
            quad,
            deleted: Cell::new(false),
        })
    }

    /// Draws every item into `output`, in order.
    pub fn evaluate(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        items: &[CompositorItem],
        output: FilterOutput,
    ) -> Result<(), RenderError> {
        check_live(self)?;
        output.bind(device)?;
        for item in items {
            let child = units.unit_context_new()?;
            let unit = child.bind_texture_2d(item.texture)?;
            self.program.activate(device)?;
            self.program.set_texture(device, "t_image", unit)?;
            self.program
                .set(device, "composite_rectangle", UniformValue::Vec4(item.rectangle))?;
            self.program
                .set(device, "intensity", UniformValue::Float(item.intensity))?;
            let state = RenderState {
                blending: item.blending,
                ..RenderState::default()
            };
            draw_fullscreen(device, &self.quad, &state)?;
            child.finish()?;
        }
        Ok(())
    }
}

impl RenderLane for CompositorLane {
    fn strategy_name(&self) -> &'static str {
        "Compositor"
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        self.program.delete(device)
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use umbra_core::math::Area;
    use umbra_core::renderer::api::{Texture2DDescriptor, TextureFormat};
    use umbra_core::renderer::texture_unit::TextureUnitAllocator;
    use umbra_infra::HeadlessDevice;

    #[test]
    fn items_are_drawn_in_order_with_their_own_state() {
        let device = Arc::new(HeadlessDevice::new());
        let allocator = TextureUnitAllocator::new(device.clone(), 4).unwrap();
        let lane =
            CompositorLane::new(device.as_ref(), Rc::new(UnitQuad::new(device.as_ref()).unwrap()))
                .unwrap();
        let texture = device
            .create_texture_2d(&Texture2DDescriptor::new("t", Area::new(4, 4), TextureFormat::Rgba8))
            .unwrap();
        let inset = CompositorItem {
            rectangle: Vec4::new(0.75, 0.75, 0.25, 0.25),
            blending: Some(BlendState::ALPHA),
            ..CompositorItem::fullscreen(texture)
        };

        lane.evaluate(
            device.as_ref(),
            &allocator.root_context(),
            &[CompositorItem::fullscreen(texture), inset],
            FilterOutput::Default(Area::new(100, 100)),
        )
        .unwrap();

        let draws = device.draw_calls();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].state.blending, None);
        assert_eq!(draws[1].state.blending, Some(BlendState::ALPHA));
        assert_eq!(
            device.uniform(lane.program.id(), "composite_rectangle"),
            Some(UniformValue::Vec4(inset.rectangle))
        );
    }
}
