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
//! Applies ambient occlusion to a light buffer.

use super::{draw_fullscreen, FilterOutput};
use crate::render_lane::shaders::{self, FULLSCREEN_VERT, OCCLUSION_FRAG};
use crate::render_lane::{check_live, LaneProgram, RenderLane};
use crate::UnitQuad;
use std::cell::Cell;
use std::rc::Rc;
use umbra_core::renderer::api::{BlendState, RenderState, TextureId, UniformValue};
use umbra_core::renderer::error::{ParameterError, RenderError, ResourceError, ShaderError};
use umbra_core::renderer::target::LightBuffer;
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;

/// Darkens the diffuse light of a light buffer by an occlusion texture.
#[derive(Debug)]
pub struct OcclusionApplicatorLane {
    program: LaneProgram,
    quad: Rc<UnitQuad>,
    deleted: Cell<bool>,
}

impl OcclusionApplicatorLane {
    /// Compiles the applicator program.
    pub fn new(device: &dyn GraphicsDevice, quad: Rc<UnitQuad>) -> Result<Self, ShaderError> {
        let program = LaneProgram::compile(
            device,
            &shaders::program("occlusion-applicator", FULLSCREEN_VERT, OCCLUSION_FRAG, &[]),
        )?;
        Ok(Self {
            program,
            quad,
            deleted: Cell::new(false),
        })
    }

    /// Multiplies the diffuse light of `light_buffer` by `occlusion`.
    ///
    /// An `intensity` of 0 leaves the buffer unchanged and 1 applies the
    /// occlusion fully.
    pub fn evaluate(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        occlusion: TextureId,
        intensity: f32,
        light_buffer: &LightBuffer,
    ) -> Result<(), RenderError> {
        check_live(self)?;
        ParameterError::check_range_f32("occlusion_intensity", intensity, 0.0, 1.0)?;

        FilterOutput::target(light_buffer).bind(device)?;
        let child = units.unit_context_new()?;
        let unit = child.bind_texture_2d(occlusion)?;
        self.program.activate(device)?;
        self.program.set_texture(device, "t_occlusion", unit)?;
        self.program
            .set(device, "occlusion_intensity", UniformValue::Float(intensity))?;
        let state = RenderState {
            blending: Some(BlendState::MULTIPLY),
            ..RenderState::default()
        };
        draw_fullscreen(device, &self.quad, &state)?;
        child.finish()?;
        Ok(())
    }
}

impl RenderLane for OcclusionApplicatorLane {
    fn strategy_name(&self) -> &'static str {
        "OcclusionApplicator"
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
