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
//! Combines surface and light into the final lit image.

use super::{draw_fullscreen, FilterOutput};
use crate::render_lane::shaders::{self, FULLSCREEN_VERT, LIGHT_APPLICATOR_FRAG};
use crate::render_lane::{check_live, delete_programs, LaneProgram, LaneProgramBuilder, RenderLane};
use crate::UnitQuad;
use std::cell::Cell;
use std::rc::Rc;
use umbra_core::renderer::api::{RenderState, UniformValue};
use umbra_core::renderer::error::{RenderError, ResourceError, ShaderError};
use umbra_core::renderer::target::{GeometryBuffer, LightBuffer, LightBufferComponents, RenderTarget};
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;

/// Writes `albedo * diffuse + specular + emission` into an output.
///
/// One program is compiled per light buffer layout, so that a diffuse-only
/// or specular-only light buffer never samples a missing texture.
#[derive(Debug)]
pub struct LightApplicatorLane {
    diffuse: LaneProgram,
    specular: LaneProgram,
    full: LaneProgram,
    quad: Rc<UnitQuad>,
    deleted: Cell<bool>,
}

impl LightApplicatorLane {
    /// Compiles the three applicator programs.
    pub fn new(device: &dyn GraphicsDevice, quad: Rc<UnitQuad>) -> Result<Self, ShaderError> {
        let mut builder = LaneProgramBuilder::new(device);
        let mut compile = |name: &str, defines: &[(&str, &str)]| {
            builder.compile(&shaders::program(name, FULLSCREEN_VERT, LIGHT_APPLICATOR_FRAG, defines))
        };
        let diffuse = compile("light-applicator-diffuse", &[("LIGHT_DIFFUSE", "1")])?;
        let specular = compile("light-applicator-specular", &[("LIGHT_SPECULAR", "1")])?;
        let full = compile(
            "light-applicator-full",
            &[("LIGHT_DIFFUSE", "1"), ("LIGHT_SPECULAR", "1")],
        )?;
        builder.finish();
        Ok(Self {
            diffuse,
            specular,
            full,
            quad,
            deleted: Cell::new(false),
        })
    }

    fn program(&self, components: LightBufferComponents) -> &LaneProgram {
        match components {
            LightBufferComponents::DiffuseOnly => &self.diffuse,
            LightBufferComponents::SpecularOnly => &self.specular,
            LightBufferComponents::Full => &self.full,
        }
    }

    /// Writes the lit surfaces of `gbuffer` into `output`, overwriting it.
    pub fn evaluate(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        gbuffer: &GeometryBuffer,
        light_buffer: &LightBuffer,
        output: FilterOutput,
    ) -> Result<(), RenderError> {
        check_live(self)?;
        let program = self.program(light_buffer.description().components);

        output.bind(device)?;
        let child = units.unit_context_new()?;
        let albedo = child.bind_texture_2d(gbuffer.albedo_emissive_texture())?;
        program.activate(device)?;
        program.set_texture(device, "t_albedo_emissive", albedo)?;
        if let Some(diffuse) = light_buffer.diffuse_texture() {
            let unit = child.bind_texture_2d(diffuse)?;
            program.set(device, "t_diffuse", UniformValue::Texture(unit))?;
        }
        if let Some(specular) = light_buffer.specular_texture() {
            let unit = child.bind_texture_2d(specular)?;
            program.set(device, "t_specular", UniformValue::Texture(unit))?;
        }
        draw_fullscreen(device, &self.quad, &RenderState::default())?;
        child.finish()?;
        Ok(())
    }
}

impl RenderLane for LightApplicatorLane {
    fn strategy_name(&self) -> &'static str {
        "LightApplicator"
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        delete_programs(
            device,
            "LightApplicatorLane",
            [&self.diffuse, &self.specular, &self.full],
        )
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}
