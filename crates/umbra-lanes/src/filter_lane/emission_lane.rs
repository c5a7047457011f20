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
//! Emission and glow.

use super::{draw_fullscreen, BoxBlurLane, FilterOutput};
use crate::render_lane::shaders::{self, EMISSION_FRAG, FULLSCREEN_VERT, TEXTURE_INTENSITY_FRAG};
use crate::render_lane::{check_live, delete_programs, LaneProgram, LaneProgramBuilder, RenderLane};
use crate::UnitQuad;
use std::cell::Cell;
use std::rc::Rc;
use umbra_core::renderer::api::{BlendState, RenderState, TextureId, UniformValue};
use umbra_core::renderer::error::{ParameterError, RenderError, ResourceError, ShaderError};
use umbra_core::renderer::filter::BlurParameters;
use umbra_core::renderer::target::{
    GeometryBuffer, ImageBuffer, ImageBufferDescription, RenderTargetPool,
};
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;

/// Emission parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionParameters {
    /// Scales the emission term read from the geometry buffer.
    pub emission_intensity: f32,
    /// Scales the blurred glow added to the output.
    pub glow_intensity: f32,
    /// Blurs the emission into a glow. `None` adds the emission directly.
    pub blur: Option<BlurParameters>,
    /// The size of the glow buffer relative to the output.
    pub scale: f32,
}

impl Default for EmissionParameters {
    fn default() -> Self {
        Self {
            emission_intensity: 1.0,
            glow_intensity: 1.0,
            blur: None,
            scale: 0.25,
        }
    }
}

impl EmissionParameters {
    /// Checks every value.
    pub fn validate(&self) -> Result<(), ParameterError> {
        ParameterError::check_range_f32("emission_intensity", self.emission_intensity, 0.0, f32::MAX)?;
        ParameterError::check_range_f32("glow_intensity", self.glow_intensity, 0.0, f32::MAX)?;
        ParameterError::check_range_f32("scale", self.scale, f32::MIN_POSITIVE, 1.0)?;
        if let Some(blur) = &self.blur {
            blur.validate()?;
        }
        Ok(())
    }
}

/// Adds the emissive term of a geometry buffer to an output, optionally
/// spreading it into a glow first.
#[derive(Debug)]
pub struct EmissionLane {
    emission: LaneProgram,
    glow: LaneProgram,
    blur: BoxBlurLane,
    quad: Rc<UnitQuad>,
    deleted: Cell<bool>,
}

impl EmissionLane {
    /// Compiles the emission programs.
    pub fn new(device: &dyn GraphicsDevice, quad: Rc<UnitQuad>) -> Result<Self, ShaderError> {
        let mut builder = LaneProgramBuilder::new(device);
        let emission =
            builder.compile(&shaders::program("emission", FULLSCREEN_VERT, EMISSION_FRAG, &[]))?;
        let glow = builder.compile(&shaders::program(
            "emission-glow",
            FULLSCREEN_VERT,
            TEXTURE_INTENSITY_FRAG,
            &[],
        ))?;
        let blur = BoxBlurLane::new(device, Rc::clone(&quad))?;
        builder.finish();
        Ok(Self {
            emission,
            glow,
            blur,
            quad,
            deleted: Cell::new(false),
        })
    }

    /// Adds the emission of `gbuffer` to `output`.
    ///
    /// ## Arguments
    ///
    /// * `pool` - Supplies the glow buffer and the blur's scratch buffers
    ///   when `parameters.blur` is set. Every buffer is released before
    ///   returning.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        parameters: &EmissionParameters,
        pool: &RenderTargetPool<ImageBuffer>,
        gbuffer: &GeometryBuffer,
        output: FilterOutput,
    ) -> Result<(), RenderError> {
        check_live(self)?;
        parameters.validate()?;
        let additive = RenderState {
            blending: Some(BlendState::ADDITIVE),
            ..RenderState::default()
        };

        let Some(blur) = &parameters.blur else {
            output.bind(device)?;
            return self.draw_emission(
                device,
                units,
                gbuffer.albedo_emissive_texture(),
                parameters.emission_intensity,
                &additive,
            );
        };

        let description = ImageBufferDescription::new(output.area().scaled(f64::from(parameters.scale)));
        let glow = pool.acquire_scoped(device, &description)?;
        FilterOutput::target(&*glow).bind(device)?;
        glow.clear_bound_primary_framebuffer(device)?;
        self.draw_emission(
            device,
            units,
            gbuffer.albedo_emissive_texture(),
            parameters.emission_intensity,
            &RenderState::default(),
        )?;
        self.blur.evaluate(device, units, blur, pool, &*glow, &*glow, |d, area| {
            d.with_area(area)
        })?;

        output.bind(device)?;
        let child = units.unit_context_new()?;
        let image = child.bind_texture_2d(glow.image_texture())?;
        self.glow.activate(device)?;
        self.glow.set_texture(device, "t_image", image)?;
        self.glow
            .set(device, "intensity", UniformValue::Float(parameters.glow_intensity))?;
        draw_fullscreen(device, &self.quad, &additive)?;
        child.finish()?;
        Ok(())
    }

    fn draw_emission(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        albedo_emissive: TextureId,
        intensity: f32,
        state: &RenderState,
    ) -> Result<(), RenderError> {
        let child = units.unit_context_new()?;
        let unit = child.bind_texture_2d(albedo_emissive)?;
        self.emission.activate(device)?;
        self.emission.set_texture(device, "t_albedo_emissive", unit)?;
        self.emission
            .set(device, "emission_intensity", UniformValue::Float(intensity))?;
        draw_fullscreen(device, &self.quad, state)?;
        child.finish()?;
        Ok(())
    }
}

impl RenderLane for EmissionLane {
    fn strategy_name(&self) -> &'static str {
        "Emission"
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        let programs = delete_programs(device, "EmissionLane", [&self.emission, &self.glow]);
        let blur = self.blur.delete(device);
        programs.and(blur)
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
    use umbra_core::renderer::target::GeometryBufferDescription;
    use umbra_core::renderer::texture_unit::TextureUnitAllocator;
    use umbra_infra::HeadlessDevice;

    struct Fixture {
        device: Arc<HeadlessDevice>,
        allocator: TextureUnitAllocator,
        lane: EmissionLane,
        pool: RenderTargetPool<ImageBuffer>,
        gbuffer: GeometryBuffer,
    }

    fn fixture() -> Fixture {
        let device = Arc::new(HeadlessDevice::new());
        let allocator = TextureUnitAllocator::new(device.clone(), 4).unwrap();
        let quad = Rc::new(UnitQuad::new(device.as_ref()).unwrap());
        let lane = EmissionLane::new(device.as_ref(), quad).unwrap();
        let pool = RenderTargetPool::new(|d: &dyn GraphicsDevice, desc: &ImageBufferDescription| {
            ImageBuffer::create(d, desc)
        });
        let gbuffer =
            GeometryBuffer::create(device.as_ref(), &GeometryBufferDescription::new(Area::new(64, 64)))
                .unwrap();
        Fixture {
            device,
            allocator,
            lane,
            pool,
            gbuffer,
        }
    }

    #[test]
    fn without_blur_emission_is_added_directly() {
        let f = fixture();
        let output = FilterOutput::Default(Area::new(64, 64));
        f.lane
            .evaluate(
                f.device.as_ref(),
                &f.allocator.root_context(),
                &EmissionParameters::default(),
                &f.pool,
                &f.gbuffer,
                output,
            )
            .unwrap();

        let draws = f.device.draw_calls();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].framebuffer, None);
        assert_eq!(draws[0].state.blending, Some(BlendState::ADDITIVE));
        assert_eq!(f.pool.bytes_allocated(), 0);
    }

    #[test]
    fn blurred_emission_goes_through_a_scaled_glow_buffer() {
        let f = fixture();
        let output = FilterOutput::Default(Area::new(64, 64));
        let parameters = EmissionParameters {
            blur: Some(BlurParameters::default()),
            ..EmissionParameters::default()
        };
        f.lane
            .evaluate(
                f.device.as_ref(),
                &f.allocator.root_context(),
                &parameters,
                &f.pool,
                &f.gbuffer,
                output,
            )
            .unwrap();

        let draws = f.device.draw_calls();
        // Emission into the glow buffer, one blur pass pair, the additive glow.
        assert_eq!(draws.len(), 4);
        assert!(draws[0].framebuffer.is_some());
        assert_eq!(draws[3].framebuffer, None);
        assert_eq!(draws[3].state.blending, Some(BlendState::ADDITIVE));
        assert_eq!(f.pool.in_use_count(), 0);
        // The 16x16 glow buffer plus two 8x8 blur scratch buffers.
        assert_eq!(f.pool.free_count(), 3);
    }
}
