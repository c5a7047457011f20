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
//! A separable box blur over pooled scratch targets.

use super::{draw_fullscreen, FilterOutput};
use crate::render_lane::shaders::{self, BOX_BLUR_HORIZONTAL_FRAG, BOX_BLUR_VERTICAL_FRAG, FULLSCREEN_VERT};
use crate::render_lane::{check_live, delete_programs, LaneProgram, LaneProgramBuilder, RenderLane};
use crate::UnitQuad;
use std::cell::Cell;
use std::rc::Rc;
use umbra_core::math::Area;
use umbra_core::renderer::api::{BlitFilter, FramebufferId, RenderState, TextureId, UniformValue};
use umbra_core::renderer::error::{RenderError, ResourceError, ShaderError};
use umbra_core::renderer::filter::BlurParameters;
use umbra_core::renderer::target::{
    scale, DepthVarianceBuffer, ImageBuffer, RenderTarget, RenderTargetPool,
};
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;

/// A render target whose primary color texture can be blurred.
pub trait BlurTarget: RenderTarget {
    /// The texture sampled by the blur passes.
    fn blur_texture(&self) -> TextureId;
}

impl BlurTarget for ImageBuffer {
    fn blur_texture(&self) -> TextureId {
        self.image_texture()
    }
}

impl BlurTarget for DepthVarianceBuffer {
    fn blur_texture(&self) -> TextureId {
        self.depth_variance_texture()
    }
}

/// Copies the color contents of `source` into `destination`.
pub(crate) fn blit(
    device: &dyn GraphicsDevice,
    source: (FramebufferId, Area),
    destination: FilterOutput,
    filter: BlitFilter,
) -> Result<(), ResourceError> {
    device.bind_read_framebuffer(source.0)?;
    destination.bind(device)?;
    let result = device.blit_framebuffer(source.1, destination.area(), filter);
    device.unbind_read_framebuffer();
    result
}

fn of<T: RenderTarget>(target: &T) -> (FramebufferId, Area) {
    (target.primary_framebuffer(), target.area())
}

/// Blurs a target by alternating horizontal and vertical box filters.
///
/// The source is first scaled into a scratch target of `blur_scale` times
/// its size, blurred there, and scaled back into the output, so that a
/// smaller scale widens the blur for the same cost.
#[derive(Debug)]
pub struct BoxBlurLane {
    horizontal: LaneProgram,
    vertical: LaneProgram,
    quad: Rc<UnitQuad>,
    deleted: Cell<bool>,
}

impl BoxBlurLane {
    /// Compiles the blur programs.
    pub fn new(device: &dyn GraphicsDevice, quad: Rc<UnitQuad>) -> Result<Self, ShaderError> {
        let mut builder = LaneProgramBuilder::new(device);
        let horizontal = builder.compile(&shaders::program(
            "box-blur-horizontal",
            FULLSCREEN_VERT,
            BOX_BLUR_HORIZONTAL_FRAG,
            &[],
        ))?;
        let vertical = builder.compile(&shaders::program(
            "box-blur-vertical",
            FULLSCREEN_VERT,
            BOX_BLUR_VERTICAL_FRAG,
            &[],
        ))?;
        builder.finish();
        Ok(Self {
            horizontal,
            vertical,
            quad,
            deleted: Cell::new(false),
        })
    }

    /// Blurs `source` into `output`.
    ///
    /// ## Arguments
    ///
    /// * `units` - The caller's texture unit context; the lane works in a
    ///   child of it.
    /// * `parameters` - Blur size, scale, pass count and scale filter.
    /// * `pool` - Supplies the two scratch targets, which are released
    ///   before returning on every path.
    /// * `source` - The blurred target. It may be `output` itself.
    /// * `output` - Receives the result at its own size.
    /// * `scaler` - Resizes a description of `source` for the scratch targets.
    ///
    /// ## Behavior
    ///
    /// With zero passes the source is copied. With a zero blur size the
    /// source is only scaled down and back up.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate<T, F>(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        parameters: &BlurParameters,
        pool: &RenderTargetPool<T>,
        source: &T,
        output: &T,
        scaler: F,
    ) -> Result<(), RenderError>
    where
        T: BlurTarget,
        F: Fn(&T::Description, Area) -> T::Description,
    {
        check_live(self)?;
        parameters.validate()?;
        let filter = parameters.blur_scale_filter;

        if parameters.blur_passes == 0 {
            if source.primary_framebuffer() != output.primary_framebuffer() {
                blit(device, of(source), FilterOutput::target(output), filter)?;
            }
            return Ok(());
        }

        let scratch = scale(source.description(), &scaler, f64::from(parameters.blur_scale));
        let front = pool.acquire_scoped(device, &scratch)?;
        blit(device, of(source), FilterOutput::target(&*front), filter)?;

        if parameters.blur_size > 0.0 {
            let back = pool.acquire_scoped(device, &scratch)?;
            for _ in 0..parameters.blur_passes {
                self.pass(device, units, &self.horizontal, parameters.blur_size, &*front, &*back)?;
                self.pass(device, units, &self.vertical, parameters.blur_size, &*back, &*front)?;
            }
        }

        blit(device, of(&*front), FilterOutput::target(output), filter)?;
        Ok(())
    }

    fn pass<T: BlurTarget>(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        program: &LaneProgram,
        blur_size: f32,
        from: &T,
        to: &T,
    ) -> Result<(), RenderError> {
        FilterOutput::target(to).bind(device)?;
        let child = units.unit_context_new()?;
        let image = child.bind_texture_2d(from.blur_texture())?;
        program.activate(device)?;
        program.set_texture(device, "t_image", image)?;
        program.set(device, "blur_size", UniformValue::Float(blur_size))?;
        program.set(device, "texel_size", UniformValue::Vec2(from.area().inverse()))?;
        draw_fullscreen(device, &self.quad, &RenderState::default())?;
        child.finish()?;
        Ok(())
    }
}

impl RenderLane for BoxBlurLane {
    fn strategy_name(&self) -> &'static str {
        "BoxBlur"
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        delete_programs(device, "BoxBlurLane", [&self.horizontal, &self.vertical])
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use umbra_core::renderer::target::ImageBufferDescription;
    use umbra_core::renderer::texture_unit::TextureUnitAllocator;
    use umbra_infra::graphics::headless::DeviceCommand;
    use umbra_infra::HeadlessDevice;

    fn image_pool() -> RenderTargetPool<ImageBuffer> {
        RenderTargetPool::new(|device: &dyn GraphicsDevice, description: &ImageBufferDescription| {
            ImageBuffer::create(device, description)
        })
    }

    struct Fixture {
        device: Arc<HeadlessDevice>,
        allocator: TextureUnitAllocator,
        blur: BoxBlurLane,
        pool: RenderTargetPool<ImageBuffer>,
    }

    fn fixture() -> Fixture {
        let device = Arc::new(HeadlessDevice::new());
        let allocator = TextureUnitAllocator::new(device.clone(), 4).unwrap();
        let quad = Rc::new(UnitQuad::new(device.as_ref()).unwrap());
        let blur = BoxBlurLane::new(device.as_ref(), quad).unwrap();
        Fixture {
            device,
            allocator,
            blur,
            pool: image_pool(),
        }
    }

    #[test]
    fn blurring_alternates_between_two_scratch_targets() {
        let f = fixture();
        let device = f.device.as_ref();
        let description = ImageBufferDescription::new(Area::new(64, 32));
        let source = ImageBuffer::create(device, &description).unwrap();
        let output = ImageBuffer::create(device, &description).unwrap();
        let parameters = BlurParameters {
            blur_passes: 2,
            ..BlurParameters::default()
        };
        device.take_commands();

        f.blur
            .evaluate(
                device,
                &f.allocator.root_context(),
                &parameters,
                &f.pool,
                &source,
                &output,
                |d: &ImageBufferDescription, area| d.with_area(area),
            )
            .unwrap();

        assert_eq!(device.draw_call_count(), 4);
        assert_eq!(f.pool.in_use_count(), 0);
        assert_eq!(f.pool.free_count(), 2);
        let blits: Vec<_> = device
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCommand::Blit { source, destination, .. } => Some((source, destination)),
                _ => None,
            })
            .collect();
        assert_eq!(
            blits,
            vec![
                (Area::new(64, 32), Area::new(32, 16)),
                (Area::new(32, 16), Area::new(64, 32)),
            ]
        );
    }

    #[test]
    fn zero_passes_copy_the_source() {
        let f = fixture();
        let device = f.device.as_ref();
        let description = ImageBufferDescription::new(Area::new(16, 16));
        let source = ImageBuffer::create(device, &description).unwrap();
        let output = ImageBuffer::create(device, &description).unwrap();
        let parameters = BlurParameters {
            blur_passes: 0,
            ..BlurParameters::default()
        };

        f.blur
            .evaluate(
                device,
                &f.allocator.root_context(),
                &parameters,
                &f.pool,
                &source,
                &output,
                |d: &ImageBufferDescription, area| d.with_area(area),
            )
            .unwrap();

        assert_eq!(device.draw_call_count(), 0);
        assert_eq!(f.pool.free_count(), 0);
    }

    #[test]
    fn zero_size_only_rescales() {
        let f = fixture();
        let device = f.device.as_ref();
        let description = ImageBufferDescription::new(Area::new(16, 16));
        let source = ImageBuffer::create(device, &description).unwrap();
        let parameters = BlurParameters {
            blur_size: 0.0,
            ..BlurParameters::default()
        };

        f.blur
            .evaluate(
                device,
                &f.allocator.root_context(),
                &parameters,
                &f.pool,
                &source,
                &source,
                |d: &ImageBufferDescription, area| d.with_area(area),
            )
            .unwrap();

        assert_eq!(device.draw_call_count(), 0);
        assert_eq!(f.pool.free_count(), 1);
    }

    #[test]
    fn scratch_targets_are_returned_on_failure() {
        let f = fixture();
        let device = f.device.as_ref();
        let description = ImageBufferDescription::new(Area::new(16, 16));
        let source = ImageBuffer::create(device, &description).unwrap();
        f.blur.quad.delete(device).unwrap();

        let result = f.blur.evaluate(
            device,
            &f.allocator.root_context(),
            &BlurParameters::default(),
            &f.pool,
            &source,
            &source,
            |d: &ImageBufferDescription, area| d.with_area(area),
        );

        assert!(result.is_err());
        assert_eq!(f.pool.in_use_count(), 0);
    }

    #[test]
    fn invalid_parameters_are_rejected_before_drawing() {
        let f = fixture();
        let device = f.device.as_ref();
        let description = ImageBufferDescription::new(Area::new(16, 16));
        let source = ImageBuffer::create(device, &description).unwrap();
        let parameters = BlurParameters {
            blur_scale: 0.0,
            ..BlurParameters::default()
        };
        let result = f.blur.evaluate(
            device,
            &f.allocator.root_context(),
            &parameters,
            &f.pool,
            &source,
            &source,
            |d: &ImageBufferDescription, area| d.with_area(area),
        );
        assert!(matches!(result, Err(RenderError::ParameterError(_))));
        assert_eq!(f.pool.bytes_allocated(), 0);
    }
}
