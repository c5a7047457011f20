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
//! One deferred frame, pass by pass.
//!
//! [`DeferredRenderer`] owns the lanes of a frame and runs them in a fixed
//! order for one observer:
//!
//! ```text
//! shadow maps -> stencil -> depth -> geometry -> light -> light applicator
//!             -> translucent -> filters
//! ```
//!
//! Each pass consumes what the previous one produced, so the first failure
//! aborts the rest of the frame.

use crate::filter_lane::{FilterOutput, LightApplicatorLane};
use crate::render_lane::{
    DepthLane, GeometryLane, LightLane, ShadowMapLane, StencilLane, TranslucentLane,
};
use crate::{RenderLane, UnitQuad};
use std::rc::Rc;
use umbra_core::math::{Mat4, Vec4};
use umbra_core::renderer::api::ClearValues;
use umbra_core::renderer::error::{RenderError, ResourceError, ShaderError};
use umbra_core::renderer::light::Light;
use umbra_core::renderer::matrices::{Matrices, MatricesObserver, Projection};
use umbra_core::renderer::shadow::ShadowMapContext;
use umbra_core::renderer::target::{
    DepthVarianceBuffer, GeometryBuffer, ImageBuffer, LightBuffer, RenderTarget, RenderTargetPool,
};
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::{DepthInstances, Lights, OpaqueInstances, Stencils, Translucents};

/// What a [`FrameFilter`] may read and where it writes.
pub struct FilterContext<'a> {
    /// The device.
    pub device: &'a dyn GraphicsDevice,
    /// The frame's texture unit context.
    pub units: &'a TextureUnitContext,
    /// The frame's observer.
    pub observer: &'a MatricesObserver,
    /// The filled geometry buffer.
    pub gbuffer: &'a GeometryBuffer,
    /// The accumulated light.
    pub light_buffer: &'a LightBuffer,
    /// The lit image, translucents included.
    pub image: &'a ImageBuffer,
}

/// A post-processing step run at the end of a frame.
pub trait FrameFilter {
    /// Applies the filter.
    fn apply(&mut self, context: &FilterContext<'_>) -> Result<(), RenderError>;
}

impl<F> FrameFilter for F
where
    F: FnMut(&FilterContext<'_>) -> Result<(), RenderError>,
{
    fn apply(&mut self, context: &FilterContext<'_>) -> Result<(), RenderError> {
        self(context)
    }
}

/// The scene and targets of one frame.
///
/// `light_buffer` and `image` are expected to borrow the depth-stencil
/// attachment of `gbuffer` (see [`GeometryBuffer::shared_depth`]), so that
/// light volumes and translucents are tested against the opaque scene.
pub struct DeferredFrame<'a> {
    /// The observer's view matrix.
    pub view: Mat4,
    /// The observer's projection.
    pub projection: Projection,
    /// The stencil instances.
    pub stencils: &'a mut Stencils,
    /// The depth pre-pass instances.
    pub depth: &'a mut DepthInstances,
    /// The opaque instances.
    pub opaques: &'a mut OpaqueInstances,
    /// The lights.
    pub lights: &'a mut Lights,
    /// The translucents.
    pub translucents: &'a Translucents,
    /// The instances seen by shadow-casting lights, and the pool their maps
    /// come from. `None` renders no shadow maps.
    pub shadows: Option<FrameShadows<'a>>,
    /// The geometry buffer.
    pub gbuffer: &'a GeometryBuffer,
    /// The light buffer.
    pub light_buffer: &'a LightBuffer,
    /// The image the lit scene is written to.
    pub image: &'a ImageBuffer,
}

/// The shadow casters of a frame.
pub struct FrameShadows<'a> {
    /// The instances rendered into every shadow map.
    pub casters: &'a mut DepthInstances,
    /// The pool of shadow maps.
    pub pool: &'a RenderTargetPool<DepthVarianceBuffer>,
}

/// The draw calls issued by each pass of a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Shadow maps rendered.
    pub shadow_maps: usize,
    /// Depth pre-pass draw calls.
    pub depth_draws: usize,
    /// Geometry pass draw calls.
    pub geometry_draws: usize,
    /// Light pass draw calls.
    pub light_draws: usize,
    /// Translucent pass draw calls.
    pub translucent_draws: usize,
}

/// The lanes of a deferred frame.
#[derive(Debug)]
pub struct DeferredRenderer {
    quad: Rc<UnitQuad>,
    stencil: StencilLane,
    depth: DepthLane,
    shadow_map: ShadowMapLane,
    geometry: GeometryLane,
    light: LightLane,
    light_applicator: LightApplicatorLane,
    translucent: TranslucentLane,
}

impl DeferredRenderer {
    /// Creates every lane, sharing one unit quad.
    ///
    /// ## Errors
    ///
    /// Fails if a program does not compile or the quad cannot be created.
    /// Everything created before the failure is deleted.
    pub fn new(device: &dyn GraphicsDevice) -> Result<Self, RenderError> {
        let quad = Rc::new(UnitQuad::new(device)?);
        match Self::with_quad(device, quad.clone()) {
            Ok(renderer) => {
                log::debug!("DeferredRenderer: lanes created");
                Ok(renderer)
            }
            Err(e) => {
                if let Err(delete) = quad.delete(device) {
                    log::warn!("DeferredRenderer: Failed to destroy unit quad: {:?}", delete);
                }
                Err(e)
            }
        }
    }

    fn with_quad(device: &dyn GraphicsDevice, quad: Rc<UnitQuad>) -> Result<Self, RenderError> {
        let stencil = StencilLane::new(device)?;
        let shadow_map = created(device, ShadowMapLane::new(device, quad.clone()), &[&stencil])?;
        let light = created(
            device,
            LightLane::new(device, quad.clone()),
            &[&stencil, &shadow_map],
        )?;
        let light_applicator = created(
            device,
            LightApplicatorLane::new(device, quad.clone()),
            &[&stencil, &shadow_map, &light],
        )?;
        Ok(Self {
            quad,
            stencil,
            depth: DepthLane::new(),
            shadow_map,
            geometry: GeometryLane::new(),
            light,
            light_applicator,
            translucent: TranslucentLane::new(),
        })
    }

    /// Renders `frame`, then runs `filters` in order.
    ///
    /// `matrices` must not have an active observer: shadow maps are rendered
    /// from each light before the frame's observer scope opens.
    ///
    /// ## Errors
    ///
    /// The first failure of any pass. Shadow maps rendered so far are
    /// returned to their pool.
    pub fn render(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        matrices: &Matrices,
        frame: DeferredFrame<'_>,
        filters: &mut [&mut dyn FrameFilter],
    ) -> Result<FrameStats, RenderError> {
        let DeferredFrame {
            view,
            projection,
            stencils,
            depth,
            opaques,
            lights,
            translucents,
            shadows,
            gbuffer,
            light_buffer,
            image,
        } = frame;
        let mut stats = FrameStats::default();

        let shadow_maps = match shadows {
            Some(shadows) => Some(self.render_shadow_maps(device, units, matrices, lights, shadows)?),
            None => None,
        };
        stats.shadow_maps = shadow_maps.as_ref().map_or(0, ShadowMapContext::len);

        matrices.with_observer(view, &projection, |observer| {
            let area = gbuffer.area();
            device.bind_draw_framebuffer(gbuffer.primary_framebuffer())?;
            device.set_viewport(area);
            gbuffer.clear_bound_primary_framebuffer(device)?;

            self.stencil.render_stencils(device, area, observer, stencils)?;
            stats.depth_draws = self.depth.render_depth(device, units, area, observer, depth)?;
            stats.geometry_draws =
                self.geometry
                    .render_geometry(device, units, observer, gbuffer, opaques)?;
            stats.light_draws = self.light.render_lights(
                device,
                units,
                observer,
                gbuffer,
                light_buffer,
                shadow_maps.as_ref(),
                lights,
            )?;

            let output = FilterOutput::target(image);
            output.bind(device)?;
            device.clear(&ClearValues {
                color: Some(Vec4::ZERO),
                depth: None,
                stencil: None,
            })?;
            self.light_applicator
                .evaluate(device, units, gbuffer, light_buffer, output)?;
            output.bind(device)?;
            stats.translucent_draws = self.translucent.render_translucents(
                device,
                units,
                image.area(),
                observer,
                translucents,
            )?;

            let context = FilterContext {
                device,
                units,
                observer,
                gbuffer,
                light_buffer,
                image,
            };
            for filter in filters.iter_mut() {
                filter.apply(&context)?;
            }
            Ok::<_, RenderError>(())
        })?;

        log::trace!("DeferredRenderer: frame done {:?}", stats);
        Ok(stats)
    }

    fn render_shadow_maps<'p>(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        matrices: &Matrices,
        lights: &Lights,
        shadows: FrameShadows<'p>,
    ) -> Result<ShadowMapContext<'p>, RenderError> {
        let casters: Vec<Rc<Light>> = lights.shadow_casters().cloned().collect();
        let mut execution = self.shadow_map.shadow_begin(shadows.pool)?;
        for light in &casters {
            execution.render_light(device, units, matrices, light, shadows.casters)?;
        }
        Ok(execution.complete())
    }

    /// The unit quad shared by the full-screen lanes.
    pub fn unit_quad(&self) -> &Rc<UnitQuad> {
        &self.quad
    }

    fn lanes(&self) -> [&dyn RenderLane; 7] {
        [
            &self.stencil,
            &self.depth,
            &self.shadow_map,
            &self.geometry,
            &self.light,
            &self.light_applicator,
            &self.translucent,
        ]
    }

    /// Deletes every lane and the unit quad. Every deletion is attempted;
    /// the first failure is returned.
    pub fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        let mut first_error = None;
        for lane in self.lanes() {
            if let Err(e) = lane.delete(device) {
                log::warn!(
                    "DeferredRenderer: Failed to destroy {} lane: {:?}",
                    lane.strategy_name(),
                    e
                );
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.quad.delete(device) {
            log::warn!("DeferredRenderer: Failed to destroy unit quad: {:?}", e);
            first_error.get_or_insert(e);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Returns `true` once every lane was deleted.
    pub fn is_deleted(&self) -> bool {
        self.lanes().iter().all(|lane| lane.is_deleted())
    }
}

/// Passes `lane` through, deleting the lanes created before it on failure.
fn created<T>(
    device: &dyn GraphicsDevice,
    lane: Result<T, ShaderError>,
    before: &[&dyn RenderLane],
) -> Result<T, RenderError> {
    lane.map_err(|e| {
        for previous in before {
            if let Err(delete) = previous.delete(device) {
                log::warn!(
                    "DeferredRenderer: Failed to destroy {} lane: {:?}",
                    previous.strategy_name(),
                    delete
                );
            }
        }
        RenderError::from(e)
    })
}
