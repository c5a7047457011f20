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
//! Renders variance shadow maps for shadow-casting lights.

use super::depth_variance_lane::DepthVarianceLane;
use super::{check_live, RenderLane};
use crate::filter_lane::BoxBlurLane;
use crate::UnitQuad;
use std::cell::Cell;
use std::rc::Rc;
use umbra_core::renderer::error::{RenderError, ResourceError, ShaderError};
use umbra_core::renderer::light::Light;
use umbra_core::renderer::matrices::Matrices;
use umbra_core::renderer::shadow::{Shadow, ShadowMapContext};
use umbra_core::renderer::target::{DepthVarianceBuffer, RenderTargetPool};
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::DepthInstances;

/// Produces the shadow maps of a frame.
///
/// Rendering happens inside a [`ShadowMapExecution`], of which at most one
/// exists per lane at a time:
///
/// ```text
/// shadow_begin(pool) -> render_light(..)* -> complete() -> ShadowMapContext
/// ```
#[derive(Debug)]
pub struct ShadowMapLane {
    depth_variance: DepthVarianceLane,
    blur: BoxBlurLane,
    active: Cell<bool>,
    deleted: Cell<bool>,
}

impl ShadowMapLane {
    /// Creates the lane and its blur programs.
    pub fn new(device: &dyn GraphicsDevice, quad: Rc<UnitQuad>) -> Result<Self, ShaderError> {
        Ok(Self {
            depth_variance: DepthVarianceLane::new(),
            blur: BoxBlurLane::new(device, quad)?,
            active: Cell::new(false),
            deleted: Cell::new(false),
        })
    }

    /// Starts rendering shadow maps taken from `pool`.
    ///
    /// ## Errors
    ///
    /// Returns [`RenderError::ShadowExecutionAlreadyActive`] while a previous
    /// execution is alive.
    pub fn shadow_begin<'l, 'p>(
        &'l self,
        pool: &'p RenderTargetPool<DepthVarianceBuffer>,
    ) -> Result<ShadowMapExecution<'l, 'p>, RenderError> {
        check_live(self)?;
        if self.active.replace(true) {
            return Err(RenderError::ShadowExecutionAlreadyActive);
        }
        log::trace!("ShadowMapLane: execution started");
        Ok(ShadowMapExecution {
            lane: self,
            pool,
            context: ShadowMapContext::new(pool),
        })
    }

    /// Returns `true` while an execution is alive.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// One frame's worth of shadow map rendering.
///
/// Dropping an execution without completing it returns every map rendered so
/// far to the pool.
#[derive(Debug)]
pub struct ShadowMapExecution<'l, 'p> {
    lane: &'l ShadowMapLane,
    pool: &'p RenderTargetPool<DepthVarianceBuffer>,
    context: ShadowMapContext<'p>,
}

impl<'p> ShadowMapExecution<'_, 'p> {
    /// Renders the shadow map of `light` from the depth instances it sees.
    ///
    /// Lights without a shadow are skipped. The map is rendered from an
    /// observer placed at the light, so `matrices` must not have an active
    /// observer.
    ///
    /// ## Errors
    ///
    /// Fails if the shadow parameters are invalid, the pool cannot supply a
    /// map, or drawing fails. The map being rendered is returned to the pool.
    pub fn render_light(
        &mut self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        matrices: &Matrices,
        light: &Light,
        instances: &mut DepthInstances,
    ) -> Result<(), RenderError> {
        let Light::Projective(projective) = light else {
            return Ok(());
        };
        let Some(Shadow::Variance(shadow)) = &projective.shadow else {
            return Ok(());
        };
        shadow.validate()?;

        let map = self.pool.acquire(device, &shadow.map_description)?;
        let view = projective.transform.matrix().inverse();
        let lane = self.lane;
        let rendered = matrices
            .with_observer(view, &projective.projection, |observer| {
                lane.depth_variance
                    .render_depth_variance(device, units, observer, &map, instances)
            })
            .and_then(|_| match &shadow.blur {
                Some(blur) => lane.blur.evaluate(
                    device,
                    units,
                    blur,
                    self.pool,
                    &*map,
                    &*map,
                    |description, area| description.with_area(area),
                ),
                None => Ok(()),
            });

        match rendered {
            Ok(()) => {
                log::trace!("ShadowMapLane: rendered shadow {}", shadow.id());
                self.context.insert(shadow.id(), map);
                Ok(())
            }
            Err(e) => {
                self.pool.release(map);
                Err(e)
            }
        }
    }

    /// The number of maps rendered so far.
    pub fn rendered(&self) -> usize {
        self.context.len()
    }

    /// Ends the execution, handing over the rendered maps.
    pub fn complete(mut self) -> ShadowMapContext<'p> {
        std::mem::replace(&mut self.context, ShadowMapContext::new(self.pool))
    }
}

impl Drop for ShadowMapExecution<'_, '_> {
    fn drop(&mut self) {
        self.lane.active.set(false);
    }
}

impl RenderLane for ShadowMapLane {
    fn strategy_name(&self) -> &'static str {
        "ShadowMap"
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        self.depth_variance.delete(device)?;
        self.blur.delete(device)
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_core::math::Area;
    use umbra_core::renderer::target::DepthVarianceBufferDescription;
    use umbra_infra::HeadlessDevice;

    fn pool() -> RenderTargetPool<DepthVarianceBuffer> {
        RenderTargetPool::new(
            |device: &dyn GraphicsDevice, description: &DepthVarianceBufferDescription| {
                DepthVarianceBuffer::create(device, description)
            },
        )
    }

    #[test]
    fn only_one_execution_at_a_time() {
        let device = HeadlessDevice::new();
        let lane = ShadowMapLane::new(&device, Rc::new(UnitQuad::new(&device).unwrap())).unwrap();
        let pool = pool();

        let execution = lane.shadow_begin(&pool).unwrap();
        assert!(matches!(
            lane.shadow_begin(&pool),
            Err(RenderError::ShadowExecutionAlreadyActive)
        ));
        let context = execution.complete();
        assert!(context.is_empty());
        assert!(!lane.is_active());
        assert!(lane.shadow_begin(&pool).is_ok());
    }

    #[test]
    fn maps_are_returned_when_the_context_is_released() {
        let device = HeadlessDevice::new();
        let lane = ShadowMapLane::new(&device, Rc::new(UnitQuad::new(&device).unwrap())).unwrap();
        let pool = pool();
        let map = pool
            .acquire(&device, &DepthVarianceBufferDescription::new(Area::new(32, 32)))
            .unwrap();

        let mut execution = lane.shadow_begin(&pool).unwrap();
        execution.context.insert(7, map);
        assert_eq!(execution.rendered(), 1);
        let context = execution.complete();
        assert!(context.require(7).is_ok());
        assert_eq!(pool.in_use_count(), 1);
        context.release();
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.free_count(), 1);
    }
}
