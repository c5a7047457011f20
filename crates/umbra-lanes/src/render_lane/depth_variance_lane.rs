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
//! Renders depth instances into a depth-variance buffer, storing the first
//! two moments of depth for variance shadow mapping.

use super::depth_lane::visit_depth;
use super::{check_live, RenderLane};
use std::cell::Cell;
use umbra_core::renderer::api::{
    CompareFunction, CullingState, DepthState, FaceSelection, RenderState, StencilState,
};
use umbra_core::renderer::error::{RenderError, ResourceError};
use umbra_core::renderer::matrices::MatricesObserver;
use umbra_core::renderer::target::{DepthVarianceBuffer, RenderTarget};
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::DepthInstances;

/// Renders the depth moments of a scene as seen from an observer, usually a
/// shadow-casting light.
#[derive(Debug, Default)]
pub struct DepthVarianceLane {
    deleted: Cell<bool>,
}

impl DepthVarianceLane {
    /// A new depth-variance lane.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state used while drawing into a depth-variance buffer.
    pub fn render_state(faces: FaceSelection) -> RenderState {
        RenderState {
            blending: None,
            culling: Some(CullingState {
                faces,
                ..CullingState::default()
            }),
            depth: DepthState {
                test: Some(CompareFunction::Less),
                write: true,
                clamp: false,
            },
            stencil: StencilState::DISABLED,
            color_write: true,
        }
    }

    /// Binds and clears `target`, then draws `instances` into it.
    ///
    /// ## Returns
    ///
    /// The number of draw calls issued.
    pub fn render_depth_variance(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        observer: &MatricesObserver,
        target: &DepthVarianceBuffer,
        instances: &mut DepthInstances,
    ) -> Result<usize, RenderError> {
        check_live(self)?;
        device.bind_draw_framebuffer(target.primary_framebuffer())?;
        device.set_viewport(target.area());
        target.clear_bound_primary_framebuffer(device)?;
        device.activate_render_state(&Self::render_state(instances.faces_culled()));
        let draws = visit_depth(device, units, observer, instances)?;
        log::trace!(
            "DepthVarianceLane: {} draws into {:?}",
            draws,
            target.primary_framebuffer()
        );
        Ok(draws)
    }
}

impl RenderLane for DepthVarianceLane {
    fn strategy_name(&self) -> &'static str {
        "DepthVariance"
    }

    fn delete(&self, _device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        self.deleted.set(true);
        Ok(())
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}
