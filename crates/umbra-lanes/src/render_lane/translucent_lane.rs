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
//! Draws translucent instances over the lit image.

use super::draw::MaterialDrawer;
use super::{check_live, RenderLane};
use std::cell::Cell;
use umbra_core::math::Area;
use umbra_core::renderer::api::{CompareFunction, DepthState, RenderState, StencilState};
use umbra_core::renderer::error::{RenderError, ResourceError};
use umbra_core::renderer::matrices::MatricesObserver;
use umbra_core::renderer::stencil::allow_bit;
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::{Translucent, TranslucentState, Translucents};

/// Renders [`Translucents`] into the bound framebuffer in insertion order.
///
/// The depth buffer of the opaque geometry is tested but never written, so
/// translucents are hidden by opaque surfaces and not by each other.
#[derive(Debug, Default)]
pub struct TranslucentLane {
    deleted: Cell<bool>,
}

impl TranslucentLane {
    /// A new translucent lane.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state used while drawing a translucent with `state`.
    pub fn render_state(state: TranslucentState) -> RenderState {
        RenderState {
            blending: state.blending,
            culling: state.culling,
            depth: DepthState {
                test: Some(CompareFunction::Less),
                write: false,
                clamp: false,
            },
            stencil: StencilState::test_equal(allow_bit(), allow_bit()),
            color_write: true,
        }
    }

    /// Draws every translucent, each with its own blending and culling.
    ///
    /// ## Returns
    ///
    /// The number of draw calls issued.
    pub fn render_translucents(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        area: Area,
        observer: &MatricesObserver,
        translucents: &Translucents,
    ) -> Result<usize, RenderError> {
        check_live(self)?;
        device.set_viewport(area);

        let mut drawer = MaterialDrawer::new(device, units, observer);
        for translucent in translucents {
            device.activate_render_state(&Self::render_state(translucent.state()));
            let material = translucent.material();
            let shader = material.shader();
            drawer.shader_start(shader)?;
            drawer.material_start(material)?;
            match translucent {
                Translucent::Single { instance, .. } => {
                    drawer.bind_array(instance.array_object())?;
                    drawer.draw_single(material, instance)?;
                }
                Translucent::Batched { batch, .. } => {
                    drawer.update_batch(batch)?;
                    drawer.draw_batched(material, batch)?;
                }
                Translucent::Billboarded { billboards, .. } => {
                    drawer.draw_billboarded(material, billboards)?;
                }
            }
            drawer.material_finish()?;
            drawer.shader_finish(shader);
        }
        drawer.finish()
    }
}

impl RenderLane for TranslucentLane {
    fn strategy_name(&self) -> &'static str {
        "Translucent"
    }

    fn delete(&self, _device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        self.deleted.set(true);
        Ok(())
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_core::renderer::api::{BlendState, CullingState, FaceSelection};

    #[test]
    fn translucent_state_keeps_depth_read_only() {
        let state = TranslucentLane::render_state(TranslucentState {
            blending: Some(BlendState::ALPHA),
            culling: Some(CullingState {
                faces: FaceSelection::Front,
                ..CullingState::default()
            }),
        });
        assert_eq!(state.blending, Some(BlendState::ALPHA));
        assert_eq!(state.culling.map(|c| c.faces), Some(FaceSelection::Front));
        assert!(!state.depth.write);
        assert_eq!(state.depth.test, Some(CompareFunction::Less));
        assert_eq!(state.stencil.reference, allow_bit());
    }
}
