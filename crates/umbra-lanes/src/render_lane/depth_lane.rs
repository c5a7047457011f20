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
//! Renders depth instances into the depth buffer of the bound framebuffer.

use super::draw::MaterialDrawer;
use super::{check_live, RenderLane};
use std::cell::Cell;
use umbra_core::math::Area;
use umbra_core::renderer::api::{
    CompareFunction, CullingState, DepthState, FaceSelection, RenderState, StencilState,
};
use umbra_core::renderer::error::{RenderError, ResourceError};
use umbra_core::renderer::material::MaterialBinding;
use umbra_core::renderer::matrices::MatricesObserver;
use umbra_core::renderer::shader::ShaderBinding;
use umbra_core::renderer::stencil::allow_bit;
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::instance::{InstanceBatchedDynamic, InstanceSingle};
use umbra_core::scene::{DepthInstances, DepthInstancesConsumer};

/// Fills the depth buffer ahead of the geometry pass.
///
/// Only pixels whose allow bit is set are written, so the stencil pass must
/// run first. Materials are the caller's depth materials; the lane itself
/// owns no program.
#[derive(Debug, Default)]
pub struct DepthLane {
    deleted: Cell<bool>,
}

impl DepthLane {
    /// A new depth lane.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state used while drawing depth instances culling `faces`.
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
            stencil: StencilState::test_equal(allow_bit(), allow_bit()),
            color_write: false,
        }
    }

    /// Draws `instances` into the depth buffer of the bound framebuffer.
    ///
    /// ## Returns
    ///
    /// The number of draw calls issued.
    ///
    /// ## Errors
    ///
    /// Fails on the first callback failure; the remaining instances are not
    /// drawn.
    pub fn render_depth(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        area: Area,
        observer: &MatricesObserver,
        instances: &mut DepthInstances,
    ) -> Result<usize, RenderError> {
        check_live(self)?;
        device.set_viewport(area);
        device.activate_render_state(&Self::render_state(instances.faces_culled()));
        visit_depth(device, units, observer, instances)
    }
}

/// Drives `instances` through `MaterialDrawer` with whatever target and
/// state the caller set up.
pub(crate) fn visit_depth(
    device: &dyn GraphicsDevice,
    units: &TextureUnitContext,
    observer: &MatricesObserver,
    instances: &mut DepthInstances,
) -> Result<usize, RenderError> {
    let mut consumer = DepthConsumer {
        drawer: MaterialDrawer::new(device, units, observer),
    };
    instances.visit(&mut consumer)?;
    consumer.drawer.finish()
}

struct DepthConsumer<'a> {
    drawer: MaterialDrawer<'a>,
}

impl DepthInstancesConsumer for DepthConsumer<'_> {
    fn on_instance_batched_update(
        &mut self,
        batch: &InstanceBatchedDynamic,
    ) -> Result<(), RenderError> {
        self.drawer.update_batch(batch)
    }

    fn on_instance_batched_shader_start(
        &mut self,
        shader: &dyn ShaderBinding,
    ) -> Result<(), RenderError> {
        self.drawer.shader_start(shader)
    }

    fn on_instance_batched_material_start(
        &mut self,
        material: &dyn MaterialBinding,
    ) -> Result<(), RenderError> {
        self.drawer.material_start(material)
    }

    fn on_instance_batched(
        &mut self,
        material: &dyn MaterialBinding,
        batch: &InstanceBatchedDynamic,
    ) -> Result<(), RenderError> {
        self.drawer.draw_batched(material, batch)
    }

    fn on_instance_batched_material_finish(
        &mut self,
        _material: &dyn MaterialBinding,
    ) -> Result<(), RenderError> {
        self.drawer.material_finish()
    }

    fn on_instance_batched_shader_finish(
        &mut self,
        shader: &dyn ShaderBinding,
    ) -> Result<(), RenderError> {
        self.drawer.shader_finish(shader);
        Ok(())
    }

    fn on_instance_single_shader_start(
        &mut self,
        shader: &dyn ShaderBinding,
    ) -> Result<(), RenderError> {
        self.drawer.shader_start(shader)
    }

    fn on_instance_single_material_start(
        &mut self,
        material: &dyn MaterialBinding,
    ) -> Result<(), RenderError> {
        self.drawer.material_start(material)
    }

    fn on_instance_single_array_start(
        &mut self,
        instance: &InstanceSingle,
    ) -> Result<(), RenderError> {
        self.drawer.bind_array(instance.array_object())
    }

    fn on_instance_single(
        &mut self,
        material: &dyn MaterialBinding,
        instance: &InstanceSingle,
    ) -> Result<(), RenderError> {
        self.drawer.draw_single(material, instance)
    }

    fn on_instance_single_material_finish(
        &mut self,
        _material: &dyn MaterialBinding,
    ) -> Result<(), RenderError> {
        self.drawer.material_finish()
    }

    fn on_instance_single_shader_finish(
        &mut self,
        shader: &dyn ShaderBinding,
    ) -> Result<(), RenderError> {
        self.drawer.shader_finish(shader);
        Ok(())
    }
}

impl RenderLane for DepthLane {
    fn strategy_name(&self) -> &'static str {
        "Depth"
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

    #[test]
    fn depth_state_tests_allowed_pixels_only() {
        let state = DepthLane::render_state(FaceSelection::Front);
        assert_eq!(state.culling.map(|c| c.faces), Some(FaceSelection::Front));
        assert_eq!(state.depth.test, Some(CompareFunction::Less));
        assert!(state.depth.write);
        assert_eq!(state.stencil.reference, allow_bit());
        assert_eq!(state.stencil.test_mask, allow_bit());
        assert_eq!(state.stencil.write_mask, 0);
        assert!(!state.color_write);
    }
}
