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
//! Fills the geometry buffer with opaque instances.

use super::draw::MaterialDrawer;
use super::{check_live, RenderLane};
use std::cell::Cell;
use umbra_core::math::Vec4;
use umbra_core::renderer::api::{
    ClearValues, CompareFunction, CullingState, DepthState, RenderState, StencilOperation,
    StencilState,
};
use umbra_core::renderer::error::{RenderError, ResourceError};
use umbra_core::renderer::material::MaterialBinding;
use umbra_core::renderer::matrices::MatricesObserver;
use umbra_core::renderer::shader::ShaderBinding;
use umbra_core::renderer::stencil::{allow_bit, group_bits, group_value};
use umbra_core::renderer::target::{GeometryBuffer, RenderTarget};
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::instance::{InstanceBatchedDynamic, InstanceSingle};
use umbra_core::scene::{OpaqueInstances, OpaqueInstancesConsumer};

/// Renders opaque instances into a [`GeometryBuffer`].
///
/// Each instance writes its stencil group into the group bits of the pixels
/// it covers, which the light lane later tests against. Pixels without the
/// allow bit are left untouched.
#[derive(Debug, Default)]
pub struct GeometryLane {
    deleted: Cell<bool>,
}

impl GeometryLane {
    /// A new geometry lane.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state used while drawing instances of stencil `group`.
    pub fn render_state(group: u8) -> RenderState {
        RenderState {
            blending: None,
            culling: Some(CullingState::default()),
            depth: DepthState {
                test: Some(CompareFunction::LessEqual),
                write: true,
                clamp: false,
            },
            stencil: StencilState {
                enabled: true,
                function: CompareFunction::Equal,
                reference: allow_bit() | group_value(group),
                test_mask: allow_bit(),
                write_mask: group_bits(),
                on_stencil_fail: StencilOperation::Keep,
                on_depth_fail: StencilOperation::Keep,
                on_pass: StencilOperation::Replace,
            },
            color_write: true,
        }
    }

    /// Draws `instances` into `gbuffer`.
    ///
    /// The buffer's colour attachments are cleared; depth and stencil are
    /// kept, as the stencil and depth lanes have already filled them.
    ///
    /// ## Returns
    ///
    /// The number of draw calls issued.
    pub fn render_geometry(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        observer: &MatricesObserver,
        gbuffer: &GeometryBuffer,
        instances: &mut OpaqueInstances,
    ) -> Result<usize, RenderError> {
        check_live(self)?;
        device.bind_draw_framebuffer(gbuffer.primary_framebuffer())?;
        device.set_viewport(gbuffer.area());
        device.clear(&ClearValues {
            color: Some(Vec4::ZERO),
            depth: None,
            stencil: None,
        })?;

        let mut consumer = GeometryConsumer {
            device,
            drawer: MaterialDrawer::new(device, units, observer),
        };
        instances.visit(&mut consumer)?;
        let draws = consumer.drawer.finish()?;
        log::trace!("GeometryLane: {} draw calls", draws);
        Ok(draws)
    }
}

struct GeometryConsumer<'a> {
    device: &'a dyn GraphicsDevice,
    drawer: MaterialDrawer<'a>,
}

impl OpaqueInstancesConsumer for GeometryConsumer<'_> {
    fn on_instance_batched_update(
        &mut self,
        batch: &InstanceBatchedDynamic,
    ) -> Result<(), RenderError> {
        self.drawer.update_batch(batch)
    }

    fn on_start_group(&mut self, group: u8) -> Result<(), RenderError> {
        self.device
            .activate_render_state(&GeometryLane::render_state(group));
        Ok(())
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

    fn on_finish_group(&mut self, _group: u8) -> Result<(), RenderError> {
        Ok(())
    }
}

impl RenderLane for GeometryLane {
    fn strategy_name(&self) -> &'static str {
        "Geometry"
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
    fn groups_are_written_to_allowed_pixels() {
        let state = GeometryLane::render_state(3);
        assert_eq!(state.stencil.reference, 0x80 | (3 << 3));
        assert_eq!(state.stencil.test_mask, 0x80);
        assert_eq!(state.stencil.write_mask, 0x78);
        assert_eq!(state.stencil.on_pass, StencilOperation::Replace);
        assert_eq!(state.depth.test, Some(CompareFunction::LessEqual));
        assert!(state.color_write);
    }

    #[test]
    fn delete_is_idempotent() {
        let lane = GeometryLane::new();
        let device = umbra_infra::HeadlessDevice::new();
        lane.delete(&device).unwrap();
        lane.delete(&device).unwrap();
        assert!(lane.is_deleted());
    }
}
