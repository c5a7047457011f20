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
//! Renders mask instances into a mask buffer.

use super::draw::ProgramSwitch;
use super::program::{delete_programs, LaneProgram, LaneProgramBuilder};
use super::shaders::{self, BATCHED_VERT, MASK_FRAG, SINGLE_VERT};
use super::{check_live, RenderLane};
use std::cell::Cell;
use umbra_core::renderer::api::{
    CompareFunction, CullingState, DepthState, Primitive, RenderState, StencilState,
};
use umbra_core::renderer::error::{RenderError, ResourceError, ShaderError};
use umbra_core::renderer::matrices::MatricesObserver;
use umbra_core::renderer::target::{MaskBuffer, RenderTarget};
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::instance::{InstanceBatchedDynamic, InstanceSingle};
use umbra_core::scene::{MaskInstances, MaskInstancesConsumer};

/// Writes full coverage wherever a mask instance is visible.
#[derive(Debug)]
pub struct MaskLane {
    single: LaneProgram,
    batched: LaneProgram,
    deleted: Cell<bool>,
}

impl MaskLane {
    /// Compiles the mask programs.
    pub fn new(device: &dyn GraphicsDevice) -> Result<Self, ShaderError> {
        let mut builder = LaneProgramBuilder::new(device);
        let single = builder.compile(&shaders::program("mask-single", SINGLE_VERT, MASK_FRAG, &[]))?;
        let batched =
            builder.compile(&shaders::program("mask-batched", BATCHED_VERT, MASK_FRAG, &[]))?;
        builder.finish();
        Ok(Self {
            single,
            batched,
            deleted: Cell::new(false),
        })
    }

    /// The state used while drawing mask instances.
    pub fn render_state() -> RenderState {
        RenderState {
            blending: None,
            culling: Some(CullingState::default()),
            depth: DepthState {
                test: Some(CompareFunction::Less),
                write: true,
                clamp: false,
            },
            stencil: StencilState::DISABLED,
            color_write: true,
        }
    }

    /// Clears `target` and draws `instances` into it.
    pub fn render_mask(
        &self,
        device: &dyn GraphicsDevice,
        observer: &MatricesObserver,
        target: &MaskBuffer,
        instances: &mut MaskInstances,
    ) -> Result<(), RenderError> {
        check_live(self)?;
        device.bind_draw_framebuffer(target.primary_framebuffer())?;
        device.set_viewport(target.area());
        target.clear_bound_primary_framebuffer(device)?;
        device.activate_render_state(&Self::render_state());

        let mut consumer = MaskConsumer {
            lane: self,
            device,
            switch: ProgramSwitch::new(device, observer),
        };
        let result = instances.visit(&mut consumer);
        consumer.switch.finish();
        result
    }
}

struct MaskConsumer<'a> {
    lane: &'a MaskLane,
    device: &'a dyn GraphicsDevice,
    switch: ProgramSwitch<'a>,
}

impl MaskInstancesConsumer for MaskConsumer<'_> {
    fn on_instance_batched_update(
        &mut self,
        batch: &InstanceBatchedDynamic,
    ) -> Result<(), RenderError> {
        batch.update(self.device)?;
        Ok(())
    }

    fn on_instance_single_array_start(
        &mut self,
        instance: &InstanceSingle,
    ) -> Result<(), RenderError> {
        self.switch.use_program(&self.lane.single)?;
        self.device.bind_array_object(instance.array_object())?;
        Ok(())
    }

    fn on_instance_single(&mut self, instance: &InstanceSingle) -> Result<(), RenderError> {
        self.switch.upload_instance(&self.lane.single, instance)?;
        self.device.draw_elements(Primitive::Triangles)?;
        Ok(())
    }

    fn on_instance_batched(&mut self, batch: &InstanceBatchedDynamic) -> Result<(), RenderError> {
        let count = batch.render_count();
        if count == 0 {
            return Ok(());
        }
        self.switch.use_program(&self.lane.batched)?;
        self.device.bind_array_object(batch.array_object())?;
        self.device
            .draw_elements_instanced(Primitive::Triangles, count)?;
        Ok(())
    }
}

impl RenderLane for MaskLane {
    fn strategy_name(&self) -> &'static str {
        "Mask"
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        delete_programs(device, "MaskLane", [&self.single, &self.batched])
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_infra::HeadlessDevice;

    #[test]
    fn programs_are_deleted_once() {
        let device = HeadlessDevice::new();
        let lane = MaskLane::new(&device).unwrap();
        assert_eq!(device.live_programs(), 2);
        lane.delete(&device).unwrap();
        lane.delete(&device).unwrap();
        assert_eq!(device.live_programs(), 0);
        assert!(lane.is_deleted());
    }
}
