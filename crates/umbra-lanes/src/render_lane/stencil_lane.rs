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
//! Writes the allow bit of the stencil buffer from a stencil scene.

use super::draw::ProgramSwitch;
use super::program::{delete_programs, LaneProgram, LaneProgramBuilder};
use super::shaders::{self, BATCHED_VERT, SINGLE_VERT, STENCIL_FRAG};
use super::{check_live, RenderLane};
use std::cell::Cell;
use umbra_core::math::Area;
use umbra_core::renderer::api::{
    ClearValues, CompareFunction, CullingState, DepthState, Primitive, RenderState, StencilOperation,
    StencilState,
};
use umbra_core::renderer::error::{RenderError, ResourceError, ShaderError};
use umbra_core::renderer::matrices::MatricesObserver;
use umbra_core::renderer::stencil::{allow_bit, StencilMode};
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::instance::{InstanceBatchedDynamic, InstanceSingle};
use umbra_core::scene::{Stencils, StencilsConsumer};

/// Renders stencil instances into the stencil buffer of the bound framebuffer.
///
/// The buffer is first cleared to the mode's clear value, then every covered
/// pixel has its allow bit replaced by the mode's instance value. No color or
/// depth is written.
#[derive(Debug)]
pub struct StencilLane {
    single: LaneProgram,
    batched: LaneProgram,
    deleted: Cell<bool>,
}

impl StencilLane {
    /// Compiles the stencil programs.
    pub fn new(device: &dyn GraphicsDevice) -> Result<Self, ShaderError> {
        let mut builder = LaneProgramBuilder::new(device);
        let single = builder.compile(&shaders::program("stencil-single", SINGLE_VERT, STENCIL_FRAG, &[]))?;
        let batched =
            builder.compile(&shaders::program("stencil-batched", BATCHED_VERT, STENCIL_FRAG, &[]))?;
        builder.finish();
        Ok(Self {
            single,
            batched,
            deleted: Cell::new(false),
        })
    }

    /// The state used while drawing stencil instances in `mode`.
    pub fn render_state(mode: StencilMode) -> RenderState {
        RenderState {
            blending: None,
            culling: Some(CullingState::default()),
            depth: DepthState::DISABLED,
            stencil: StencilState {
                enabled: true,
                function: CompareFunction::Always,
                reference: mode.instance_value(),
                test_mask: 0xff,
                write_mask: allow_bit(),
                on_stencil_fail: StencilOperation::Keep,
                on_depth_fail: StencilOperation::Keep,
                on_pass: StencilOperation::Replace,
            },
            color_write: false,
        }
    }

    /// Clears the stencil buffer of the bound framebuffer and draws
    /// `stencils` into it.
    ///
    /// ## Arguments
    ///
    /// * `area` - The viewport of the bound framebuffer.
    /// * `observer` - The observer the instances are seen from.
    /// * `stencils` - The stencil scene.
    ///
    /// ## Errors
    ///
    /// Fails if the lane was deleted or any device call fails. The stencil
    /// buffer may be partially written.
    pub fn render_stencils(
        &self,
        device: &dyn GraphicsDevice,
        area: Area,
        observer: &MatricesObserver,
        stencils: &mut Stencils,
    ) -> Result<(), RenderError> {
        check_live(self)?;
        let mode = stencils.mode();
        device.set_viewport(area);
        device.clear(&ClearValues {
            color: None,
            depth: None,
            stencil: Some(mode.clear_value()),
        })?;
        device.activate_render_state(&Self::render_state(mode));

        let mut consumer = StencilConsumer {
            lane: self,
            device,
            switch: ProgramSwitch::new(device, observer),
        };
        let result = stencils.visit(&mut consumer);
        consumer.switch.finish();
        result
    }
}

struct StencilConsumer<'a> {
    lane: &'a StencilLane,
    device: &'a dyn GraphicsDevice,
    switch: ProgramSwitch<'a>,
}

impl StencilsConsumer for StencilConsumer<'_> {
    fn on_instance_batched_update(
        &mut self,
        batch: &InstanceBatchedDynamic,
    ) -> Result<(), RenderError> {
        batch.update(self.device)?;
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
}

impl RenderLane for StencilLane {
    fn strategy_name(&self) -> &'static str {
        "Stencil"
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        delete_programs(device, "StencilLane", [&self.single, &self.batched])
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}
