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
//! The shader, material and instance lifecycle shared by lanes that draw
//! caller-supplied materials.

use super::program::LaneProgram;
use umbra_core::renderer::api::{ArrayObjectId, Primitive, ProgramId};
use umbra_core::renderer::error::RenderError;
use umbra_core::renderer::material::MaterialBinding;
use umbra_core::renderer::matrices::MatricesObserver;
use umbra_core::renderer::shader::ShaderBinding;
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::instance::{
    InstanceBatchedDynamic, InstanceBillboardedDynamic, InstanceSingle,
};

/// Drives material shaders through their lifecycle for one pass.
///
/// Each material gets its own child texture unit context, finished when the
/// material is done so the next material starts from the pass's bindings.
pub(crate) struct MaterialDrawer<'a> {
    device: &'a dyn GraphicsDevice,
    units: &'a TextureUnitContext,
    observer: &'a MatricesObserver,
    material_units: Option<TextureUnitContext>,
    draws: usize,
}

impl<'a> MaterialDrawer<'a> {
    pub(crate) fn new(
        device: &'a dyn GraphicsDevice,
        units: &'a TextureUnitContext,
        observer: &'a MatricesObserver,
    ) -> Self {
        Self {
            device,
            units,
            observer,
            material_units: None,
            draws: 0,
        }
    }

    pub(crate) fn update_batch(&self, batch: &InstanceBatchedDynamic) -> Result<(), RenderError> {
        batch.update(self.device)?;
        Ok(())
    }

    pub(crate) fn shader_start(&self, shader: &dyn ShaderBinding) -> Result<(), RenderError> {
        shader.on_activate(self.device)?;
        shader.on_receive_view_values(self.device, self.observer)
    }

    pub(crate) fn shader_finish(&self, shader: &dyn ShaderBinding) {
        shader.on_deactivate(self.device);
    }

    pub(crate) fn material_start(&mut self, material: &dyn MaterialBinding) -> Result<(), RenderError> {
        self.material_finish()?;
        let units = self.units.unit_context_new()?;
        material.on_receive_material_values(self.device, &units)?;
        self.material_units = Some(units);
        Ok(())
    }

    pub(crate) fn material_finish(&mut self) -> Result<(), RenderError> {
        if let Some(units) = self.material_units.take() {
            units.finish()?;
        }
        Ok(())
    }

    pub(crate) fn bind_array(&self, array: ArrayObjectId) -> Result<(), RenderError> {
        self.device.bind_array_object(array)?;
        Ok(())
    }

    /// Draws every enabled instance of `batch`.
    pub(crate) fn draw_batched(
        &mut self,
        material: &dyn MaterialBinding,
        batch: &InstanceBatchedDynamic,
    ) -> Result<(), RenderError> {
        material.shader().on_validate()?;
        let count = batch.render_count();
        if count == 0 {
            return Ok(());
        }
        self.device.bind_array_object(batch.array_object())?;
        self.device
            .draw_elements_instanced(Primitive::Triangles, count)?;
        self.draws += 1;
        Ok(())
    }

    /// Draws one instance with the array object already bound.
    pub(crate) fn draw_single(
        &mut self,
        material: &dyn MaterialBinding,
        instance: &InstanceSingle,
    ) -> Result<(), RenderError> {
        let shader = material.shader();
        let device = self.device;
        self.observer
            .with_transform(instance.transform(), instance.uv_matrix(), |matrices| {
                shader.on_receive_instance_transform_values(device, matrices)
            })?;
        shader.on_validate()?;
        self.device.draw_elements(Primitive::Triangles)?;
        self.draws += 1;
        Ok(())
    }

    /// Draws every enabled billboard of `billboards` as points.
    pub(crate) fn draw_billboarded(
        &mut self,
        material: &dyn MaterialBinding,
        billboards: &InstanceBillboardedDynamic,
    ) -> Result<(), RenderError> {
        material.shader().on_validate()?;
        billboards.update(self.device)?;
        let count = billboards.enabled_count() as u32;
        if count == 0 {
            return Ok(());
        }
        self.device.bind_array_object(billboards.array_object())?;
        self.device.draw_arrays(Primitive::Points, 0, count)?;
        self.draws += 1;
        Ok(())
    }

    /// Ends the pass, returning the number of draw calls issued.
    pub(crate) fn finish(mut self) -> Result<usize, RenderError> {
        self.material_finish()?;
        self.device.unbind_array_object();
        Ok(self.draws)
    }
}

/// Tracks which internal program is current so that consecutive instances
/// drawn with the same program skip activation and view uploads.
pub(crate) struct ProgramSwitch<'a> {
    device: &'a dyn GraphicsDevice,
    observer: &'a MatricesObserver,
    current: Option<ProgramId>,
}

impl<'a> ProgramSwitch<'a> {
    pub(crate) fn new(device: &'a dyn GraphicsDevice, observer: &'a MatricesObserver) -> Self {
        Self {
            device,
            observer,
            current: None,
        }
    }

    /// Makes `program` current and uploads the view values if it was not
    /// already.
    pub(crate) fn use_program(&mut self, program: &LaneProgram) -> Result<(), RenderError> {
        if self.current == Some(program.id()) {
            return Ok(());
        }
        program.activate(self.device)?;
        program.upload_view_values(self.device, self.observer)?;
        self.current = Some(program.id());
        Ok(())
    }

    /// Uploads the matrices of `instance` to `program`.
    pub(crate) fn upload_instance(
        &self,
        program: &LaneProgram,
        instance: &InstanceSingle,
    ) -> Result<(), RenderError> {
        let device = self.device;
        self.observer
            .with_transform(instance.transform(), instance.uv_matrix(), |matrices| {
                program
                    .upload_instance_values(device, matrices)
                    .map_err(RenderError::from)
            })
    }

    pub(crate) fn finish(self) {
        if self.current.is_some() {
            self.device.deactivate_program();
        }
        self.device.unbind_array_object();
    }
}
