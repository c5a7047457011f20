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
//! Programs compiled and owned by lanes.

use std::cell::Cell;
use umbra_core::renderer::api::{ProgramId, ProgramSource, TextureUnit, UniformValue};
use umbra_core::renderer::error::{RenderError, ResourceError, ShaderError};
use umbra_core::renderer::matrices::{MatricesInstance, MatricesObserver};
use umbra_core::renderer::shader::{upload_view_values, uniforms};
use umbra_core::renderer::traits::GraphicsDevice;

/// A program a lane compiled for its own use, as opposed to the material
/// shaders supplied by the caller.
#[derive(Debug)]
pub struct LaneProgram {
    name: String,
    program: ProgramId,
    deleted: Cell<bool>,
}

impl LaneProgram {
    /// Compiles `source`.
    ///
    /// ## Errors
    ///
    /// Returns the device's compilation error.
    pub fn compile(device: &dyn GraphicsDevice, source: &ProgramSource) -> Result<Self, ShaderError> {
        let program = device.compile_program(source)?;
        log::debug!("LaneProgram: compiled '{}' as {:?}", source.name, program);
        Ok(Self {
            name: source.name.clone(),
            program,
            deleted: Cell::new(false),
        })
    }

    /// The program name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The compiled program.
    pub fn id(&self) -> ProgramId {
        self.program
    }

    /// Makes the program current.
    pub fn activate(&self, device: &dyn GraphicsDevice) -> Result<(), RenderError> {
        if self.is_deleted() {
            return Err(ResourceError::Deleted("lane program").into());
        }
        device.activate_program(self.program)?;
        Ok(())
    }

    /// Uploads one uniform.
    pub fn set(
        &self,
        device: &dyn GraphicsDevice,
        name: &str,
        value: UniformValue,
    ) -> Result<(), ShaderError> {
        device.set_uniform(self.program, name, value)
    }

    /// Points a sampler uniform at `unit`.
    pub fn set_texture(
        &self,
        device: &dyn GraphicsDevice,
        name: &str,
        unit: TextureUnit,
    ) -> Result<(), ShaderError> {
        device.set_uniform(self.program, name, UniformValue::Texture(unit))
    }

    /// Uploads the observer's projection, view and depth coefficient.
    pub fn upload_view_values(
        &self,
        device: &dyn GraphicsDevice,
        observer: &MatricesObserver,
    ) -> Result<(), ShaderError> {
        upload_view_values(device, self.program, observer)
    }

    /// Uploads the model-view, normal and UV matrices of one instance.
    pub fn upload_instance_values(
        &self,
        device: &dyn GraphicsDevice,
        instance: &MatricesInstance,
    ) -> Result<(), ShaderError> {
        self.set(device, uniforms::MODEL_VIEW, UniformValue::Mat4(instance.model_view()))?;
        self.set(device, uniforms::NORMAL, UniformValue::Mat3(instance.normal()))?;
        self.set(device, uniforms::UV, UniformValue::Mat3(instance.uv()))
    }

    /// Deletes the program. Deleting twice does nothing.
    pub fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        device.destroy_program(self.program)
    }

    /// Returns `true` once the program was deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

/// Deletes every program in `programs`, logging failures on behalf of
/// `owner`. Every program is attempted; the first failure is returned.
pub(crate) fn delete_programs<'a>(
    device: &dyn GraphicsDevice,
    owner: &str,
    programs: impl IntoIterator<Item = &'a LaneProgram>,
) -> Result<(), ResourceError> {
    let mut first_error = None;
    for program in programs {
        if let Err(e) = program.delete(device) {
            log::warn!("{}: Failed to destroy program '{}': {:?}", owner, program.name(), e);
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Compiles the programs of a lane under construction, deleting those already
/// compiled if a later one fails.
pub(crate) struct LaneProgramBuilder<'d> {
    device: &'d dyn GraphicsDevice,
    compiled: Vec<ProgramId>,
}

impl<'d> LaneProgramBuilder<'d> {
    pub(crate) fn new(device: &'d dyn GraphicsDevice) -> Self {
        Self {
            device,
            compiled: Vec::new(),
        }
    }

    pub(crate) fn compile(&mut self, source: &ProgramSource) -> Result<LaneProgram, ShaderError> {
        let program = LaneProgram::compile(self.device, source)?;
        self.compiled.push(program.id());
        Ok(program)
    }

    /// Hands ownership of every compiled program to the lane.
    pub(crate) fn finish(mut self) {
        self.compiled.clear();
    }
}

impl Drop for LaneProgramBuilder<'_> {
    fn drop(&mut self) {
        for program in self.compiled.drain(..) {
            if let Err(e) = self.device.destroy_program(program) {
                log::warn!(
                    "LaneProgramBuilder: Failed to destroy partial program {:?}: {:?}",
                    program,
                    e
                );
            }
        }
    }
}
