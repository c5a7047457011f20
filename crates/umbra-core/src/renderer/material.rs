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

//! Materials: a shader paired with one set of its parameters.

use crate::id::IdPool;
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::shader::{InstanceShader, ShaderBinding, ShaderKind, ShaderParameters};
use crate::renderer::texture_unit::TextureUnitContext;
use crate::renderer::traits::GraphicsDevice;
use std::fmt::Debug;
use std::rc::Rc;

/// A shader together with the parameters it draws with.
#[derive(Debug)]
pub struct Material<P: ShaderParameters> {
    id: u64,
    shader: Rc<InstanceShader<P>>,
    parameters: P,
}

impl<P: ShaderParameters> Material<P> {
    /// Creates a material with a fresh ID.
    pub fn new(ids: &IdPool, shader: Rc<InstanceShader<P>>, parameters: P) -> Self {
        Self {
            id: ids.fresh_id(),
            shader,
            parameters,
        }
    }

    /// The typed shader.
    pub fn instance_shader(&self) -> &Rc<InstanceShader<P>> {
        &self.shader
    }

    /// The parameters.
    pub fn parameters(&self) -> &P {
        &self.parameters
    }

    /// Mutable access to the parameters.
    pub fn parameters_mut(&mut self) -> &mut P {
        &mut self.parameters
    }
}

/// The object-safe face of a [`Material`].
///
/// Scenes store materials of any parameter type behind this trait.
pub trait MaterialBinding: Debug {
    /// The material's unique ID.
    fn material_id(&self) -> u64;

    /// The material's shader.
    fn shader(&self) -> &dyn ShaderBinding;

    /// Uploads the material's values into its (active) shader.
    fn on_receive_material_values(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
    ) -> Result<(), RenderError>;
}

impl<P: ShaderParameters> MaterialBinding for Material<P> {
    fn material_id(&self) -> u64 {
        self.id
    }

    fn shader(&self) -> &dyn ShaderBinding {
        self.shader.as_ref()
    }

    fn on_receive_material_values(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
    ) -> Result<(), RenderError> {
        if self.shader.is_deleted() {
            return Err(ResourceError::Deleted("shader").into());
        }
        self.shader
            .on_receive_material_values(device, units, &self.parameters)
    }
}

/// Rejects `material` unless its shader is of the `expected` kind.
pub fn check_kind(material: &dyn MaterialBinding, expected: ShaderKind) -> Result<(), RenderError> {
    let found = material.shader().kind();
    if found != expected {
        return Err(RenderError::ShaderKindMismatch { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGraphicsDevice;
    use crate::renderer::api::ProgramSource;

    #[test]
    fn kind_mismatch_is_reported() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let source = ProgramSource {
            name: "depth".to_string(),
            vertex: String::new(),
            geometry: None,
            fragment: String::new(),
        };
        let shader =
            Rc::new(InstanceShader::<()>::new(&device, &ids, ShaderKind::SingleDepth, &source).unwrap());
        let material = Material::new(&ids, shader, ());

        assert!(check_kind(&material, ShaderKind::SingleDepth).is_ok());
        assert!(matches!(
            check_kind(&material, ShaderKind::BatchedDepth),
            Err(RenderError::ShaderKindMismatch {
                expected: ShaderKind::BatchedDepth,
                found: ShaderKind::SingleDepth,
            })
        ));
        assert_ne!(material.material_id(), material.shader().shader_id());
    }
}
