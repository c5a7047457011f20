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

//! Instance shaders, their parameter bundles and source providers.
//!
//! A shader is a compiled program tagged with the [`ShaderKind`] of instance
//! it can draw. Passes drive every shader through the same lifecycle:
//! activate, receive view values, receive material values, receive instance
//! values (single instances only), validate, deactivate.

use crate::id::IdPool;
use crate::renderer::api::{ProgramId, ProgramSource, UniformValue};
use crate::renderer::error::{RenderError, ResourceError, ShaderError};
use crate::renderer::matrices::{MatricesInstance, MatricesObserver};
use crate::renderer::texture_unit::TextureUnitContext;
use crate::renderer::traits::GraphicsDevice;
use ahash::AHashMap;
use std::cell::Cell;
use std::fmt::{self, Debug};
use std::marker::PhantomData;

/// What a shader can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Single instances into the geometry buffer.
    SingleGeometry,
    /// Batched instances into the geometry buffer.
    BatchedGeometry,
    /// Single instances into a depth or depth-variance target.
    SingleDepth,
    /// Batched instances into a depth or depth-variance target.
    BatchedDepth,
    /// Single translucent instances.
    SingleTranslucent,
    /// Batched translucent instances.
    BatchedTranslucent,
    /// Billboarded translucent instances.
    BillboardedTranslucent,
    /// Full-screen ambient lights.
    AmbientLight,
    /// Full-screen directional lights.
    DirectionalLight,
    /// Spherical volume lights.
    SphericalLight,
    /// Projective volume lights.
    ProjectiveLight,
}

impl ShaderKind {
    /// Returns `true` for kinds that draw one instance at a time and
    /// therefore receive per-instance transform values.
    pub fn is_single(&self) -> bool {
        matches!(
            self,
            ShaderKind::SingleGeometry | ShaderKind::SingleDepth | ShaderKind::SingleTranslucent
        )
    }

    /// Returns `true` for light shader kinds.
    pub fn is_light(&self) -> bool {
        matches!(
            self,
            ShaderKind::AmbientLight
                | ShaderKind::DirectionalLight
                | ShaderKind::SphericalLight
                | ShaderKind::ProjectiveLight
        )
    }
}

/// Uniform names shared by every provided program.
pub mod uniforms {
    /// Observer projection matrix.
    pub const PROJECTION: &str = "transform_projection";
    /// Observer view matrix.
    pub const VIEW: &str = "transform_view";
    /// Inverse observer view matrix.
    pub const VIEW_INVERSE: &str = "transform_view_inverse";
    /// Per-instance model-view matrix.
    pub const MODEL_VIEW: &str = "transform_modelview";
    /// Per-instance normal matrix.
    pub const NORMAL: &str = "transform_normal";
    /// Per-instance texture coordinate matrix.
    pub const UV: &str = "transform_uv";
    /// Observer depth coefficient used for logarithmic depth.
    pub const DEPTH_COEFFICIENT: &str = "depth_coefficient";
}

/// A bundle of material values a shader uploads for each material.
pub trait ShaderParameters: Debug + 'static {
    /// Uploads the values, binding any texture through `units`.
    fn upload(
        &self,
        device: &dyn GraphicsDevice,
        program: ProgramId,
        units: &TextureUnitContext,
    ) -> Result<(), RenderError>;
}

impl ShaderParameters for () {
    fn upload(
        &self,
        _device: &dyn GraphicsDevice,
        _program: ProgramId,
        _units: &TextureUnitContext,
    ) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Resolves program sources by name.
pub trait ShaderSourceProvider {
    /// Returns the source for `name`.
    ///
    /// ## Errors
    ///
    /// Returns [`ShaderError::SourceNotFound`] for unknown names.
    fn program_source(&self, name: &str) -> Result<ProgramSource, ShaderError>;
}

/// A [`ShaderSourceProvider`] backed by a map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryShaderSources {
    sources: AHashMap<String, ProgramSource>,
}

impl InMemoryShaderSources {
    /// An empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source` under its own name, replacing any previous entry.
    pub fn insert(&mut self, source: ProgramSource) -> &mut Self {
        self.sources.insert(source.name.clone(), source);
        self
    }
}

impl ShaderSourceProvider for InMemoryShaderSources {
    fn program_source(&self, name: &str) -> Result<ProgramSource, ShaderError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| ShaderError::SourceNotFound {
                name: name.to_string(),
            })
    }
}

/// The object-safe face of a shader, used by scenes and passes that do not
/// care about its parameter type.
pub trait ShaderBinding: Debug {
    /// The shader's unique ID.
    fn shader_id(&self) -> u64;
    /// What the shader draws.
    fn kind(&self) -> ShaderKind;
    /// The compiled program.
    fn program(&self) -> ProgramId;
    /// Makes the program current and starts a lifecycle.
    fn on_activate(&self, device: &dyn GraphicsDevice) -> Result<(), RenderError>;
    /// Uploads observer values.
    fn on_receive_view_values(
        &self,
        device: &dyn GraphicsDevice,
        observer: &MatricesObserver,
    ) -> Result<(), RenderError>;
    /// Uploads per-instance transform values.
    fn on_receive_instance_transform_values(
        &self,
        device: &dyn GraphicsDevice,
        instance: &MatricesInstance,
    ) -> Result<(), RenderError>;
    /// Checks that every required step of the lifecycle happened since the
    /// last material or instance was drawn.
    fn on_validate(&self) -> Result<(), ShaderError>;
    /// Ends the lifecycle.
    fn on_deactivate(&self, device: &dyn GraphicsDevice);
}

#[derive(Debug, Default)]
struct Lifecycle {
    active: Cell<bool>,
    view: Cell<bool>,
    material: Cell<bool>,
    instance: Cell<bool>,
}

/// A compiled program drawing instances with parameters of type `P`.
pub struct InstanceShader<P: ShaderParameters> {
    id: u64,
    name: String,
    kind: ShaderKind,
    program: ProgramId,
    lifecycle: Lifecycle,
    deleted: Cell<bool>,
    _parameters: PhantomData<fn(&P)>,
}

impl<P: ShaderParameters> Debug for InstanceShader<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceShader")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("program", &self.program)
            .finish()
    }
}

impl<P: ShaderParameters> InstanceShader<P> {
    /// Compiles `source` into a shader of the given kind.
    ///
    /// ## Errors
    ///
    /// Returns the device's compilation error, carrying the source location
    /// when the backend reports one.
    pub fn new(
        device: &dyn GraphicsDevice,
        ids: &IdPool,
        kind: ShaderKind,
        source: &ProgramSource,
    ) -> Result<Self, ShaderError> {
        let program = device.compile_program(source)?;
        let id = ids.fresh_id();
        log::debug!(
            "InstanceShader: compiled '{}' as {:?} (id {})",
            source.name,
            kind,
            id
        );
        Ok(Self {
            id,
            name: source.name.clone(),
            kind,
            program,
            lifecycle: Lifecycle::default(),
            deleted: Cell::new(false),
            _parameters: PhantomData,
        })
    }

    /// Resolves `name` through `sources` and compiles it.
    pub fn from_provider(
        device: &dyn GraphicsDevice,
        ids: &IdPool,
        kind: ShaderKind,
        sources: &dyn ShaderSourceProvider,
        name: &str,
    ) -> Result<Self, ShaderError> {
        let source = sources.program_source(name)?;
        Self::new(device, ids, kind, &source)
    }

    /// The program name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uploads a material's parameters.
    pub fn on_receive_material_values(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        parameters: &P,
    ) -> Result<(), RenderError> {
        parameters.upload(device, self.program, units)?;
        self.lifecycle.material.set(true);
        self.lifecycle.instance.set(false);
        Ok(())
    }

    /// Deletes the program. Deleting twice does nothing.
    pub fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        device.destroy_program(self.program)
    }

    /// Returns `true` once the shader was deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

impl<P: ShaderParameters> ShaderBinding for InstanceShader<P> {
    fn shader_id(&self) -> u64 {
        self.id
    }

    fn kind(&self) -> ShaderKind {
        self.kind
    }

    fn program(&self) -> ProgramId {
        self.program
    }

    fn on_activate(&self, device: &dyn GraphicsDevice) -> Result<(), RenderError> {
        if self.is_deleted() {
            return Err(ResourceError::Deleted("shader").into());
        }
        device.activate_program(self.program)?;
        self.lifecycle.active.set(true);
        self.lifecycle.view.set(false);
        self.lifecycle.material.set(false);
        self.lifecycle.instance.set(false);
        Ok(())
    }

    fn on_receive_view_values(
        &self,
        device: &dyn GraphicsDevice,
        observer: &MatricesObserver,
    ) -> Result<(), RenderError> {
        upload_view_values(device, self.program, observer)?;
        self.lifecycle.view.set(true);
        Ok(())
    }

    fn on_receive_instance_transform_values(
        &self,
        device: &dyn GraphicsDevice,
        instance: &MatricesInstance,
    ) -> Result<(), RenderError> {
        device.set_uniform(
            self.program,
            uniforms::MODEL_VIEW,
            UniformValue::Mat4(instance.model_view()),
        )?;
        device.set_uniform(
            self.program,
            uniforms::NORMAL,
            UniformValue::Mat3(instance.normal()),
        )?;
        device.set_uniform(self.program, uniforms::UV, UniformValue::Mat3(instance.uv()))?;
        self.lifecycle.instance.set(true);
        Ok(())
    }

    fn on_validate(&self) -> Result<(), ShaderError> {
        let missing = if !self.lifecycle.active.get() {
            Some("shader was not activated")
        } else if !self.lifecycle.view.get() {
            Some("view values were not received")
        } else if !self.lifecycle.material.get() {
            Some("material values were not received")
        } else if self.kind.is_single() && !self.lifecycle.instance.get() {
            Some("instance transform values were not received")
        } else {
            None
        };
        match missing {
            Some(reason) => Err(ShaderError::ValidationFailed {
                program: self.name.clone(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn on_deactivate(&self, device: &dyn GraphicsDevice) {
        device.deactivate_program();
        self.lifecycle.active.set(false);
    }
}

/// Uploads the observer uniforms every provided program declares.
pub fn upload_view_values(
    device: &dyn GraphicsDevice,
    program: ProgramId,
    observer: &MatricesObserver,
) -> Result<(), ShaderError> {
    device.set_uniform(
        program,
        uniforms::PROJECTION,
        UniformValue::Mat4(observer.projection_matrix()),
    )?;
    device.set_uniform(program, uniforms::VIEW, UniformValue::Mat4(observer.view()))?;
    device.set_uniform(
        program,
        uniforms::VIEW_INVERSE,
        UniformValue::Mat4(observer.view_inverse()),
    )?;
    device.set_uniform(
        program,
        uniforms::DEPTH_COEFFICIENT,
        UniformValue::Float(observer.depth_coefficient()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGraphicsDevice;

    fn source(name: &str, fragment: &str) -> ProgramSource {
        ProgramSource {
            name: name.to_string(),
            vertex: "void main() {}".to_string(),
            geometry: None,
            fragment: fragment.to_string(),
        }
    }

    #[test]
    fn provider_reports_unknown_sources() {
        let mut sources = InMemoryShaderSources::new();
        sources.insert(source("depth_single", "void main() {}"));
        assert!(sources.program_source("depth_single").is_ok());
        assert!(matches!(
            sources.program_source("missing"),
            Err(ShaderError::SourceNotFound { name }) if name == "missing"
        ));
    }

    #[test]
    fn compile_errors_propagate() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let result = InstanceShader::<()>::new(
            &device,
            &ids,
            ShaderKind::SingleDepth,
            &source("broken", "syntax error"),
        );
        assert!(matches!(result, Err(ShaderError::CompileError { .. })));
        assert_eq!(ids.fresh_id(), 0);
    }

    #[test]
    fn validation_tracks_the_lifecycle() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let shader = InstanceShader::<()>::new(
            &device,
            &ids,
            ShaderKind::BatchedGeometry,
            &source("geometry_batched", "void main() {}"),
        )
        .unwrap();

        assert!(shader.on_validate().is_err());
        shader.on_activate(&device).unwrap();
        assert!(shader.on_validate().is_err());
        shader.lifecycle.view.set(true);
        shader.lifecycle.material.set(true);
        assert!(shader.on_validate().is_ok());
        shader.on_deactivate(&device);
    }

    #[test]
    fn single_kinds_need_instance_values() {
        assert!(ShaderKind::SingleTranslucent.is_single());
        assert!(!ShaderKind::BillboardedTranslucent.is_single());
        assert!(ShaderKind::ProjectiveLight.is_light());
    }
}
