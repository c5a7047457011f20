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

//! Lights and light shaders.
//!
//! Ambient and directional lights cover the whole screen. Spherical and
//! projective lights are volumes: only pixels inside the rasterized volume
//! are shaded.

use crate::id::IdPool;
use crate::math::{Mat4, Quat, Vec3};
use crate::renderer::api::{ArrayObjectId, ProgramId, ProgramSource, TextureId};
use crate::renderer::error::{RenderError, ResourceError, ShaderError};
use crate::renderer::matrices::Projection;
use crate::renderer::shader::ShaderKind;
use crate::renderer::shadow::Shadow;
use crate::renderer::traits::GraphicsDevice;
use crate::scene::transform::SharedTransform;
use std::cell::Cell;

/// A compiled light program.
#[derive(Debug)]
pub struct LightShader {
    id: u64,
    name: String,
    kind: ShaderKind,
    program: ProgramId,
    deleted: Cell<bool>,
}

impl LightShader {
    /// Compiles `source` as a light shader of `kind`.
    ///
    /// ## Errors
    ///
    /// Returns [`ShaderError::ValidationFailed`] if `kind` is not a light
    /// kind, or the device's compilation error.
    pub fn new(
        device: &dyn GraphicsDevice,
        ids: &IdPool,
        kind: ShaderKind,
        source: &ProgramSource,
    ) -> Result<Self, ShaderError> {
        if !kind.is_light() {
            return Err(ShaderError::ValidationFailed {
                program: source.name.clone(),
                reason: format!("{kind:?} is not a light shader kind"),
            });
        }
        let program = device.compile_program(source)?;
        Ok(Self {
            id: ids.fresh_id(),
            name: source.name.clone(),
            kind,
            program,
            deleted: Cell::new(false),
        })
    }

    /// The shader ID.
    pub fn shader_id(&self) -> u64 {
        self.id
    }

    /// The program name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The light kind this shader draws.
    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    /// The compiled program.
    pub fn program(&self) -> ProgramId {
        self.program
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

/// A constant term added to every lit pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbientLight {
    id: u64,
    /// Linear RGB colour.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Optional ambient occlusion texture scaling the term per pixel.
    pub occlusion: Option<TextureId>,
}

impl AmbientLight {
    /// A white ambient light of intensity 1.
    pub fn new(ids: &IdPool) -> Self {
        Self {
            id: ids.fresh_id(),
            color: Vec3::ONE,
            intensity: 1.0,
            occlusion: None,
        }
    }
}

/// An infinitely distant light.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    id: u64,
    /// Linear RGB colour.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// World-space direction the light travels in.
    pub direction: Vec3,
}

impl DirectionalLight {
    /// A white directional light of intensity 1.
    pub fn new(ids: &IdPool, direction: Vec3) -> Self {
        Self {
            id: ids.fresh_id(),
            color: Vec3::ONE,
            intensity: 1.0,
            direction: direction.normalize_or_zero(),
        }
    }
}

/// A point light bounded by a sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct SphericalLight {
    id: u64,
    /// Linear RGB colour.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// World-space center.
    pub position: Vec3,
    /// Distance at which the contribution reaches zero.
    pub radius: f32,
    /// Attenuation exponent.
    pub falloff: f32,
    /// A unit sphere mesh drawn as the light volume.
    pub volume: ArrayObjectId,
}

impl SphericalLight {
    /// A white spherical light of intensity 1 and linear falloff.
    pub fn new(ids: &IdPool, volume: ArrayObjectId, position: Vec3, radius: f32) -> Self {
        Self {
            id: ids.fresh_id(),
            color: Vec3::ONE,
            intensity: 1.0,
            position,
            radius,
            falloff: 1.0,
            volume,
        }
    }
}

/// A light projecting an image through a frustum, optionally shadowed.
#[derive(Debug, Clone)]
pub struct ProjectiveLight {
    id: u64,
    /// Linear RGB colour.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Position and orientation of the light.
    pub transform: SharedTransform,
    /// The projection through which the image is cast.
    pub projection: Projection,
    /// The projected image.
    pub image: TextureId,
    /// Attenuation exponent.
    pub falloff: f32,
    /// A frustum mesh matching `projection`, drawn as the light volume.
    pub volume: ArrayObjectId,
    /// An optional shadow.
    pub shadow: Option<Shadow>,
}

impl ProjectiveLight {
    /// A white, unshadowed projective light of intensity 1.
    pub fn new(
        ids: &IdPool,
        volume: ArrayObjectId,
        transform: SharedTransform,
        projection: Projection,
        image: TextureId,
    ) -> Self {
        Self {
            id: ids.fresh_id(),
            color: Vec3::ONE,
            intensity: 1.0,
            transform,
            projection,
            image,
            falloff: 1.0,
            volume,
            shadow: None,
        }
    }

    /// The distance at which the contribution reaches zero.
    pub fn radius(&self) -> f32 {
        self.projection.far()
    }
}

/// Any light.
#[derive(Debug, Clone)]
pub enum Light {
    /// Full-screen ambient term.
    Ambient(AmbientLight),
    /// Full-screen directional light.
    Directional(DirectionalLight),
    /// Spherical volume light.
    Spherical(SphericalLight),
    /// Projective volume light.
    Projective(ProjectiveLight),
}

impl Light {
    /// The light ID.
    pub fn id(&self) -> u64 {
        match self {
            Light::Ambient(l) => l.id,
            Light::Directional(l) => l.id,
            Light::Spherical(l) => l.id,
            Light::Projective(l) => l.id,
        }
    }

    /// The light colour.
    pub fn color(&self) -> Vec3 {
        match self {
            Light::Ambient(l) => l.color,
            Light::Directional(l) => l.color,
            Light::Spherical(l) => l.color,
            Light::Projective(l) => l.color,
        }
    }

    /// The light intensity.
    pub fn intensity(&self) -> f32 {
        match self {
            Light::Ambient(l) => l.intensity,
            Light::Directional(l) => l.intensity,
            Light::Spherical(l) => l.intensity,
            Light::Projective(l) => l.intensity,
        }
    }

    /// The shader kind able to draw this light.
    pub fn shader_kind(&self) -> ShaderKind {
        match self {
            Light::Ambient(_) => ShaderKind::AmbientLight,
            Light::Directional(_) => ShaderKind::DirectionalLight,
            Light::Spherical(_) => ShaderKind::SphericalLight,
            Light::Projective(_) => ShaderKind::ProjectiveLight,
        }
    }

    /// The volume mesh of a volume light, `None` for full-screen lights.
    pub fn volume(&self) -> Option<ArrayObjectId> {
        match self {
            Light::Ambient(_) | Light::Directional(_) => None,
            Light::Spherical(l) => Some(l.volume),
            Light::Projective(l) => Some(l.volume),
        }
    }

    /// The model matrix of the volume mesh.
    pub fn volume_matrix(&self) -> Option<Mat4> {
        match self {
            Light::Ambient(_) | Light::Directional(_) => None,
            Light::Spherical(l) => Some(Mat4::from_scale_rotation_translation(
                Vec3::splat(l.radius),
                Quat::IDENTITY,
                l.position,
            )),
            Light::Projective(l) => Some(l.transform.matrix()),
        }
    }

    /// The light's shadow, if it casts one.
    pub fn shadow(&self) -> Option<&Shadow> {
        match self {
            Light::Projective(l) => l.shadow.as_ref(),
            _ => None,
        }
    }
}

/// Rejects `shader` unless it can draw `light`.
pub fn check_light_shader(light: &Light, shader: &LightShader) -> Result<(), RenderError> {
    let expected = light.shader_kind();
    if shader.kind() != expected {
        return Err(RenderError::ShaderKindMismatch {
            expected,
            found: shader.kind(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGraphicsDevice;
    use approx::assert_relative_eq;

    fn source() -> ProgramSource {
        ProgramSource {
            name: "light".to_string(),
            vertex: String::new(),
            geometry: None,
            fragment: String::new(),
        }
    }

    #[test]
    fn light_shaders_must_have_a_light_kind() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        assert!(LightShader::new(&device, &ids, ShaderKind::SingleDepth, &source()).is_err());
        let shader = LightShader::new(&device, &ids, ShaderKind::SphericalLight, &source()).unwrap();

        let light = Light::Spherical(SphericalLight::new(&ids, ArrayObjectId(1), Vec3::ZERO, 2.0));
        assert!(check_light_shader(&light, &shader).is_ok());
        let ambient = Light::Ambient(AmbientLight::new(&ids));
        assert!(matches!(
            check_light_shader(&ambient, &shader),
            Err(RenderError::ShaderKindMismatch { .. })
        ));
    }

    #[test]
    fn spherical_volume_is_scaled_by_radius() {
        let ids = IdPool::new();
        let light = Light::Spherical(SphericalLight::new(
            &ids,
            ArrayObjectId(1),
            Vec3::new(0.0, 1.0, 0.0),
            3.0,
        ));
        let m = light.volume_matrix().unwrap();
        let p = m.transform_point3(Vec3::X);
        assert_relative_eq!(p.x, 3.0);
        assert_relative_eq!(p.y, 1.0);
        assert!(light.shadow().is_none());
        assert!(Light::Ambient(AmbientLight::new(&ids)).volume().is_none());
    }
}
