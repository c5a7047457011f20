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

//! Mesh data, procedural primitives and the loader contracts.
//!
//! Mesh file formats live outside the renderer. Loaders produce
//! [`MeshData`], which is uploaded into an array object through the device.

use crate::renderer::api::{ArrayObjectDescriptor, ArrayObjectId, ArrayObjectSource};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use async_trait::async_trait;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;

/// One interleaved vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
    /// Texture coordinates.
    pub uv: [f32; 2],
    /// Tangent, with the bitangent sign in `w`.
    pub tangent: [f32; 4],
}

/// Vertices and triangle indices of a mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    /// The vertices.
    pub vertices: Vec<Vertex>,
    /// Three indices per triangle.
    pub indices: Vec<u32>,
}

/// An error raised while loading or uploading a mesh.
#[derive(Debug)]
pub enum MeshError {
    /// No mesh exists under the requested name.
    NotFound {
        /// The requested name.
        name: String,
    },
    /// The mesh data is malformed.
    Invalid {
        /// What is wrong with it.
        reason: String,
    },
    /// Uploading the mesh failed.
    Resource(ResourceError),
    /// The loader could not finish its work.
    LoaderFailed(String),
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::NotFound { name } => write!(f, "Mesh '{name}' not found"),
            MeshError::Invalid { reason } => write!(f, "Invalid mesh: {reason}"),
            MeshError::Resource(err) => write!(f, "Mesh upload failed: {err}"),
            MeshError::LoaderFailed(msg) => write!(f, "Mesh loader failed: {msg}"),
        }
    }
}

impl std::error::Error for MeshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MeshError::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for MeshError {
    fn from(err: ResourceError) -> Self {
        MeshError::Resource(err)
    }
}

impl MeshData {
    /// The stride of one vertex in bytes.
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;

    /// A quad covering `[-1, 1]` on X and Y, facing +Z. Filters draw it to
    /// cover the whole viewport.
    pub fn unit_quad() -> Self {
        let corners = [
            ([-1.0, -1.0], [0.0, 0.0]),
            ([1.0, -1.0], [1.0, 0.0]),
            ([1.0, 1.0], [1.0, 1.0]),
            ([-1.0, 1.0], [0.0, 1.0]),
        ];
        let vertices = corners
            .iter()
            .map(|([x, y], uv)| Vertex {
                position: [*x, *y, 0.0],
                normal: [0.0, 0.0, 1.0],
                uv: *uv,
                tangent: [1.0, 0.0, 0.0, 1.0],
            })
            .collect();
        Self {
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// An axis-aligned cube of half-extent 1 with per-face normals.
    pub fn cube() -> Self {
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let mut mesh = MeshData::default();
        for (normal, u, v) in faces {
            let base = mesh.vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = [
                    normal[0] + u[0] * su + v[0] * sv,
                    normal[1] + u[1] * su + v[1] * sv,
                    normal[2] + u[2] * su + v[2] * sv,
                ];
                mesh.vertices.push(Vertex {
                    position,
                    normal,
                    uv: [(su + 1.0) * 0.5, (sv + 1.0) * 0.5],
                    tangent: [u[0], u[1], u[2], 1.0],
                });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// A UV sphere of radius 1, used as the volume of spherical lights.
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = MeshData::default();
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = u * 2.0 * PI;
                let normal = [theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()];
                mesh.vertices.push(Vertex {
                    position: normal,
                    normal,
                    uv: [u, v],
                    tangent: [-phi.sin(), 0.0, phi.cos(), 1.0],
                });
            }
        }
        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                mesh.indices
                    .extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        mesh
    }

    /// Checks that the indices describe whole triangles over existing
    /// vertices.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.indices.len() % 3 != 0 {
            return Err(MeshError::Invalid {
                reason: format!("{} indices do not form whole triangles", self.indices.len()),
            });
        }
        let count = self.vertices.len() as u32;
        if let Some(index) = self.indices.iter().find(|i| **i >= count) {
            return Err(MeshError::Invalid {
                reason: format!("index {index} out of range for {count} vertices"),
            });
        }
        Ok(())
    }

    /// Validates the mesh and uploads it into a new array object.
    pub fn upload(&self, device: &dyn GraphicsDevice, label: &str) -> Result<ArrayObjectId, MeshError> {
        self.validate()?;
        let id = device.create_array_object(&ArrayObjectDescriptor {
            label: Some(label.to_owned().into()),
            source: ArrayObjectSource::Mesh {
                vertices: bytemuck::cast_slice(&self.vertices),
                stride: Self::STRIDE,
                indices: &self.indices,
            },
        })?;
        log::debug!(
            "MeshData: uploaded '{}' ({} vertices, {} triangles)",
            label,
            self.vertices.len(),
            self.indices.len() / 3
        );
        Ok(id)
    }
}

/// Loads meshes by name on the calling thread.
pub trait MeshLoader {
    /// Loads the mesh called `name`.
    fn load(&self, name: &str) -> Result<MeshData, MeshError>;
}

/// Loads meshes by name without blocking the caller.
#[async_trait]
pub trait AsyncMeshLoader: Send + Sync {
    /// Loads the mesh called `name`.
    async fn load(&self, name: &str) -> Result<MeshData, MeshError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_is_twelve_floats() {
        assert_eq!(MeshData::STRIDE, 48);
    }

    #[test]
    fn primitives_are_valid() {
        assert!(MeshData::unit_quad().validate().is_ok());
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.validate().is_ok());
        let sphere = MeshData::sphere(8, 4);
        assert_eq!(sphere.indices.len(), 8 * 4 * 6);
        assert!(sphere.validate().is_ok());
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mesh = MeshData {
            vertices: MeshData::unit_quad().vertices,
            indices: vec![0, 1, 4],
        };
        assert!(matches!(mesh.validate(), Err(MeshError::Invalid { .. })));
        let ragged = MeshData {
            indices: vec![0, 1],
            ..MeshData::unit_quad()
        };
        assert!(ragged.validate().is_err());
    }
}
