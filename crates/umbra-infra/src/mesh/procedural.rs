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

use umbra_core::renderer::mesh::{MeshData, MeshError, MeshLoader};

/// Builds the renderer's procedural primitives by name.
///
/// Known names: `quad`, `cube`, `sphere` (32 segments, 16 rings) and
/// `sphere-low` (12 segments, 8 rings, used for light volumes).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProceduralMeshLoader;

impl MeshLoader for ProceduralMeshLoader {
    fn load(&self, name: &str) -> Result<MeshData, MeshError> {
        match name {
            "quad" => Ok(MeshData::unit_quad()),
            "cube" => Ok(MeshData::cube()),
            "sphere" => Ok(MeshData::sphere(32, 16)),
            "sphere-low" => Ok(MeshData::sphere(12, 8)),
            _ => Err(MeshError::NotFound {
                name: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_primitives_are_valid() {
        for name in ["quad", "cube", "sphere", "sphere-low"] {
            let mesh = ProceduralMeshLoader.load(name).unwrap();
            mesh.validate().unwrap();
            assert!(!mesh.indices.is_empty(), "{name}");
        }
    }

    #[test]
    fn unknown_names_are_not_found() {
        assert!(matches!(
            ProceduralMeshLoader.load("teapot"),
            Err(MeshError::NotFound { name }) if name == "teapot"
        ));
    }
}
