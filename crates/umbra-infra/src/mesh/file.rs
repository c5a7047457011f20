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

use std::io;
use std::path::{Path, PathBuf};
use umbra_core::renderer::mesh::{MeshData, MeshError, MeshLoader};

/// Loads `<root>/<name>.ron` files holding serialized [`MeshData`].
#[derive(Debug, Clone)]
pub struct RonMeshLoader {
    root: PathBuf,
}

impl RonMeshLoader {
    /// Creates a loader reading from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory meshes are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.ron"))
    }
}

impl MeshLoader for RonMeshLoader {
    fn load(&self, name: &str) -> Result<MeshData, MeshError> {
        let path = self.path_of(name);
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MeshError::NotFound {
                name: name.to_string(),
            },
            _ => MeshError::LoaderFailed(format!("{}: {e}", path.display())),
        })?;
        let mesh: MeshData = ron::from_str(&text).map_err(|e| MeshError::Invalid {
            reason: format!("{}: {e}", path.display()),
        })?;
        mesh.validate()?;
        log::debug!(
            "RonMeshLoader: loaded '{}' ({} vertices)",
            name,
            mesh.vertices.len()
        );
        Ok(mesh)
    }
}
