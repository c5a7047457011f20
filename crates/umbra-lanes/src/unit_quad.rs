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
use std::cell::Cell;
use umbra_core::renderer::api::{ArrayObjectId, Primitive};
use umbra_core::renderer::error::ResourceError;
use umbra_core::renderer::mesh::{MeshData, MeshError};
use umbra_core::renderer::traits::GraphicsDevice;

/// The full-screen quad shared by every filter and full-screen light.
#[derive(Debug)]
pub struct UnitQuad {
    array_object: ArrayObjectId,
    deleted: Cell<bool>,
}

impl UnitQuad {
    /// Uploads the quad.
    pub fn new(device: &dyn GraphicsDevice) -> Result<Self, ResourceError> {
        let array_object = MeshData::unit_quad()
            .upload(device, "unit-quad")
            .map_err(|e| match e {
                MeshError::Resource(e) => e,
                other => ResourceError::BackendError(other.to_string()),
            })?;
        Ok(Self {
            array_object,
            deleted: Cell::new(false),
        })
    }

    /// The quad's array object.
    pub fn array_object(&self) -> ArrayObjectId {
        self.array_object
    }

    /// Binds the quad and draws it with the current program and state.
    pub fn draw(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.is_deleted() {
            return Err(ResourceError::Deleted("unit quad"));
        }
        device.bind_array_object(self.array_object)?;
        device.draw_elements(Primitive::Triangles)
    }

    /// Deletes the quad. Deleting twice does nothing.
    pub fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        device.destroy_array_object(self.array_object)
    }

    /// Returns `true` once the quad was deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}
