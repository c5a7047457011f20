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

use crate::id::IdPool;
use crate::math::Mat3;
use crate::renderer::api::ArrayObjectId;
use crate::scene::transform::SharedTransform;

/// A single mesh drawn with its own transform.
#[derive(Debug, Clone)]
pub struct InstanceSingle {
    id: u64,
    array_object: ArrayObjectId,
    transform: SharedTransform,
    uv_matrix: Mat3,
}

impl InstanceSingle {
    /// Creates an instance of the mesh in `array_object`.
    pub fn new(ids: &IdPool, array_object: ArrayObjectId, transform: SharedTransform) -> Self {
        Self {
            id: ids.fresh_id(),
            array_object,
            transform,
            uv_matrix: Mat3::IDENTITY,
        }
    }

    /// Replaces the texture coordinate matrix.
    pub fn with_uv_matrix(mut self, uv_matrix: Mat3) -> Self {
        self.uv_matrix = uv_matrix;
        self
    }

    /// The instance ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The mesh.
    pub fn array_object(&self) -> ArrayObjectId {
        self.array_object
    }

    /// The transform, shared with whoever else holds it.
    pub fn transform(&self) -> &SharedTransform {
        &self.transform
    }

    /// The texture coordinate matrix.
    pub fn uv_matrix(&self) -> Mat3 {
        self.uv_matrix
    }
}
