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

//! Scene containers and the callback protocols passes drive over them.
//!
//! A container is filled by the caller every frame, then handed to a pass
//! which calls `visit` with a consumer. Every consumer method returns a
//! `Result`; the first error aborts the rest of the sequence and is returned
//! from `visit`.
//!
//! Materials are grouped under their shader so that a pass switches shader
//! as rarely as possible, then material, then per-instance state.

pub mod depth;
pub mod instance;
pub mod lights;
pub mod mask;
pub mod opaques;
pub mod stencils;
pub mod transform;
pub mod translucents;

pub use self::depth::*;
pub use self::lights::*;
pub use self::mask::*;
pub use self::opaques::*;
pub use self::stencils::*;
pub use self::translucents::*;

use crate::renderer::material::MaterialBinding;
use crate::renderer::shader::ShaderBinding;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Instances of one material.
#[derive(Debug)]
pub struct MaterialGroup<I> {
    material: Rc<dyn MaterialBinding>,
    instances: Vec<I>,
}

impl<I> MaterialGroup<I> {
    /// The material.
    pub fn material(&self) -> &dyn MaterialBinding {
        self.material.as_ref()
    }

    /// The instances drawn with the material.
    pub fn instances(&self) -> &[I] {
        &self.instances
    }
}

/// Materials of one shader.
#[derive(Debug)]
pub struct ShaderGroup<I> {
    materials: BTreeMap<u64, MaterialGroup<I>>,
}

impl<I> ShaderGroup<I> {
    /// The shader shared by every material of the group.
    pub fn shader(&self) -> Option<&dyn ShaderBinding> {
        self.materials.values().next().map(|g| g.material.shader())
    }

    /// The material groups, in material ID order.
    pub fn materials(&self) -> impl Iterator<Item = &MaterialGroup<I>> {
        self.materials.values()
    }
}

/// Instances grouped by shader, then material, both in ID order.
#[derive(Debug)]
pub struct ShaderGroups<I> {
    shaders: BTreeMap<u64, ShaderGroup<I>>,
    count: usize,
}

impl<I> Default for ShaderGroups<I> {
    fn default() -> Self {
        Self {
            shaders: BTreeMap::new(),
            count: 0,
        }
    }
}

impl<I> ShaderGroups<I> {
    /// Adds `instance` under `material`.
    pub fn insert(&mut self, material: Rc<dyn MaterialBinding>, instance: I) {
        let shader_id = material.shader().shader_id();
        let material_id = material.material_id();
        self.shaders
            .entry(shader_id)
            .or_insert_with(|| ShaderGroup {
                materials: BTreeMap::new(),
            })
            .materials
            .entry(material_id)
            .or_insert_with(|| MaterialGroup {
                material,
                instances: Vec::new(),
            })
            .instances
            .push(instance);
        self.count += 1;
    }

    /// Sorts the instances of every material group by `key`.
    pub fn sort_instances_by_key<K: Ord, F: FnMut(&I) -> K>(&mut self, mut key: F) {
        for group in self.shaders.values_mut() {
            for material in group.materials.values_mut() {
                material.instances.sort_by_key(&mut key);
            }
        }
    }

    /// The shader groups in shader ID order.
    pub fn shaders(&self) -> impl Iterator<Item = &ShaderGroup<I>> {
        self.shaders.values()
    }

    /// The total number of instances.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if there are no instances.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.shaders.clear();
        self.count = 0;
    }
}
