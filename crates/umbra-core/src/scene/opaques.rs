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

//! Opaque instances rendered into the geometry buffer, partitioned by
//! stencil group.

use super::instance::{InstanceBatchedDynamic, InstanceSingle};
use super::ShaderGroups;
use crate::renderer::error::{InstanceError, RenderError};
use crate::renderer::material::{check_kind, MaterialBinding};
use crate::renderer::shader::{ShaderBinding, ShaderKind};
use crate::renderer::stencil::{check_valid_group, MAXIMUM_GROUPS};
use ahash::AHashSet;
use std::rc::Rc;

/// Receives the opaque protocol.
///
/// `on_start`, then `on_instance_batched_update` for every batch of every
/// group, then for each non-empty group in ascending order:
/// `on_start_group`, the batched shader groups, the single shader groups
/// (with `on_instance_single_array_start` on every change of mesh) and
/// `on_finish_group`. Finally `on_finish`.
#[allow(unused_variables)]
pub trait OpaqueInstancesConsumer {
    /// The protocol starts.
    fn on_start(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// A batch may need its GPU data refreshed.
    fn on_instance_batched_update(
        &mut self,
        batch: &InstanceBatchedDynamic,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    /// A stencil group starts.
    fn on_start_group(&mut self, group: u8) -> Result<(), RenderError>;

    /// A batched shader becomes active.
    fn on_instance_batched_shader_start(
        &mut self,
        shader: &dyn ShaderBinding,
    ) -> Result<(), RenderError>;

    /// A batched material becomes active.
    fn on_instance_batched_material_start(
        &mut self,
        material: &dyn MaterialBinding,
    ) -> Result<(), RenderError>;

    /// One batch is drawn.
    fn on_instance_batched(
        &mut self,
        material: &dyn MaterialBinding,
        batch: &InstanceBatchedDynamic,
    ) -> Result<(), RenderError>;

    /// A batched material is done.
    fn on_instance_batched_material_finish(
        &mut self,
        material: &dyn MaterialBinding,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    /// A batched shader is done.
    fn on_instance_batched_shader_finish(
        &mut self,
        shader: &dyn ShaderBinding,
    ) -> Result<(), RenderError>;

    /// A single shader becomes active.
    fn on_instance_single_shader_start(
        &mut self,
        shader: &dyn ShaderBinding,
    ) -> Result<(), RenderError>;

    /// A single material becomes active.
    fn on_instance_single_material_start(
        &mut self,
        material: &dyn MaterialBinding,
    ) -> Result<(), RenderError>;

    /// The next single instances use a different mesh.
    fn on_instance_single_array_start(
        &mut self,
        instance: &InstanceSingle,
    ) -> Result<(), RenderError>;

    /// One single instance is drawn.
    fn on_instance_single(
        &mut self,
        material: &dyn MaterialBinding,
        instance: &InstanceSingle,
    ) -> Result<(), RenderError>;

    /// A single material is done.
    fn on_instance_single_material_finish(
        &mut self,
        material: &dyn MaterialBinding,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    /// A single shader is done.
    fn on_instance_single_shader_finish(
        &mut self,
        shader: &dyn ShaderBinding,
    ) -> Result<(), RenderError>;

    /// A stencil group is done.
    fn on_finish_group(&mut self, group: u8) -> Result<(), RenderError>;

    /// The protocol ends.
    fn on_finish(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Group {
    batched: ShaderGroups<Rc<InstanceBatchedDynamic>>,
    singles: ShaderGroups<InstanceSingle>,
}

impl Group {
    fn is_empty(&self) -> bool {
        self.batched.is_empty() && self.singles.is_empty()
    }
}

/// The opaque instances of a frame.
#[derive(Debug)]
pub struct OpaqueInstances {
    groups: Vec<Group>,
    visible: AHashSet<u64>,
}

impl Default for OpaqueInstances {
    fn default() -> Self {
        Self {
            groups: (0..MAXIMUM_GROUPS).map(|_| Group::default()).collect(),
            visible: AHashSet::new(),
        }
    }
}

impl OpaqueInstances {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single instance to stencil `group`, drawn with a
    /// [`ShaderKind::SingleGeometry`] material.
    ///
    /// The group is validated before anything else.
    pub fn add_single(
        &mut self,
        instance: InstanceSingle,
        material: Rc<dyn MaterialBinding>,
        group: i64,
    ) -> Result<(), RenderError> {
        let group = check_valid_group(group)?;
        check_kind(material.as_ref(), ShaderKind::SingleGeometry)?;
        self.mark_visible(instance.id())?;
        self.groups[group as usize].singles.insert(material, instance);
        Ok(())
    }

    /// Adds a batch to stencil `group`, drawn with a
    /// [`ShaderKind::BatchedGeometry`] material.
    pub fn add_batched(
        &mut self,
        batch: Rc<InstanceBatchedDynamic>,
        material: Rc<dyn MaterialBinding>,
        group: i64,
    ) -> Result<(), RenderError> {
        let group = check_valid_group(group)?;
        check_kind(material.as_ref(), ShaderKind::BatchedGeometry)?;
        self.mark_visible(batch.id())?;
        self.groups[group as usize].batched.insert(material, batch);
        Ok(())
    }

    fn mark_visible(&mut self, id: u64) -> Result<(), InstanceError> {
        if !self.visible.insert(id) {
            return Err(InstanceError::InstanceAlreadyVisible { id });
        }
        Ok(())
    }

    /// The number of instances and batches.
    pub fn count(&self) -> usize {
        self.visible.len()
    }

    /// Removes everything.
    pub fn reset(&mut self) {
        for group in &mut self.groups {
            group.batched.clear();
            group.singles.clear();
        }
        self.visible.clear();
    }

    /// Drives `consumer` through the opaque protocol.
    pub fn visit(&mut self, consumer: &mut dyn OpaqueInstancesConsumer) -> Result<(), RenderError> {
        for group in &mut self.groups {
            group
                .singles
                .sort_instances_by_key(|i| (i.array_object(), i.id()));
        }

        consumer.on_start()?;
        for group in &self.groups {
            for shader in group.batched.shaders() {
                for material in shader.materials() {
                    for batch in material.instances() {
                        consumer.on_instance_batched_update(batch)?;
                    }
                }
            }
        }

        for (index, group) in self.groups.iter().enumerate().skip(1) {
            if group.is_empty() {
                continue;
            }
            let number = index as u8;
            consumer.on_start_group(number)?;

            for shader_group in group.batched.shaders() {
                let Some(shader) = shader_group.shader() else {
                    continue;
                };
                consumer.on_instance_batched_shader_start(shader)?;
                for material in shader_group.materials() {
                    consumer.on_instance_batched_material_start(material.material())?;
                    for batch in material.instances() {
                        consumer.on_instance_batched(material.material(), batch)?;
                    }
                    consumer.on_instance_batched_material_finish(material.material())?;
                }
                consumer.on_instance_batched_shader_finish(shader)?;
            }

            for shader_group in group.singles.shaders() {
                let Some(shader) = shader_group.shader() else {
                    continue;
                };
                consumer.on_instance_single_shader_start(shader)?;
                for material in shader_group.materials() {
                    consumer.on_instance_single_material_start(material.material())?;
                    let mut array = None;
                    for instance in material.instances() {
                        if array != Some(instance.array_object()) {
                            array = Some(instance.array_object());
                            consumer.on_instance_single_array_start(instance)?;
                        }
                        consumer.on_instance_single(material.material(), instance)?;
                    }
                    consumer.on_instance_single_material_finish(material.material())?;
                }
                consumer.on_instance_single_shader_finish(shader)?;
            }

            consumer.on_finish_group(number)?;
        }
        consumer.on_finish()
    }
}
