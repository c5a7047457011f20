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

//! Instances rendered into depth-only and depth-variance targets.

use super::instance::{InstanceBatchedDynamic, InstanceSingle};
use super::ShaderGroups;
use crate::renderer::api::FaceSelection;
use crate::renderer::error::{InstanceError, RenderError};
use crate::renderer::material::{check_kind, MaterialBinding};
use crate::renderer::shader::{ShaderBinding, ShaderKind};
use ahash::AHashSet;
use std::rc::Rc;

/// Receives the depth protocol.
///
/// The sequence is: `on_start`, one `on_instance_batched_update` per batch,
/// then every batched shader group, then every single shader group, then
/// `on_finish`. Within a group the order is shader start, then for each
/// material: material start, instances, material finish; then shader
/// finish. Singles announce a change of mesh with
/// `on_instance_single_array_start`.
#[allow(unused_variables)]
pub trait DepthInstancesConsumer {
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

    /// The protocol ends.
    fn on_finish(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// The set of instances visible to a depth pass.
#[derive(Debug)]
pub struct DepthInstances {
    batched: ShaderGroups<Rc<InstanceBatchedDynamic>>,
    singles: ShaderGroups<InstanceSingle>,
    visible: AHashSet<u64>,
    faces_culled: FaceSelection,
}

impl Default for DepthInstances {
    fn default() -> Self {
        Self {
            batched: ShaderGroups::default(),
            singles: ShaderGroups::default(),
            visible: AHashSet::new(),
            faces_culled: FaceSelection::Back,
        }
    }
}

impl DepthInstances {
    /// An empty set culling back faces.
    pub fn new() -> Self {
        Self::default()
    }

    /// The faces culled while rendering.
    pub fn faces_culled(&self) -> FaceSelection {
        self.faces_culled
    }

    /// Sets the faces culled while rendering.
    pub fn set_faces_culled(&mut self, faces: FaceSelection) {
        self.faces_culled = faces;
    }

    /// Adds a single instance drawn with a [`ShaderKind::SingleDepth`]
    /// material.
    pub fn add_single(
        &mut self,
        instance: InstanceSingle,
        material: Rc<dyn MaterialBinding>,
    ) -> Result<(), RenderError> {
        check_kind(material.as_ref(), ShaderKind::SingleDepth)?;
        self.mark_visible(instance.id())?;
        self.singles.insert(material, instance);
        Ok(())
    }

    /// Adds a batch drawn with a [`ShaderKind::BatchedDepth`] material.
    pub fn add_batched(
        &mut self,
        batch: Rc<InstanceBatchedDynamic>,
        material: Rc<dyn MaterialBinding>,
    ) -> Result<(), RenderError> {
        check_kind(material.as_ref(), ShaderKind::BatchedDepth)?;
        self.mark_visible(batch.id())?;
        self.batched.insert(material, batch);
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

    /// Removes everything, keeping the culling mode.
    pub fn reset(&mut self) {
        self.batched.clear();
        self.singles.clear();
        self.visible.clear();
    }

    /// Drives `consumer` through the depth protocol.
    pub fn visit(&mut self, consumer: &mut dyn DepthInstancesConsumer) -> Result<(), RenderError> {
        self.singles
            .sort_instances_by_key(|i| (i.array_object(), i.id()));

        consumer.on_start()?;

        for group in self.batched.shaders() {
            for material in group.materials() {
                for batch in material.instances() {
                    consumer.on_instance_batched_update(batch)?;
                }
            }
        }

        for group in self.batched.shaders() {
            let Some(shader) = group.shader() else {
                continue;
            };
            consumer.on_instance_batched_shader_start(shader)?;
            for material in group.materials() {
                consumer.on_instance_batched_material_start(material.material())?;
                for batch in material.instances() {
                    consumer.on_instance_batched(material.material(), batch)?;
                }
                consumer.on_instance_batched_material_finish(material.material())?;
            }
            consumer.on_instance_batched_shader_finish(shader)?;
        }

        for group in self.singles.shaders() {
            let Some(shader) = group.shader() else {
                continue;
            };
            consumer.on_instance_single_shader_start(shader)?;
            for material in group.materials() {
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

        consumer.on_finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdPool;
    use crate::mock::MockGraphicsDevice;
    use crate::scene::fixtures;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn push(&mut self, event: String) -> Result<(), RenderError> {
            let failed = self.fail_on.is_some_and(|f| event.starts_with(f));
            self.events.push(event);
            if failed {
                return Err(RenderError::RenderingFailed("stop".to_string()));
            }
            Ok(())
        }
    }

    impl DepthInstancesConsumer for Recorder {
        fn on_start(&mut self) -> Result<(), RenderError> {
            self.push("start".into())
        }
        fn on_instance_batched_update(&mut self, b: &InstanceBatchedDynamic) -> Result<(), RenderError> {
            self.push(format!("update {}", b.id()))
        }
        fn on_instance_batched_shader_start(&mut self, s: &dyn ShaderBinding) -> Result<(), RenderError> {
            self.push(format!("batched shader {}", s.shader_id()))
        }
        fn on_instance_batched_material_start(&mut self, m: &dyn MaterialBinding) -> Result<(), RenderError> {
            self.push(format!("batched material {}", m.material_id()))
        }
        fn on_instance_batched(&mut self, _: &dyn MaterialBinding, b: &InstanceBatchedDynamic) -> Result<(), RenderError> {
            self.push(format!("batched {}", b.id()))
        }
        fn on_instance_batched_shader_finish(&mut self, _: &dyn ShaderBinding) -> Result<(), RenderError> {
            self.push("batched shader finish".into())
        }
        fn on_instance_single_shader_start(&mut self, s: &dyn ShaderBinding) -> Result<(), RenderError> {
            self.push(format!("single shader {}", s.shader_id()))
        }
        fn on_instance_single_material_start(&mut self, m: &dyn MaterialBinding) -> Result<(), RenderError> {
            self.push(format!("single material {}", m.material_id()))
        }
        fn on_instance_single_array_start(&mut self, i: &InstanceSingle) -> Result<(), RenderError> {
            self.push(format!("array {}", i.array_object().0))
        }
        fn on_instance_single(&mut self, _: &dyn MaterialBinding, i: &InstanceSingle) -> Result<(), RenderError> {
            self.push(format!("single {}", i.id()))
        }
        fn on_instance_single_shader_finish(&mut self, _: &dyn ShaderBinding) -> Result<(), RenderError> {
            self.push("single shader finish".into())
        }
        fn on_finish(&mut self) -> Result<(), RenderError> {
            self.push("finish".into())
        }
    }

    #[test]
    fn batched_instances_come_first() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let single_shader = fixtures::shader(&device, &ids, ShaderKind::SingleDepth); // 0
        let batched_shader = fixtures::shader(&device, &ids, ShaderKind::BatchedDepth); // 1
        let single_material = fixtures::material(&ids, &single_shader); // 2
        let batched_material = fixtures::material(&ids, &batched_shader); // 3
        let a = fixtures::single(&ids, 20); // 4
        let b = fixtures::single(&ids, 10); // 5
        let c = fixtures::single(&ids, 20); // 6
        let batch = fixtures::batch(&device, &ids); // 7

        let mut scene = DepthInstances::new();
        scene.add_single(a, single_material.clone()).unwrap();
        scene.add_single(b, single_material.clone()).unwrap();
        scene.add_single(c, single_material).unwrap();
        scene.add_batched(batch, batched_material).unwrap();
        assert_eq!(scene.count(), 4);

        let mut recorder = Recorder::default();
        scene.visit(&mut recorder).unwrap();
        assert_eq!(
            recorder.events,
            vec![
                "start",
                "update 7",
                "batched shader 1",
                "batched material 3",
                "batched 7",
                "batched shader finish",
                "single shader 0",
                "single material 2",
                "array 10",
                "single 5",
                "array 20",
                "single 4",
                "single 6",
                "single shader finish",
                "finish",
            ]
        );
    }

    #[test]
    fn duplicates_and_wrong_kinds_are_rejected() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let shader = fixtures::shader(&device, &ids, ShaderKind::SingleDepth);
        let material = fixtures::material(&ids, &shader);
        let instance = fixtures::single(&ids, 1);

        let mut scene = DepthInstances::new();
        scene.add_single(instance.clone(), material.clone()).unwrap();
        assert!(matches!(
            scene.add_single(instance, material.clone()),
            Err(RenderError::InstanceError(InstanceError::InstanceAlreadyVisible { .. }))
        ));
        assert!(matches!(
            scene.add_batched(fixtures::batch(&device, &ids), material),
            Err(RenderError::ShaderKindMismatch { .. })
        ));
        assert_eq!(scene.faces_culled(), FaceSelection::Back);

        scene.reset();
        assert_eq!(scene.count(), 0);
    }

    #[test]
    fn a_failing_callback_aborts_the_sequence() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let shader = fixtures::shader(&device, &ids, ShaderKind::SingleDepth);
        let material = fixtures::material(&ids, &shader);
        let mut scene = DepthInstances::new();
        scene.add_single(fixtures::single(&ids, 1), material).unwrap();

        let mut recorder = Recorder {
            fail_on: Some("single material"),
            ..Recorder::default()
        };
        assert!(scene.visit(&mut recorder).is_err());
        assert_eq!(recorder.events.last().map(String::as_str), Some("single material 1"));
        assert!(!recorder.events.contains(&"finish".to_string()));
    }
}
