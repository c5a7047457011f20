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

//! Instances rendered into a mask buffer.

use super::instance::{InstanceBatchedDynamic, InstanceSingle};
use crate::renderer::error::{InstanceError, RenderError};
use ahash::AHashSet;
use std::rc::Rc;

/// Receives the mask protocol: `on_start`, every batch's
/// `on_instance_batched_update`, the singles sorted by mesh (with
/// `on_instance_single_array_start` on every change of mesh), the batches,
/// then `on_finish`.
#[allow(unused_variables)]
pub trait MaskInstancesConsumer {
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

    /// The single instances are about to be drawn.
    fn on_instance_single_start(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// The next single instances use a different mesh.
    fn on_instance_single_array_start(
        &mut self,
        instance: &InstanceSingle,
    ) -> Result<(), RenderError>;

    /// One single instance is drawn.
    fn on_instance_single(&mut self, instance: &InstanceSingle) -> Result<(), RenderError>;

    /// The batches are about to be drawn.
    fn on_instance_batched_start(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// One batch is drawn.
    fn on_instance_batched(&mut self, batch: &InstanceBatchedDynamic) -> Result<(), RenderError>;

    /// The protocol ends.
    fn on_finish(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// The instances covered by a mask.
#[derive(Debug, Default)]
pub struct MaskInstances {
    singles: Vec<InstanceSingle>,
    batched: Vec<Rc<InstanceBatchedDynamic>>,
    visible: AHashSet<u64>,
}

impl MaskInstances {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single instance.
    pub fn add_single(&mut self, instance: InstanceSingle) -> Result<(), InstanceError> {
        if !self.visible.insert(instance.id()) {
            return Err(InstanceError::InstanceAlreadyVisible { id: instance.id() });
        }
        self.singles.push(instance);
        Ok(())
    }

    /// Adds a batch.
    pub fn add_batched(&mut self, batch: Rc<InstanceBatchedDynamic>) -> Result<(), InstanceError> {
        if !self.visible.insert(batch.id()) {
            return Err(InstanceError::InstanceAlreadyVisible { id: batch.id() });
        }
        self.batched.push(batch);
        Ok(())
    }

    /// The number of instances and batches.
    pub fn count(&self) -> usize {
        self.visible.len()
    }

    /// Removes everything.
    pub fn reset(&mut self) {
        self.singles.clear();
        self.batched.clear();
        self.visible.clear();
    }

    /// Drives `consumer` through the mask protocol.
    pub fn visit(&mut self, consumer: &mut dyn MaskInstancesConsumer) -> Result<(), RenderError> {
        self.singles.sort_by_key(|i| (i.array_object(), i.id()));

        consumer.on_start()?;
        for batch in &self.batched {
            consumer.on_instance_batched_update(batch)?;
        }

        if !self.singles.is_empty() {
            consumer.on_instance_single_start()?;
            let mut array = None;
            for instance in &self.singles {
                if array != Some(instance.array_object()) {
                    array = Some(instance.array_object());
                    consumer.on_instance_single_array_start(instance)?;
                }
                consumer.on_instance_single(instance)?;
            }
        }

        if !self.batched.is_empty() {
            consumer.on_instance_batched_start()?;
            for batch in &self.batched {
                consumer.on_instance_batched(batch)?;
            }
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
    struct Recorder(Vec<String>);

    impl MaskInstancesConsumer for Recorder {
        fn on_instance_batched_update(&mut self, b: &InstanceBatchedDynamic) -> Result<(), RenderError> {
            self.0.push(format!("update {}", b.id()));
            Ok(())
        }
        fn on_instance_single_array_start(&mut self, _: &InstanceSingle) -> Result<(), RenderError> {
            Ok(())
        }
        fn on_instance_single(&mut self, i: &InstanceSingle) -> Result<(), RenderError> {
            self.0.push(format!("single {}", i.id()));
            Ok(())
        }
        fn on_instance_batched(&mut self, b: &InstanceBatchedDynamic) -> Result<(), RenderError> {
            self.0.push(format!("batched {}", b.id()));
            Ok(())
        }
    }

    #[test]
    fn singles_are_drawn_before_batches() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let mut mask = MaskInstances::new();
        mask.add_batched(fixtures::batch(&device, &ids)).unwrap(); // 0
        mask.add_single(fixtures::single(&ids, 1)).unwrap(); // 1

        let mut recorder = Recorder::default();
        mask.visit(&mut recorder).unwrap();
        assert_eq!(recorder.0, vec!["update 0", "single 1", "batched 0"]);
        assert_eq!(mask.count(), 2);
    }
}
