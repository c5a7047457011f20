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

//! Instances that write the allow bit of the stencil buffer.

use super::instance::{InstanceBatchedDynamic, InstanceSingle};
use crate::renderer::error::{InstanceError, RenderError};
use crate::renderer::stencil::StencilMode;
use ahash::AHashSet;
use std::rc::Rc;

/// Receives the stencil protocol: `on_start`, one `on_instance_batched_update`
/// and `on_instance_batched` per batch, then the singles sorted by mesh with
/// `on_instance_single_array_start` on every change of mesh, then
/// `on_finish`.
#[allow(unused_variables)]
pub trait StencilsConsumer {
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

    /// One batch is drawn.
    fn on_instance_batched(&mut self, batch: &InstanceBatchedDynamic) -> Result<(), RenderError>;

    /// The next single instances use a different mesh.
    fn on_instance_single_array_start(
        &mut self,
        instance: &InstanceSingle,
    ) -> Result<(), RenderError>;

    /// One single instance is drawn.
    fn on_instance_single(&mut self, instance: &InstanceSingle) -> Result<(), RenderError>;

    /// The protocol ends.
    fn on_finish(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// The stencil instances of a frame.
#[derive(Debug, Default)]
pub struct Stencils {
    mode: StencilMode,
    singles: Vec<InstanceSingle>,
    batched: Vec<Rc<InstanceBatchedDynamic>>,
    visible: AHashSet<u64>,
}

impl Stencils {
    /// An empty set in [`StencilMode::InstancesAreNegative`] mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current mode.
    pub fn mode(&self) -> StencilMode {
        self.mode
    }

    /// Changes the mode.
    pub fn set_mode(&mut self, mode: StencilMode) {
        self.mode = mode;
    }

    /// Adds a single instance.
    pub fn add_single(&mut self, instance: InstanceSingle) -> Result<(), InstanceError> {
        self.mark_visible(instance.id())?;
        self.singles.push(instance);
        Ok(())
    }

    /// Adds a batch.
    pub fn add_batched(&mut self, batch: Rc<InstanceBatchedDynamic>) -> Result<(), InstanceError> {
        self.mark_visible(batch.id())?;
        self.batched.push(batch);
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

    /// Removes every instance, keeping the mode.
    pub fn reset(&mut self) {
        self.singles.clear();
        self.batched.clear();
        self.visible.clear();
    }

    /// Drives `consumer` through the stencil protocol.
    pub fn visit(&mut self, consumer: &mut dyn StencilsConsumer) -> Result<(), RenderError> {
        self.singles.sort_by_key(|i| (i.array_object(), i.id()));

        consumer.on_start()?;
        for batch in &self.batched {
            consumer.on_instance_batched_update(batch)?;
            consumer.on_instance_batched(batch)?;
        }
        let mut array = None;
        for instance in &self.singles {
            if array != Some(instance.array_object()) {
                array = Some(instance.array_object());
                consumer.on_instance_single_array_start(instance)?;
            }
            consumer.on_instance_single(instance)?;
        }
        consumer.on_finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdPool;
    use crate::scene::fixtures;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl StencilsConsumer for Recorder {
        fn on_instance_batched(&mut self, b: &InstanceBatchedDynamic) -> Result<(), RenderError> {
            self.0.push(format!("batched {}", b.id()));
            Ok(())
        }
        fn on_instance_single_array_start(&mut self, i: &InstanceSingle) -> Result<(), RenderError> {
            self.0.push(format!("array {}", i.array_object().0));
            Ok(())
        }
        fn on_instance_single(&mut self, i: &InstanceSingle) -> Result<(), RenderError> {
            self.0.push(format!("single {}", i.id()));
            Ok(())
        }
    }

    #[test]
    fn singles_are_sorted_by_mesh_then_id() {
        let ids = IdPool::new();
        let mut stencils = Stencils::new();
        assert_eq!(stencils.mode(), StencilMode::InstancesAreNegative);
        stencils.add_single(fixtures::single(&ids, 2)).unwrap(); // 0
        stencils.add_single(fixtures::single(&ids, 1)).unwrap(); // 1
        stencils.add_single(fixtures::single(&ids, 2)).unwrap(); // 2

        let mut recorder = Recorder::default();
        stencils.visit(&mut recorder).unwrap();
        assert_eq!(
            recorder.0,
            vec!["array 1", "single 1", "array 2", "single 0", "single 2"]
        );
    }

    #[test]
    fn duplicates_are_rejected() {
        let ids = IdPool::new();
        let instance = fixtures::single(&ids, 1);
        let mut stencils = Stencils::new();
        stencils.add_single(instance.clone()).unwrap();
        assert_eq!(
            stencils.add_single(instance),
            Err(InstanceError::InstanceAlreadyVisible { id: 0 })
        );
    }
}
