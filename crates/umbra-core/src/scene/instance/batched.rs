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

//! Dynamic batches: many transforms packed into one instance buffer.

use crate::id::IdPool;
use crate::math::Mat4;
use crate::renderer::api::{
    ArrayBufferId, ArrayObjectDescriptor, ArrayObjectId, ArrayObjectSource, BufferUsage,
    InstanceAttributes,
};
use crate::renderer::error::{InstanceError, ResourceError};
use crate::renderer::traits::GraphicsDevice;
use crate::scene::transform::SharedTransform;
use std::cell::{Cell, RefCell};

/// A slot of a dynamic batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchSlot(pub usize);

#[derive(Debug)]
struct Slot {
    transform: SharedTransform,
    uploaded_generation: Option<u64>,
}

#[derive(Debug)]
struct BatchState {
    slots: Vec<Option<Slot>>,
    // Stack of free slot indices; the top is claimed next.
    free: Vec<usize>,
    dirty: bool,
}

/// Up to `capacity` copies of one mesh, each following a shared transform,
/// drawn with a single instanced call.
///
/// Enabling and disabling are O(1): freed slots go on a stack and the most
/// recently freed one is claimed first. A fresh batch hands out slots in
/// ascending order. The whole buffer is
/// drawn every time; disabled slots hold a zero matrix, which collapses
/// their geometry.
#[derive(Debug)]
pub struct InstanceBatchedDynamic {
    id: u64,
    capacity: usize,
    buffer: ArrayBufferId,
    array_object: ArrayObjectId,
    state: RefCell<BatchState>,
    deleted: Cell<bool>,
}

impl InstanceBatchedDynamic {
    /// Creates a batch of `mesh` with room for `capacity` instances.
    pub fn create(
        device: &dyn GraphicsDevice,
        ids: &IdPool,
        mesh: ArrayObjectId,
        capacity: usize,
    ) -> Result<Self, ResourceError> {
        let stride = InstanceAttributes::ModelMatrix.stride();
        let buffer = device.create_array_buffer(stride * capacity as u64, BufferUsage::DynamicDraw)?;
        let array_object = match device.create_array_object(&ArrayObjectDescriptor {
            label: Some("batch".into()),
            source: ArrayObjectSource::Instanced {
                base: mesh,
                instance_buffer: buffer,
                attributes: InstanceAttributes::ModelMatrix,
            },
        }) {
            Ok(id) => id,
            Err(e) => {
                if let Err(destroy) = device.destroy_array_buffer(buffer) {
                    log::warn!(
                        "InstanceBatchedDynamic: Failed to destroy buffer {:?}: {:?}",
                        buffer,
                        destroy
                    );
                }
                return Err(e);
            }
        };

        Ok(Self {
            id: ids.fresh_id(),
            capacity,
            buffer,
            array_object,
            state: RefCell::new(BatchState {
                slots: (0..capacity).map(|_| None).collect(),
                free: (0..capacity).rev().collect(),
                dirty: true,
            }),
            deleted: Cell::new(false),
        })
    }

    /// The batch ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The instanced array object to draw.
    pub fn array_object(&self) -> ArrayObjectId {
        self.array_object
    }

    /// The maximum number of enabled instances.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of instances to pass to an instanced draw. This is always
    /// the capacity.
    pub fn render_count(&self) -> u32 {
        self.capacity as u32
    }

    /// The number of enabled instances.
    pub fn enabled_count(&self) -> usize {
        let state = self.state.borrow();
        self.capacity - state.free.len()
    }

    /// Binds `transform` to the most recently freed slot.
    ///
    /// ## Errors
    ///
    /// Returns [`InstanceError::BatchFull`] when every slot is in use.
    pub fn enable_instance(&self, transform: SharedTransform) -> Result<BatchSlot, InstanceError> {
        let mut state = self.state.borrow_mut();
        let Some(index) = state.free.pop() else {
            return Err(InstanceError::BatchFull {
                capacity: self.capacity,
            });
        };
        state.slots[index] = Some(Slot {
            transform,
            uploaded_generation: None,
        });
        state.dirty = true;
        Ok(BatchSlot(index))
    }

    /// Frees `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not enabled.
    pub fn disable_instance(&self, slot: BatchSlot) {
        let mut state = self.state.borrow_mut();
        let taken = state.slots.get_mut(slot.0).and_then(Option::take);
        assert!(
            taken.is_some(),
            "InstanceBatchedDynamic: slot {} is not enabled",
            slot.0
        );
        state.free.push(slot.0);
        state.dirty = true;
    }

    /// Returns `true` if the GPU buffer is out of date: right after
    /// creation, after any enable or disable, and after any enabled
    /// transform was mutated since the last upload.
    pub fn update_required(&self) -> bool {
        let state = self.state.borrow();
        state.dirty
            || state.slots.iter().flatten().any(|slot| {
                slot.uploaded_generation != Some(slot.transform.generation())
            })
    }

    /// Uploads every slot's matrix, in slot order, if an update is required.
    pub fn update(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.get() {
            return Err(ResourceError::Deleted("batch"));
        }
        if !self.update_required() {
            return Ok(());
        }

        let mut state = self.state.borrow_mut();
        let mut data: Vec<f32> = Vec::with_capacity(self.capacity * 16);
        let mut generations = Vec::with_capacity(self.capacity);
        for slot in &state.slots {
            match slot {
                Some(slot) => {
                    let generation = slot.transform.generation();
                    data.extend_from_slice(&slot.transform.matrix().to_cols_array());
                    generations.push(Some(generation));
                }
                None => {
                    data.extend_from_slice(&Mat4::ZERO.to_cols_array());
                    generations.push(None);
                }
            }
        }
        device.update_array_buffer(self.buffer, 0, bytemuck::cast_slice(&data))?;

        for (slot, generation) in state.slots.iter_mut().zip(generations) {
            if let (Some(slot), Some(generation)) = (slot, generation) {
                slot.uploaded_generation = Some(generation);
            }
        }
        state.dirty = false;
        log::trace!("InstanceBatchedDynamic: uploaded batch {}", self.id);
        Ok(())
    }

    /// Deletes the GPU resources. Deleting twice does nothing.
    pub fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        let object = device.destroy_array_object(self.array_object);
        let buffer = device.destroy_array_buffer(self.buffer);
        object.and(buffer)
    }

    /// Returns `true` once the batch was deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::mock::MockGraphicsDevice;
    use crate::scene::transform::Transform;

    fn batch(device: &MockGraphicsDevice, capacity: usize) -> InstanceBatchedDynamic {
        InstanceBatchedDynamic::create(device, &IdPool::new(), ArrayObjectId(999), capacity).unwrap()
    }

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn update_is_required_after_construction() {
        let device = MockGraphicsDevice::new();
        let batch = batch(&device, 2);
        assert!(batch.update_required());
        batch.update(&device).unwrap();
        assert!(!batch.update_required());
        batch.update(&device).unwrap();
    }

    #[test]
    fn full_batch_is_rejected() {
        let device = MockGraphicsDevice::new();
        let batch = batch(&device, 2);
        batch.enable_instance(SharedTransform::default()).unwrap();
        batch.enable_instance(SharedTransform::default()).unwrap();
        assert_eq!(
            batch.enable_instance(SharedTransform::default()),
            Err(InstanceError::BatchFull { capacity: 2 })
        );
        assert_eq!(batch.enabled_count(), 2);
    }

    #[test]
    fn freed_slots_are_reused_most_recent_first() {
        let device = MockGraphicsDevice::new();
        let batch = batch(&device, 4);
        let slots: Vec<_> = (0..3)
            .map(|_| batch.enable_instance(SharedTransform::default()).unwrap())
            .collect();
        assert_eq!(slots, vec![BatchSlot(0), BatchSlot(1), BatchSlot(2)]);

        batch.disable_instance(BatchSlot(0));
        batch.disable_instance(BatchSlot(2));
        assert_eq!(batch.enabled_count(), 1);
        assert_eq!(batch.enable_instance(SharedTransform::default()), Ok(BatchSlot(2)));
        assert_eq!(batch.enable_instance(SharedTransform::default()), Ok(BatchSlot(0)));
        assert_eq!(batch.enable_instance(SharedTransform::default()), Ok(BatchSlot(3)));
        assert_eq!(
            batch.enable_instance(SharedTransform::default()),
            Err(InstanceError::BatchFull { capacity: 4 })
        );
    }

    #[test]
    fn upload_follows_shared_transforms() {
        let device = MockGraphicsDevice::new();
        let batch = batch(&device, 2);
        let transform = SharedTransform::default();
        batch.enable_instance(transform.clone()).unwrap();
        batch.update(&device).unwrap();

        let contents = floats(&device.buffer_contents(batch.buffer));
        assert_eq!(contents.len(), 32);
        assert_eq!(&contents[0..16], &Mat4::IDENTITY.to_cols_array());
        assert!(contents[16..].iter().all(|f| *f == 0.0));

        transform.set(Transform::ScaleTranslation {
            scale: 1.0,
            translation: Vec3::new(4.0, 5.0, 6.0),
        });
        assert!(batch.update_required());
        batch.update(&device).unwrap();
        let contents = floats(&device.buffer_contents(batch.buffer));
        assert_eq!(&contents[12..15], &[4.0, 5.0, 6.0]);
        assert!(!batch.update_required());
    }

    #[test]
    #[should_panic(expected = "not enabled")]
    fn disabling_an_unknown_slot_panics() {
        let device = MockGraphicsDevice::new();
        batch(&device, 1).disable_instance(BatchSlot(0));
    }

    #[test]
    fn delete_is_idempotent() {
        let device = MockGraphicsDevice::new();
        let batch = batch(&device, 1);
        batch.delete(&device).unwrap();
        batch.delete(&device).unwrap();
        assert!(matches!(batch.update(&device), Err(ResourceError::Deleted(_))));
    }
}
