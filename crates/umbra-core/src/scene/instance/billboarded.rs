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
use crate::math::Vec3;
use crate::renderer::api::{
    ArrayBufferId, ArrayObjectDescriptor, ArrayObjectId, ArrayObjectSource, BufferUsage,
    InstanceAttributes,
};
use crate::renderer::error::{InstanceError, ResourceError};
use crate::renderer::traits::GraphicsDevice;
use ahash::AHashMap;
use std::cell::{Cell, RefCell};

/// Identifies one billboard in a [`InstanceBillboardedDynamic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BillboardId(pub u64);

/// One camera-facing quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Billboard {
    /// World-space center.
    pub position: Vec3,
    /// Edge length in world units.
    pub scale: f32,
    /// Rotation around the view axis, in radians.
    pub rotation: f32,
}

impl Billboard {
    fn pack(&self) -> [f32; 5] {
        [
            self.position.x,
            self.position.y,
            self.position.z,
            self.scale,
            self.rotation,
        ]
    }
}

#[derive(Debug, Default)]
struct BillboardState {
    dense: Vec<(BillboardId, Billboard)>,
    index: AHashMap<BillboardId, usize>,
    next: u64,
    dirty: bool,
}

/// Up to `capacity` billboards drawn as points in one call.
///
/// Billboards are packed densely: removing one moves the last billboard into
/// its place, so only the first [`enabled_count`](Self::enabled_count)
/// points are drawn.
#[derive(Debug)]
pub struct InstanceBillboardedDynamic {
    id: u64,
    capacity: usize,
    buffer: ArrayBufferId,
    array_object: ArrayObjectId,
    state: RefCell<BillboardState>,
    deleted: Cell<bool>,
}

impl InstanceBillboardedDynamic {
    /// Creates an empty set with room for `capacity` billboards.
    pub fn create(
        device: &dyn GraphicsDevice,
        ids: &IdPool,
        capacity: usize,
    ) -> Result<Self, ResourceError> {
        let stride = InstanceAttributes::Billboard.stride();
        let buffer = device.create_array_buffer(stride * capacity as u64, BufferUsage::DynamicDraw)?;
        let array_object = match device.create_array_object(&ArrayObjectDescriptor {
            label: Some("billboards".into()),
            source: ArrayObjectSource::Points {
                buffer,
                attributes: InstanceAttributes::Billboard,
            },
        }) {
            Ok(id) => id,
            Err(e) => {
                if let Err(destroy) = device.destroy_array_buffer(buffer) {
                    log::warn!(
                        "InstanceBillboardedDynamic: Failed to destroy buffer {:?}: {:?}",
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
            state: RefCell::new(BillboardState {
                dirty: true,
                ..BillboardState::default()
            }),
            deleted: Cell::new(false),
        })
    }

    /// The instance ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The points array object to draw.
    pub fn array_object(&self) -> ArrayObjectId {
        self.array_object
    }

    /// The maximum number of billboards.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of billboards, which is also the number of points to draw.
    pub fn enabled_count(&self) -> usize {
        self.state.borrow().dense.len()
    }

    /// Adds a billboard.
    ///
    /// ## Errors
    ///
    /// Returns [`InstanceError::BatchFull`] when the set is full.
    pub fn add(&self, billboard: Billboard) -> Result<BillboardId, InstanceError> {
        let mut state = self.state.borrow_mut();
        if state.dense.len() >= self.capacity {
            return Err(InstanceError::BatchFull {
                capacity: self.capacity,
            });
        }
        let id = BillboardId(state.next);
        state.next += 1;
        let position = state.dense.len();
        state.dense.push((id, billboard));
        state.index.insert(id, position);
        state.dirty = true;
        Ok(id)
    }

    /// Replaces a billboard's values. Returns `false` if `id` is unknown.
    pub fn set(&self, id: BillboardId, billboard: Billboard) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(&position) = state.index.get(&id) else {
            return false;
        };
        state.dense[position].1 = billboard;
        state.dirty = true;
        true
    }

    /// Removes a billboard. Returns `false` if `id` is unknown.
    pub fn remove(&self, id: BillboardId) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(position) = state.index.remove(&id) else {
            return false;
        };
        state.dense.swap_remove(position);
        if let Some((moved, _)) = state.dense.get(position).copied() {
            state.index.insert(moved, position);
        }
        state.dirty = true;
        true
    }

    /// Removes every billboard.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.dense.clear();
        state.index.clear();
        state.dirty = true;
    }

    /// The billboard `id`, if present.
    pub fn get(&self, id: BillboardId) -> Option<Billboard> {
        let state = self.state.borrow();
        state.index.get(&id).map(|&position| state.dense[position].1)
    }

    /// Returns `true` if the GPU buffer is out of date.
    pub fn update_required(&self) -> bool {
        self.state.borrow().dirty
    }

    /// Uploads the packed billboards if an update is required.
    pub fn update(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.get() {
            return Err(ResourceError::Deleted("billboards"));
        }
        let mut state = self.state.borrow_mut();
        if !state.dirty {
            return Ok(());
        }
        let data: Vec<f32> = state
            .dense
            .iter()
            .flat_map(|(_, billboard)| billboard.pack())
            .collect();
        if !data.is_empty() {
            device.update_array_buffer(self.buffer, 0, bytemuck::cast_slice(&data))?;
        }
        state.dirty = false;
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGraphicsDevice;

    fn at(x: f32) -> Billboard {
        Billboard {
            position: Vec3::new(x, 0.0, 0.0),
            scale: 1.0,
            rotation: 0.0,
        }
    }

    #[test]
    fn removal_keeps_the_set_dense() {
        let device = MockGraphicsDevice::new();
        let set = InstanceBillboardedDynamic::create(&device, &IdPool::new(), 3).unwrap();
        let a = set.add(at(1.0)).unwrap();
        let b = set.add(at(2.0)).unwrap();
        let c = set.add(at(3.0)).unwrap();
        assert!(matches!(set.add(at(4.0)), Err(InstanceError::BatchFull { capacity: 3 })));

        assert!(set.remove(a));
        assert!(!set.remove(a));
        assert_eq!(set.enabled_count(), 2);
        assert_eq!(set.get(c), Some(at(3.0)));
        assert_eq!(set.get(b), Some(at(2.0)));

        set.update(&device).unwrap();
        let bytes = device.buffer_contents(set.buffer);
        let first_x = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(first_x, 3.0);
        assert!(!set.update_required());
    }
}
