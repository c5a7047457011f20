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

//! Stack-structured allocation of texture units.
//!
//! Every pass that samples textures opens a child context of its caller's
//! context, binds what it needs and finishes the context. A child starts with
//! its parent's bindings and claims units from whatever the parent has not
//! used. Finishing a context deletes the textures it allocated and restores
//! the parent's bindings.
//!
//! Contexts must be created and finished in strict LIFO order. Creating,
//! binding or finishing through a context that is not the top of the stack
//! is a programming error and panics.

use crate::renderer::api::{Texture2DDescriptor, TextureId, TextureUnit};
use crate::renderer::error::{ParameterError, RenderError, ResourceError, TextureUnitError};
use crate::renderer::traits::GraphicsDevice;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Frame {
    id: u64,
    next: u32,
    bindings: Vec<Option<TextureId>>,
    owned: Vec<TextureId>,
}

struct AllocatorState {
    device: Arc<dyn GraphicsDevice>,
    units: u32,
    max_depth: usize,
    stack: Vec<Frame>,
    next_id: u64,
}

impl AllocatorState {
    fn top(&self) -> &Frame {
        match self.stack.last() {
            Some(frame) => frame,
            None => unreachable!("the root frame is never popped"),
        }
    }

    fn top_mut(&mut self) -> &mut Frame {
        match self.stack.last_mut() {
            Some(frame) => frame,
            None => unreachable!("the root frame is never popped"),
        }
    }

    fn require_current(&self, id: u64, operation: &str) {
        assert!(
            self.top().id == id,
            "TextureUnitContext: {operation} called on a context that is not current"
        );
    }

    fn check_required(&self, required: u32) -> Result<(), TextureUnitError> {
        if required > self.units {
            return Err(TextureUnitError::UnitsExhausted {
                requested: required,
                available: self.units,
            });
        }
        Ok(())
    }
}

/// Hands out texture units to a stack of [`TextureUnitContext`]s.
#[derive(Clone)]
pub struct TextureUnitAllocator {
    shared: Rc<RefCell<AllocatorState>>,
}

impl fmt::Debug for TextureUnitAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.borrow();
        f.debug_struct("TextureUnitAllocator")
            .field("units", &state.units)
            .field("max_depth", &state.max_depth)
            .field("depth", &state.stack.len())
            .finish()
    }
}

impl TextureUnitAllocator {
    /// Creates an allocator over every unit the device exposes, with at most
    /// `max_depth` contexts alive at once (the root included).
    ///
    /// ## Errors
    ///
    /// Returns a [`ParameterError`] if `max_depth` is smaller than 2.
    pub fn new(device: Arc<dyn GraphicsDevice>, max_depth: usize) -> Result<Self, ParameterError> {
        if max_depth < 2 {
            return Err(ParameterError::Invalid {
                name: "max_depth",
                reason: format!("must be at least 2, got {max_depth}"),
            });
        }
        let units = device.texture_units_max();
        log::debug!(
            "TextureUnitAllocator: {} units, stack depth {}",
            units,
            max_depth
        );
        Ok(Self {
            shared: Rc::new(RefCell::new(AllocatorState {
                device,
                units,
                max_depth,
                stack: vec![Frame {
                    id: 0,
                    next: 0,
                    bindings: vec![None; units as usize],
                    owned: Vec::new(),
                }],
                next_id: 1,
            })),
        })
    }

    /// The root context. It is never finished.
    pub fn root_context(&self) -> TextureUnitContext {
        TextureUnitContext {
            shared: Rc::clone(&self.shared),
            id: 0,
            finished: true,
        }
    }

    /// The number of units the device exposes.
    pub fn units(&self) -> u32 {
        self.shared.borrow().units
    }

    /// The number of contexts currently on the stack, the root included.
    pub fn depth(&self) -> usize {
        self.shared.borrow().stack.len()
    }

    /// The texture currently bound to `unit` according to the current context.
    pub fn binding(&self, unit: TextureUnit) -> Option<TextureId> {
        let state = self.shared.borrow();
        state.top().bindings.get(unit.0 as usize).copied().flatten()
    }
}

/// A scope owning the texture units it bound.
///
/// Dropping an unfinished context that is current finishes it.
pub struct TextureUnitContext {
    shared: Rc<RefCell<AllocatorState>>,
    id: u64,
    finished: bool,
}

impl fmt::Debug for TextureUnitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureUnitContext")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish()
    }
}

impl TextureUnitContext {
    /// Returns `true` if this context is the top of the stack.
    pub fn is_current(&self) -> bool {
        self.shared.borrow().top().id == self.id
    }

    /// Opens a child context.
    ///
    /// # Panics
    ///
    /// Panics if this context is not current.
    pub fn unit_context_new(&self) -> Result<TextureUnitContext, TextureUnitError> {
        let mut state = self.shared.borrow_mut();
        state.require_current(self.id, "unit_context_new");
        if state.stack.len() >= state.max_depth {
            return Err(TextureUnitError::ContextLimitReached {
                max_depth: state.max_depth,
            });
        }

        let id = state.next_id;
        state.next_id += 1;
        let top = state.top();
        let frame = Frame {
            id,
            next: top.next,
            bindings: top.bindings.clone(),
            owned: Vec::new(),
        };
        state.stack.push(frame);
        log::trace!("TextureUnitContext: new context {} (depth {})", id, state.stack.len());

        Ok(TextureUnitContext {
            shared: Rc::clone(&self.shared),
            id,
            finished: false,
        })
    }

    /// Opens a child context after checking that `reserved` more units are
    /// still available.
    pub fn unit_context_new_with_reserved(
        &self,
        reserved: u32,
    ) -> Result<TextureUnitContext, TextureUnitError> {
        {
            let state = self.shared.borrow();
            state.require_current(self.id, "unit_context_new_with_reserved");
            state.check_required(state.top().next.saturating_add(reserved))?;
        }
        self.unit_context_new()
    }

    /// Binds `texture` to the next free unit of this context.
    ///
    /// # Panics
    ///
    /// Panics if this context is not current.
    pub fn bind_texture_2d(&self, texture: TextureId) -> Result<TextureUnit, RenderError> {
        let mut state = self.shared.borrow_mut();
        state.require_current(self.id, "bind_texture_2d");
        let next = state.top().next;
        state.check_required(next + 1)?;

        let unit = TextureUnit(next);
        state.device.bind_texture(unit, texture)?;
        let frame = state.top_mut();
        frame.bindings[next as usize] = Some(texture);
        frame.next += 1;
        log::trace!("TextureUnitContext: bound {:?} to {:?}", texture, unit);
        Ok(unit)
    }

    /// Creates a texture owned by this context and binds it to the next free
    /// unit. The texture is deleted when the context finishes.
    pub fn allocate_texture_2d(
        &self,
        descriptor: &Texture2DDescriptor,
    ) -> Result<(TextureUnit, TextureId), RenderError> {
        let mut state = self.shared.borrow_mut();
        state.require_current(self.id, "allocate_texture_2d");
        let next = state.top().next;
        state.check_required(next + 1)?;

        let unit = TextureUnit(next);
        let texture = state.device.create_texture_2d(descriptor)?;
        if let Err(e) = state.device.bind_texture(unit, texture) {
            if let Err(destroy) = state.device.destroy_texture(texture) {
                log::warn!(
                    "TextureUnitContext: Failed to destroy texture {:?}: {:?}",
                    texture,
                    destroy
                );
            }
            return Err(e.into());
        }
        let frame = state.top_mut();
        frame.bindings[next as usize] = Some(texture);
        frame.owned.push(texture);
        frame.next += 1;
        Ok((unit, texture))
    }

    /// Finishes the context.
    ///
    /// Every texture the context allocated is deleted, then the parent's
    /// bindings are restored. Deletion failures are logged and the first one
    /// is returned once the parent is active again.
    ///
    /// # Panics
    ///
    /// Panics if this context is not current, or if it is the root.
    pub fn finish(mut self) -> Result<(), ResourceError> {
        assert!(self.id != 0, "TextureUnitContext: the root context cannot be finished");
        self.finished = true;
        self.pop()
    }

    fn pop(&self) -> Result<(), ResourceError> {
        let mut state = self.shared.borrow_mut();
        state.require_current(self.id, "finish");
        let Some(child) = state.stack.pop() else {
            unreachable!("a current context is always on the stack");
        };

        let mut first_error = None;
        for texture in &child.owned {
            if let Err(e) = state.device.destroy_texture(*texture) {
                log::warn!(
                    "TextureUnitContext: Failed to destroy texture {:?}: {:?}",
                    texture,
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        let parent = state.top().bindings.clone();
        for (index, (restored, current)) in parent.iter().zip(&child.bindings).enumerate() {
            if restored == current {
                continue;
            }
            let unit = TextureUnit(index as u32);
            let result = match restored {
                Some(texture) => state.device.bind_texture(unit, *texture),
                None => state.device.unbind_texture(unit),
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        log::trace!("TextureUnitContext: finished context {}", child.id);
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for TextureUnitContext {
    fn drop(&mut self) {
        if self.finished || std::thread::panicking() {
            return;
        }
        self.finished = true;
        if !self.is_current() {
            log::error!(
                "TextureUnitContext: context {} dropped while not current; it was never finished",
                self.id
            );
            return;
        }
        if let Err(e) = self.pop() {
            log::warn!("TextureUnitContext: Failed to finish dropped context: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Area;
    use crate::mock::MockGraphicsDevice;
    use crate::renderer::api::TextureFormat;

    fn allocator(units: u32) -> (Arc<MockGraphicsDevice>, TextureUnitAllocator) {
        let device = Arc::new(MockGraphicsDevice::with_units(units));
        let allocator = TextureUnitAllocator::new(device.clone(), 4).unwrap();
        (device, allocator)
    }

    fn descriptor() -> Texture2DDescriptor<'static> {
        Texture2DDescriptor::new("scratch", Area::new(4, 4), TextureFormat::Rgba8)
    }

    #[test]
    fn depth_below_two_is_rejected() {
        let device = Arc::new(MockGraphicsDevice::new());
        assert!(TextureUnitAllocator::new(device, 1).is_err());
    }

    #[test]
    fn children_claim_units_after_their_parent() {
        let (device, allocator) = allocator(8);
        let root = allocator.root_context();
        let parent = root.unit_context_new().unwrap();
        assert_eq!(parent.bind_texture_2d(TextureId(100)).unwrap(), TextureUnit(0));

        let child = parent.unit_context_new().unwrap();
        assert_eq!(child.bind_texture_2d(TextureId(200)).unwrap(), TextureUnit(1));
        assert_eq!(child.bind_texture_2d(TextureId(201)).unwrap(), TextureUnit(2));
        child.finish().unwrap();

        assert_eq!(device.bound_texture(TextureUnit(0)), Some(TextureId(100)));
        assert_eq!(device.bound_texture(TextureUnit(1)), None);
        assert_eq!(device.bound_texture(TextureUnit(2)), None);
        assert_eq!(parent.bind_texture_2d(TextureId(101)).unwrap(), TextureUnit(1));
        parent.finish().unwrap();
        assert_eq!(allocator.depth(), 1);
    }

    #[test]
    fn exhausting_units_fails() {
        let (_device, allocator) = allocator(2);
        let context = allocator.root_context().unit_context_new().unwrap();
        context.bind_texture_2d(TextureId(1)).unwrap();
        context.bind_texture_2d(TextureId(2)).unwrap();
        let err = context.bind_texture_2d(TextureId(3)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::TextureUnitError(TextureUnitError::UnitsExhausted {
                requested: 3,
                available: 2
            })
        ));
        context.finish().unwrap();
    }

    #[test]
    fn reservations_are_checked_up_front() {
        let (_device, allocator) = allocator(4);
        let root = allocator.root_context();
        let context = root.unit_context_new().unwrap();
        context.bind_texture_2d(TextureId(1)).unwrap();
        assert!(context.unit_context_new_with_reserved(3).is_ok_and(|c| c.finish().is_ok()));
        assert_eq!(
            context.unit_context_new_with_reserved(4).unwrap_err(),
            TextureUnitError::UnitsExhausted {
                requested: 5,
                available: 4
            }
        );
        context.finish().unwrap();
    }

    #[test]
    fn stack_depth_is_bounded() {
        let (_device, allocator) = allocator(8);
        let root = allocator.root_context();
        let a = root.unit_context_new().unwrap();
        let b = a.unit_context_new().unwrap();
        let c = b.unit_context_new().unwrap();
        assert_eq!(
            c.unit_context_new().unwrap_err(),
            TextureUnitError::ContextLimitReached { max_depth: 4 }
        );
        c.finish().unwrap();
        b.finish().unwrap();
        a.finish().unwrap();
    }

    #[test]
    fn allocated_textures_are_deleted_on_finish() {
        let (device, allocator) = allocator(4);
        let context = allocator.root_context().unit_context_new().unwrap();
        let (unit, texture) = context.allocate_texture_2d(&descriptor()).unwrap();
        assert_eq!(unit, TextureUnit(0));
        assert!(device.is_texture_live(texture));
        context.finish().unwrap();
        assert!(!device.is_texture_live(texture));
        assert_eq!(device.bound_texture(TextureUnit(0)), None);
    }

    #[test]
    fn dropping_a_current_context_finishes_it() {
        let (device, allocator) = allocator(4);
        let root = allocator.root_context();
        {
            let context = root.unit_context_new().unwrap();
            context.allocate_texture_2d(&descriptor()).unwrap();
            assert_eq!(allocator.depth(), 2);
        }
        assert_eq!(allocator.depth(), 1);
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    #[should_panic(expected = "not current")]
    fn binding_through_a_parent_with_an_active_child_panics() {
        let (_device, allocator) = allocator(4);
        let root = allocator.root_context();
        let parent = root.unit_context_new().unwrap();
        let _child = parent.unit_context_new().unwrap();
        let _ = parent.bind_texture_2d(TextureId(1));
    }

    #[test]
    #[should_panic(expected = "not current")]
    fn finishing_out_of_order_panics() {
        let (_device, allocator) = allocator(4);
        let root = allocator.root_context();
        let parent = root.unit_context_new().unwrap();
        let _child = parent.unit_context_new().unwrap();
        let _ = parent.finish();
    }

    #[test]
    #[should_panic(expected = "not current")]
    fn opening_a_sibling_while_a_child_is_unfinished_panics() {
        let (_device, allocator) = allocator(4);
        let root = allocator.root_context();
        let parent = root.unit_context_new().unwrap();
        let child = parent.unit_context_new().unwrap();
        child.allocate_texture_2d(&descriptor()).unwrap();
        let _ = parent.unit_context_new();
    }
}
