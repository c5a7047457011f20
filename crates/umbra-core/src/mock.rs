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

//! A mock graphics device for unit tests.

use crate::math::Area;
use crate::renderer::api::*;
use crate::renderer::error::{ResourceError, ShaderError};
use crate::renderer::traits::GraphicsDevice;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MockCall {
    BindTexture(TextureUnit, TextureId),
    UnbindTexture(TextureUnit),
    BindDrawFramebuffer(FramebufferId),
    Clear(ClearValues),
    RenderState(RenderState),
    ActivateProgram(ProgramId),
    Uniform(String, UniformValue),
    BindArrayObject(ArrayObjectId),
    DrawElements,
    DrawInstanced(u32),
    DrawArrays(u32, u32),
}

#[derive(Debug)]
pub(crate) struct MockGraphicsDevice {
    units: u32,
    next_id: AtomicUsize,
    pub textures_created: AtomicUsize,
    pub textures_destroyed: AtomicUsize,
    pub framebuffers_created: AtomicUsize,
    pub framebuffers_destroyed: AtomicUsize,
    live_textures: Mutex<HashSet<TextureId>>,
    buffers: Mutex<HashMap<ArrayBufferId, Vec<u8>>>,
    bound: Mutex<HashMap<TextureUnit, TextureId>>,
    calls: Mutex<Vec<MockCall>>,
    fail_texture_creation: Mutex<Option<usize>>,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self::with_units(16)
    }

    pub fn with_units(units: u32) -> Self {
        Self {
            units,
            next_id: AtomicUsize::new(1),
            textures_created: AtomicUsize::new(0),
            textures_destroyed: AtomicUsize::new(0),
            framebuffers_created: AtomicUsize::new(0),
            framebuffers_destroyed: AtomicUsize::new(0),
            live_textures: Mutex::new(HashSet::new()),
            buffers: Mutex::new(HashMap::new()),
            bound: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_texture_creation: Mutex::new(None),
        }
    }

    /// Makes texture creation fail once `remaining` more textures have been created.
    pub fn fail_texture_creation_after(&self, remaining: usize) {
        *self.fail_texture_creation.lock().unwrap() = Some(remaining);
    }

    pub fn live_texture_count(&self) -> usize {
        self.live_textures.lock().unwrap().len()
    }

    pub fn is_texture_live(&self, id: TextureId) -> bool {
        self.live_textures.lock().unwrap().contains(&id)
    }

    pub fn bound_texture(&self, unit: TextureUnit) -> Option<TextureId> {
        self.bound.lock().unwrap().get(&unit).copied()
    }

    pub fn buffer_contents(&self, id: ArrayBufferId) -> Vec<u8> {
        self.buffers.lock().unwrap().get(&id).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn next(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn texture_units_max(&self) -> u32 {
        self.units
    }

    fn create_texture_2d(
        &self,
        _descriptor: &Texture2DDescriptor,
    ) -> Result<TextureId, ResourceError> {
        let mut fail = self.fail_texture_creation.lock().unwrap();
        if let Some(remaining) = fail.as_mut() {
            if *remaining == 0 {
                return Err(ResourceError::BackendError("out of memory".to_string()));
            }
            *remaining -= 1;
        }
        let id = TextureId(self.next());
        self.textures_created.fetch_add(1, Ordering::SeqCst);
        self.live_textures.lock().unwrap().insert(id);
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        if !self.live_textures.lock().unwrap().remove(&id) {
            return Err(ResourceError::NotFound);
        }
        self.textures_destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn bind_texture(&self, unit: TextureUnit, texture: TextureId) -> Result<(), ResourceError> {
        self.bound.lock().unwrap().insert(unit, texture);
        self.record(MockCall::BindTexture(unit, texture));
        Ok(())
    }

    fn unbind_texture(&self, unit: TextureUnit) -> Result<(), ResourceError> {
        self.bound.lock().unwrap().remove(&unit);
        self.record(MockCall::UnbindTexture(unit));
        Ok(())
    }

    fn regenerate_mipmaps(&self, _unit: TextureUnit) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_framebuffer(
        &self,
        _descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, ResourceError> {
        self.framebuffers_created.fetch_add(1, Ordering::SeqCst);
        Ok(FramebufferId(self.next()))
    }

    fn destroy_framebuffer(&self, _id: FramebufferId) -> Result<(), ResourceError> {
        self.framebuffers_destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn bind_draw_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError> {
        self.record(MockCall::BindDrawFramebuffer(id));
        Ok(())
    }

    fn unbind_draw_framebuffer(&self) {}

    fn bind_read_framebuffer(&self, _id: FramebufferId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn unbind_read_framebuffer(&self) {}

    fn blit_framebuffer(
        &self,
        _source: Area,
        _destination: Area,
        _filter: BlitFilter,
    ) -> Result<(), ResourceError> {
        Ok(())
    }

    fn clear(&self, values: &ClearValues) -> Result<(), ResourceError> {
        self.record(MockCall::Clear(*values));
        Ok(())
    }

    fn set_viewport(&self, _area: Area) {}

    fn activate_render_state(&self, state: &RenderState) {
        self.record(MockCall::RenderState(*state));
    }

    fn compile_program(&self, source: &ProgramSource) -> Result<ProgramId, ShaderError> {
        if source.fragment.contains("syntax error") {
            return Err(ShaderError::CompileError {
                name: source.name.clone(),
                location: None,
                details: "syntax error".to_string(),
            });
        }
        Ok(ProgramId(self.next()))
    }

    fn destroy_program(&self, _id: ProgramId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn activate_program(&self, id: ProgramId) -> Result<(), ResourceError> {
        self.record(MockCall::ActivateProgram(id));
        Ok(())
    }

    fn deactivate_program(&self) {}

    fn set_uniform(
        &self,
        _program: ProgramId,
        name: &str,
        value: UniformValue,
    ) -> Result<(), ShaderError> {
        self.record(MockCall::Uniform(name.to_string(), value));
        Ok(())
    }

    fn create_array_buffer(
        &self,
        size: u64,
        _usage: BufferUsage,
    ) -> Result<ArrayBufferId, ResourceError> {
        let id = ArrayBufferId(self.next());
        self.buffers
            .lock()
            .unwrap()
            .insert(id, vec![0; size as usize]);
        Ok(id)
    }

    fn update_array_buffer(
        &self,
        id: ArrayBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let mut buffers = self.buffers.lock().unwrap();
        let buffer = buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.len() {
            return Err(ResourceError::OutOfBounds);
        }
        buffer[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_array_buffer(&self, id: ArrayBufferId) -> Result<(), ResourceError> {
        self.buffers
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_array_object(
        &self,
        _descriptor: &ArrayObjectDescriptor,
    ) -> Result<ArrayObjectId, ResourceError> {
        Ok(ArrayObjectId(self.next()))
    }

    fn destroy_array_object(&self, _id: ArrayObjectId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn bind_array_object(&self, id: ArrayObjectId) -> Result<(), ResourceError> {
        self.record(MockCall::BindArrayObject(id));
        Ok(())
    }

    fn unbind_array_object(&self) {}

    fn draw_elements(&self, _primitive: Primitive) -> Result<(), ResourceError> {
        self.record(MockCall::DrawElements);
        Ok(())
    }

    fn draw_elements_instanced(
        &self,
        _primitive: Primitive,
        instances: u32,
    ) -> Result<(), ResourceError> {
        self.record(MockCall::DrawInstanced(instances));
        Ok(())
    }

    fn draw_arrays(
        &self,
        _primitive: Primitive,
        first: u32,
        count: u32,
    ) -> Result<(), ResourceError> {
        self.record(MockCall::DrawArrays(first, count));
        Ok(())
    }
}
