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

use crate::math::Area;
use crate::renderer::api::*;
use crate::renderer::error::{ResourceError, ShaderError};
use std::fmt::Debug;

/// A GPU context. Implementations are expected to be used from one thread at a
/// time; the `Send + Sync` bound only allows handing the device to a worker.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// The number of texture units the hardware exposes.
    fn texture_units_max(&self) -> u32;

    /// Creates a 2D texture.
    /// ## Arguments
    /// * `descriptor` - The texture size, format and sampling configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created texture.
    /// ## Errors
    /// * `ResourceError` - If the backend fails to allocate the texture.
    fn create_texture_2d(
        &self,
        descriptor: &Texture2DDescriptor,
    ) -> Result<TextureId, ResourceError>;

    /// Destroys a texture.
    /// ## Arguments
    /// * `id` - The ID of the texture to be destroyed.
    /// ## Errors
    /// * `ResourceError` - If the ID is unknown.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Binds a texture to a texture unit.
    fn bind_texture(&self, unit: TextureUnit, texture: TextureId) -> Result<(), ResourceError>;

    /// Unbinds whatever texture is bound to a texture unit.
    fn unbind_texture(&self, unit: TextureUnit) -> Result<(), ResourceError>;

    /// Regenerates the mipmaps of the texture bound to `unit`.
    fn regenerate_mipmaps(&self, unit: TextureUnit) -> Result<(), ResourceError>;

    /// Creates a framebuffer from existing textures.
    /// ## Arguments
    /// * `descriptor` - The color attachments and optional depth attachment.
    /// ## Returns
    /// A `Result` containing the ID of the created framebuffer.
    /// ## Errors
    /// * `ResourceError` - If an attachment is unknown or the framebuffer is incomplete.
    fn create_framebuffer(
        &self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, ResourceError>;

    /// Destroys a framebuffer. The attached textures are left untouched.
    fn destroy_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError>;

    /// Binds a framebuffer for drawing.
    fn bind_draw_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError>;

    /// Restores the default framebuffer for drawing.
    fn unbind_draw_framebuffer(&self);

    /// Binds a framebuffer as the source of blits.
    fn bind_read_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError>;

    /// Restores the default framebuffer as the source of blits.
    fn unbind_read_framebuffer(&self);

    /// Copies the color contents of the read framebuffer to the draw framebuffer.
    /// ## Arguments
    /// * `source` - The region read.
    /// * `destination` - The region written.
    /// * `filter` - The filter used when the regions differ in size.
    fn blit_framebuffer(
        &self,
        source: Area,
        destination: Area,
        filter: BlitFilter,
    ) -> Result<(), ResourceError>;

    /// Clears the bound draw framebuffer.
    fn clear(&self, values: &ClearValues) -> Result<(), ResourceError>;

    /// Sets the viewport to the given area, anchored at the origin.
    fn set_viewport(&self, area: Area);

    /// Activates blending, culling, depth, stencil and color write state.
    fn activate_render_state(&self, state: &RenderState);

    /// Compiles and links a shader program.
    /// ## Arguments
    /// * `source` - The resolved sources of every stage.
    /// ## Returns
    /// A `Result` containing the ID of the linked program.
    /// ## Errors
    /// * `ShaderError::CompileError` - If a stage fails to compile or the program fails to link.
    fn compile_program(&self, source: &ProgramSource) -> Result<ProgramId, ShaderError>;

    /// Destroys a shader program.
    fn destroy_program(&self, id: ProgramId) -> Result<(), ResourceError>;

    /// Makes a program current.
    fn activate_program(&self, id: ProgramId) -> Result<(), ResourceError>;

    /// Clears the current program.
    fn deactivate_program(&self);

    /// Uploads a value to a named uniform of `program`, which must be current.
    /// ## Errors
    /// * `ShaderError::MissingUniform` - If the program has no such uniform.
    fn set_uniform(
        &self,
        program: ProgramId,
        name: &str,
        value: UniformValue,
    ) -> Result<(), ShaderError>;

    /// Allocates an array buffer of `size` bytes.
    fn create_array_buffer(&self, size: u64, usage: BufferUsage)
        -> Result<ArrayBufferId, ResourceError>;

    /// Writes `data` at `offset` into an array buffer.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If the write does not fit in the buffer.
    fn update_array_buffer(
        &self,
        id: ArrayBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError>;

    /// Destroys an array buffer.
    fn destroy_array_buffer(&self, id: ArrayBufferId) -> Result<(), ResourceError>;

    /// Creates an array object.
    fn create_array_object(
        &self,
        descriptor: &ArrayObjectDescriptor,
    ) -> Result<ArrayObjectId, ResourceError>;

    /// Destroys an array object. Buffers it reads from are left untouched.
    fn destroy_array_object(&self, id: ArrayObjectId) -> Result<(), ResourceError>;

    /// Binds an array object for drawing.
    fn bind_array_object(&self, id: ArrayObjectId) -> Result<(), ResourceError>;

    /// Unbinds the current array object.
    fn unbind_array_object(&self);

    /// Draws every index of the bound array object.
    fn draw_elements(&self, primitive: Primitive) -> Result<(), ResourceError>;

    /// Draws every index of the bound array object `instances` times.
    fn draw_elements_instanced(
        &self,
        primitive: Primitive,
        instances: u32,
    ) -> Result<(), ResourceError>;

    /// Draws `count` vertices of the bound array object, starting at `first`.
    fn draw_arrays(&self, primitive: Primitive, first: u32, count: u32)
        -> Result<(), ResourceError>;
}
