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

//! GPU render targets, their structural descriptions and the pool that
//! recycles them.
//!
//! A description is an immutable value; two descriptions are equal iff all of
//! their fields are. A target is a live set of attachments matching its
//! description. Targets are deleted exactly once: deleting an already deleted
//! target is a no-op.

mod ambient_occlusion_buffer;
mod depth;
mod depth_variance_buffer;
mod geometry_buffer;
mod image_buffer;
mod light_buffer;
mod mask_buffer;
mod pool;

pub use self::ambient_occlusion_buffer::*;
pub use self::depth::*;
pub use self::depth_variance_buffer::*;
pub use self::geometry_buffer::*;
pub use self::image_buffer::*;
pub use self::light_buffer::*;
pub use self::mask_buffer::*;
pub use self::pool::*;

use crate::math::Area;
use crate::renderer::api::{FramebufferDescriptor, FramebufferId, Texture2DDescriptor, TextureId};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use std::cell::Cell;
use std::fmt::Debug;
use std::hash::Hash;

/// The structural description of a render target.
pub trait RenderTargetDescription: Clone + Eq + Hash + Debug + 'static {
    /// The size of every attachment.
    fn area(&self) -> Area;
}

/// A live render target.
pub trait RenderTarget: Debug + 'static {
    /// The description type this target is created from.
    type Description: RenderTargetDescription;

    /// The description the target was created from.
    fn description(&self) -> &Self::Description;

    /// The framebuffer passes draw into.
    fn primary_framebuffer(&self) -> FramebufferId;

    /// The total size in bytes of the attachments this target owns. Borrowed
    /// attachments are not counted.
    fn byte_size(&self) -> u64;

    /// Deletes the framebuffer and every owned attachment.
    ///
    /// Deleting a deleted target does nothing and succeeds.
    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError>;

    /// Returns `true` once [`RenderTarget::delete`] has been called.
    fn is_deleted(&self) -> bool;

    /// The size of the target.
    fn area(&self) -> Area {
        self.description().area()
    }
}

/// Scales a description's area by `factor` and hands the result to the
/// caller's `scaler`, which decides what a resized description looks like.
pub fn scale<D, F>(description: &D, scaler: F, factor: f64) -> D
where
    D: RenderTargetDescription,
    F: Fn(&D, Area) -> D,
{
    scaler(description, description.area().scaled(factor))
}

/// Builds a target's attachments, destroying whatever was created if a later
/// step fails so that construction either fully succeeds or leaves nothing
/// behind.
pub(crate) struct TargetBuilder<'d> {
    device: &'d dyn GraphicsDevice,
    owned: Vec<TextureId>,
    bytes: u64,
}

impl<'d> TargetBuilder<'d> {
    pub(crate) fn new(device: &'d dyn GraphicsDevice) -> Self {
        Self {
            device,
            owned: Vec::new(),
            bytes: 0,
        }
    }

    /// Creates a texture owned by the target under construction.
    pub(crate) fn texture(
        &mut self,
        descriptor: &Texture2DDescriptor,
    ) -> Result<TextureId, ResourceError> {
        let id = self.device.create_texture_2d(descriptor)?;
        self.owned.push(id);
        self.bytes += descriptor.byte_size();
        Ok(id)
    }

    /// Creates the framebuffer and hands over ownership of the textures.
    pub(crate) fn finish(
        mut self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<TargetAttachments, ResourceError> {
        let framebuffer = self.device.create_framebuffer(descriptor)?;
        Ok(TargetAttachments {
            framebuffer,
            owned: std::mem::take(&mut self.owned),
            byte_size: self.bytes,
            deleted: Cell::new(false),
        })
    }
}

impl Drop for TargetBuilder<'_> {
    fn drop(&mut self) {
        for texture in self.owned.drain(..) {
            if let Err(e) = self.device.destroy_texture(texture) {
                log::warn!(
                    "TargetBuilder: Failed to destroy partial attachment {:?}: {:?}",
                    texture,
                    e
                );
            }
        }
    }
}

/// The framebuffer and owned textures of a constructed target.
#[derive(Debug)]
pub(crate) struct TargetAttachments {
    pub(crate) framebuffer: FramebufferId,
    owned: Vec<TextureId>,
    pub(crate) byte_size: u64,
    deleted: Cell<bool>,
}

impl TargetAttachments {
    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.get()
    }

    /// Destroys the framebuffer and owned textures once. Every resource is
    /// attempted; the first failure is returned.
    pub(crate) fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }

        let mut first_error = device.destroy_framebuffer(self.framebuffer).err();
        for texture in &self.owned {
            if let Err(e) = device.destroy_texture(*texture) {
                log::warn!("RenderTarget: Failed to destroy attachment {:?}: {:?}", texture, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
