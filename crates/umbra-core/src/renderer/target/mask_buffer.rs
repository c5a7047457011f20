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

//! The mask buffer: an R8 coverage mask of selected instances.

use super::{RenderTarget, RenderTargetDescription, TargetAttachments, TargetBuilder};
use crate::math::{Area, Vec4};
use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;

/// Describes a mask buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskBufferDescription {
    /// The buffer size.
    pub area: Area,
}

impl MaskBufferDescription {
    /// A mask buffer of the given size.
    pub fn new(area: Area) -> Self {
        Self { area }
    }

    /// Same description at a new size.
    pub fn with_area(&self, area: Area) -> Self {
        Self { area }
    }
}

impl RenderTargetDescription for MaskBufferDescription {
    fn area(&self) -> Area {
        self.area
    }
}

/// An R8 mask with a packed depth/stencil attachment.
#[derive(Debug)]
pub struct MaskBuffer {
    description: MaskBufferDescription,
    mask: TextureId,
    attachments: TargetAttachments,
}

impl MaskBuffer {
    /// Allocates a mask buffer matching `description`.
    pub fn create(
        device: &dyn GraphicsDevice,
        description: &MaskBufferDescription,
    ) -> Result<Self, ResourceError> {
        let area = description.area;
        let mut builder = TargetBuilder::new(device);
        let mask = builder.texture(
            &Texture2DDescriptor::new("mbuffer-mask", area, TextureFormat::R8).nearest(),
        )?;
        let depth = builder.texture(
            &Texture2DDescriptor::new("mbuffer-depth", area, TextureFormat::Depth24Stencil8).nearest(),
        )?;
        let attachments = builder.finish(&FramebufferDescriptor {
            label: Some("mbuffer".into()),
            color_attachments: vec![ColorAttachment {
                draw_buffer: 0,
                texture: mask,
            }],
            depth_attachment: Some(DepthStencilAttachment::DepthStencil(depth)),
        })?;
        Ok(Self {
            description: *description,
            mask,
            attachments,
        })
    }

    /// The mask texture.
    pub fn mask_texture(&self) -> TextureId {
        self.mask
    }

    /// Clears the bound mask to zero coverage and far depth.
    pub fn clear_bound_primary_framebuffer(
        &self,
        device: &dyn GraphicsDevice,
    ) -> Result<(), ResourceError> {
        device.clear(&ClearValues::all(Vec4::ZERO, 1.0, 0))
    }
}

impl RenderTarget for MaskBuffer {
    type Description = MaskBufferDescription;

    fn description(&self) -> &MaskBufferDescription {
        &self.description
    }

    fn primary_framebuffer(&self) -> FramebufferId {
        self.attachments.framebuffer
    }

    fn byte_size(&self) -> u64 {
        self.attachments.byte_size
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        self.attachments.delete(device)
    }

    fn is_deleted(&self) -> bool {
        self.attachments.is_deleted()
    }
}
