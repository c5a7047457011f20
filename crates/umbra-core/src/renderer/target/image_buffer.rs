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

//! The image buffer: a general purpose RGBA8 color target.

use super::{DepthAttachment, RenderTarget, RenderTargetDescription, TargetAttachments, TargetBuilder};
use crate::math::{Area, Vec4};
use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;

/// Describes an image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageBufferDescription {
    /// The buffer size.
    pub area: Area,
    /// The optional depth attachment.
    pub depth: Option<DepthAttachment>,
}

impl ImageBufferDescription {
    /// A color-only image buffer.
    pub fn new(area: Area) -> Self {
        Self { area, depth: None }
    }

    /// Same description at a new size. A shared depth attachment has a fixed
    /// size, so resizing drops it.
    pub fn with_area(&self, area: Area) -> Self {
        let depth = match self.depth {
            Some(DepthAttachment::Share(_)) if area != self.area => None,
            other => other,
        };
        Self { area, depth }
    }
}

impl RenderTargetDescription for ImageBufferDescription {
    fn area(&self) -> Area {
        self.area
    }
}

/// An RGBA8 image buffer with an optional depth attachment.
#[derive(Debug)]
pub struct ImageBuffer {
    description: ImageBufferDescription,
    image: TextureId,
    depth: Option<DepthStencilAttachment>,
    attachments: TargetAttachments,
}

impl ImageBuffer {
    /// Allocates an image buffer matching `description`.
    pub fn create(
        device: &dyn GraphicsDevice,
        description: &ImageBufferDescription,
    ) -> Result<Self, ResourceError> {
        let area = description.area;
        let mut builder = TargetBuilder::new(device);
        let image = builder.texture(&Texture2DDescriptor::new(
            "ibuffer-image",
            area,
            TextureFormat::Rgba8,
        ))?;
        let depth = description
            .depth
            .map(|depth| depth.attach(&mut builder, "ibuffer-depth", area))
            .transpose()?;
        let attachments = builder.finish(&FramebufferDescriptor {
            label: Some("ibuffer".into()),
            color_attachments: vec![ColorAttachment {
                draw_buffer: 0,
                texture: image,
            }],
            depth_attachment: depth,
        })?;

        log::debug!(
            "ImageBuffer: created {}x{} ({} bytes)",
            area.width,
            area.height,
            attachments.byte_size
        );

        Ok(Self {
            description: *description,
            image,
            depth,
            attachments,
        })
    }

    /// The color texture.
    pub fn image_texture(&self) -> TextureId {
        self.image
    }

    /// The depth attachment, if any.
    pub fn depth_attachment(&self) -> Option<DepthStencilAttachment> {
        self.depth
    }

    /// Clears the bound buffer to transparent black and far depth.
    pub fn clear_bound_primary_framebuffer(
        &self,
        device: &dyn GraphicsDevice,
    ) -> Result<(), ResourceError> {
        device.clear(&ClearValues {
            color: Some(Vec4::ZERO),
            depth: self.depth.map(|_| 1.0),
            stencil: None,
        })
    }
}

impl RenderTarget for ImageBuffer {
    type Description = ImageBufferDescription;

    fn description(&self) -> &ImageBufferDescription {
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
