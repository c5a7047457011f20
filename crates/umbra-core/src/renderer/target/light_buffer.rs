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

//! The light buffer: accumulated diffuse and specular light.

use super::{DepthAttachment, RenderTarget, RenderTargetDescription, TargetAttachments, TargetBuilder};
use crate::math::{Area, Vec4};
use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;

/// Which light terms a light buffer accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LightBufferComponents {
    /// Diffuse light only.
    DiffuseOnly,
    /// Specular light only.
    SpecularOnly,
    /// Both diffuse and specular light.
    #[default]
    Full,
}

/// Describes a light buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightBufferDescription {
    /// The buffer size.
    pub area: Area,
    /// The accumulated light terms.
    pub components: LightBufferComponents,
    /// The depth attachment. Sharing the geometry buffer's depth-stencil
    /// texture lets light volumes be depth and stencil tested without a copy.
    pub depth: DepthAttachment,
}

impl LightBufferDescription {
    /// A full light buffer with its own depth-stencil attachment.
    pub fn new(area: Area) -> Self {
        Self {
            area,
            components: LightBufferComponents::Full,
            depth: DepthAttachment::CreateWithStencil,
        }
    }

    /// Same description at a new size.
    pub fn with_area(&self, area: Area) -> Self {
        Self { area, ..*self }
    }
}

impl RenderTargetDescription for LightBufferDescription {
    fn area(&self) -> Area {
        self.area
    }
}

/// A light buffer with RGBA8 diffuse and/or specular attachments.
#[derive(Debug)]
pub struct LightBuffer {
    description: LightBufferDescription,
    diffuse: Option<TextureId>,
    specular: Option<TextureId>,
    depth: DepthStencilAttachment,
    attachments: TargetAttachments,
}

impl LightBuffer {
    /// Allocates a light buffer matching `description`.
    pub fn create(
        device: &dyn GraphicsDevice,
        description: &LightBufferDescription,
    ) -> Result<Self, ResourceError> {
        let area = description.area;
        let mut builder = TargetBuilder::new(device);

        let (want_diffuse, want_specular) = match description.components {
            LightBufferComponents::DiffuseOnly => (true, false),
            LightBufferComponents::SpecularOnly => (false, true),
            LightBufferComponents::Full => (true, true),
        };

        let mut color_attachments = Vec::new();
        let diffuse = if want_diffuse {
            let texture = builder.texture(&Texture2DDescriptor::new(
                "lbuffer-diffuse",
                area,
                TextureFormat::Rgba8,
            ))?;
            color_attachments.push(ColorAttachment {
                draw_buffer: 0,
                texture,
            });
            Some(texture)
        } else {
            None
        };
        let specular = if want_specular {
            let texture = builder.texture(&Texture2DDescriptor::new(
                "lbuffer-specular",
                area,
                TextureFormat::Rgba8,
            ))?;
            color_attachments.push(ColorAttachment {
                draw_buffer: 1,
                texture,
            });
            Some(texture)
        } else {
            None
        };
        let depth = description
            .depth
            .attach(&mut builder, "lbuffer-depth", area)?;

        let attachments = builder.finish(&FramebufferDescriptor {
            label: Some("lbuffer".into()),
            color_attachments,
            depth_attachment: Some(depth),
        })?;

        log::debug!(
            "LightBuffer: created {}x{} {:?} ({} bytes)",
            area.width,
            area.height,
            description.components,
            attachments.byte_size
        );

        Ok(Self {
            description: *description,
            diffuse,
            specular,
            depth,
            attachments,
        })
    }

    /// The diffuse texture, if accumulated.
    pub fn diffuse_texture(&self) -> Option<TextureId> {
        self.diffuse
    }

    /// The specular texture, if accumulated.
    pub fn specular_texture(&self) -> Option<TextureId> {
        self.specular
    }

    /// The depth attachment, owned or shared.
    pub fn depth_attachment(&self) -> DepthStencilAttachment {
        self.depth
    }

    /// Clears the light terms of the bound buffer to black. Depth and stencil
    /// are left alone, since they usually belong to the geometry buffer.
    pub fn clear_bound_primary_framebuffer(
        &self,
        device: &dyn GraphicsDevice,
    ) -> Result<(), ResourceError> {
        device.clear(&ClearValues {
            color: Some(Vec4::new(0.0, 0.0, 0.0, 1.0)),
            depth: None,
            stencil: None,
        })
    }
}

impl RenderTarget for LightBuffer {
    type Description = LightBufferDescription;

    fn description(&self) -> &LightBufferDescription {
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
