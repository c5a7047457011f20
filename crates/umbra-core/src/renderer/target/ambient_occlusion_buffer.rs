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

//! The ambient occlusion buffer consumed by the occlusion applicator.

use super::{RenderTarget, RenderTargetDescription, TargetAttachments, TargetBuilder};
use crate::math::{Area, Vec4};
use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;

/// Describes an ambient occlusion buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AmbientOcclusionBufferDescription {
    /// The buffer size.
    pub area: Area,
}

impl AmbientOcclusionBufferDescription {
    /// An occlusion buffer of the given size.
    pub fn new(area: Area) -> Self {
        Self { area }
    }

    /// Same description at a new size.
    pub fn with_area(&self, area: Area) -> Self {
        Self { area }
    }
}

impl RenderTargetDescription for AmbientOcclusionBufferDescription {
    fn area(&self) -> Area {
        self.area
    }
}

/// A single R8 occlusion term per pixel, 1.0 meaning unoccluded.
#[derive(Debug)]
pub struct AmbientOcclusionBuffer {
    description: AmbientOcclusionBufferDescription,
    occlusion: TextureId,
    attachments: TargetAttachments,
}

impl AmbientOcclusionBuffer {
    /// Allocates an ambient occlusion buffer matching `description`.
    pub fn create(
        device: &dyn GraphicsDevice,
        description: &AmbientOcclusionBufferDescription,
    ) -> Result<Self, ResourceError> {
        let mut builder = TargetBuilder::new(device);
        let occlusion = builder.texture(&Texture2DDescriptor::new(
            "aobuffer-occlusion",
            description.area,
            TextureFormat::R8,
        ))?;
        let attachments = builder.finish(&FramebufferDescriptor {
            label: Some("aobuffer".into()),
            color_attachments: vec![ColorAttachment {
                draw_buffer: 0,
                texture: occlusion,
            }],
            depth_attachment: None,
        })?;
        Ok(Self {
            description: *description,
            occlusion,
            attachments,
        })
    }

    /// The occlusion texture.
    pub fn occlusion_texture(&self) -> TextureId {
        self.occlusion
    }

    /// Clears the bound buffer to "no occlusion".
    pub fn clear_bound_primary_framebuffer(
        &self,
        device: &dyn GraphicsDevice,
    ) -> Result<(), ResourceError> {
        device.clear(&ClearValues {
            color: Some(Vec4::ONE),
            depth: None,
            stencil: None,
        })
    }
}

impl RenderTarget for AmbientOcclusionBuffer {
    type Description = AmbientOcclusionBufferDescription;

    fn description(&self) -> &AmbientOcclusionBufferDescription {
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
