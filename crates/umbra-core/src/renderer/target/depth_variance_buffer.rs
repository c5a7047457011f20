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

//! The depth-variance buffer: first and second depth moments for variance
//! shadow mapping.

use super::{DepthPrecision, RenderTarget, RenderTargetDescription, TargetAttachments, TargetBuilder};
use crate::math::{Area, Vec4};
use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use serde::{Deserialize, Serialize};

/// The precision of the stored depth moments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthVariancePrecision {
    /// Two 16-bit float channels.
    #[default]
    Bits16,
    /// Two 32-bit float channels.
    Bits32,
}

impl DepthVariancePrecision {
    /// The texture format with this precision.
    pub fn format(&self) -> TextureFormat {
        match self {
            DepthVariancePrecision::Bits16 => TextureFormat::Rg16f,
            DepthVariancePrecision::Bits32 => TextureFormat::Rg32f,
        }
    }
}

/// Describes a depth-variance buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthVarianceBufferDescription {
    /// The buffer size.
    pub area: Area,
    /// Precision of the depth attachment used while rendering.
    pub depth_precision: DepthPrecision,
    /// Precision of the stored moments.
    pub variance_precision: DepthVariancePrecision,
    /// Minification filter of the moments texture.
    pub min_filter: TextureFilter,
    /// Magnification filter of the moments texture.
    pub mag_filter: TextureFilter,
}

impl DepthVarianceBufferDescription {
    /// A linearly filtered, 16-bit moments buffer of the given size.
    pub fn new(area: Area) -> Self {
        Self {
            area,
            depth_precision: DepthPrecision::Bits24,
            variance_precision: DepthVariancePrecision::Bits16,
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
        }
    }

    /// Same description at a new size.
    pub fn with_area(&self, area: Area) -> Self {
        Self { area, ..*self }
    }
}

impl RenderTargetDescription for DepthVarianceBufferDescription {
    fn area(&self) -> Area {
        self.area
    }
}

/// A depth-variance buffer.
#[derive(Debug)]
pub struct DepthVarianceBuffer {
    description: DepthVarianceBufferDescription,
    moments: TextureId,
    depth: TextureId,
    attachments: TargetAttachments,
}

impl DepthVarianceBuffer {
    /// Allocates a depth-variance buffer matching `description`.
    pub fn create(
        device: &dyn GraphicsDevice,
        description: &DepthVarianceBufferDescription,
    ) -> Result<Self, ResourceError> {
        let area = description.area;
        let mut builder = TargetBuilder::new(device);
        let moments = builder.texture(&Texture2DDescriptor {
            min_filter: description.min_filter,
            mag_filter: description.mag_filter,
            ..Texture2DDescriptor::new(
                "dvbuffer-moments",
                area,
                description.variance_precision.format(),
            )
        })?;
        let depth = builder.texture(
            &Texture2DDescriptor::new(
                "dvbuffer-depth",
                area,
                description.depth_precision.format(),
            )
            .nearest(),
        )?;
        let attachments = builder.finish(&FramebufferDescriptor {
            label: Some("dvbuffer".into()),
            color_attachments: vec![ColorAttachment {
                draw_buffer: 0,
                texture: moments,
            }],
            depth_attachment: Some(DepthStencilAttachment::Depth(depth)),
        })?;

        log::debug!(
            "DepthVarianceBuffer: created {}x{} ({} bytes)",
            area.width,
            area.height,
            attachments.byte_size
        );

        Ok(Self {
            description: *description,
            moments,
            depth,
            attachments,
        })
    }

    /// The moments texture sampled by shadowed lights.
    pub fn depth_variance_texture(&self) -> TextureId {
        self.moments
    }

    /// The depth texture used while rendering the moments.
    pub fn depth_texture(&self) -> TextureId {
        self.depth
    }

    /// Clears the bound buffer: maximal moments and far depth, so that
    /// unrendered texels are fully lit.
    pub fn clear_bound_primary_framebuffer(
        &self,
        device: &dyn GraphicsDevice,
    ) -> Result<(), ResourceError> {
        device.clear(&ClearValues {
            color: Some(Vec4::new(1.0, 1.0, 0.0, 0.0)),
            depth: Some(1.0),
            stencil: None,
        })
    }
}

impl RenderTarget for DepthVarianceBuffer {
    type Description = DepthVarianceBufferDescription;

    fn description(&self) -> &DepthVarianceBufferDescription {
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
