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

//! The geometry buffer: the surface attributes written by the geometry pass.

use super::{RenderTarget, RenderTargetDescription, SharedDepth, TargetAttachments, TargetBuilder};
use crate::math::{Area, Vec4};
use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;

/// Which attachments a geometry buffer has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeometryBufferComponents {
    /// Albedo/emission, normals, specular and depth-stencil.
    #[default]
    Full,
    /// Everything but the specular attachment.
    NoSpecular,
}

/// Describes a geometry buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryBufferDescription {
    /// The buffer size.
    pub area: Area,
    /// The attachment layout.
    pub components: GeometryBufferComponents,
}

impl GeometryBufferDescription {
    /// A full geometry buffer of the given size.
    pub fn new(area: Area) -> Self {
        Self {
            area,
            components: GeometryBufferComponents::Full,
        }
    }

    /// Same description at a new size.
    pub fn with_area(&self, area: Area) -> Self {
        Self { area, ..*self }
    }
}

impl RenderTargetDescription for GeometryBufferDescription {
    fn area(&self) -> Area {
        self.area
    }
}

/// A geometry buffer.
///
/// | Draw buffer | Format | Contents |
/// |---|---|---|
/// | 0 | RGBA8 | albedo (rgb), emission (a) |
/// | 1 | RG16F | compressed view-space normal |
/// | 2 | RGBA8 | specular color (rgb), exponent (a); absent for `NoSpecular` |
/// | depth | DEPTH24_STENCIL8 | depth and stencil |
#[derive(Debug)]
pub struct GeometryBuffer {
    description: GeometryBufferDescription,
    albedo_emissive: TextureId,
    normal: TextureId,
    specular: Option<TextureId>,
    depth_stencil: TextureId,
    attachments: TargetAttachments,
}

impl GeometryBuffer {
    /// Allocates a geometry buffer matching `description`.
    pub fn create(
        device: &dyn GraphicsDevice,
        description: &GeometryBufferDescription,
    ) -> Result<Self, ResourceError> {
        let area = description.area;
        let mut builder = TargetBuilder::new(device);

        let albedo_emissive = builder.texture(&Texture2DDescriptor::new(
            "gbuffer-albedo-emissive",
            area,
            TextureFormat::Rgba8,
        ))?;
        let normal = builder.texture(
            &Texture2DDescriptor::new("gbuffer-normal", area, TextureFormat::Rg16f).nearest(),
        )?;
        let specular = match description.components {
            GeometryBufferComponents::Full => Some(builder.texture(&Texture2DDescriptor::new(
                "gbuffer-specular",
                area,
                TextureFormat::Rgba8,
            ))?),
            GeometryBufferComponents::NoSpecular => None,
        };
        let depth_stencil = builder.texture(
            &Texture2DDescriptor::new("gbuffer-depth-stencil", area, TextureFormat::Depth24Stencil8)
                .nearest(),
        )?;

        let mut color_attachments = vec![
            ColorAttachment {
                draw_buffer: 0,
                texture: albedo_emissive,
            },
            ColorAttachment {
                draw_buffer: 1,
                texture: normal,
            },
        ];
        if let Some(texture) = specular {
            color_attachments.push(ColorAttachment {
                draw_buffer: 2,
                texture,
            });
        }

        let attachments = builder.finish(&FramebufferDescriptor {
            label: Some("gbuffer".into()),
            color_attachments,
            depth_attachment: Some(DepthStencilAttachment::DepthStencil(depth_stencil)),
        })?;

        log::debug!(
            "GeometryBuffer: created {}x{} {:?} ({} bytes)",
            area.width,
            area.height,
            description.components,
            attachments.byte_size
        );

        Ok(Self {
            description: *description,
            albedo_emissive,
            normal,
            specular,
            depth_stencil,
            attachments,
        })
    }

    /// The albedo and emission texture.
    pub fn albedo_emissive_texture(&self) -> TextureId {
        self.albedo_emissive
    }

    /// The normal texture.
    pub fn normal_texture(&self) -> TextureId {
        self.normal
    }

    /// The specular texture, if the buffer has one.
    pub fn specular_texture(&self) -> Option<TextureId> {
        self.specular
    }

    /// The depth-stencil texture.
    pub fn depth_texture(&self) -> TextureId {
        self.depth_stencil
    }

    /// The depth-stencil texture as an attachment other targets can borrow.
    pub fn shared_depth(&self) -> SharedDepth {
        SharedDepth {
            texture: self.depth_stencil,
            with_stencil: true,
        }
    }

    /// Clears the buffer, which must be bound for drawing: black, far depth,
    /// zero stencil.
    pub fn clear_bound_primary_framebuffer(
        &self,
        device: &dyn GraphicsDevice,
    ) -> Result<(), ResourceError> {
        device.clear(&ClearValues::all(Vec4::ZERO, 1.0, 0))
    }
}

impl RenderTarget for GeometryBuffer {
    type Description = GeometryBufferDescription;

    fn description(&self) -> &GeometryBufferDescription {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGraphicsDevice;

    #[test]
    fn full_buffer_is_sixteen_bytes_per_pixel() {
        let device = MockGraphicsDevice::new();
        let gbuffer =
            GeometryBuffer::create(&device, &GeometryBufferDescription::new(Area::new(640, 480)))
                .unwrap();
        assert_eq!(gbuffer.byte_size(), 640 * 480 * 16);
        assert!(gbuffer.specular_texture().is_some());
    }

    #[test]
    fn no_specular_buffer_is_twelve_bytes_per_pixel() {
        let device = MockGraphicsDevice::new();
        let description = GeometryBufferDescription {
            area: Area::new(640, 480),
            components: GeometryBufferComponents::NoSpecular,
        };
        let gbuffer = GeometryBuffer::create(&device, &description).unwrap();
        assert_eq!(gbuffer.byte_size(), 640 * 480 * 12);
        assert!(gbuffer.specular_texture().is_none());
    }

    #[test]
    fn double_delete_is_a_no_op() {
        let device = MockGraphicsDevice::new();
        let gbuffer =
            GeometryBuffer::create(&device, &GeometryBufferDescription::new(Area::new(4, 4)))
                .unwrap();
        assert!(!gbuffer.is_deleted());

        gbuffer.delete(&device).unwrap();
        assert!(gbuffer.is_deleted());
        assert_eq!(device.live_texture_count(), 0);

        gbuffer.delete(&device).unwrap();
        assert!(gbuffer.is_deleted());
        assert_eq!(
            device
                .framebuffers_destroyed
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[test]
    fn failed_construction_leaves_nothing_behind() {
        let device = MockGraphicsDevice::new();
        device.fail_texture_creation_after(2);
        let result =
            GeometryBuffer::create(&device, &GeometryBufferDescription::new(Area::new(8, 8)));
        assert!(result.is_err());
        assert_eq!(device.live_texture_count(), 0);
    }
}
