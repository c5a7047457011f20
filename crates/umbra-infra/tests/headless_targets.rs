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

//! Render targets, pools and texture unit contexts driven against the
//! headless device, which validates framebuffer completeness and tracks VRAM.

use std::rc::Rc;
use std::sync::Arc;

use umbra_core::math::Area;
use umbra_core::renderer::api::{Texture2DDescriptor, TextureFormat, TextureUnit};
use umbra_core::renderer::target::*;
use umbra_core::renderer::texture_unit::TextureUnitAllocator;
use umbra_core::renderer::GraphicsDevice;
use umbra_infra::HeadlessDevice;

#[test]
fn geometry_buffer_variants_match_their_byte_sizes() -> anyhow::Result<()> {
    let device = HeadlessDevice::new();
    let area = Area::new(640, 480);

    let full = GeometryBuffer::create(&device, &GeometryBufferDescription::new(area))?;
    assert_eq!(full.byte_size(), 640 * 480 * 16);
    assert_eq!(device.vram_allocated_bytes() as u64, full.byte_size());

    let no_specular = GeometryBuffer::create(
        &device,
        &GeometryBufferDescription {
            area,
            components: GeometryBufferComponents::NoSpecular,
        },
    )?;
    assert_eq!(no_specular.byte_size(), 640 * 480 * 12);

    full.delete(&device)?;
    no_specular.delete(&device)?;
    no_specular.delete(&device)?;
    assert!(no_specular.is_deleted());
    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.live_framebuffers(), 0);
    assert_eq!(device.vram_allocated_bytes(), 0);
    Ok(())
}

#[test]
fn light_buffer_borrows_the_geometry_depth() -> anyhow::Result<()> {
    let device = HeadlessDevice::new();
    let area = Area::new(320, 240);
    let gbuffer = GeometryBuffer::create(&device, &GeometryBufferDescription::new(area))?;

    let description = LightBufferDescription {
        depth: DepthAttachment::Share(SharedDepth {
            texture: gbuffer.depth_texture(),
            with_stencil: true,
        }),
        ..LightBufferDescription::new(area)
    };
    let lbuffer = LightBuffer::create(&device, &description)?;
    assert_eq!(lbuffer.byte_size(), 320 * 240 * 8);

    lbuffer.delete(&device)?;
    assert!(device.is_texture_live(gbuffer.depth_texture()));
    gbuffer.delete(&device)?;
    assert!(!device.is_texture_live(gbuffer.depth_texture()));
    Ok(())
}

#[test]
fn every_target_kind_builds_a_complete_framebuffer() -> anyhow::Result<()> {
    let device = HeadlessDevice::new();
    let area = Area::new(128, 128);

    let variance = DepthVarianceBuffer::create(&device, &DepthVarianceBufferDescription::new(area))?;
    let mask = MaskBuffer::create(&device, &MaskBufferDescription::new(area))?;
    let occlusion = AmbientOcclusionBuffer::create(
        &device,
        &AmbientOcclusionBufferDescription::new(area),
    )?;
    let image = ImageBuffer::create(
        &device,
        &ImageBufferDescription {
            area,
            depth: Some(DepthAttachment::CreateWithStencil),
        },
    )?;

    assert_eq!(device.live_framebuffers(), 4);
    assert_eq!(
        device.texture_info(mask.mask_texture()),
        Some((area, TextureFormat::R8))
    );
    assert_eq!(
        device.texture_info(variance.depth_variance_texture()),
        Some((area, TextureFormat::Rg16f))
    );

    variance.delete(&device)?;
    mask.delete(&device)?;
    occlusion.delete(&device)?;
    image.delete(&device)?;
    assert_eq!(device.live_textures(), 0);
    Ok(())
}

#[test]
fn pool_recycles_and_tears_down_on_a_real_registry() -> anyhow::Result<()> {
    let device = HeadlessDevice::new();
    let pool: RenderTargetPool<ImageBuffer> = RenderTargetPool::new(ImageBuffer::create);
    let description = ImageBufferDescription::new(Area::new(256, 256));

    let first = pool.acquire(&device, &description)?;
    let first_texture = first.image_texture();
    pool.release(first);

    let half = scale(&description, ImageBufferDescription::with_area, 0.5);
    assert_eq!(half.area, Area::new(128, 128));
    let scaled = pool.acquire(&device, &half)?;
    let again = pool.acquire(&device, &description)?;
    assert_eq!(again.image_texture(), first_texture);
    assert_eq!(device.live_framebuffers(), 2);

    pool.release(Rc::clone(&scaled));
    assert_eq!(pool.evict_unused(&device), 1);
    assert!(scaled.is_deleted());

    pool.release(again);
    pool.delete_all(&device);
    pool.delete_all(&device);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(pool.bytes_allocated(), 0);
    Ok(())
}

#[test]
fn unit_contexts_restore_bindings_on_the_device() -> anyhow::Result<()> {
    let device = Arc::new(HeadlessDevice::with_texture_units(4));
    let allocator = TextureUnitAllocator::new(device.clone(), 4)?;
    let root = allocator.root_context();

    let outer = root.unit_context_new()?;
    let (albedo_unit, albedo) = outer.allocate_texture_2d(&Texture2DDescriptor::new(
        "albedo",
        Area::new(8, 8),
        TextureFormat::Rgba8,
    ))?;
    assert_eq!(albedo_unit, TextureUnit(0));

    let inner = outer.unit_context_new()?;
    let (scratch_unit, scratch) = inner.allocate_texture_2d(&Texture2DDescriptor::new(
        "scratch",
        Area::new(8, 8),
        TextureFormat::R8,
    ))?;
    assert_eq!(scratch_unit, TextureUnit(1));
    assert_eq!(device.bound_texture(TextureUnit(1)), Some(scratch));

    inner.finish()?;
    assert!(!device.is_texture_live(scratch));
    assert_eq!(device.bound_texture(TextureUnit(1)), None);
    assert_eq!(device.bound_texture(TextureUnit(0)), Some(albedo));

    outer.finish()?;
    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.texture_units_max(), 4);
    Ok(())
}
