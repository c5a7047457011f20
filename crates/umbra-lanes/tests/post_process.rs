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
//! Filters and shadow maps chained through pooled targets.

use anyhow::Result;
use approx::assert_relative_eq;
use std::rc::Rc;
use std::sync::Arc;
use umbra_core::math::{Area, Mat4};
use umbra_core::renderer::api::{Texture2DDescriptor, TextureFormat, UniformValue};
use umbra_core::renderer::filter::{BlurParameters, FxaaSettings};
use umbra_core::renderer::light::{Light, ProjectiveLight};
use umbra_core::renderer::material::Material;
use umbra_core::renderer::matrices::{Matrices, Projection};
use umbra_core::renderer::mesh::MeshData;
use umbra_core::renderer::shader::{InstanceShader, ShaderKind};
use umbra_core::renderer::shadow::{Shadow, ShadowDepthVariance};
use umbra_core::renderer::target::{
    DepthVarianceBuffer, DepthVarianceBufferDescription, GeometryBuffer,
    GeometryBufferDescription, ImageBuffer, ImageBufferDescription, RenderTargetPool,
};
use umbra_core::renderer::texture_unit::TextureUnitAllocator;
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::instance::InstanceSingle;
use umbra_core::scene::transform::{SharedTransform, Transform};
use umbra_core::scene::DepthInstances;
use umbra_core::{IdPool, RenderError};
use umbra_infra::HeadlessDevice;
use umbra_lanes::filter_lane::{FilterOutput, FogLane, FogParameters, FogProgression, FxaaLane};
use umbra_lanes::render_lane::shaders::stock_source;
use umbra_lanes::render_lane::ShadowMapLane;
use umbra_lanes::UnitQuad;

const AREA: Area = Area {
    width: 80,
    height: 60,
};

fn projection() -> Projection {
    Projection::Perspective {
        fov_y_radians: 1.2,
        aspect: 4.0 / 3.0,
        near: 0.5,
        far: 60.0,
    }
}

#[test]
fn fog_feeds_fxaa_through_a_pooled_image() -> Result<()> {
    let device = Arc::new(HeadlessDevice::new());
    let allocator = TextureUnitAllocator::new(device.clone(), 4)?;
    let units = allocator.root_context();
    let quad = Rc::new(UnitQuad::new(device.as_ref())?);
    let fog = FogLane::new(device.as_ref(), quad.clone())?;
    let fxaa = FxaaLane::new(quad);

    let gbuffer = GeometryBuffer::create(device.as_ref(), &GeometryBufferDescription::new(AREA))?;
    let image = ImageBuffer::create(device.as_ref(), &ImageBufferDescription::new(AREA))?;
    let pool = RenderTargetPool::new(
        |device: &dyn GraphicsDevice, description: &ImageBufferDescription| {
            ImageBuffer::create(device, description)
        },
    );
    let parameters = FogParameters {
        progression: FogProgression::Quadratic,
        near: 2.0,
        far: 40.0,
        ..FogParameters::default()
    };

    let matrices = Matrices::new();
    matrices.with_observer(Mat4::IDENTITY, &projection(), |observer| {
        pool.with_target(
            device.as_ref(),
            &ImageBufferDescription::new(AREA),
            |fogged: &ImageBuffer| {
                fog.evaluate(
                    device.as_ref(),
                    &units,
                    observer,
                    &parameters,
                    image.image_texture(),
                    gbuffer.depth_texture(),
                    FilterOutput::target(fogged),
                )?;
                fxaa.evaluate(
                    device.as_ref(),
                    &units,
                    &FxaaSettings::default(),
                    fogged.image_texture(),
                    FilterOutput::Default(AREA),
                )
            },
        )
    })?;

    let draws = device.draw_calls();
    assert_eq!(draws.len(), 2);
    assert_eq!(device.program_name(draws[0].program).as_deref(), Some("fog-quadratic"));
    assert_eq!(draws[1].framebuffer, None);

    match device.uniform(draws[0].program, "fog_far") {
        Some(UniformValue::Float(far)) => assert_relative_eq!(far, 40.0),
        other => panic!("unexpected fog_far {other:?}"),
    }
    match device.uniform(draws[0].program, "depth_coefficient") {
        Some(UniformValue::Float(coefficient)) => {
            assert_relative_eq!(coefficient, 2.0 / (60.0f32 + 1.0).log2())
        }
        other => panic!("unexpected depth_coefficient {other:?}"),
    }
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.free_count(), 1);
    Ok(())
}

#[test]
fn invalid_fog_touches_nothing() -> Result<()> {
    let device = Arc::new(HeadlessDevice::new());
    let allocator = TextureUnitAllocator::new(device.clone(), 4)?;
    let quad = Rc::new(UnitQuad::new(device.as_ref())?);
    let fog = FogLane::new(device.as_ref(), quad)?;
    let image = ImageBuffer::create(device.as_ref(), &ImageBufferDescription::new(AREA))?;
    let parameters = FogParameters {
        near: 10.0,
        far: 10.0,
        ..FogParameters::default()
    };

    let matrices = Matrices::new();
    let result = matrices.with_observer(Mat4::IDENTITY, &projection(), |observer| {
        fog.evaluate(
            device.as_ref(),
            &allocator.root_context(),
            observer,
            &parameters,
            image.image_texture(),
            image.image_texture(),
            FilterOutput::Default(AREA),
        )
    });
    assert!(matches!(result, Err(RenderError::ParameterError(_))));
    assert_eq!(device.draw_call_count(), 0);
    Ok(())
}

#[test]
fn blurred_shadow_maps_keep_one_map_per_shadow() -> Result<()> {
    let device = Arc::new(HeadlessDevice::new());
    let allocator = TextureUnitAllocator::new(device.clone(), 4)?;
    let units = allocator.root_context();
    let ids = IdPool::new();
    let lane = ShadowMapLane::new(device.as_ref(), Rc::new(UnitQuad::new(device.as_ref())?))?;
    let pool = RenderTargetPool::new(
        |device: &dyn GraphicsDevice, description: &DepthVarianceBufferDescription| {
            DepthVarianceBuffer::create(device, description)
        },
    );

    let cube = MeshData::cube().upload(device.as_ref(), "cube")?;
    let kind = ShaderKind::SingleDepth;
    let shader = Rc::new(InstanceShader::<()>::new(
        device.as_ref(),
        &ids,
        kind,
        &stock_source(kind),
    )?);
    let mut casters = DepthInstances::new();
    casters.add_single(
        InstanceSingle::new(&ids, cube, SharedTransform::new(Transform::Identity)),
        Rc::new(Material::new(&ids, shader, ())),
    )?;

    let mut shadow = ShadowDepthVariance::new(&ids, DepthVarianceBufferDescription::new(AREA));
    shadow.blur = Some(BlurParameters::default());
    let shadow_id = shadow.id();
    let mut light = ProjectiveLight::new(
        &ids,
        cube,
        SharedTransform::new(Transform::Identity),
        projection(),
        device.create_texture_2d(&Texture2DDescriptor::new(
            "image",
            Area::new(8, 8),
            TextureFormat::Rgba8,
        ))?,
    );
    light.shadow = Some(Shadow::Variance(shadow));
    let light = Light::Projective(light);

    let matrices = Matrices::new();
    let mut execution = lane.shadow_begin(&pool)?;
    execution.render_light(device.as_ref(), &units, &matrices, &light, &mut casters)?;
    let maps = execution.complete();

    assert_eq!(maps.len(), 1);
    assert!(maps.require(shadow_id).is_ok());
    // One depth draw plus a horizontal and a vertical blur pass.
    assert_eq!(device.draw_call_count(), 3);
    assert_eq!(pool.in_use_count(), 1);
    maps.release();
    assert_eq!(pool.in_use_count(), 0);
    assert!(!lane.is_active());
    Ok(())
}
