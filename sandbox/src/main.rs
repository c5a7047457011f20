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

// Umbra Sandbox
// Renders one deferred frame against the headless device and reports what it cost.

use std::rc::Rc;
use std::sync::Arc;

use anyhow::Result;
use umbra_core::math::{Area, Mat4, Quat, Vec3};
use umbra_core::renderer::api::{Texture2DDescriptor, TextureFormat};
use umbra_core::renderer::light::{
    AmbientLight, DirectionalLight, Light, LightShader, ProjectiveLight, SphericalLight,
};
use umbra_core::renderer::material::{Material, MaterialBinding};
use umbra_core::renderer::matrices::{Matrices, Projection};
use umbra_core::renderer::mesh::MeshData;
use umbra_core::renderer::shader::{InstanceShader, ShaderKind};
use umbra_core::renderer::shadow::{Shadow, ShadowDepthVariance};
use umbra_core::renderer::target::{
    DepthAttachment, DepthVarianceBuffer, DepthVarianceBufferDescription, GeometryBuffer,
    GeometryBufferDescription, ImageBuffer, ImageBufferDescription, LightBuffer,
    LightBufferDescription, PoolLimits, RenderTarget, RenderTargetPool,
};
use umbra_core::renderer::texture_unit::TextureUnitAllocator;
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::instance::{InstanceBatchedDynamic, InstanceSingle};
use umbra_core::scene::transform::{SharedTransform, Transform};
use umbra_core::scene::{DepthInstances, Lights, OpaqueInstances, Stencils, Translucents};
use umbra_core::{IdPool, RenderError, RendererSettings};
use umbra_infra::HeadlessDevice;
use umbra_lanes::filter_lane::{FilterOutput, FogLane, FogParameters, FxaaLane};
use umbra_lanes::render_lane::shaders::stock_source;
use umbra_lanes::{
    DeferredFrame, DeferredRenderer, FilterContext, FrameFilter, FrameShadows, RenderLane,
};

const AREA: Area = Area::new(1280, 720);

const SETTINGS: &str = r#"(
    texture_unit_context_depth: 8,
    fxaa: (quality: Preset29),
)"#;

fn material(
    device: &dyn GraphicsDevice,
    ids: &IdPool,
    kind: ShaderKind,
) -> Result<Rc<dyn MaterialBinding>> {
    let shader = Rc::new(InstanceShader::<()>::new(device, ids, kind, &stock_source(kind))?);
    Ok(Rc::new(Material::new(ids, shader, ())))
}

fn light_shader(device: &dyn GraphicsDevice, ids: &IdPool, kind: ShaderKind) -> Result<Rc<LightShader>> {
    Ok(Rc::new(LightShader::new(device, ids, kind, &stock_source(kind))?))
}

fn pool_limits(settings: &RendererSettings) -> PoolLimits {
    PoolLimits {
        soft_bytes: settings.pool_soft_limit_bytes,
        hard_bytes: settings.pool_hard_limit_bytes,
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = RendererSettings::from_ron_str(SETTINGS)?;
    log::info!("Sandbox: settings {settings:?}");

    let device = Arc::new(HeadlessDevice::new());
    let allocator = TextureUnitAllocator::new(device.clone(), settings.texture_unit_context_depth)?;
    let units = allocator.root_context();
    let ids = IdPool::new();
    let renderer = DeferredRenderer::new(device.as_ref())?;

    // --- Targets ---
    let gbuffer = GeometryBuffer::create(device.as_ref(), &GeometryBufferDescription::new(AREA))?;
    let shared = DepthAttachment::Share(gbuffer.shared_depth());
    let light_buffer = LightBuffer::create(
        device.as_ref(),
        &LightBufferDescription {
            depth: shared,
            ..LightBufferDescription::new(AREA)
        },
    )?;
    let image = ImageBuffer::create(
        device.as_ref(),
        &ImageBufferDescription {
            area: AREA,
            depth: Some(shared),
        },
    )?;
    let shadow_pool = RenderTargetPool::with_limits(
        |device: &dyn GraphicsDevice, description: &DepthVarianceBufferDescription| {
            DepthVarianceBuffer::create(device, description)
        },
        pool_limits(&settings),
    );
    let image_pool = RenderTargetPool::with_limits(
        |device: &dyn GraphicsDevice, description: &ImageBufferDescription| {
            ImageBuffer::create(device, description)
        },
        pool_limits(&settings),
    );

    // --- Scene ---
    let cube = MeshData::cube().upload(device.as_ref(), "cube")?;
    let sphere = MeshData::sphere(16, 12).upload(device.as_ref(), "sphere")?;

    let floor = SharedTransform::new(Transform::ScaleTranslation {
        scale: 10.0,
        translation: Vec3::new(0.0, -11.0, -10.0),
    });
    let crates = Rc::new(InstanceBatchedDynamic::create(device.as_ref(), &ids, cube, 16)?);
    for x in 0..3 {
        for z in 0..3 {
            crates.enable_instance(SharedTransform::new(Transform::OrientationTranslation {
                orientation: Quat::from_rotation_y(0.3 * (x + z) as f32),
                translation: Vec3::new(x as f32 * 2.5 - 2.5, 0.0, -6.0 - z as f32 * 2.5),
            }))?;
        }
    }

    let mut depth = DepthInstances::new();
    depth.add_single(
        InstanceSingle::new(&ids, cube, floor.clone()),
        material(device.as_ref(), &ids, ShaderKind::SingleDepth)?,
    )?;
    depth.add_batched(
        crates.clone(),
        material(device.as_ref(), &ids, ShaderKind::BatchedDepth)?,
    )?;

    let mut opaques = OpaqueInstances::new();
    opaques.add_single(
        InstanceSingle::new(&ids, cube, floor),
        material(device.as_ref(), &ids, ShaderKind::SingleGeometry)?,
        1,
    )?;
    opaques.add_batched(
        crates.clone(),
        material(device.as_ref(), &ids, ShaderKind::BatchedGeometry)?,
        1,
    )?;

    let mut casters = DepthInstances::new();
    casters.add_batched(
        crates,
        material(device.as_ref(), &ids, ShaderKind::BatchedDepth)?,
    )?;

    // --- Lights ---
    let mut lights = Lights::new();
    lights.add_light(
        Rc::new(Light::Ambient(AmbientLight::new(&ids))),
        light_shader(device.as_ref(), &ids, ShaderKind::AmbientLight)?,
        1,
    )?;
    lights.add_light(
        Rc::new(Light::Directional(DirectionalLight::new(
            &ids,
            Vec3::new(-0.3, -1.0, -0.4).normalize(),
        ))),
        light_shader(device.as_ref(), &ids, ShaderKind::DirectionalLight)?,
        1,
    )?;
    lights.add_light(
        Rc::new(Light::Spherical(SphericalLight::new(
            &ids,
            sphere,
            Vec3::new(2.0, 1.5, -7.0),
            5.0,
        ))),
        light_shader(device.as_ref(), &ids, ShaderKind::SphericalLight)?,
        1,
    )?;

    let spot_image = device.create_texture_2d(&Texture2DDescriptor::new(
        "spot-image",
        Area::new(64, 64),
        TextureFormat::Rgba8,
    ))?;
    let mut spot = ProjectiveLight::new(
        &ids,
        cube,
        SharedTransform::new(Transform::OrientationTranslation {
            orientation: Quat::from_rotation_x(-0.9),
            translation: Vec3::new(0.0, 6.0, -4.0),
        }),
        Projection::Perspective {
            fov_y_radians: 0.8,
            aspect: 1.0,
            near: 0.5,
            far: 30.0,
        },
        spot_image,
    );
    let mut shadow =
        ShadowDepthVariance::new(&ids, DepthVarianceBufferDescription::new(Area::new(512, 512)));
    shadow.minimum_factor = settings.shadow_minimum_factor;
    shadow.blur = Some(settings.blur);
    spot.shadow = Some(Shadow::Variance(shadow));
    lights.add_light(
        Rc::new(Light::Projective(spot)),
        light_shader(device.as_ref(), &ids, ShaderKind::ProjectiveLight)?,
        1,
    )?;

    // --- Post processing ---
    let fog = FogLane::new(device.as_ref(), renderer.unit_quad().clone())?;
    let fxaa = FxaaLane::new(renderer.unit_quad().clone());
    let fog_parameters = FogParameters {
        near: 5.0,
        far: 40.0,
        ..FogParameters::default()
    };
    let mut post = |context: &FilterContext<'_>| -> Result<(), RenderError> {
        image_pool.with_target(
            context.device,
            &ImageBufferDescription::new(AREA),
            |fogged: &ImageBuffer| {
                fog.evaluate(
                    context.device,
                    context.units,
                    context.observer,
                    &fog_parameters,
                    context.image.image_texture(),
                    context.gbuffer.depth_texture(),
                    FilterOutput::target(fogged),
                )?;
                fxaa.evaluate(
                    context.device,
                    context.units,
                    &settings.fxaa,
                    fogged.image_texture(),
                    FilterOutput::Default(AREA),
                )
            },
        )
    };
    let mut filters: [&mut dyn FrameFilter; 1] = [&mut post];

    // --- Frame ---
    let mut stencils = Stencils::new();
    let translucents = Translucents::new();
    let frame = DeferredFrame {
        view: Mat4::look_at_rh(Vec3::new(0.0, 3.0, 4.0), Vec3::new(0.0, 0.0, -8.0), Vec3::Y),
        projection: Projection::Perspective {
            fov_y_radians: 1.0,
            aspect: AREA.width as f32 / AREA.height as f32,
            near: 0.1,
            far: 100.0,
        },
        stencils: &mut stencils,
        depth: &mut depth,
        opaques: &mut opaques,
        lights: &mut lights,
        translucents: &translucents,
        shadows: Some(FrameShadows {
            casters: &mut casters,
            pool: &shadow_pool,
        }),
        gbuffer: &gbuffer,
        light_buffer: &light_buffer,
        image: &image,
    };

    let matrices = Matrices::new();
    let stats = renderer.render(device.as_ref(), &units, &matrices, frame, &mut filters)?;
    log::info!("Sandbox: {stats:?}");
    log::info!(
        "Sandbox: {} draw calls, {} bytes of VRAM ({} peak)",
        device.draw_call_count(),
        device.vram_allocated_bytes(),
        device.vram_peak_bytes()
    );

    // --- Teardown ---
    fog.delete(device.as_ref())?;
    fxaa.delete(device.as_ref())?;
    renderer.delete(device.as_ref())?;
    shadow_pool.delete_all(device.as_ref());
    image_pool.delete_all(device.as_ref());
    gbuffer.delete(device.as_ref())?;
    light_buffer.delete(device.as_ref())?;
    image.delete(device.as_ref())?;
    log::info!(
        "Sandbox: {} programs still alive after teardown",
        device.live_programs()
    );
    Ok(())
}
