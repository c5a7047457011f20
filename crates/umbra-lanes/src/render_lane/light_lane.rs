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
//! Accumulates light into a light buffer from the contents of a geometry
//! buffer.

use super::program::{LaneProgram, LaneProgramBuilder};
use super::shaders::{self, SINGLE_VERT, STENCIL_FRAG};
use super::{check_live, RenderLane};
use crate::UnitQuad;
use std::cell::Cell;
use std::rc::Rc;
use umbra_core::math::{Mat3, Mat4, Vec2};
use umbra_core::renderer::api::{
    BlendState, CompareFunction, CullingState, DepthState, FaceSelection, Primitive, ProgramId,
    RenderState, StencilOperation, StencilState, TextureUnit, UniformValue,
};
use umbra_core::renderer::error::{RenderError, ResourceError, ShaderError};
use umbra_core::renderer::light::{Light, LightShader};
use umbra_core::renderer::matrices::MatricesObserver;
use umbra_core::renderer::shader::{uniforms, upload_view_values};
use umbra_core::renderer::shadow::{Shadow, ShadowMapContext};
use umbra_core::renderer::stencil::{allow_bit, group_bits, group_value, light_mask_bit};
use umbra_core::renderer::target::{GeometryBuffer, LightBuffer, RenderTarget};
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;
use umbra_core::scene::instance::InstanceSingle;
use umbra_core::scene::{Lights, LightsConsumer};

/// Renders [`Lights`] into a [`LightBuffer`].
///
/// The light buffer is expected to share the geometry buffer's depth-stencil
/// attachment: volume lights are depth tested against the scene and every
/// light is stencil tested against the group written by the geometry lane.
///
/// Lights in a clip group only reach pixels inside the group's clip volume.
/// The volume is marked in the light mask bit before the lights are drawn and
/// the bit is cleared again afterwards.
#[derive(Debug)]
pub struct LightLane {
    clip: LaneProgram,
    quad: Rc<UnitQuad>,
    deleted: Cell<bool>,
}

impl LightLane {
    /// Compiles the clip volume program.
    pub fn new(device: &dyn GraphicsDevice, quad: Rc<UnitQuad>) -> Result<Self, ShaderError> {
        let mut builder = LaneProgramBuilder::new(device);
        let clip = builder.compile(&shaders::program("light-clip", SINGLE_VERT, STENCIL_FRAG, &[]))?;
        builder.finish();
        Ok(Self {
            clip,
            quad,
            deleted: Cell::new(false),
        })
    }

    /// The stencil test of lights in stencil `group`.
    pub fn group_stencil(group: u8) -> StencilState {
        StencilState {
            enabled: true,
            function: CompareFunction::Equal,
            reference: allow_bit() | group_value(group),
            test_mask: allow_bit() | group_bits(),
            write_mask: 0,
            on_stencil_fail: StencilOperation::Keep,
            on_depth_fail: StencilOperation::Keep,
            on_pass: StencilOperation::Keep,
        }
    }

    /// The stencil test of lights in a clip group of stencil `group`.
    pub fn clip_group_stencil(group: u8) -> StencilState {
        StencilState {
            reference: allow_bit() | group_value(group) | light_mask_bit(),
            test_mask: allow_bit() | group_bits() | light_mask_bit(),
            ..Self::group_stencil(group)
        }
    }

    /// The state used to set (`on_pass` Replace) or clear (`on_pass` Zero)
    /// the light mask bit inside a clip volume of stencil `group`.
    pub fn clip_volume_state(group: u8, on_pass: StencilOperation) -> RenderState {
        RenderState {
            blending: None,
            culling: Some(CullingState {
                faces: FaceSelection::Front,
                ..CullingState::default()
            }),
            depth: DepthState {
                test: Some(CompareFunction::GreaterEqual),
                write: false,
                clamp: false,
            },
            stencil: StencilState {
                enabled: true,
                function: CompareFunction::Equal,
                reference: allow_bit() | group_value(group) | light_mask_bit(),
                test_mask: allow_bit() | group_bits(),
                write_mask: light_mask_bit(),
                on_stencil_fail: StencilOperation::Keep,
                on_depth_fail: StencilOperation::Keep,
                on_pass,
            },
            color_write: false,
        }
    }

    /// The state used to draw `light` with the stencil test `stencil`.
    ///
    /// Volume lights draw the back faces of their volume wherever the scene
    /// lies in front of them; full-screen lights cover every pixel.
    pub fn light_state(light: &Light, stencil: StencilState) -> RenderState {
        let (culling, depth) = match light.volume() {
            Some(_) => (
                Some(CullingState {
                    faces: FaceSelection::Front,
                    ..CullingState::default()
                }),
                DepthState {
                    test: Some(CompareFunction::GreaterEqual),
                    write: false,
                    clamp: true,
                },
            ),
            None => (None, DepthState::DISABLED),
        };
        RenderState {
            blending: Some(BlendState::ADDITIVE),
            culling,
            depth,
            stencil,
            color_write: true,
        }
    }

    /// Clears `light_buffer` and accumulates `lights` into it.
    ///
    /// ## Arguments
    ///
    /// * `units` - The caller's context; the lane works in a child of it.
    /// * `gbuffer` - The geometry buffer the lights read.
    /// * `shadow_maps` - The maps of shadowed projective lights.
    ///
    /// ## Returns
    ///
    /// The number of draw calls issued, clip volumes included.
    ///
    /// ## Errors
    ///
    /// Fails if a shadowed light has no map in `shadow_maps`, if the units
    /// run out, or if any device call fails.
    #[allow(clippy::too_many_arguments)]
    pub fn render_lights(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        observer: &MatricesObserver,
        gbuffer: &GeometryBuffer,
        light_buffer: &LightBuffer,
        shadow_maps: Option<&ShadowMapContext<'_>>,
        lights: &mut Lights,
    ) -> Result<usize, RenderError> {
        check_live(self)?;
        device.bind_draw_framebuffer(light_buffer.primary_framebuffer())?;
        device.set_viewport(light_buffer.area());
        light_buffer.clear_bound_primary_framebuffer(device)?;

        let pass_units = units.unit_context_new()?;
        let gbuffer_units = GeometryUnits {
            albedo_emissive: pass_units.bind_texture_2d(gbuffer.albedo_emissive_texture())?,
            normal: pass_units.bind_texture_2d(gbuffer.normal_texture())?,
            specular: gbuffer
                .specular_texture()
                .map(|texture| pass_units.bind_texture_2d(texture))
                .transpose()?,
            depth: pass_units.bind_texture_2d(gbuffer.depth_texture())?,
        };

        let mut consumer = LightConsumer {
            lane: self,
            device,
            observer,
            units: &pass_units,
            gbuffer_units,
            screen_inverse: light_buffer.area().inverse(),
            shadow_maps,
            stencil: StencilState::DISABLED,
            program: None,
            draws: 0,
        };
        let result = lights.visit(&mut consumer);
        let draws = consumer.draws;
        if consumer.program.is_some() {
            device.deactivate_program();
        }
        device.unbind_array_object();
        pass_units.finish()?;
        result?;
        log::trace!("LightLane: {} draw calls", draws);
        Ok(draws)
    }
}

#[derive(Debug, Clone, Copy)]
struct GeometryUnits {
    albedo_emissive: TextureUnit,
    normal: TextureUnit,
    specular: Option<TextureUnit>,
    depth: TextureUnit,
}

struct LightConsumer<'a> {
    lane: &'a LightLane,
    device: &'a dyn GraphicsDevice,
    observer: &'a MatricesObserver,
    units: &'a TextureUnitContext,
    gbuffer_units: GeometryUnits,
    screen_inverse: Vec2,
    shadow_maps: Option<&'a ShadowMapContext<'a>>,
    stencil: StencilState,
    program: Option<ProgramId>,
    draws: usize,
}

impl LightConsumer<'_> {
    fn set(&self, program: ProgramId, name: &str, value: UniformValue) -> Result<(), RenderError> {
        self.device.set_uniform(program, name, value)?;
        Ok(())
    }

    fn draw_clip_volume(
        &mut self,
        clip: &InstanceSingle,
        group: u8,
        on_pass: StencilOperation,
    ) -> Result<(), RenderError> {
        let program = &self.lane.clip;
        program.activate(self.device)?;
        program.upload_view_values(self.device, self.observer)?;
        let device = self.device;
        self.observer
            .with_transform(clip.transform(), clip.uv_matrix(), |matrices| {
                program.upload_instance_values(device, matrices)
            })?;
        self.program = Some(program.id());
        self.device
            .activate_render_state(&LightLane::clip_volume_state(group, on_pass));
        self.device.bind_array_object(clip.array_object())?;
        self.device.draw_elements(Primitive::Triangles)?;
        self.draws += 1;
        Ok(())
    }

    fn upload_light(
        &self,
        program: ProgramId,
        light: &Light,
        light_units: &TextureUnitContext,
    ) -> Result<(), RenderError> {
        self.set(program, "light_color", UniformValue::Vec3(light.color()))?;
        self.set(program, "light_intensity", UniformValue::Float(light.intensity()))?;
        let view = self.observer.view();

        match light {
            Light::Ambient(ambient) => match ambient.occlusion {
                Some(occlusion) => {
                    let unit = light_units.bind_texture_2d(occlusion)?;
                    self.set(program, "light_occlusion_enabled", UniformValue::Int(1))?;
                    self.set(program, "t_occlusion", UniformValue::Texture(unit))
                }
                None => self.set(program, "light_occlusion_enabled", UniformValue::Int(0)),
            },
            Light::Directional(directional) => {
                let direction = view.transform_vector3(directional.direction).normalize_or_zero();
                self.set(program, "light_direction_eye", UniformValue::Vec3(direction))
            }
            Light::Spherical(spherical) => {
                if let Some(model) = light.volume_matrix() {
                    let matrices = self.observer.instance_matrices(model, Mat3::IDENTITY);
                    self.upload_instance(program, matrices.model_view(), matrices.normal())?;
                }
                self.set(
                    program,
                    "light_position_eye",
                    UniformValue::Vec3(view.transform_point3(spherical.position)),
                )?;
                self.set(program, "light_radius", UniformValue::Float(spherical.radius))?;
                self.set(program, "light_falloff", UniformValue::Float(spherical.falloff))
            }
            Light::Projective(projective) => self.observer.with_projective_light(
                &projective.transform,
                &projective.projection,
                |matrices| {
                    let instance = matrices.instance();
                    self.upload_instance(program, instance.model_view(), instance.normal())?;
                    self.set(
                        program,
                        "light_position_eye",
                        UniformValue::Vec3(matrices.light_position_eye()),
                    )?;
                    self.set(program, "light_radius", UniformValue::Float(projective.radius()))?;
                    self.set(program, "light_falloff", UniformValue::Float(projective.falloff))?;
                    self.set(
                        program,
                        "transform_eye_to_light_eye",
                        UniformValue::Mat4(matrices.eye_to_light_eye()),
                    )?;
                    self.set(
                        program,
                        "transform_light_projection",
                        UniformValue::Mat4(matrices.light_projection()),
                    )?;
                    self.set(
                        program,
                        "light_depth_coefficient",
                        UniformValue::Float(matrices.depth_coefficient()),
                    )?;
                    let image = light_units.bind_texture_2d(projective.image)?;
                    self.set(program, "t_light_image", UniformValue::Texture(image))?;
                    self.upload_shadow(program, projective.shadow.as_ref(), light_units)
                },
            ),
        }
    }

    fn upload_instance(
        &self,
        program: ProgramId,
        model_view: Mat4,
        normal: Mat3,
    ) -> Result<(), RenderError> {
        self.set(program, uniforms::MODEL_VIEW, UniformValue::Mat4(model_view))?;
        self.set(program, uniforms::NORMAL, UniformValue::Mat3(normal))?;
        self.set(program, uniforms::UV, UniformValue::Mat3(Mat3::IDENTITY))
    }

    fn upload_shadow(
        &self,
        program: ProgramId,
        shadow: Option<&Shadow>,
        light_units: &TextureUnitContext,
    ) -> Result<(), RenderError> {
        let Some(Shadow::Variance(variance)) = shadow else {
            return self.set(program, "shadow_enabled", UniformValue::Int(0));
        };
        let map = self
            .shadow_maps
            .ok_or(RenderError::MissingShadowMap {
                shadow: variance.id(),
            })?
            .require(variance.id())?;
        let unit = light_units.bind_texture_2d(map.depth_variance_texture())?;
        self.set(program, "shadow_enabled", UniformValue::Int(1))?;
        self.set(program, "t_shadow", UniformValue::Texture(unit))?;
        self.set(
            program,
            "shadow_minimum_factor",
            UniformValue::Float(variance.minimum_factor),
        )?;
        self.set(
            program,
            "shadow_light_bleed_reduction",
            UniformValue::Float(variance.light_bleed_reduction),
        )
    }
}

impl LightsConsumer for LightConsumer<'_> {
    fn on_light_clip_group_start(
        &mut self,
        clip: &InstanceSingle,
        group: u8,
    ) -> Result<(), RenderError> {
        self.draw_clip_volume(clip, group, StencilOperation::Replace)?;
        self.stencil = LightLane::clip_group_stencil(group);
        Ok(())
    }

    fn on_light_clip_group_finish(
        &mut self,
        clip: &InstanceSingle,
        group: u8,
    ) -> Result<(), RenderError> {
        self.draw_clip_volume(clip, group, StencilOperation::Zero)
    }

    fn on_light_group_start(&mut self, group: u8) -> Result<(), RenderError> {
        self.stencil = LightLane::group_stencil(group);
        Ok(())
    }

    fn on_light_shader_start(&mut self, shader: &LightShader) -> Result<(), RenderError> {
        let program = shader.program();
        self.device.activate_program(program)?;
        self.program = Some(program);
        upload_view_values(self.device, program, self.observer)?;

        let units = self.gbuffer_units;
        self.set(program, "t_albedo_emissive", UniformValue::Texture(units.albedo_emissive))?;
        self.set(program, "t_normal", UniformValue::Texture(units.normal))?;
        if let Some(specular) = units.specular {
            self.set(program, "t_specular", UniformValue::Texture(specular))?;
        }
        self.set(program, "t_depth", UniformValue::Texture(units.depth))?;
        self.set(program, "screen_inverse", UniformValue::Vec2(self.screen_inverse))
    }

    fn on_light_array_start(&mut self, light: &Light) -> Result<(), RenderError> {
        if let Some(volume) = light.volume() {
            self.device.bind_array_object(volume)?;
        }
        Ok(())
    }

    fn on_light(&mut self, shader: &LightShader, light: &Light) -> Result<(), RenderError> {
        let program = shader.program();
        let light_units = self.units.unit_context_new()?;
        self.upload_light(program, light, &light_units)?;
        self.device
            .activate_render_state(&LightLane::light_state(light, self.stencil));
        match light.volume() {
            Some(_) => self.device.draw_elements(Primitive::Triangles)?,
            None => self.lane.quad.draw(self.device)?,
        }
        light_units.finish()?;
        self.draws += 1;
        Ok(())
    }

    fn on_light_shader_finish(&mut self, _shader: &LightShader) -> Result<(), RenderError> {
        self.device.deactivate_program();
        self.program = None;
        Ok(())
    }
}

impl RenderLane for LightLane {
    fn strategy_name(&self) -> &'static str {
        "Light"
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        self.clip.delete(device)
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_groups_also_test_the_light_mask() {
        let plain = LightLane::group_stencil(2);
        let clipped = LightLane::clip_group_stencil(2);
        assert_eq!(plain.reference, 0x80 | 0x10);
        assert_eq!(plain.test_mask, 0xf8);
        assert_eq!(clipped.reference, 0x91);
        assert_eq!(clipped.test_mask, 0xf9);
        assert_eq!(clipped.write_mask, 0);
    }

    #[test]
    fn clip_volumes_only_touch_the_light_mask() {
        let mark = LightLane::clip_volume_state(1, StencilOperation::Replace);
        let unmark = LightLane::clip_volume_state(1, StencilOperation::Zero);
        assert_eq!(mark.stencil.write_mask, 0x01);
        assert_eq!(mark.stencil.test_mask, unmark.stencil.test_mask);
        assert_eq!(unmark.stencil.on_pass, StencilOperation::Zero);
        assert!(!mark.color_write);
    }
}
