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
//! Depth-based fog.

use super::{draw_fullscreen, FilterOutput};
use crate::render_lane::shaders::{self, FOG_FRAG, FULLSCREEN_VERT};
use crate::render_lane::{check_live, delete_programs, LaneProgram, LaneProgramBuilder, RenderLane};
use crate::UnitQuad;
use std::cell::Cell;
use std::rc::Rc;
use umbra_core::math::Vec3;
use umbra_core::renderer::api::{RenderState, TextureId, UniformValue};
use umbra_core::renderer::error::{ParameterError, RenderError, ResourceError, ShaderError};
use umbra_core::renderer::matrices::MatricesObserver;
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;

/// How fog thickens between the near and far distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FogProgression {
    /// Proportional to the distance.
    #[default]
    Linear,
    /// Thin near the viewer, thickening quickly towards the far distance.
    Quadratic,
    /// Thick near the viewer, thickening slowly towards the far distance.
    QuadraticInverse,
}

impl FogProgression {
    /// Every progression.
    pub const ALL: [FogProgression; 3] = [
        FogProgression::Linear,
        FogProgression::Quadratic,
        FogProgression::QuadraticInverse,
    ];

    fn define(&self) -> &'static str {
        match self {
            FogProgression::Linear => "FOG_LINEAR",
            FogProgression::Quadratic => "FOG_QUADRATIC",
            FogProgression::QuadraticInverse => "FOG_QUADRATIC_INVERSE",
        }
    }

    fn index(&self) -> usize {
        match self {
            FogProgression::Linear => 0,
            FogProgression::Quadratic => 1,
            FogProgression::QuadraticInverse => 2,
        }
    }
}

/// Fog parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogParameters {
    /// The progression.
    pub progression: FogProgression,
    /// The fog color.
    pub color: Vec3,
    /// Eye distance at which fog starts.
    pub near: f32,
    /// Eye distance at which fog is total.
    pub far: f32,
}

impl Default for FogParameters {
    fn default() -> Self {
        Self {
            progression: FogProgression::Linear,
            color: Vec3::splat(0.5),
            near: 0.0,
            far: 100.0,
        }
    }
}

impl FogParameters {
    /// Checks that the distances are usable.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.near.is_nan() || self.near < 0.0 {
            return Err(ParameterError::Invalid {
                name: "near",
                reason: format!("{} is negative", self.near),
            });
        }
        if self.far.is_nan() || self.far <= self.near {
            return Err(ParameterError::Invalid {
                name: "far",
                reason: format!("{} is not beyond near ({})", self.far, self.near),
            });
        }
        Ok(())
    }
}

/// Mixes the fog color into an image according to the depth of each pixel.
#[derive(Debug)]
pub struct FogLane {
    programs: [LaneProgram; 3],
    quad: Rc<UnitQuad>,
    deleted: Cell<bool>,
}

impl FogLane {
    /// Compiles one program per progression.
    pub fn new(device: &dyn GraphicsDevice, quad: Rc<UnitQuad>) -> Result<Self, ShaderError> {
        let mut builder = LaneProgramBuilder::new(device);
        let mut compile = |progression: FogProgression| {
            builder.compile(&shaders::program(
                &format!("fog-{:?}", progression).to_lowercase(),
                FULLSCREEN_VERT,
                FOG_FRAG,
                &[(progression.define(), "1")],
            ))
        };
        let programs = [
            compile(FogProgression::Linear)?,
            compile(FogProgression::Quadratic)?,
            compile(FogProgression::QuadraticInverse)?,
        ];
        builder.finish();
        Ok(Self {
            programs,
            quad,
            deleted: Cell::new(false),
        })
    }

    /// Writes `image` with fog applied into `output`.
    ///
    /// ## Arguments
    ///
    /// * `observer` - The observer `depth` was rendered from.
    /// * `image` - The lit image.
    /// * `depth` - The logarithmic depth the image was rendered with.
    pub fn evaluate(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        observer: &MatricesObserver,
        parameters: &FogParameters,
        image: TextureId,
        depth: TextureId,
        output: FilterOutput,
    ) -> Result<(), RenderError> {
        check_live(self)?;
        parameters.validate()?;
        let program = &self.programs[parameters.progression.index()];

        output.bind(device)?;
        let child = units.unit_context_new()?;
        let image = child.bind_texture_2d(image)?;
        let depth = child.bind_texture_2d(depth)?;
        program.activate(device)?;
        program.set_texture(device, "t_image", image)?;
        program.set_texture(device, "t_depth", depth)?;
        program.set(device, "fog_color", UniformValue::Vec3(parameters.color))?;
        program.set(device, "fog_near", UniformValue::Float(parameters.near))?;
        program.set(device, "fog_far", UniformValue::Float(parameters.far))?;
        program.set(
            device,
            "depth_coefficient",
            UniformValue::Float(observer.depth_coefficient()),
        )?;
        draw_fullscreen(device, &self.quad, &RenderState::default())?;
        child.finish()?;
        Ok(())
    }
}

impl RenderLane for FogLane {
    fn strategy_name(&self) -> &'static str {
        "Fog"
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        delete_programs(device, "FogLane", &self.programs)
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}
