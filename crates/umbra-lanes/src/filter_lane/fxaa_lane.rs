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
//! Fast approximate anti-aliasing.

use super::{draw_fullscreen, FilterOutput};
use crate::render_lane::shaders::{self, FULLSCREEN_VERT, FXAA_FRAG};
use crate::render_lane::{check_live, delete_programs, LaneProgram, RenderLane};
use crate::UnitQuad;
use ahash::AHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use umbra_core::renderer::api::{RenderState, TextureId, UniformValue};
use umbra_core::renderer::error::{RenderError, ResourceError};
use umbra_core::renderer::filter::{FxaaQuality, FxaaSettings};
use umbra_core::renderer::texture_unit::TextureUnitContext;
use umbra_core::renderer::traits::GraphicsDevice;

/// Anti-aliases an image into an output.
///
/// One program is compiled per quality preset, the first time the preset is
/// used.
#[derive(Debug)]
pub struct FxaaLane {
    programs: RefCell<AHashMap<FxaaQuality, LaneProgram>>,
    quad: Rc<UnitQuad>,
    deleted: Cell<bool>,
}

impl FxaaLane {
    /// A lane with no program compiled yet.
    pub fn new(quad: Rc<UnitQuad>) -> Self {
        Self {
            programs: RefCell::new(AHashMap::new()),
            quad,
            deleted: Cell::new(false),
        }
    }

    /// Anti-aliases `image` into `output`.
    ///
    /// ## Errors
    ///
    /// Returns a [`RenderError::ParameterError`] for out-of-range settings,
    /// before anything is drawn.
    pub fn evaluate(
        &self,
        device: &dyn GraphicsDevice,
        units: &TextureUnitContext,
        settings: &FxaaSettings,
        image: TextureId,
        output: FilterOutput,
    ) -> Result<(), RenderError> {
        check_live(self)?;
        settings.validate()?;

        let mut programs = self.programs.borrow_mut();
        let program = match programs.entry(settings.quality) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let preset = settings.quality.preset().to_string();
                let source = shaders::program(
                    &format!("fxaa-{preset}"),
                    FULLSCREEN_VERT,
                    FXAA_FRAG,
                    &[("FXAA_QUALITY_PRESET", preset.as_str())],
                );
                entry.insert(LaneProgram::compile(device, &source)?)
            }
        };

        output.bind(device)?;
        let child = units.unit_context_new()?;
        let unit = child.bind_texture_2d(image)?;
        program.activate(device)?;
        program.set_texture(device, "t_image", unit)?;
        program.set(device, "screen_inverse", UniformValue::Vec2(output.area().inverse()))?;
        program.set(
            device,
            "subpixel_aliasing_removal",
            UniformValue::Float(settings.subpixel_aliasing_removal),
        )?;
        program.set(device, "edge_threshold", UniformValue::Float(settings.edge_threshold))?;
        program.set(
            device,
            "edge_threshold_minimum",
            UniformValue::Float(settings.edge_threshold_minimum),
        )?;
        draw_fullscreen(device, &self.quad, &RenderState::default())?;
        child.finish()?;
        Ok(())
    }

    /// The number of presets compiled so far.
    pub fn compiled_presets(&self) -> usize {
        self.programs.borrow().len()
    }
}

impl RenderLane for FxaaLane {
    fn strategy_name(&self) -> &'static str {
        "Fxaa"
    }

    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.deleted.replace(true) {
            return Ok(());
        }
        let programs = std::mem::take(&mut *self.programs.borrow_mut());
        delete_programs(device, "FxaaLane", programs.values())
    }

    fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use umbra_core::math::Area;
    use umbra_core::renderer::texture_unit::TextureUnitAllocator;
    use umbra_infra::HeadlessDevice;

    fn image(device: &HeadlessDevice) -> TextureId {
        use umbra_core::renderer::api::{Texture2DDescriptor, TextureFormat};
        device
            .create_texture_2d(&Texture2DDescriptor::new(
                "image",
                Area::new(8, 8),
                TextureFormat::Rgba8,
            ))
            .unwrap()
    }

    #[test]
    fn presets_are_compiled_once() {
        let device = Arc::new(HeadlessDevice::new());
        let allocator = TextureUnitAllocator::new(device.clone(), 4).unwrap();
        let fxaa = FxaaLane::new(Rc::new(UnitQuad::new(device.as_ref()).unwrap()));
        let texture = image(&device);
        let output = FilterOutput::Default(Area::new(8, 8));

        for quality in [FxaaQuality::Preset25, FxaaQuality::Preset39, FxaaQuality::Preset25] {
            let settings = FxaaSettings {
                quality,
                ..FxaaSettings::default()
            };
            fxaa.evaluate(device.as_ref(), &allocator.root_context(), &settings, texture, output)
                .unwrap();
        }

        assert_eq!(fxaa.compiled_presets(), 2);
        assert_eq!(device.draw_call_count(), 3);
        let names: Vec<_> = device
            .draw_calls()
            .iter()
            .filter_map(|call| device.program_name(call.program))
            .collect();
        assert_eq!(names, vec!["fxaa-25", "fxaa-39", "fxaa-25"]);

        fxaa.delete(device.as_ref()).unwrap();
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn out_of_range_settings_draw_nothing() {
        let device = Arc::new(HeadlessDevice::new());
        let allocator = TextureUnitAllocator::new(device.clone(), 4).unwrap();
        let fxaa = FxaaLane::new(Rc::new(UnitQuad::new(device.as_ref()).unwrap()));
        let settings = FxaaSettings {
            edge_threshold: 0.5,
            ..FxaaSettings::default()
        };
        let result = fxaa.evaluate(
            device.as_ref(),
            &allocator.root_context(),
            &settings,
            image(&device),
            FilterOutput::Default(Area::new(8, 8)),
        );
        assert!(matches!(result, Err(RenderError::ParameterError(_))));
        assert_eq!(device.draw_call_count(), 0);
        assert_eq!(fxaa.compiled_presets(), 0);
    }
}
