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

//! Lights of a frame, partitioned by stencil group and clip volume.

use super::instance::InstanceSingle;
use crate::renderer::error::{InstanceError, RenderError};
use crate::renderer::light::{check_light_shader, Light, LightShader};
use crate::renderer::stencil::{check_valid_group, MAXIMUM_GROUPS};
use ahash::AHashSet;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Receives the light protocol.
///
/// `on_start`; then every clip group in creation order:
/// `on_light_clip_group_start`, its lights, `on_light_clip_group_finish`;
/// then every non-empty stencil group in ascending order:
/// `on_light_group_start`, its lights, `on_light_group_finish`. Lights are
/// grouped by shader (`on_light_shader_start` / `on_light_shader_finish`)
/// and sorted by volume mesh then ID, with `on_light_array_start` on every
/// change of volume mesh. `on_finish` is called whether or not an earlier
/// callback failed.
#[allow(unused_variables)]
pub trait LightsConsumer {
    /// The protocol starts.
    fn on_start(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// A clip group starts. `clip` is the volume outside of which its
    /// lights must not contribute.
    fn on_light_clip_group_start(
        &mut self,
        clip: &InstanceSingle,
        group: u8,
    ) -> Result<(), RenderError>;

    /// A clip group is done.
    fn on_light_clip_group_finish(
        &mut self,
        clip: &InstanceSingle,
        group: u8,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    /// A stencil group starts.
    fn on_light_group_start(&mut self, group: u8) -> Result<(), RenderError> {
        Ok(())
    }

    /// A light shader becomes active.
    fn on_light_shader_start(&mut self, shader: &LightShader) -> Result<(), RenderError>;

    /// The next lights use a different volume mesh.
    fn on_light_array_start(&mut self, light: &Light) -> Result<(), RenderError> {
        Ok(())
    }

    /// One light is drawn.
    fn on_light(&mut self, shader: &LightShader, light: &Light) -> Result<(), RenderError>;

    /// A light shader is done.
    fn on_light_shader_finish(&mut self, shader: &LightShader) -> Result<(), RenderError>;

    /// A stencil group is done.
    fn on_light_group_finish(&mut self, group: u8) -> Result<(), RenderError> {
        Ok(())
    }

    /// The protocol ends.
    fn on_finish(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Lights grouped by shader.
#[derive(Debug, Default)]
struct LightGroup {
    shaders: BTreeMap<u64, (Rc<LightShader>, Vec<Rc<Light>>)>,
}

impl LightGroup {
    fn insert(&mut self, shader: Rc<LightShader>, light: Rc<Light>) {
        self.shaders
            .entry(shader.shader_id())
            .or_insert_with(|| (shader, Vec::new()))
            .1
            .push(light);
    }

    fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    fn sort(&mut self) {
        for (_, lights) in self.shaders.values_mut() {
            lights.sort_by_key(|l| (l.volume(), l.id()));
        }
    }

    fn visit(&self, consumer: &mut dyn LightsConsumer) -> Result<(), RenderError> {
        for (shader, lights) in self.shaders.values() {
            consumer.on_light_shader_start(shader)?;
            let mut array = None;
            for (index, light) in lights.iter().enumerate() {
                if index == 0 || array != light.volume() {
                    array = light.volume();
                    consumer.on_light_array_start(light)?;
                }
                consumer.on_light(shader, light)?;
            }
            consumer.on_light_shader_finish(shader)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct ClipGroup {
    clip: InstanceSingle,
    group: u8,
    lights: LightGroup,
}

/// Identifies a clip group of a [`Lights`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipGroupId(pub usize);

/// The lights of a frame.
#[derive(Debug)]
pub struct Lights {
    clip_groups: Vec<ClipGroup>,
    groups: Vec<LightGroup>,
    visible: AHashSet<u64>,
}

impl Default for Lights {
    fn default() -> Self {
        Self {
            clip_groups: Vec::new(),
            groups: (0..MAXIMUM_GROUPS).map(|_| LightGroup::default()).collect(),
            visible: AHashSet::new(),
        }
    }
}

impl Lights {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `light`, drawn with `shader`, to stencil `group`.
    pub fn add_light(
        &mut self,
        light: Rc<Light>,
        shader: Rc<LightShader>,
        group: i64,
    ) -> Result<(), RenderError> {
        let group = check_valid_group(group)?;
        check_light_shader(&light, &shader)?;
        self.mark_visible(light.id())?;
        self.groups[group as usize].insert(shader, light);
        Ok(())
    }

    /// Creates a clip group in stencil `group`, bounded by the volume of
    /// `clip`.
    pub fn add_clip_group(
        &mut self,
        clip: InstanceSingle,
        group: i64,
    ) -> Result<ClipGroupId, RenderError> {
        let group = check_valid_group(group)?;
        self.clip_groups.push(ClipGroup {
            clip,
            group,
            lights: LightGroup::default(),
        });
        Ok(ClipGroupId(self.clip_groups.len() - 1))
    }

    /// Adds `light`, drawn with `shader`, to a clip group.
    ///
    /// # Panics
    ///
    /// Panics if `clip_group` does not belong to this set.
    pub fn add_clip_light(
        &mut self,
        clip_group: ClipGroupId,
        light: Rc<Light>,
        shader: Rc<LightShader>,
    ) -> Result<(), RenderError> {
        assert!(
            clip_group.0 < self.clip_groups.len(),
            "Lights: unknown clip group {}",
            clip_group.0
        );
        check_light_shader(&light, &shader)?;
        self.mark_visible(light.id())?;
        self.clip_groups[clip_group.0].lights.insert(shader, light);
        Ok(())
    }

    fn mark_visible(&mut self, id: u64) -> Result<(), InstanceError> {
        if !self.visible.insert(id) {
            return Err(InstanceError::LightAlreadyVisible { id });
        }
        Ok(())
    }

    /// The number of lights.
    pub fn count(&self) -> usize {
        self.visible.len()
    }

    /// Removes every light and clip group.
    pub fn reset(&mut self) {
        self.clip_groups.clear();
        for group in &mut self.groups {
            group.shaders.clear();
        }
        self.visible.clear();
    }

    /// The shadowed lights, in no particular order.
    pub fn shadow_casters(&self) -> impl Iterator<Item = &Rc<Light>> {
        self.clip_groups
            .iter()
            .map(|c| &c.lights)
            .chain(self.groups.iter())
            .flat_map(|g| g.shaders.values())
            .flat_map(|(_, lights)| lights.iter())
            .filter(|l| l.shadow().is_some())
    }

    /// Drives `consumer` through the light protocol.
    pub fn visit(&mut self, consumer: &mut dyn LightsConsumer) -> Result<(), RenderError> {
        for clip in &mut self.clip_groups {
            clip.lights.sort();
        }
        for group in &mut self.groups {
            group.sort();
        }

        let result = self.visit_groups(consumer);
        let finish = consumer.on_finish();
        result.and(finish)
    }

    fn visit_groups(&self, consumer: &mut dyn LightsConsumer) -> Result<(), RenderError> {
        consumer.on_start()?;
        for clip in &self.clip_groups {
            consumer.on_light_clip_group_start(&clip.clip, clip.group)?;
            clip.lights.visit(consumer)?;
            consumer.on_light_clip_group_finish(&clip.clip, clip.group)?;
        }
        for (index, group) in self.groups.iter().enumerate().skip(1) {
            if group.is_empty() {
                continue;
            }
            consumer.on_light_group_start(index as u8)?;
            group.visit(consumer)?;
            consumer.on_light_group_finish(index as u8)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdPool;
    use crate::math::Vec3;
    use crate::mock::MockGraphicsDevice;
    use crate::renderer::api::{ArrayObjectId, ProgramSource};
    use crate::renderer::light::{AmbientLight, SphericalLight};
    use crate::renderer::shader::ShaderKind;
    use crate::scene::fixtures;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        fail_on_light: bool,
    }

    impl LightsConsumer for Recorder {
        fn on_light_clip_group_start(&mut self, clip: &InstanceSingle, group: u8) -> Result<(), RenderError> {
            self.events.push(format!("clip {} {group}", clip.id()));
            Ok(())
        }
        fn on_light_group_start(&mut self, group: u8) -> Result<(), RenderError> {
            self.events.push(format!("group {group}"));
            Ok(())
        }
        fn on_light_shader_start(&mut self, shader: &LightShader) -> Result<(), RenderError> {
            self.events.push(format!("shader {}", shader.shader_id()));
            Ok(())
        }
        fn on_light(&mut self, _: &LightShader, light: &Light) -> Result<(), RenderError> {
            self.events.push(format!("light {}", light.id()));
            if self.fail_on_light {
                return Err(RenderError::RenderingFailed("light".into()));
            }
            Ok(())
        }
        fn on_light_shader_finish(&mut self, _: &LightShader) -> Result<(), RenderError> {
            Ok(())
        }
        fn on_finish(&mut self) -> Result<(), RenderError> {
            self.events.push("finish".into());
            Ok(())
        }
    }

    fn light_shader(device: &MockGraphicsDevice, ids: &IdPool, kind: ShaderKind) -> Rc<LightShader> {
        let source = ProgramSource {
            name: format!("{kind:?}"),
            vertex: String::new(),
            geometry: None,
            fragment: String::new(),
        };
        Rc::new(LightShader::new(device, ids, kind, &source).unwrap())
    }

    #[test]
    fn clip_groups_come_first_and_lights_sort_by_volume() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let spherical = light_shader(&device, &ids, ShaderKind::SphericalLight); // 0
        let ambient = light_shader(&device, &ids, ShaderKind::AmbientLight); // 1
        let far = Rc::new(Light::Spherical(SphericalLight::new(&ids, ArrayObjectId(9), Vec3::ZERO, 1.0))); // 2
        let near = Rc::new(Light::Spherical(SphericalLight::new(&ids, ArrayObjectId(3), Vec3::ZERO, 1.0))); // 3
        let sky = Rc::new(Light::Ambient(AmbientLight::new(&ids))); // 4
        let clip = fixtures::single(&ids, 1); // 5

        let mut lights = Lights::new();
        lights.add_light(far, spherical.clone(), 3).unwrap();
        lights.add_light(near, spherical, 3).unwrap();
        let clip_group = lights.add_clip_group(clip, 1).unwrap();
        lights.add_clip_light(clip_group, sky.clone(), ambient.clone()).unwrap();
        assert!(matches!(
            lights.add_light(sky, ambient, 2),
            Err(RenderError::InstanceError(InstanceError::LightAlreadyVisible { id: 4 }))
        ));

        let mut recorder = Recorder::default();
        lights.visit(&mut recorder).unwrap();
        assert_eq!(
            recorder.events,
            vec![
                "clip 5 1", "shader 1", "light 4", "group 3", "shader 0", "light 3", "light 2",
                "finish",
            ]
        );
    }

    #[test]
    fn finish_is_delivered_after_a_failure() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let ambient = light_shader(&device, &ids, ShaderKind::AmbientLight);
        let mut lights = Lights::new();
        lights
            .add_light(Rc::new(Light::Ambient(AmbientLight::new(&ids))), ambient, 1)
            .unwrap();

        let mut recorder = Recorder {
            fail_on_light: true,
            ..Recorder::default()
        };
        assert!(lights.visit(&mut recorder).is_err());
        assert_eq!(recorder.events.last().map(String::as_str), Some("finish"));
    }

    #[test]
    fn wrong_shader_kinds_are_rejected() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let ambient = light_shader(&device, &ids, ShaderKind::AmbientLight);
        let light = Rc::new(Light::Spherical(SphericalLight::new(&ids, ArrayObjectId(1), Vec3::ZERO, 1.0)));
        let mut lights = Lights::new();
        assert!(matches!(
            lights.add_light(light, ambient, 1),
            Err(RenderError::ShaderKindMismatch { .. })
        ));
        assert_eq!(lights.count(), 0);
    }
}
