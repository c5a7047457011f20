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

//! An in-memory [`GraphicsDevice`] that validates every call the way a real
//! driver would and records the commands it receives.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use umbra_core::math::Area;
use umbra_core::renderer::api::*;
use umbra_core::renderer::{GraphicsDevice, ResourceError, ShaderError};

/// The number of texture units reported when none is configured.
pub const DEFAULT_TEXTURE_UNITS: u32 = 16;

/// A state-changing or drawing command received by a [`HeadlessDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// A texture was bound to a unit.
    BindTexture {
        /// The unit.
        unit: TextureUnit,
        /// The texture.
        texture: TextureId,
    },
    /// A unit was cleared.
    UnbindTexture(TextureUnit),
    /// A framebuffer was bound for drawing; `None` is the default framebuffer.
    BindDrawFramebuffer(Option<FramebufferId>),
    /// A framebuffer was bound for reading; `None` is the default framebuffer.
    BindReadFramebuffer(Option<FramebufferId>),
    /// A blit between the read and draw framebuffers.
    Blit {
        /// The framebuffer read from.
        read: Option<FramebufferId>,
        /// The framebuffer written to.
        draw: Option<FramebufferId>,
        /// The region read.
        source: Area,
        /// The region written.
        destination: Area,
        /// The scaling filter.
        filter: BlitFilter,
    },
    /// The draw framebuffer was cleared.
    Clear {
        /// The framebuffer cleared.
        framebuffer: Option<FramebufferId>,
        /// What was cleared.
        values: ClearValues,
    },
    /// The viewport changed.
    Viewport(Area),
    /// Fixed-function state was activated.
    RenderState(RenderState),
    /// A program became current.
    ActivateProgram(ProgramId),
    /// The current program was cleared.
    DeactivateProgram,
    /// A uniform was uploaded.
    Uniform {
        /// The receiving program.
        program: ProgramId,
        /// The uniform name.
        name: String,
        /// The value.
        value: UniformValue,
    },
    /// An array object was bound.
    BindArrayObject(ArrayObjectId),
    /// A draw call.
    Draw(DrawCall),
}

/// The details of one draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    /// The framebuffer drawn into; `None` is the default framebuffer.
    pub framebuffer: Option<FramebufferId>,
    /// The program that was current.
    pub program: ProgramId,
    /// The array object that was bound.
    pub array_object: ArrayObjectId,
    /// The primitive type.
    pub primitive: Primitive,
    /// Indices or vertices drawn per instance.
    pub count: u32,
    /// The number of instances.
    pub instances: u32,
    /// The fixed-function state in effect.
    pub state: RenderState,
}

#[derive(Debug)]
struct TextureEntry {
    label: Option<String>,
    area: Area,
    format: TextureFormat,
    mipmapped: bool,
    size: usize,
}

#[derive(Debug)]
struct FramebufferEntry {
    attachments: Vec<TextureId>,
}

#[derive(Debug)]
struct ProgramEntry {
    name: String,
    /// `None` when the sources declare no uniform, in which case every name is accepted.
    declared: Option<HashSet<String>>,
    values: HashMap<String, UniformValue>,
}

#[derive(Debug)]
struct BufferEntry {
    data: Vec<u8>,
}

#[derive(Debug)]
enum ArrayObjectEntry {
    Mesh {
        vertex_count: u32,
        index_count: u32,
        size: usize,
    },
    Instanced {
        index_count: u32,
        instance_buffer: ArrayBufferId,
        stride: u64,
    },
    Points {
        buffer: ArrayBufferId,
        stride: u64,
    },
}

#[derive(Debug, Default)]
struct BindingState {
    units: HashMap<TextureUnit, TextureId>,
    draw_framebuffer: Option<FramebufferId>,
    read_framebuffer: Option<FramebufferId>,
    program: Option<ProgramId>,
    array_object: Option<ArrayObjectId>,
    viewport: Area,
    render_state: RenderState,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ResourceError> {
    mutex
        .lock()
        .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned ({what}): {e}")))
}

/// A GPU device that keeps every resource in host memory.
///
/// Resources are validated on creation and use (unknown IDs, incomplete
/// framebuffers, out-of-range units, draws without a program), VRAM usage is
/// tracked from texture, buffer and vertex data sizes, and every command is
/// appended to a log that tests and tools can inspect.
#[derive(Debug)]
pub struct HeadlessDevice {
    texture_units: u32,
    textures: Mutex<HashMap<TextureId, TextureEntry>>,
    framebuffers: Mutex<HashMap<FramebufferId, FramebufferEntry>>,
    programs: Mutex<HashMap<ProgramId, ProgramEntry>>,
    buffers: Mutex<HashMap<ArrayBufferId, BufferEntry>>,
    array_objects: Mutex<HashMap<ArrayObjectId, ArrayObjectEntry>>,
    bindings: Mutex<BindingState>,
    commands: Mutex<Vec<DeviceCommand>>,
    next_texture_id: AtomicUsize,
    next_framebuffer_id: AtomicUsize,
    next_program_id: AtomicUsize,
    next_buffer_id: AtomicUsize,
    next_array_object_id: AtomicUsize,
    draw_calls: AtomicUsize,
    vram_allocated_bytes: AtomicUsize,
    vram_peak_bytes: AtomicU64,
}

impl HeadlessDevice {
    /// Creates a device exposing [`DEFAULT_TEXTURE_UNITS`] texture units.
    pub fn new() -> Self {
        Self::with_texture_units(DEFAULT_TEXTURE_UNITS)
    }

    /// Creates a device exposing `texture_units` texture units.
    pub fn with_texture_units(texture_units: u32) -> Self {
        log::debug!("HeadlessDevice: created with {texture_units} texture units");
        Self {
            texture_units,
            textures: Mutex::new(HashMap::new()),
            framebuffers: Mutex::new(HashMap::new()),
            programs: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            array_objects: Mutex::new(HashMap::new()),
            bindings: Mutex::new(BindingState::default()),
            commands: Mutex::new(Vec::new()),
            next_texture_id: AtomicUsize::new(1),
            next_framebuffer_id: AtomicUsize::new(1),
            next_program_id: AtomicUsize::new(1),
            next_buffer_id: AtomicUsize::new(1),
            next_array_object_id: AtomicUsize::new(1),
            draw_calls: AtomicUsize::new(0),
            vram_allocated_bytes: AtomicUsize::new(0),
            vram_peak_bytes: AtomicU64::new(0),
        }
    }

    /// Bytes currently held by textures, buffers and mesh vertex data.
    pub fn vram_allocated_bytes(&self) -> usize {
        self.vram_allocated_bytes.load(Ordering::Relaxed)
    }

    /// The highest value [`Self::vram_allocated_bytes`] has reached.
    pub fn vram_peak_bytes(&self) -> u64 {
        self.vram_peak_bytes.load(Ordering::Relaxed)
    }

    /// The number of draw calls issued so far.
    pub fn draw_call_count(&self) -> usize {
        self.draw_calls.load(Ordering::Relaxed)
    }

    /// The number of live textures.
    pub fn live_textures(&self) -> usize {
        self.textures.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// The number of live framebuffers.
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// The number of live programs.
    pub fn live_programs(&self) -> usize {
        self.programs.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// The number of live array buffers.
    pub fn live_array_buffers(&self) -> usize {
        self.buffers.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// The number of live array objects.
    pub fn live_array_objects(&self) -> usize {
        self.array_objects.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// Returns `true` if `id` names a live texture.
    pub fn is_texture_live(&self, id: TextureId) -> bool {
        self.textures
            .lock()
            .map(|t| t.contains_key(&id))
            .unwrap_or(false)
    }

    /// The size and format of a live texture.
    pub fn texture_info(&self, id: TextureId) -> Option<(Area, TextureFormat)> {
        let textures = self.textures.lock().ok()?;
        textures.get(&id).map(|t| (t.area, t.format))
    }

    /// The debug label a live texture was created with.
    pub fn texture_label(&self, id: TextureId) -> Option<String> {
        let textures = self.textures.lock().ok()?;
        textures.get(&id).and_then(|t| t.label.clone())
    }

    /// The texture bound to `unit`, if any.
    pub fn bound_texture(&self, unit: TextureUnit) -> Option<TextureId> {
        let bindings = self.bindings.lock().ok()?;
        bindings.units.get(&unit).copied()
    }

    /// The current program, if any.
    pub fn current_program(&self) -> Option<ProgramId> {
        self.bindings.lock().ok()?.program
    }

    /// The current viewport.
    pub fn viewport(&self) -> Area {
        self.bindings.lock().map(|b| b.viewport).unwrap_or_default()
    }

    /// The framebuffer bound for drawing, `None` for the default framebuffer.
    pub fn draw_framebuffer(&self) -> Option<FramebufferId> {
        self.bindings.lock().ok()?.draw_framebuffer
    }

    /// The name a live program was compiled under.
    pub fn program_name(&self, id: ProgramId) -> Option<String> {
        let programs = self.programs.lock().ok()?;
        programs.get(&id).map(|p| p.name.clone())
    }

    /// The last value uploaded to a uniform of a live program.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        let programs = self.programs.lock().ok()?;
        programs.get(&program)?.values.get(name).copied()
    }

    /// A copy of the contents of a live array buffer.
    pub fn buffer_contents(&self, id: ArrayBufferId) -> Option<Vec<u8>> {
        let buffers = self.buffers.lock().ok()?;
        buffers.get(&id).map(|b| b.data.clone())
    }

    /// A copy of the command log.
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Returns the command log and empties it.
    pub fn take_commands(&self) -> Vec<DeviceCommand> {
        self.commands
            .lock()
            .map(|mut c| std::mem::take(&mut *c))
            .unwrap_or_default()
    }

    /// The draw calls in the command log, in issue order.
    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCommand::Draw(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    fn record(&self, command: DeviceCommand) {
        match self.commands.lock() {
            Ok(mut commands) => commands.push(command),
            Err(e) => log::error!("HeadlessDevice: command log poisoned: {e}"),
        }
    }

    fn track_allocation(&self, size: usize) {
        let total = self.vram_allocated_bytes.fetch_add(size, Ordering::Relaxed) + size;
        self.vram_peak_bytes
            .fetch_max(total as u64, Ordering::Relaxed);
    }

    fn track_release(&self, size: usize) {
        self.vram_allocated_bytes.fetch_sub(size, Ordering::Relaxed);
    }

    fn check_unit(&self, unit: TextureUnit) -> Result<(), ResourceError> {
        if unit.0 < self.texture_units {
            Ok(())
        } else {
            Err(ResourceError::BackendError(format!(
                "Texture unit {} out of range (device has {})",
                unit.0, self.texture_units
            )))
        }
    }

    fn begin_draw(&self) -> Result<DrawCall, ResourceError> {
        let bindings = lock(&self.bindings, "bindings")?;
        let program = bindings
            .program
            .ok_or_else(|| ResourceError::BackendError("Draw issued without a program".into()))?;
        let array_object = bindings.array_object.ok_or_else(|| {
            ResourceError::BackendError("Draw issued without an array object".into())
        })?;
        Ok(DrawCall {
            framebuffer: bindings.draw_framebuffer,
            program,
            array_object,
            primitive: Primitive::Triangles,
            count: 0,
            instances: 1,
            state: bindings.render_state,
        })
    }

    fn finish_draw(&self, call: DrawCall) {
        self.draw_calls.fetch_add(1, Ordering::Relaxed);
        self.record(DeviceCommand::Draw(call));
    }

    fn buffer_len(&self, id: ArrayBufferId) -> Result<u64, ResourceError> {
        let buffers = lock(&self.buffers, "buffers")?;
        buffers
            .get(&id)
            .map(|b| b.data.len() as u64)
            .ok_or(ResourceError::NotFound)
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Scans a stage for `uniform` declarations and `#error` directives.
fn scan_stage(
    program: &str,
    stage: ShaderStage,
    text: &str,
    declared: &mut HashSet<String>,
) -> Result<(), ShaderError> {
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if let Some(message) = trimmed.strip_prefix("#error") {
            let column = (line.len() - trimmed.len()) as u32 + 1;
            return Err(ShaderError::CompileError {
                name: program.to_string(),
                location: Some(SourceLocation {
                    stage,
                    line: index as u32 + 1,
                    column: Some(column),
                }),
                details: message.trim().to_string(),
            });
        }
        if let Some(rest) = trimmed.strip_prefix("uniform ") {
            // uniform <type> <name>[<array>];
            let name = rest
                .trim_end_matches(';')
                .split_whitespace()
                .nth(1)
                .map(|n| n.split('[').next().unwrap_or(n).trim_end_matches(';'));
            if let Some(name) = name {
                declared.insert(name.to_string());
            }
        }
    }
    Ok(())
}

impl GraphicsDevice for HeadlessDevice {
    fn texture_units_max(&self) -> u32 {
        self.texture_units
    }

    fn create_texture_2d(
        &self,
        descriptor: &Texture2DDescriptor,
    ) -> Result<TextureId, ResourceError> {
        if descriptor.area.is_empty() {
            return Err(ResourceError::BackendError(format!(
                "Cannot create a zero-sized texture ({:?})",
                descriptor.label
            )));
        }
        let mipmapped = descriptor.min_filter.uses_mipmaps();
        let mut size = descriptor.byte_size() as usize;
        if mipmapped {
            // Full chain is bounded by a third of the base level.
            size += size / 3;
        }

        let id = TextureId(self.next_texture_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.textures, "textures")?.insert(
            id,
            TextureEntry {
                label: descriptor.label.as_ref().map(|l| l.to_string()),
                area: descriptor.area,
                format: descriptor.format,
                mipmapped,
                size,
            },
        );
        self.track_allocation(size);
        log::trace!(
            "HeadlessDevice: created texture {:?} {:?} {}x{} {:?}",
            id,
            descriptor.label,
            descriptor.area.width,
            descriptor.area.height,
            descriptor.format
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let entry = lock(&self.textures, "textures")?
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        self.track_release(entry.size);
        lock(&self.bindings, "bindings")?
            .units
            .retain(|_, bound| *bound != id);
        Ok(())
    }

    fn bind_texture(&self, unit: TextureUnit, texture: TextureId) -> Result<(), ResourceError> {
        self.check_unit(unit)?;
        if !lock(&self.textures, "textures")?.contains_key(&texture) {
            return Err(ResourceError::NotFound);
        }
        lock(&self.bindings, "bindings")?.units.insert(unit, texture);
        self.record(DeviceCommand::BindTexture { unit, texture });
        Ok(())
    }

    fn unbind_texture(&self, unit: TextureUnit) -> Result<(), ResourceError> {
        self.check_unit(unit)?;
        lock(&self.bindings, "bindings")?.units.remove(&unit);
        self.record(DeviceCommand::UnbindTexture(unit));
        Ok(())
    }

    fn regenerate_mipmaps(&self, unit: TextureUnit) -> Result<(), ResourceError> {
        self.check_unit(unit)?;
        let texture = lock(&self.bindings, "bindings")?
            .units
            .get(&unit)
            .copied()
            .ok_or(ResourceError::NotFound)?;
        let textures = lock(&self.textures, "textures")?;
        let entry = textures.get(&texture).ok_or(ResourceError::NotFound)?;
        if !entry.mipmapped {
            log::debug!(
                "HeadlessDevice: regenerating mipmaps of {:?}, which does not sample them",
                texture
            );
        }
        Ok(())
    }

    fn create_framebuffer(
        &self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, ResourceError> {
        let textures = lock(&self.textures, "textures")?;
        let mut area = None;
        let mut attachments = Vec::new();
        let mut draw_buffers = HashSet::new();

        for color in &descriptor.color_attachments {
            let entry = textures.get(&color.texture).ok_or(ResourceError::NotFound)?;
            if entry.format.has_depth() {
                return Err(ResourceError::BackendError(format!(
                    "Incomplete framebuffer {:?}: depth texture used as color attachment",
                    descriptor.label
                )));
            }
            if !draw_buffers.insert(color.draw_buffer) {
                return Err(ResourceError::BackendError(format!(
                    "Incomplete framebuffer {:?}: draw buffer {} attached twice",
                    descriptor.label, color.draw_buffer
                )));
            }
            attachments.push((color.texture, entry.area));
        }

        if let Some(depth) = descriptor.depth_attachment {
            let entry = textures
                .get(&depth.texture())
                .ok_or(ResourceError::NotFound)?;
            let compatible = match depth {
                DepthStencilAttachment::Depth(_) => entry.format.has_depth(),
                DepthStencilAttachment::DepthStencil(_) => entry.format.has_stencil(),
            };
            if !compatible {
                return Err(ResourceError::BackendError(format!(
                    "Incomplete framebuffer {:?}: {:?} cannot back a {:?} attachment",
                    descriptor.label, entry.format, depth
                )));
            }
            attachments.push((depth.texture(), entry.area));
        }

        if attachments.is_empty() {
            return Err(ResourceError::BackendError(format!(
                "Incomplete framebuffer {:?}: no attachments",
                descriptor.label
            )));
        }
        for (_, attachment_area) in &attachments {
            match area {
                None => area = Some(*attachment_area),
                Some(expected) if expected != *attachment_area => {
                    return Err(ResourceError::BackendError(format!(
                        "Incomplete framebuffer {:?}: attachment sizes differ",
                        descriptor.label
                    )));
                }
                Some(_) => {}
            }
        }
        drop(textures);

        let id = FramebufferId(self.next_framebuffer_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.framebuffers, "framebuffers")?.insert(
            id,
            FramebufferEntry {
                attachments: attachments.into_iter().map(|(t, _)| t).collect(),
            },
        );
        Ok(id)
    }

    fn destroy_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError> {
        lock(&self.framebuffers, "framebuffers")?
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        let mut bindings = lock(&self.bindings, "bindings")?;
        if bindings.draw_framebuffer == Some(id) {
            bindings.draw_framebuffer = None;
        }
        if bindings.read_framebuffer == Some(id) {
            bindings.read_framebuffer = None;
        }
        Ok(())
    }

    fn bind_draw_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError> {
        {
            let framebuffers = lock(&self.framebuffers, "framebuffers")?;
            let entry = framebuffers.get(&id).ok_or(ResourceError::NotFound)?;
            let textures = lock(&self.textures, "textures")?;
            if entry.attachments.iter().any(|t| !textures.contains_key(t)) {
                return Err(ResourceError::BackendError(format!(
                    "Framebuffer {:?} has a deleted attachment",
                    id
                )));
            }
        }
        lock(&self.bindings, "bindings")?.draw_framebuffer = Some(id);
        self.record(DeviceCommand::BindDrawFramebuffer(Some(id)));
        Ok(())
    }

    fn unbind_draw_framebuffer(&self) {
        match self.bindings.lock() {
            Ok(mut bindings) => bindings.draw_framebuffer = None,
            Err(e) => log::error!("HeadlessDevice: bindings poisoned: {e}"),
        }
        self.record(DeviceCommand::BindDrawFramebuffer(None));
    }

    fn bind_read_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError> {
        if !lock(&self.framebuffers, "framebuffers")?.contains_key(&id) {
            return Err(ResourceError::NotFound);
        }
        lock(&self.bindings, "bindings")?.read_framebuffer = Some(id);
        self.record(DeviceCommand::BindReadFramebuffer(Some(id)));
        Ok(())
    }

    fn unbind_read_framebuffer(&self) {
        match self.bindings.lock() {
            Ok(mut bindings) => bindings.read_framebuffer = None,
            Err(e) => log::error!("HeadlessDevice: bindings poisoned: {e}"),
        }
        self.record(DeviceCommand::BindReadFramebuffer(None));
    }

    fn blit_framebuffer(
        &self,
        source: Area,
        destination: Area,
        filter: BlitFilter,
    ) -> Result<(), ResourceError> {
        let (read, draw) = {
            let bindings = lock(&self.bindings, "bindings")?;
            (bindings.read_framebuffer, bindings.draw_framebuffer)
        };
        self.record(DeviceCommand::Blit {
            read,
            draw,
            source,
            destination,
            filter,
        });
        Ok(())
    }

    fn clear(&self, values: &ClearValues) -> Result<(), ResourceError> {
        let framebuffer = lock(&self.bindings, "bindings")?.draw_framebuffer;
        self.record(DeviceCommand::Clear {
            framebuffer,
            values: *values,
        });
        Ok(())
    }

    fn set_viewport(&self, area: Area) {
        match self.bindings.lock() {
            Ok(mut bindings) => bindings.viewport = area,
            Err(e) => log::error!("HeadlessDevice: bindings poisoned: {e}"),
        }
        self.record(DeviceCommand::Viewport(area));
    }

    fn activate_render_state(&self, state: &RenderState) {
        match self.bindings.lock() {
            Ok(mut bindings) => bindings.render_state = *state,
            Err(e) => log::error!("HeadlessDevice: bindings poisoned: {e}"),
        }
        self.record(DeviceCommand::RenderState(*state));
    }

    fn compile_program(&self, source: &ProgramSource) -> Result<ProgramId, ShaderError> {
        let mut declared = HashSet::new();
        let mut stages = vec![
            (ShaderStage::Vertex, source.vertex.as_str()),
            (ShaderStage::Fragment, source.fragment.as_str()),
        ];
        if let Some(geometry) = &source.geometry {
            stages.push((ShaderStage::Geometry, geometry.as_str()));
        }
        for (stage, text) in stages {
            if text.trim().is_empty() {
                return Err(ShaderError::CompileError {
                    name: source.name.clone(),
                    location: None,
                    details: format!("empty {stage} stage"),
                });
            }
            scan_stage(&source.name, stage, text, &mut declared)?;
        }

        let id = ProgramId(self.next_program_id.fetch_add(1, Ordering::Relaxed));
        let mut programs = self.programs.lock().map_err(|e| ShaderError::CompileError {
            name: source.name.clone(),
            location: None,
            details: format!("Mutex poisoned (programs): {e}"),
        })?;
        programs.insert(
            id,
            ProgramEntry {
                name: source.name.clone(),
                declared: (!declared.is_empty()).then_some(declared),
                values: HashMap::new(),
            },
        );
        log::debug!("HeadlessDevice: compiled program '{}' as {:?}", source.name, id);
        Ok(id)
    }

    fn destroy_program(&self, id: ProgramId) -> Result<(), ResourceError> {
        lock(&self.programs, "programs")?
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        let mut bindings = lock(&self.bindings, "bindings")?;
        if bindings.program == Some(id) {
            bindings.program = None;
        }
        Ok(())
    }

    fn activate_program(&self, id: ProgramId) -> Result<(), ResourceError> {
        if !lock(&self.programs, "programs")?.contains_key(&id) {
            return Err(ResourceError::NotFound);
        }
        lock(&self.bindings, "bindings")?.program = Some(id);
        self.record(DeviceCommand::ActivateProgram(id));
        Ok(())
    }

    fn deactivate_program(&self) {
        match self.bindings.lock() {
            Ok(mut bindings) => bindings.program = None,
            Err(e) => log::error!("HeadlessDevice: bindings poisoned: {e}"),
        }
        self.record(DeviceCommand::DeactivateProgram);
    }

    fn set_uniform(
        &self,
        program: ProgramId,
        name: &str,
        value: UniformValue,
    ) -> Result<(), ShaderError> {
        if let UniformValue::Texture(unit) = value {
            if unit.0 >= self.texture_units {
                return Err(ShaderError::ValidationFailed {
                    program: format!("{program:?}"),
                    reason: format!("sampler '{name}' reads from unit {} out of range", unit.0),
                });
            }
        }
        let mut programs = self
            .programs
            .lock()
            .map_err(|e| ShaderError::ValidationFailed {
                program: format!("{program:?}"),
                reason: format!("Mutex poisoned (programs): {e}"),
            })?;
        let entry = programs
            .get_mut(&program)
            .ok_or_else(|| ShaderError::ValidationFailed {
                program: format!("{program:?}"),
                reason: "unknown program".to_string(),
            })?;
        if let Some(declared) = &entry.declared {
            if !declared.contains(name) {
                return Err(ShaderError::MissingUniform {
                    program: entry.name.clone(),
                    uniform: name.to_string(),
                });
            }
        }
        entry.values.insert(name.to_string(), value);
        drop(programs);
        self.record(DeviceCommand::Uniform {
            program,
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn create_array_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
    ) -> Result<ArrayBufferId, ResourceError> {
        let id = ArrayBufferId(self.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.buffers, "buffers")?.insert(
            id,
            BufferEntry {
                data: vec![0; size as usize],
            },
        );
        self.track_allocation(size as usize);
        log::trace!("HeadlessDevice: created {usage:?} buffer {id:?} of {size} bytes");
        Ok(id)
    }

    fn update_array_buffer(
        &self,
        id: ArrayBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let mut buffers = lock(&self.buffers, "buffers")?;
        let entry = buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .ok_or(ResourceError::OutOfBounds)?;
        if end > entry.data.len() {
            return Err(ResourceError::OutOfBounds);
        }
        entry.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_array_buffer(&self, id: ArrayBufferId) -> Result<(), ResourceError> {
        let entry = lock(&self.buffers, "buffers")?
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        self.track_release(entry.data.len());
        Ok(())
    }

    fn create_array_object(
        &self,
        descriptor: &ArrayObjectDescriptor,
    ) -> Result<ArrayObjectId, ResourceError> {
        let entry = match descriptor.source {
            ArrayObjectSource::Mesh {
                vertices,
                stride,
                indices,
            } => {
                if stride == 0 || vertices.len() as u64 % stride != 0 {
                    return Err(ResourceError::BackendError(format!(
                        "Array object {:?}: {} vertex bytes do not divide into stride {}",
                        descriptor.label,
                        vertices.len(),
                        stride
                    )));
                }
                let vertex_count = (vertices.len() as u64 / stride) as u32;
                if let Some(bad) = indices.iter().find(|&&i| i >= vertex_count) {
                    return Err(ResourceError::BackendError(format!(
                        "Array object {:?}: index {} out of range ({} vertices)",
                        descriptor.label, bad, vertex_count
                    )));
                }
                let size = vertices.len() + std::mem::size_of_val(indices);
                ArrayObjectEntry::Mesh {
                    vertex_count,
                    index_count: indices.len() as u32,
                    size,
                }
            }
            ArrayObjectSource::Instanced {
                base,
                instance_buffer,
                attributes,
            } => {
                let index_count = match lock(&self.array_objects, "array objects")?.get(&base) {
                    Some(ArrayObjectEntry::Mesh { index_count, .. })
                    | Some(ArrayObjectEntry::Instanced { index_count, .. }) => *index_count,
                    Some(ArrayObjectEntry::Points { .. }) => {
                        return Err(ResourceError::BackendError(format!(
                            "Array object {:?}: cannot instance a point array",
                            descriptor.label
                        )))
                    }
                    None => return Err(ResourceError::NotFound),
                };
                self.buffer_len(instance_buffer)?;
                ArrayObjectEntry::Instanced {
                    index_count,
                    instance_buffer,
                    stride: attributes.stride(),
                }
            }
            ArrayObjectSource::Points { buffer, attributes } => {
                self.buffer_len(buffer)?;
                ArrayObjectEntry::Points {
                    buffer,
                    stride: attributes.stride(),
                }
            }
        };

        if let ArrayObjectEntry::Mesh { size, .. } = entry {
            self.track_allocation(size);
        }
        let id = ArrayObjectId(self.next_array_object_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.array_objects, "array objects")?.insert(id, entry);
        Ok(id)
    }

    fn destroy_array_object(&self, id: ArrayObjectId) -> Result<(), ResourceError> {
        let entry = lock(&self.array_objects, "array objects")?
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        if let ArrayObjectEntry::Mesh { size, .. } = entry {
            self.track_release(size);
        }
        let mut bindings = lock(&self.bindings, "bindings")?;
        if bindings.array_object == Some(id) {
            bindings.array_object = None;
        }
        Ok(())
    }

    fn bind_array_object(&self, id: ArrayObjectId) -> Result<(), ResourceError> {
        if !lock(&self.array_objects, "array objects")?.contains_key(&id) {
            return Err(ResourceError::NotFound);
        }
        lock(&self.bindings, "bindings")?.array_object = Some(id);
        self.record(DeviceCommand::BindArrayObject(id));
        Ok(())
    }

    fn unbind_array_object(&self) {
        match self.bindings.lock() {
            Ok(mut bindings) => bindings.array_object = None,
            Err(e) => log::error!("HeadlessDevice: bindings poisoned: {e}"),
        }
    }

    fn draw_elements(&self, primitive: Primitive) -> Result<(), ResourceError> {
        let mut call = self.begin_draw()?;
        let array_object = call.array_object;
        let count = match lock(&self.array_objects, "array objects")?.get(&array_object) {
            Some(ArrayObjectEntry::Mesh { index_count, .. })
            | Some(ArrayObjectEntry::Instanced { index_count, .. }) => *index_count,
            Some(ArrayObjectEntry::Points { .. }) => {
                return Err(ResourceError::BackendError(
                    "Indexed draw on a point array".to_string(),
                ))
            }
            None => return Err(ResourceError::NotFound),
        };
        call.primitive = primitive;
        call.count = count;
        call.instances = 1;
        self.finish_draw(call);
        Ok(())
    }

    fn draw_elements_instanced(
        &self,
        primitive: Primitive,
        instances: u32,
    ) -> Result<(), ResourceError> {
        let mut call = self.begin_draw()?;
        let array_object = call.array_object;
        let (count, buffer, stride) =
            match lock(&self.array_objects, "array objects")?.get(&array_object) {
                Some(ArrayObjectEntry::Instanced {
                    index_count,
                    instance_buffer,
                    stride,
                }) => (*index_count, *instance_buffer, *stride),
                Some(_) => {
                    return Err(ResourceError::BackendError(
                        "Instanced draw on an array object without instance data".to_string(),
                    ))
                }
                None => return Err(ResourceError::NotFound),
            };
        let capacity = self.buffer_len(buffer)? / stride;
        if u64::from(instances) > capacity {
            return Err(ResourceError::OutOfBounds);
        }
        call.primitive = primitive;
        call.count = count;
        call.instances = instances;
        self.finish_draw(call);
        Ok(())
    }

    fn draw_arrays(
        &self,
        primitive: Primitive,
        first: u32,
        count: u32,
    ) -> Result<(), ResourceError> {
        let mut call = self.begin_draw()?;
        let array_object = call.array_object;
        let vertices = match lock(&self.array_objects, "array objects")?.get(&array_object) {
            Some(ArrayObjectEntry::Mesh { vertex_count, .. }) => u64::from(*vertex_count),
            Some(ArrayObjectEntry::Points { buffer, stride }) => {
                let (buffer, stride) = (*buffer, *stride);
                self.buffer_len(buffer)? / stride
            }
            Some(ArrayObjectEntry::Instanced { .. }) => {
                return Err(ResourceError::BackendError(
                    "Array draw on an instanced array object".to_string(),
                ))
            }
            None => return Err(ResourceError::NotFound),
        };
        if u64::from(first) + u64::from(count) > vertices {
            return Err(ResourceError::OutOfBounds);
        }
        call.primitive = primitive;
        call.count = count;
        call.instances = 1;
        self.finish_draw(call);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(vertex: &str, fragment: &str) -> ProgramSource {
        ProgramSource {
            name: "test".to_string(),
            vertex: vertex.to_string(),
            geometry: None,
            fragment: fragment.to_string(),
        }
    }

    fn quad(device: &HeadlessDevice) -> ArrayObjectId {
        let vertices = [0u8; 4 * 12];
        device
            .create_array_object(&ArrayObjectDescriptor {
                label: None,
                source: ArrayObjectSource::Mesh {
                    vertices: &vertices,
                    stride: 12,
                    indices: &[0, 1, 2, 2, 3, 0],
                },
            })
            .unwrap()
    }

    #[test]
    fn texture_memory_is_tracked() {
        let device = HeadlessDevice::new();
        let desc = Texture2DDescriptor::new("t", Area::new(64, 32), TextureFormat::Rgba8);
        let a = device.create_texture_2d(&desc).unwrap();
        let b = device.create_texture_2d(&desc).unwrap();
        assert_eq!(device.vram_allocated_bytes(), 2 * 64 * 32 * 4);

        device.destroy_texture(a).unwrap();
        assert_eq!(device.vram_allocated_bytes(), 64 * 32 * 4);
        assert_eq!(device.vram_peak_bytes(), 2 * 64 * 32 * 4);
        assert!(matches!(
            device.destroy_texture(a),
            Err(ResourceError::NotFound)
        ));
        assert!(device.is_texture_live(b));
        assert_eq!(device.live_textures(), 1);
    }

    #[test]
    fn framebuffer_attachments_must_agree_in_size() {
        let device = HeadlessDevice::new();
        let color = device
            .create_texture_2d(&Texture2DDescriptor::new(
                "c",
                Area::new(8, 8),
                TextureFormat::Rgba8,
            ))
            .unwrap();
        let depth = device
            .create_texture_2d(&Texture2DDescriptor::new(
                "d",
                Area::new(4, 4),
                TextureFormat::Depth24Stencil8,
            ))
            .unwrap();
        let result = device.create_framebuffer(&FramebufferDescriptor {
            label: None,
            color_attachments: vec![ColorAttachment {
                draw_buffer: 0,
                texture: color,
            }],
            depth_attachment: Some(DepthStencilAttachment::DepthStencil(depth)),
        });
        assert!(matches!(result, Err(ResourceError::BackendError(_))));
    }

    #[test]
    fn depth_only_texture_cannot_back_a_stencil_attachment() {
        let device = HeadlessDevice::new();
        let depth = device
            .create_texture_2d(&Texture2DDescriptor::new(
                "d",
                Area::new(4, 4),
                TextureFormat::Depth24,
            ))
            .unwrap();
        let result = device.create_framebuffer(&FramebufferDescriptor {
            label: None,
            color_attachments: Vec::new(),
            depth_attachment: Some(DepthStencilAttachment::DepthStencil(depth)),
        });
        assert!(result.is_err());
        let ok = device.create_framebuffer(&FramebufferDescriptor {
            label: None,
            color_attachments: Vec::new(),
            depth_attachment: Some(DepthStencilAttachment::Depth(depth)),
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn compile_errors_carry_a_location() {
        let device = HeadlessDevice::new();
        let err = device
            .compile_program(&program("void main() {}", "void main() {\n  #error bad sampler\n}"))
            .unwrap_err();
        match err {
            ShaderError::CompileError {
                location: Some(location),
                details,
                ..
            } => {
                assert_eq!(location.stage, ShaderStage::Fragment);
                assert_eq!(location.line, 2);
                assert_eq!(location.column, Some(3));
                assert_eq!(details, "bad sampler");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn declared_uniforms_are_enforced() {
        let device = HeadlessDevice::new();
        let id = device
            .compile_program(&program(
                "uniform mat4 m_projection;\nvoid main() {}",
                "uniform sampler2D t_albedo;\nvoid main() {}",
            ))
            .unwrap();
        device
            .set_uniform(id, "m_projection", UniformValue::Mat4(glam::Mat4::IDENTITY))
            .unwrap();
        device
            .set_uniform(id, "t_albedo", UniformValue::Texture(TextureUnit(2)))
            .unwrap();
        assert!(matches!(
            device.set_uniform(id, "m_view", UniformValue::Float(1.0)),
            Err(ShaderError::MissingUniform { .. })
        ));
        assert_eq!(
            device.uniform(id, "t_albedo"),
            Some(UniformValue::Texture(TextureUnit(2)))
        );
    }

    #[test]
    fn draws_require_a_program_and_an_array_object() {
        let device = HeadlessDevice::new();
        let array = quad(&device);
        device.bind_array_object(array).unwrap();
        assert!(device.draw_elements(Primitive::Triangles).is_err());

        let id = device
            .compile_program(&program("void main() {}", "void main() {}"))
            .unwrap();
        device.activate_program(id).unwrap();
        device.draw_elements(Primitive::Triangles).unwrap();

        let calls = device.draw_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].count, 6);
        assert_eq!(calls[0].framebuffer, None);
        assert_eq!(device.draw_call_count(), 1);
    }

    #[test]
    fn instanced_draws_are_bounded_by_the_instance_buffer() {
        let device = HeadlessDevice::new();
        let mesh = quad(&device);
        let buffer = device
            .create_array_buffer(3 * 64, BufferUsage::DynamicDraw)
            .unwrap();
        let instanced = device
            .create_array_object(&ArrayObjectDescriptor {
                label: None,
                source: ArrayObjectSource::Instanced {
                    base: mesh,
                    instance_buffer: buffer,
                    attributes: InstanceAttributes::ModelMatrix,
                },
            })
            .unwrap();
        let id = device
            .compile_program(&program("void main() {}", "void main() {}"))
            .unwrap();
        device.activate_program(id).unwrap();
        device.bind_array_object(instanced).unwrap();
        device
            .draw_elements_instanced(Primitive::Triangles, 3)
            .unwrap();
        assert!(matches!(
            device.draw_elements_instanced(Primitive::Triangles, 4),
            Err(ResourceError::OutOfBounds)
        ));
    }

    #[test]
    fn buffer_writes_are_bounds_checked() {
        let device = HeadlessDevice::new();
        let buffer = device.create_array_buffer(8, BufferUsage::StaticDraw).unwrap();
        device.update_array_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            device.buffer_contents(buffer).unwrap(),
            vec![0, 0, 0, 0, 1, 2, 3, 4]
        );
        assert!(matches!(
            device.update_array_buffer(buffer, 6, &[1, 2, 3]),
            Err(ResourceError::OutOfBounds)
        ));
    }

    #[test]
    fn units_beyond_the_device_limit_are_rejected() {
        let device = HeadlessDevice::with_texture_units(2);
        let texture = device
            .create_texture_2d(&Texture2DDescriptor::new(
                "t",
                Area::new(1, 1),
                TextureFormat::R8,
            ))
            .unwrap();
        device.bind_texture(TextureUnit(1), texture).unwrap();
        assert!(device.bind_texture(TextureUnit(2), texture).is_err());
        device.destroy_texture(texture).unwrap();
        assert_eq!(device.bound_texture(TextureUnit(1)), None);
    }
}
