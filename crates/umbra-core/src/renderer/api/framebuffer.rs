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

//! Framebuffer handles, attachment layouts, blits and clears.

use super::texture::TextureId;
use crate::math::Vec4;
use std::borrow::Cow;

/// An opaque handle to a GPU framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub usize);

/// A color texture attached to a framebuffer draw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorAttachment {
    /// The index of the draw buffer the shader writes to.
    pub draw_buffer: u32,
    /// The attached texture.
    pub texture: TextureId,
}

/// The depth (and optionally stencil) texture attached to a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthStencilAttachment {
    /// A depth-only texture.
    Depth(TextureId),
    /// A packed depth and stencil texture.
    DepthStencil(TextureId),
}

impl DepthStencilAttachment {
    /// The attached texture.
    pub fn texture(&self) -> TextureId {
        match self {
            DepthStencilAttachment::Depth(t) | DepthStencilAttachment::DepthStencil(t) => *t,
        }
    }
}

/// A descriptor used to create a framebuffer.
#[derive(Debug, Clone, Default)]
pub struct FramebufferDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The color attachments in draw buffer order.
    pub color_attachments: Vec<ColorAttachment>,
    /// The depth attachment, if any.
    pub depth_attachment: Option<DepthStencilAttachment>,
}

/// The filter used when a blit changes the size of the copied region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum BlitFilter {
    /// Nearest texel.
    Nearest,
    /// Bilinear interpolation.
    #[default]
    Linear,
}

/// Which buffers of the bound draw framebuffer to clear, and to what.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearValues {
    /// The color to clear every color attachment to.
    pub color: Option<Vec4>,
    /// The depth value.
    pub depth: Option<f32>,
    /// The stencil value.
    pub stencil: Option<u8>,
}

impl ClearValues {
    /// Clears color, depth and stencil, the way every geometry frame starts.
    pub fn all(color: Vec4, depth: f32, stencil: u8) -> Self {
        Self {
            color: Some(color),
            depth: Some(depth),
            stencil: Some(stencil),
        }
    }
}
