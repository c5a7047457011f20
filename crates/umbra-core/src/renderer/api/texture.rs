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

//! Defines data structures and enums for describing GPU textures and the
//! units through which shaders sample them.

use crate::math::Area;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// An opaque handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// A hardware texture binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureUnit(pub u32);

/// The storage format of a texture's texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// One 8-bit normalized channel.
    R8,
    /// Two 8-bit normalized channels.
    Rg8,
    /// Four 8-bit normalized channels.
    Rgba8,
    /// One 16-bit float channel.
    R16f,
    /// Two 16-bit float channels.
    Rg16f,
    /// Four 16-bit float channels.
    Rgba16f,
    /// Two 32-bit float channels.
    Rg32f,
    /// Four 32-bit float channels.
    Rgba32f,
    /// 16-bit depth.
    Depth16,
    /// 24-bit depth, stored in four bytes.
    Depth24,
    /// 32-bit float depth.
    Depth32f,
    /// 24-bit depth packed with an 8-bit stencil.
    Depth24Stencil8,
}

impl TextureFormat {
    /// The number of bytes one texel occupies in GPU memory.
    pub fn bytes_per_pixel(&self) -> u64 {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::Rg8 | TextureFormat::R16f | TextureFormat::Depth16 => 2,
            TextureFormat::Rgba8
            | TextureFormat::Rg16f
            | TextureFormat::Depth24
            | TextureFormat::Depth32f
            | TextureFormat::Depth24Stencil8 => 4,
            TextureFormat::Rgba16f | TextureFormat::Rg32f => 8,
            TextureFormat::Rgba32f => 16,
        }
    }

    /// Returns `true` for formats usable as a depth attachment.
    pub fn has_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16
                | TextureFormat::Depth24
                | TextureFormat::Depth32f
                | TextureFormat::Depth24Stencil8
        )
    }

    /// Returns `true` for formats that carry a stencil channel.
    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth24Stencil8)
    }
}

/// Texel filtering used when sampling a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureFilter {
    /// Nearest texel.
    Nearest,
    /// Bilinear interpolation.
    #[default]
    Linear,
    /// Nearest texel in the nearest mipmap level.
    NearestMipmapNearest,
    /// Bilinear interpolation in the nearest mipmap level.
    LinearMipmapNearest,
    /// Nearest texel, interpolated between mipmap levels.
    NearestMipmapLinear,
    /// Trilinear interpolation.
    LinearMipmapLinear,
}

impl TextureFilter {
    /// Returns `true` if sampling with this filter reads mipmap levels, in
    /// which case the mipmaps must be regenerated after rendering.
    pub fn uses_mipmaps(&self) -> bool {
        !matches!(self, TextureFilter::Nearest | TextureFilter::Linear)
    }
}

/// Behaviour when sampling outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    /// Clamp to the edge texel.
    #[default]
    ClampToEdge,
    /// Repeat the texture.
    Repeat,
    /// Repeat the texture, mirrored on every repetition.
    MirroredRepeat,
}

/// A descriptor used to create a 2D texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture2DDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The texture size.
    pub area: Area,
    /// The texel format.
    pub format: TextureFormat,
    /// Minification filter.
    pub min_filter: TextureFilter,
    /// Magnification filter. Only `Nearest` and `Linear` are meaningful.
    pub mag_filter: TextureFilter,
    /// Horizontal wrapping.
    pub wrap_s: TextureWrap,
    /// Vertical wrapping.
    pub wrap_t: TextureWrap,
}

impl<'a> Texture2DDescriptor<'a> {
    /// A clamped, linearly filtered texture of the given size and format.
    pub fn new(label: &'a str, area: Area, format: TextureFormat) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            area,
            format,
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
            wrap_s: TextureWrap::ClampToEdge,
            wrap_t: TextureWrap::ClampToEdge,
        }
    }

    /// Same descriptor with nearest filtering, as used for depth attachments.
    pub fn nearest(mut self) -> Self {
        self.min_filter = TextureFilter::Nearest;
        self.mag_filter = TextureFilter::Nearest;
        self
    }

    /// The size in bytes of the base mipmap level.
    pub fn byte_size(&self) -> u64 {
        self.area.pixel_count() * self.format.bytes_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_buffer_formats_are_four_bytes() {
        for format in [
            TextureFormat::Rgba8,
            TextureFormat::Rg16f,
            TextureFormat::Depth24Stencil8,
        ] {
            assert_eq!(format.bytes_per_pixel(), 4);
        }
    }

    #[test]
    fn descriptor_byte_size() {
        let desc = Texture2DDescriptor::new("t", Area::new(640, 480), TextureFormat::Rg32f);
        assert_eq!(desc.byte_size(), 640 * 480 * 8);
    }

    #[test]
    fn mipmap_filters_are_detected() {
        assert!(!TextureFilter::Linear.uses_mipmaps());
        assert!(TextureFilter::LinearMipmapLinear.uses_mipmaps());
    }
}
