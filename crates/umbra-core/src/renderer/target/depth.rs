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

//! Depth attachment configuration, including depth shared between targets.

use super::TargetBuilder;
use crate::math::Area;
use crate::renderer::api::{DepthStencilAttachment, Texture2DDescriptor, TextureFormat, TextureId};
use crate::renderer::error::ResourceError;
use serde::{Deserialize, Serialize};

/// The precision of a depth-only attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthPrecision {
    /// 16-bit depth.
    Bits16,
    /// 24-bit depth.
    #[default]
    Bits24,
    /// 32-bit float depth.
    Bits32F,
}

impl DepthPrecision {
    /// The texture format with this precision.
    pub fn format(&self) -> TextureFormat {
        match self {
            DepthPrecision::Bits16 => TextureFormat::Depth16,
            DepthPrecision::Bits24 => TextureFormat::Depth24,
            DepthPrecision::Bits32F => TextureFormat::Depth32f,
        }
    }
}

/// A depth texture owned by another target and borrowed by this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedDepth {
    /// The borrowed texture.
    pub texture: TextureId,
    /// Whether the borrowed texture carries stencil bits.
    pub with_stencil: bool,
}

/// How a target obtains its depth attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthAttachment {
    /// Borrow the depth texture of another target. The borrowing target never
    /// deletes it.
    Share(SharedDepth),
    /// Create a depth-only texture of the given precision.
    Create(DepthPrecision),
    /// Create a packed 24-bit depth, 8-bit stencil texture.
    CreateWithStencil,
}

impl DepthAttachment {
    /// Resolves the attachment, creating a texture through `builder` if needed.
    pub(crate) fn attach(
        &self,
        builder: &mut TargetBuilder<'_>,
        label: &str,
        area: Area,
    ) -> Result<DepthStencilAttachment, ResourceError> {
        match self {
            DepthAttachment::Share(shared) if shared.with_stencil => {
                Ok(DepthStencilAttachment::DepthStencil(shared.texture))
            }
            DepthAttachment::Share(shared) => Ok(DepthStencilAttachment::Depth(shared.texture)),
            DepthAttachment::Create(precision) => {
                let texture = builder.texture(
                    &Texture2DDescriptor::new(label, area, precision.format()).nearest(),
                )?;
                Ok(DepthStencilAttachment::Depth(texture))
            }
            DepthAttachment::CreateWithStencil => {
                let texture = builder.texture(
                    &Texture2DDescriptor::new(label, area, TextureFormat::Depth24Stencil8)
                        .nearest(),
                )?;
                Ok(DepthStencilAttachment::DepthStencil(texture))
            }
        }
    }
}
