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

//! Defines the hierarchy of error types for the rendering subsystem.

use crate::renderer::api::program::SourceLocation;
use crate::renderer::shader::ShaderKind;
use std::fmt;

/// An error related to resolving, compiling or feeding a shader program.
#[derive(Debug)]
pub enum ShaderError {
    /// No source is registered under the requested name.
    SourceNotFound {
        /// The requested program name.
        name: String,
    },
    /// The program failed to compile or link.
    CompileError {
        /// The program name.
        name: String,
        /// Where the compiler reported the failure, if it did.
        location: Option<SourceLocation>,
        /// The compiler's diagnostic.
        details: String,
    },
    /// The program has no active uniform with the given name.
    MissingUniform {
        /// The program name.
        program: String,
        /// The uniform name.
        uniform: String,
    },
    /// A draw was attempted before every required value was uploaded.
    ValidationFailed {
        /// The program name.
        program: String,
        /// What is missing.
        reason: String,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::SourceNotFound { name } => {
                write!(f, "No shader source registered for '{name}'")
            }
            ShaderError::CompileError {
                name,
                location: Some(location),
                details,
            } => {
                write!(f, "Shader compilation failed for '{name}' at {location}: {details}")
            }
            ShaderError::CompileError {
                name,
                location: None,
                details,
            } => {
                write!(f, "Shader compilation failed for '{name}': {details}")
            }
            ShaderError::MissingUniform { program, uniform } => {
                write!(f, "Program '{program}' has no uniform named '{uniform}'")
            }
            ShaderError::ValidationFailed { program, reason } => {
                write!(f, "Program '{program}' is not ready to draw: {reason}")
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug)]
pub enum ResourceError {
    /// A shader-specific error occurred.
    Shader(ShaderError),
    /// A generic resource could not be found.
    NotFound,
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
    /// The resource has already been deleted.
    Deleted(&'static str),
    /// Allocating the resource would exceed a pool's hard byte limit.
    PoolExhausted {
        /// Bytes the pool would hold after the allocation.
        requested: u64,
        /// The hard limit in bytes.
        limit: u64,
    },
    /// An attempt was made to access a resource out of its bounds (e.g., in a buffer).
    OutOfBounds,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "Shader resource error: {err}"),
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::Deleted(what) => write!(f, "The {what} has already been deleted."),
            ResourceError::PoolExhausted { requested, limit } => write!(
                f,
                "Pool hard limit exceeded: {requested} bytes requested, limit is {limit} bytes."
            ),
            ResourceError::OutOfBounds => {
                write!(f, "Resource access out of bounds.")
            }
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

/// An error raised by the texture unit allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureUnitError {
    /// The context does not have enough free units left.
    UnitsExhausted {
        /// Units the operation needed.
        requested: u32,
        /// Units still free in the context.
        available: u32,
    },
    /// The context stack is already at its maximum depth.
    ContextLimitReached {
        /// The configured maximum depth.
        max_depth: usize,
    },
}

impl fmt::Display for TextureUnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureUnitError::UnitsExhausted {
                requested,
                available,
            } => write!(
                f,
                "Texture units exhausted: {requested} requested, {available} available"
            ),
            TextureUnitError::ContextLimitReached { max_depth } => {
                write!(f, "Texture unit context limit reached ({max_depth})")
            }
        }
    }
}

impl std::error::Error for TextureUnitError {}

/// An error raised by instances, batches and scene containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    /// Every slot of a batch is in use.
    BatchFull {
        /// The batch capacity.
        capacity: usize,
    },
    /// The instance was already added to the scene.
    InstanceAlreadyVisible {
        /// The instance ID.
        id: u64,
    },
    /// The light was already added to the scene.
    LightAlreadyVisible {
        /// The light ID.
        id: u64,
    },
}

impl fmt::Display for InstanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceError::BatchFull { capacity } => {
                write!(f, "Batch is full (capacity is {capacity})")
            }
            InstanceError::InstanceAlreadyVisible { id } => {
                write!(f, "Instance {id} is already visible")
            }
            InstanceError::LightAlreadyVisible { id } => {
                write!(f, "Light {id} is already visible")
            }
        }
    }
}

impl std::error::Error for InstanceError {}

/// An invalid stencil group number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilError {
    /// The rejected group.
    pub group: i64,
}

impl fmt::Display for StencilError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid stencil group {}: groups must be in the range [1, 15]",
            self.group
        )
    }
}

impl std::error::Error for StencilError {}

/// A rejected filter or renderer parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterError {
    /// A numeric parameter outside its valid range.
    OutOfRange {
        /// The parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// A parameter that is invalid for another reason.
    Invalid {
        /// The parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ParameterError {
    /// Returns `Ok(value)` if `value` lies in `[min, max]`.
    pub fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<f64, Self> {
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(ParameterError::OutOfRange {
                name,
                value,
                min,
                max,
            })
        }
    }
}

impl ParameterError {
    /// Single-precision variant of [`ParameterError::check_range`], compared
    /// in `f32` so that bounds written as `f32` literals are inclusive.
    pub fn check_range_f32(name: &'static str, value: f32, min: f32, max: f32) -> Result<f32, Self> {
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(ParameterError::OutOfRange {
                name,
                value: f64::from(value),
                min: f64::from(min),
                max: f64::from(max),
            })
        }
    }
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterError::OutOfRange {
                name,
                value,
                min,
                max,
            } => write!(
                f,
                "Parameter '{name}' is {value}, expected a value in [{min}, {max}]"
            ),
            ParameterError::Invalid { name, reason } => {
                write!(f, "Parameter '{name}' is invalid: {reason}")
            }
        }
    }
}

impl std::error::Error for ParameterError {}

/// A high-level error that aborts a pass or a frame.
#[derive(Debug)]
pub enum RenderError {
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// Texture unit allocation failed.
    TextureUnitError(TextureUnitError),
    /// An instance or scene container rejected an operation.
    InstanceError(InstanceError),
    /// An invalid stencil group was supplied.
    StencilError(StencilError),
    /// A filter or renderer parameter was rejected.
    ParameterError(ParameterError),
    /// A material was used in a slot meant for a different kind of shader.
    ShaderKindMismatch {
        /// The kind the slot requires.
        expected: ShaderKind,
        /// The material's kind.
        found: ShaderKind,
    },
    /// `shadow_begin` was called while a shadow execution was in progress.
    ShadowExecutionAlreadyActive,
    /// A shadowed light was rendered without its shadow map.
    MissingShadowMap {
        /// The shadow ID.
        shadow: u64,
    },
    /// A critical rendering operation failed.
    RenderingFailed(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::TextureUnitError(err) => write!(f, "Texture unit error: {err}"),
            RenderError::InstanceError(err) => write!(f, "Instance error: {err}"),
            RenderError::StencilError(err) => write!(f, "Stencil error: {err}"),
            RenderError::ParameterError(err) => write!(f, "Parameter error: {err}"),
            RenderError::ShaderKindMismatch { expected, found } => write!(
                f,
                "Material shader kind mismatch: expected {expected:?}, found {found:?}"
            ),
            RenderError::ShadowExecutionAlreadyActive => {
                write!(f, "Shadow execution is already active")
            }
            RenderError::MissingShadowMap { shadow } => {
                write!(f, "No shadow map was rendered for shadow {shadow}")
            }
            RenderError::RenderingFailed(msg) => {
                write!(f, "A critical rendering operation failed: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            RenderError::TextureUnitError(err) => Some(err),
            RenderError::InstanceError(err) => Some(err),
            RenderError::StencilError(err) => Some(err),
            RenderError::ParameterError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

impl From<ShaderError> for RenderError {
    fn from(err: ShaderError) -> Self {
        RenderError::ResourceError(ResourceError::Shader(err))
    }
}

impl From<TextureUnitError> for RenderError {
    fn from(err: TextureUnitError) -> Self {
        RenderError::TextureUnitError(err)
    }
}

impl From<InstanceError> for RenderError {
    fn from(err: InstanceError) -> Self {
        RenderError::InstanceError(err)
    }
}

impl From<StencilError> for RenderError {
    fn from(err: StencilError) -> Self {
        RenderError::StencilError(err)
    }
}

impl From<ParameterError> for RenderError {
    fn from(err: ParameterError) -> Self {
        RenderError::ParameterError(err)
    }
}
