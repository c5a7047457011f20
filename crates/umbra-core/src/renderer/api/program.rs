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

//! Shader program handles, sources and uniform values.

use super::texture::TextureUnit;
use crate::math::{Mat3, Mat4, Vec2, Vec3, Vec4};
use std::fmt;

/// An opaque handle to a linked GPU shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub usize);

/// A programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Geometry stage.
    Geometry,
    /// Fragment stage.
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Geometry => write!(f, "geometry"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// The place in a program's sources a compiler diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// The failing stage.
    pub stage: ShaderStage,
    /// One-based line number.
    pub line: u32,
    /// One-based column, when the compiler reports one.
    pub column: Option<u32>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}:{}", self.stage, self.line, column),
            None => write!(f, "{}:{}", self.stage, self.line),
        }
    }
}

/// The fully resolved sources of a shader program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    /// The program name, used in diagnostics.
    pub name: String,
    /// Vertex stage source.
    pub vertex: String,
    /// Optional geometry stage source.
    pub geometry: Option<String>,
    /// Fragment stage source.
    pub fragment: String,
}

/// A value uploaded to a named program uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// A signed integer.
    Int(i32),
    /// A float.
    Float(f32),
    /// A 2-component vector.
    Vec2(Vec2),
    /// A 3-component vector.
    Vec3(Vec3),
    /// A 4-component vector.
    Vec4(Vec4),
    /// A 3x3 matrix.
    Mat3(Mat3),
    /// A 4x4 matrix.
    Mat4(Mat4),
    /// A sampler reading from the given texture unit.
    Texture(TextureUnit),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_location_display() {
        let with_column = SourceLocation {
            stage: ShaderStage::Fragment,
            line: 12,
            column: Some(4),
        };
        assert_eq!(with_column.to_string(), "fragment:12:4");

        let without_column = SourceLocation {
            stage: ShaderStage::Vertex,
            line: 3,
            column: None,
        };
        assert_eq!(without_column.to_string(), "vertex:3");
    }
}
