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

//! Vertex data handles: array buffers, array objects and draw primitives.

use std::borrow::Cow;

/// An opaque handle to a GPU array buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayBufferId(pub usize);

/// An opaque handle to a GPU array object, that is, a complete vertex input
/// configuration ready to be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayObjectId(pub usize);

/// A hint describing how often a buffer's contents change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Uploaded once.
    StaticDraw,
    /// Updated every few frames.
    DynamicDraw,
    /// Updated every frame.
    StreamDraw,
}

/// The primitive assembled from vertices by a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// One point per vertex.
    Points,
    /// Line segments.
    Lines,
    /// Triangles.
    Triangles,
}

/// The per-instance attribute layout read from an instance buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceAttributes {
    /// One column-major 4x4 model matrix per instance.
    ModelMatrix,
    /// Position (xyz), scale and rotation per instance, read per vertex.
    Billboard,
}

impl InstanceAttributes {
    /// The stride, in bytes, of one instance's data.
    pub fn stride(&self) -> u64 {
        match self {
            InstanceAttributes::ModelMatrix => 16 * 4,
            InstanceAttributes::Billboard => 5 * 4,
        }
    }
}

/// Where an array object's vertex data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayObjectSource<'a> {
    /// Interleaved vertex data and triangle indices.
    Mesh {
        /// Interleaved vertex bytes.
        vertices: &'a [u8],
        /// The vertex stride in bytes.
        stride: u64,
        /// Triangle indices.
        indices: &'a [u32],
    },
    /// The attributes of an existing array object, plus per-instance data
    /// read from `instance_buffer`.
    Instanced {
        /// The mesh array object whose attributes are reused.
        base: ArrayObjectId,
        /// The buffer holding per-instance data.
        instance_buffer: ArrayBufferId,
        /// The layout of each instance's data.
        attributes: InstanceAttributes,
    },
    /// Vertex data read directly from a buffer without indices.
    Points {
        /// The buffer holding one vertex per point.
        buffer: ArrayBufferId,
        /// The layout of each point.
        attributes: InstanceAttributes,
    },
}

/// A descriptor used to create an array object.
#[derive(Debug, Clone)]
pub struct ArrayObjectDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The vertex data source.
    pub source: ArrayObjectSource<'a>,
}
