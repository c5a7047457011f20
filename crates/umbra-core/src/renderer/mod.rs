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

//! Renderer contracts: GPU device abstraction, render targets, texture unit
//! allocation, shaders, materials, lights and observer matrices.

pub mod api;
pub mod error;
pub mod filter;
pub mod light;
pub mod material;
pub mod matrices;
pub mod mesh;
pub mod settings;
pub mod shader;
pub mod shadow;
pub mod stencil;
pub mod target;
pub mod texture_unit;
pub mod traits;

pub use self::api::*;
pub use self::error::*;
pub use self::traits::*;
