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

//! # Umbra Core
//!
//! Foundational crate containing the GPU device contract, render target
//! management, texture unit allocation, instances and the scene protocols
//! that the pass renderers in `umbra-lanes` drive.

#![warn(missing_docs)]

pub mod id;
pub mod math;
pub mod renderer;
pub mod scene;

#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod mock;

pub use id::IdPool;
pub use renderer::error::RenderError;
pub use renderer::settings::RendererSettings;
