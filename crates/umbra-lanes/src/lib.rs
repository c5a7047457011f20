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
//! Hot-path pass renderers and post-process filters for the Umbra deferred
//! renderer.
//!
//! [`render_lane`] holds the scene passes (stencil, depth, geometry, light,
//! translucent, mask and shadow maps), [`filter_lane`] the full-screen
//! filters, and [`frame`] strings them together into a deferred frame.

#![warn(missing_docs)]

pub mod filter_lane;
pub mod frame;
pub mod render_lane;
mod unit_quad;

pub use frame::{
    DeferredFrame, DeferredRenderer, FilterContext, FrameFilter, FrameShadows, FrameStats,
};
pub use render_lane::RenderLane;
pub use unit_quad::UnitQuad;
