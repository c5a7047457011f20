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
//! Rendering lanes: the pass renderers of the deferred pipeline.
//!
//! Each lane drives one scene protocol from `umbra-core` against a render
//! target, switching shaders, materials and instances in the order the
//! protocol dictates. Lanes own whatever internal programs they need and are
//! deleted exactly once through [`RenderLane::delete`].

mod depth_lane;
mod depth_variance_lane;
mod draw;
mod geometry_lane;
mod light_lane;
mod mask_lane;
mod program;
pub mod shaders;
mod shadow_map_lane;
mod stencil_lane;
mod translucent_lane;

pub use depth_lane::*;
pub use depth_variance_lane::*;
pub use geometry_lane::*;
pub use light_lane::*;
pub use mask_lane::*;
pub use program::*;
pub use shadow_map_lane::*;
pub use stencil_lane::*;
pub use translucent_lane::*;

use umbra_core::renderer::error::{RenderError, ResourceError};
use umbra_core::renderer::traits::GraphicsDevice;

/// A trait shared by every pass renderer and filter.
///
/// Lanes hold GPU resources (compiled programs, meshes) created by their
/// constructor. Once deleted, a lane refuses to render.
pub trait RenderLane {
    /// Returns a human-readable identifier for this rendering strategy.
    ///
    /// # Returns
    ///
    /// A static string identifying the lane (e.g., "Stencil", "BoxBlur").
    fn strategy_name(&self) -> &'static str;

    /// Deletes every GPU resource the lane owns.
    ///
    /// Deleting a deleted lane does nothing and succeeds.
    fn delete(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError>;

    /// Returns `true` once [`RenderLane::delete`] has been called.
    fn is_deleted(&self) -> bool;
}

/// Fails with [`ResourceError::Deleted`] if `lane` was deleted.
pub(crate) fn check_live(lane: &dyn RenderLane) -> Result<(), RenderError> {
    if lane.is_deleted() {
        return Err(ResourceError::Deleted(lane.strategy_name()).into());
    }
    Ok(())
}
