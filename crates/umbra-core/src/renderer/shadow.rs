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

//! Shadows and the per-frame shadow map context.

use crate::id::IdPool;
use crate::renderer::error::{ParameterError, RenderError};
use crate::renderer::filter::BlurParameters;
use crate::renderer::target::{DepthVarianceBuffer, DepthVarianceBufferDescription, RenderTargetPool};
use ahash::AHashMap;
use std::fmt;
use std::rc::Rc;

/// The default lower bound of the light contribution in shadow.
pub const DEFAULT_MINIMUM_FACTOR: f32 = 0.2;

/// The default light bleed reduction.
pub const DEFAULT_LIGHT_BLEED_REDUCTION: f32 = 0.2;

/// A variance shadow.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowDepthVariance {
    id: u64,
    /// The minimum light contribution in shadow, in `[0, 1]`.
    pub minimum_factor: f32,
    /// Amount cut from the variance upper bound to hide light bleeding, in
    /// `[0, 1)`.
    pub light_bleed_reduction: f32,
    /// The shadow map to render into.
    pub map_description: DepthVarianceBufferDescription,
    /// Optional blur applied to the rendered map.
    pub blur: Option<BlurParameters>,
}

impl ShadowDepthVariance {
    /// Creates a shadow rendered into maps described by `map_description`.
    pub fn new(ids: &IdPool, map_description: DepthVarianceBufferDescription) -> Self {
        Self {
            id: ids.fresh_id(),
            minimum_factor: DEFAULT_MINIMUM_FACTOR,
            light_bleed_reduction: DEFAULT_LIGHT_BLEED_REDUCTION,
            map_description,
            blur: None,
        }
    }

    /// The shadow ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Checks every parameter against its valid range.
    pub fn validate(&self) -> Result<(), ParameterError> {
        ParameterError::check_range_f32("minimum_factor", self.minimum_factor, 0.0, 1.0)?;
        if self.light_bleed_reduction.is_nan()
            || !(0.0..1.0).contains(&self.light_bleed_reduction)
        {
            return Err(ParameterError::Invalid {
                name: "light_bleed_reduction",
                reason: format!("{} is not in [0, 1)", self.light_bleed_reduction),
            });
        }
        if let Some(blur) = &self.blur {
            blur.validate()?;
        }
        Ok(())
    }
}

/// A shadow cast by a light.
#[derive(Debug, Clone, PartialEq)]
pub enum Shadow {
    /// Variance shadow mapping.
    Variance(ShadowDepthVariance),
}

impl Shadow {
    /// The shadow ID.
    pub fn id(&self) -> u64 {
        match self {
            Shadow::Variance(s) => s.id(),
        }
    }

    /// The description of the map this shadow renders into.
    pub fn map_description(&self) -> &DepthVarianceBufferDescription {
        match self {
            Shadow::Variance(s) => &s.map_description,
        }
    }
}

/// The shadow maps rendered for one frame, keyed by shadow ID.
///
/// Every map is returned to its pool when the context is dropped.
pub struct ShadowMapContext<'p> {
    pool: &'p RenderTargetPool<DepthVarianceBuffer>,
    maps: AHashMap<u64, Rc<DepthVarianceBuffer>>,
}

impl fmt::Debug for ShadowMapContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowMapContext")
            .field("maps", &self.maps.len())
            .finish()
    }
}

impl<'p> ShadowMapContext<'p> {
    /// An empty context whose maps come from `pool`.
    pub fn new(pool: &'p RenderTargetPool<DepthVarianceBuffer>) -> Self {
        Self {
            pool,
            maps: AHashMap::new(),
        }
    }

    /// Records the map rendered for `shadow`. A map previously recorded for
    /// the same shadow is returned to the pool.
    pub fn insert(&mut self, shadow: u64, map: Rc<DepthVarianceBuffer>) {
        if let Some(previous) = self.maps.insert(shadow, map) {
            self.pool.release(previous);
        }
    }

    /// The map rendered for `shadow`.
    pub fn shadow_map(&self, shadow: u64) -> Option<&DepthVarianceBuffer> {
        self.maps.get(&shadow).map(Rc::as_ref)
    }

    /// The map rendered for `shadow`, or [`RenderError::MissingShadowMap`].
    pub fn require(&self, shadow: u64) -> Result<&DepthVarianceBuffer, RenderError> {
        self.shadow_map(shadow)
            .ok_or(RenderError::MissingShadowMap { shadow })
    }

    /// The number of maps held.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Returns `true` if no map is held.
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Returns every map to the pool.
    pub fn release(self) {}
}

impl Drop for ShadowMapContext<'_> {
    fn drop(&mut self) {
        for (_, map) in self.maps.drain() {
            self.pool.release(map);
        }
    }
}
