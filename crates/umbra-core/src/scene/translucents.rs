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

//! Translucent instances, rendered in insertion order.

use super::instance::{InstanceBatchedDynamic, InstanceBillboardedDynamic, InstanceSingle};
use crate::renderer::api::{BlendState, CullingState};
use crate::renderer::error::RenderError;
use crate::renderer::material::{check_kind, MaterialBinding};
use crate::renderer::shader::ShaderKind;
use std::rc::Rc;

/// How a translucent is blended and culled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TranslucentState {
    /// Blending, or `None` to overwrite the destination.
    pub blending: Option<BlendState>,
    /// Face culling, or `None` to draw both faces.
    pub culling: Option<CullingState>,
}

/// A translucent drawable.
#[derive(Debug, Clone)]
pub enum Translucent {
    /// One single instance.
    Single {
        /// The instance.
        instance: InstanceSingle,
        /// A [`ShaderKind::SingleTranslucent`] material.
        material: Rc<dyn MaterialBinding>,
        /// Blending and culling.
        state: TranslucentState,
    },
    /// One batch.
    Batched {
        /// The batch.
        batch: Rc<InstanceBatchedDynamic>,
        /// A [`ShaderKind::BatchedTranslucent`] material.
        material: Rc<dyn MaterialBinding>,
        /// Blending and culling.
        state: TranslucentState,
    },
    /// A set of billboards.
    Billboarded {
        /// The billboards.
        billboards: Rc<InstanceBillboardedDynamic>,
        /// A [`ShaderKind::BillboardedTranslucent`] material.
        material: Rc<dyn MaterialBinding>,
        /// Blending and culling.
        state: TranslucentState,
    },
}

impl Translucent {
    /// The material.
    pub fn material(&self) -> &dyn MaterialBinding {
        match self {
            Translucent::Single { material, .. }
            | Translucent::Batched { material, .. }
            | Translucent::Billboarded { material, .. } => material.as_ref(),
        }
    }

    /// Blending and culling.
    pub fn state(&self) -> TranslucentState {
        match self {
            Translucent::Single { state, .. }
            | Translucent::Batched { state, .. }
            | Translucent::Billboarded { state, .. } => *state,
        }
    }

    /// The shader kind the material must have.
    pub fn required_kind(&self) -> ShaderKind {
        match self {
            Translucent::Single { .. } => ShaderKind::SingleTranslucent,
            Translucent::Batched { .. } => ShaderKind::BatchedTranslucent,
            Translucent::Billboarded { .. } => ShaderKind::BillboardedTranslucent,
        }
    }
}

/// The translucents of a frame.
#[derive(Debug, Default)]
pub struct Translucents {
    items: Vec<Translucent>,
}

impl Translucents {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `translucent`, checking its material kind.
    pub fn add(&mut self, translucent: Translucent) -> Result<(), RenderError> {
        check_kind(translucent.material(), translucent.required_kind())?;
        self.items.push(translucent);
        Ok(())
    }

    /// The translucents in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Translucent> {
        self.items.iter()
    }

    /// The number of translucents.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes everything.
    pub fn reset(&mut self) {
        self.items.clear();
    }
}

impl<'a> IntoIterator for &'a Translucents {
    type Item = &'a Translucent;
    type IntoIter = std::slice::Iter<'a, Translucent>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdPool;
    use crate::mock::MockGraphicsDevice;
    use crate::scene::fixtures;

    #[test]
    fn insertion_order_is_kept_and_kinds_checked() {
        let device = MockGraphicsDevice::new();
        let ids = IdPool::new();
        let single = fixtures::shader(&device, &ids, ShaderKind::SingleTranslucent);
        let batched = fixtures::shader(&device, &ids, ShaderKind::BatchedTranslucent);
        let single_material = fixtures::material(&ids, &single);
        let batched_material = fixtures::material(&ids, &batched);

        let mut translucents = Translucents::new();
        translucents
            .add(Translucent::Batched {
                batch: fixtures::batch(&device, &ids),
                material: batched_material,
                state: TranslucentState {
                    blending: Some(BlendState::ADDITIVE),
                    culling: None,
                },
            })
            .unwrap();
        translucents
            .add(Translucent::Single {
                instance: fixtures::single(&ids, 1),
                material: single_material.clone(),
                state: TranslucentState::default(),
            })
            .unwrap();
        assert!(matches!(
            translucents.add(Translucent::Batched {
                batch: fixtures::batch(&device, &ids),
                material: single_material,
                state: TranslucentState::default(),
            }),
            Err(RenderError::ShaderKindMismatch { .. })
        ));

        let kinds: Vec<ShaderKind> = translucents.iter().map(Translucent::required_kind).collect();
        assert_eq!(kinds, vec![ShaderKind::BatchedTranslucent, ShaderKind::SingleTranslucent]);
    }
}
