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

//! Instance transforms.
//!
//! A [`SharedTransform`] is shared by identity: an instance and the batch it
//! belongs to hold the same transform, and every mutation bumps a generation
//! counter that batches compare against to know they must re-upload.

use crate::math::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// An object-to-world transform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Transform {
    /// No transformation.
    #[default]
    Identity,
    /// A rotation followed by a translation.
    OrientationTranslation {
        /// Rotation.
        orientation: Quat,
        /// Translation.
        translation: Vec3,
    },
    /// A uniform scale followed by a translation.
    ScaleTranslation {
        /// Uniform scale factor.
        scale: f32,
        /// Translation.
        translation: Vec3,
    },
    /// A per-axis scale, then a rotation, then a translation.
    ScaleOrientationTranslation {
        /// Per-axis scale.
        scale: Vec3,
        /// Rotation.
        orientation: Quat,
        /// Translation.
        translation: Vec3,
    },
    /// An arbitrary matrix.
    Matrix(Mat4),
}

impl Transform {
    /// The model matrix.
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Transform::Identity => Mat4::IDENTITY,
            Transform::OrientationTranslation {
                orientation,
                translation,
            } => Mat4::from_rotation_translation(orientation, translation),
            Transform::ScaleTranslation { scale, translation } => {
                Mat4::from_scale_rotation_translation(Vec3::splat(scale), Quat::IDENTITY, translation)
            }
            Transform::ScaleOrientationTranslation {
                scale,
                orientation,
                translation,
            } => Mat4::from_scale_rotation_translation(scale, orientation, translation),
            Transform::Matrix(m) => m,
        }
    }

    /// The translation component.
    pub fn translation(&self) -> Vec3 {
        self.matrix().w_axis.truncate()
    }
}

struct TransformCell {
    value: RwLock<Transform>,
    generation: AtomicU64,
}

/// A transform shared by identity between instances and batches.
#[derive(Clone)]
pub struct SharedTransform {
    cell: Arc<TransformCell>,
}

impl fmt::Debug for SharedTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTransform")
            .field("value", &self.get())
            .field("generation", &self.generation())
            .finish()
    }
}

impl Default for SharedTransform {
    fn default() -> Self {
        Self::new(Transform::Identity)
    }
}

impl SharedTransform {
    /// Wraps `transform`.
    pub fn new(transform: Transform) -> Self {
        Self {
            cell: Arc::new(TransformCell {
                value: RwLock::new(transform),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// A copy of the current transform.
    pub fn get(&self) -> Transform {
        *self.cell.value.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current model matrix.
    pub fn matrix(&self) -> Mat4 {
        self.get().matrix()
    }

    /// Replaces the transform.
    pub fn set(&self, transform: Transform) {
        self.modify(|t| *t = transform);
    }

    /// Mutates the transform in place.
    pub fn modify<F: FnOnce(&mut Transform)>(&self, f: F) {
        let mut value = self.cell.value.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut value);
        self.cell.generation.fetch_add(1, Ordering::Release);
    }

    /// Incremented on every mutation.
    pub fn generation(&self) -> u64 {
        self.cell.generation.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles share the same transform.
    pub fn ptr_eq(&self, other: &SharedTransform) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mutations_are_visible_through_every_handle() {
        let a = SharedTransform::default();
        let b = a.clone();
        assert_eq!(a.generation(), 0);

        b.set(Transform::ScaleTranslation {
            scale: 1.0,
            translation: Vec3::new(0.0, 3.0, 0.0),
        });
        assert_eq!(a.generation(), 1);
        assert_relative_eq!(a.get().translation().y, 3.0);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&SharedTransform::default()));
    }

    #[test]
    fn scale_orientation_translation_applies_scale_first() {
        let t = Transform::ScaleOrientationTranslation {
            scale: Vec3::new(2.0, 1.0, 1.0),
            orientation: Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            translation: Vec3::new(0.0, 0.0, 1.0),
        };
        let p = t.matrix().transform_point3(Vec3::X);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 1.0, epsilon = 1e-6);
    }
}
