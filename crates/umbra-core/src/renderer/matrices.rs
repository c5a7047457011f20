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

//! Observer-scoped matrix derivation.
//!
//! [`Matrices::with_observer`] opens an observer scope for one view and
//! projection. Inside it, [`MatricesObserver::with_transform`] derives the
//! per-instance matrices a single instance is drawn with, and
//! [`MatricesObserver::with_projective_light`] derives the matrices a
//! projective light samples its texture and shadow map with.

use crate::math::{Mat3, Mat4, Vec3};
use crate::scene::transform::SharedTransform;
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// A projection from eye space to clip space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// A symmetric perspective projection.
    Perspective {
        /// Vertical field of view in radians.
        fov_y_radians: f32,
        /// Width divided by height.
        aspect: f32,
        /// Distance to the near plane.
        near: f32,
        /// Distance to the far plane.
        far: f32,
    },
    /// An orthographic projection.
    Orthographic {
        /// Left plane.
        left: f32,
        /// Right plane.
        right: f32,
        /// Bottom plane.
        bottom: f32,
        /// Top plane.
        top: f32,
        /// Distance to the near plane.
        near: f32,
        /// Distance to the far plane.
        far: f32,
    },
}

impl Projection {
    /// The projection matrix, using OpenGL clip-space conventions.
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y_radians,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh_gl(fov_y_radians, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        }
    }

    /// Distance to the near plane.
    pub fn near(&self) -> f32 {
        match *self {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    /// Distance to the far plane.
    pub fn far(&self) -> f32 {
        match *self {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }
}

/// The coefficient shaders use to encode logarithmic depth for a projection
/// with the given far plane.
pub fn depth_coefficient(far: f32) -> f32 {
    2.0 / (far + 1.0).log2()
}

/// Opens observer scopes. At most one observer is active at a time.
#[derive(Debug, Default)]
pub struct Matrices {
    observer_active: Cell<bool>,
}

struct ObserverScope<'a>(&'a Cell<bool>);

impl Drop for ObserverScope<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Matrices {
    /// Creates a matrix context with no active observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with an observer at `view` looking through `projection`.
    ///
    /// # Panics
    ///
    /// Panics if called while another observer of this context is active.
    pub fn with_observer<R, E, F>(&self, view: Mat4, projection: &Projection, f: F) -> Result<R, E>
    where
        F: FnOnce(&MatricesObserver) -> Result<R, E>,
    {
        assert!(
            !self.observer_active.replace(true),
            "Matrices: an observer is already active"
        );
        let _scope = ObserverScope(&self.observer_active);
        let observer = MatricesObserver {
            view,
            view_inverse: view.inverse(),
            projection: *projection,
            projection_matrix: projection.matrix(),
        };
        f(&observer)
    }

    /// Returns `true` while an observer is active.
    pub fn observer_active(&self) -> bool {
        self.observer_active.get()
    }
}

/// Matrices of one observer.
#[derive(Debug, Clone, Copy)]
pub struct MatricesObserver {
    view: Mat4,
    view_inverse: Mat4,
    projection: Projection,
    projection_matrix: Mat4,
}

impl MatricesObserver {
    /// World to eye space.
    pub fn view(&self) -> Mat4 {
        self.view
    }

    /// Eye to world space.
    pub fn view_inverse(&self) -> Mat4 {
        self.view_inverse
    }

    /// The observer projection.
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Eye to clip space.
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    /// Logarithmic depth coefficient for this observer's far plane.
    pub fn depth_coefficient(&self) -> f32 {
        depth_coefficient(self.projection.far())
    }

    /// Runs `f` with the matrices of one instance transformed by
    /// `transform`, its texture coordinates transformed by `uv`.
    pub fn with_transform<R, E, F>(&self, transform: &SharedTransform, uv: Mat3, f: F) -> Result<R, E>
    where
        F: FnOnce(&MatricesInstance) -> Result<R, E>,
    {
        f(&self.instance_matrices(transform.matrix(), uv))
    }

    /// Derives instance matrices for a raw model matrix.
    pub fn instance_matrices(&self, model: Mat4, uv: Mat3) -> MatricesInstance {
        let model_view = self.view * model;
        MatricesInstance {
            model,
            model_view,
            normal: normal_matrix(model_view),
            uv,
        }
    }

    /// Runs `f` with the matrices of a projective light placed by
    /// `transform` and projecting through `projection`.
    pub fn with_projective_light<R, E, F>(
        &self,
        transform: &SharedTransform,
        projection: &Projection,
        f: F,
    ) -> Result<R, E>
    where
        F: FnOnce(&MatricesProjectiveLight) -> Result<R, E>,
    {
        let light_model = transform.matrix();
        let light_view = light_model.inverse();
        let light_projection = projection.matrix();
        let instance = self.instance_matrices(light_model, Mat3::IDENTITY);
        f(&MatricesProjectiveLight {
            instance,
            light_view,
            light_projection,
            eye_to_light_eye: light_view * self.view_inverse,
            light_position_eye: self.view.transform_point3(light_model.transform_point3(Vec3::ZERO)),
            depth_coefficient: depth_coefficient(projection.far()),
        })
    }
}

/// The inverse transpose of the upper 3x3 of `model_view`.
pub fn normal_matrix(model_view: Mat4) -> Mat3 {
    Mat3::from_mat4(model_view).inverse().transpose()
}

/// Matrices of one single instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatricesInstance {
    model: Mat4,
    model_view: Mat4,
    normal: Mat3,
    uv: Mat3,
}

impl MatricesInstance {
    /// Object to world space.
    pub fn model(&self) -> Mat4 {
        self.model
    }

    /// Object to eye space.
    pub fn model_view(&self) -> Mat4 {
        self.model_view
    }

    /// Transforms object-space normals to eye space.
    pub fn normal(&self) -> Mat3 {
        self.normal
    }

    /// Texture coordinate transform.
    pub fn uv(&self) -> Mat3 {
        self.uv
    }
}

/// Matrices of one projective light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatricesProjectiveLight {
    instance: MatricesInstance,
    light_view: Mat4,
    light_projection: Mat4,
    eye_to_light_eye: Mat4,
    light_position_eye: Vec3,
    depth_coefficient: f32,
}

impl MatricesProjectiveLight {
    /// Matrices of the light's volume as an instance.
    pub fn instance(&self) -> &MatricesInstance {
        &self.instance
    }

    /// World to light-eye space.
    pub fn light_view(&self) -> Mat4 {
        self.light_view
    }

    /// Light-eye to light-clip space.
    pub fn light_projection(&self) -> Mat4 {
        self.light_projection
    }

    /// Observer-eye to light-eye space.
    pub fn eye_to_light_eye(&self) -> Mat4 {
        self.eye_to_light_eye
    }

    /// The light origin in observer-eye space.
    pub fn light_position_eye(&self) -> Vec3 {
        self.light_position_eye
    }

    /// Logarithmic depth coefficient of the light projection.
    pub fn depth_coefficient(&self) -> f32 {
        self.depth_coefficient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::transform::Transform;
    use approx::assert_relative_eq;

    fn perspective() -> Projection {
        Projection::Perspective {
            fov_y_radians: std::f32::consts::FRAC_PI_2,
            aspect: 1.0,
            near: 1.0,
            far: 100.0,
        }
    }

    #[test]
    fn instance_matrices_are_derived_from_the_view() {
        let matrices = Matrices::new();
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let transform = SharedTransform::new(Transform::ScaleTranslation {
            scale: 2.0,
            translation: Vec3::new(1.0, 0.0, 0.0),
        });

        matrices
            .with_observer(view, &perspective(), |observer| {
                observer.with_transform(&transform, Mat3::IDENTITY, |instance| {
                    let origin = instance.model_view().transform_point3(Vec3::ZERO);
                    assert_relative_eq!(origin.x, 1.0);
                    assert_relative_eq!(origin.z, -5.0);
                    let n = instance.normal() * Vec3::X;
                    assert_relative_eq!(n.x, 0.5);
                    Ok::<(), ()>(())
                })
            })
            .unwrap();
        assert!(!matrices.observer_active());
    }

    #[test]
    fn observer_scope_ends_on_error() {
        let matrices = Matrices::new();
        let result: Result<(), &str> =
            matrices.with_observer(Mat4::IDENTITY, &perspective(), |_| Err("aborted"));
        assert!(result.is_err());
        assert!(!matrices.observer_active());
    }

    #[test]
    #[should_panic(expected = "already active")]
    fn nested_observers_panic() {
        let matrices = Matrices::new();
        let _ = matrices.with_observer(Mat4::IDENTITY, &perspective(), |_| {
            matrices.with_observer(Mat4::IDENTITY, &perspective(), |_| Ok::<(), ()>(()))
        });
    }

    #[test]
    fn projections_report_their_planes() {
        let ortho = Projection::Orthographic {
            left: -1.0,
            right: 1.0,
            bottom: -1.0,
            top: 1.0,
            near: 0.5,
            far: 10.0,
        };
        assert_relative_eq!(ortho.near(), 0.5);
        assert_relative_eq!(perspective().far(), 100.0);
        assert_relative_eq!(depth_coefficient(1.0), 2.0);
    }
}
