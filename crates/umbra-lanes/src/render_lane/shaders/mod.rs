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
//! Built-in GLSL sources for the Umbra lanes.
//!
//! Sources are embedded at compile time and carry no `#version` line:
//! [`program`] prepends the version and any `#define`s a variant needs, so
//! one file serves several programs (FXAA presets, fog progressions, light
//! models).
//!
//! The `*_VERT` and `*_FRAG` constants are the raw stages. [`stock_source`]
//! pairs them into a usable program for every [`ShaderKind`], which is what
//! the sandbox and the tests draw their materials and lights with.

use umbra_core::renderer::api::ProgramSource;
use umbra_core::renderer::shader::ShaderKind;

/// The GLSL version every program is compiled as.
pub const GLSL_VERSION: &str = "#version 330 core";

/// Single instances with per-instance matrix uniforms.
pub const SINGLE_VERT: &str = include_str!("single.vert");

/// Batched instances with a per-instance model matrix attribute.
pub const BATCHED_VERT: &str = include_str!("batched.vert");

/// Billboards drawn as points.
pub const BILLBOARD_VERT: &str = include_str!("billboard.vert");

/// The unit quad covering the viewport.
pub const FULLSCREEN_VERT: &str = include_str!("fullscreen.vert");

/// The unit quad placed into a normalized rectangle.
pub const COMPOSITE_VERT: &str = include_str!("composite.vert");

/// Full-screen lights.
pub const LIGHT_FULLSCREEN_VERT: &str = include_str!("light_fullscreen.vert");

/// Stencil-only output.
pub const STENCIL_FRAG: &str = include_str!("stencil.frag");

/// Full mask coverage.
pub const MASK_FRAG: &str = include_str!("mask.frag");

/// Flat surfaces into the geometry buffer.
pub const GEOMETRY_FRAG: &str = include_str!("geometry.frag");

/// Depth and depth-variance moments.
pub const DEPTH_FRAG: &str = include_str!("depth.frag");

/// Flat premultiplied translucent color.
pub const TRANSLUCENT_FRAG: &str = include_str!("translucent.frag");

/// Deferred light accumulation, one model per `LIGHT_*` define.
pub const LIGHT_FRAG: &str = include_str!("light.frag");

/// Horizontal box blur pass.
pub const BOX_BLUR_HORIZONTAL_FRAG: &str = include_str!("box_blur_horizontal.frag");

/// Vertical box blur pass.
pub const BOX_BLUR_VERTICAL_FRAG: &str = include_str!("box_blur_vertical.frag");

/// FXAA, one program per `FXAA_QUALITY_PRESET`.
pub const FXAA_FRAG: &str = include_str!("fxaa.frag");

/// Depth fog, one program per `FOG_*` progression.
pub const FOG_FRAG: &str = include_str!("fog.frag");

/// Emission extracted from the geometry buffer.
pub const EMISSION_FRAG: &str = include_str!("emission.frag");

/// A texture scaled by an intensity.
pub const TEXTURE_INTENSITY_FRAG: &str = include_str!("texture_intensity.frag");

/// Ambient occlusion applied to the light buffer.
pub const OCCLUSION_FRAG: &str = include_str!("occlusion.frag");

/// Geometry and light buffers combined into a lit image.
pub const LIGHT_APPLICATOR_FRAG: &str = include_str!("light_applicator.frag");

/// Assembles a program from a vertex and a fragment stage.
///
/// ## Arguments
///
/// * `name`: The program name reported in compile errors.
/// * `vertex`, `fragment`: Stage bodies without a `#version` line.
/// * `defines`: `(name, value)` pairs emitted as `#define`s into both stages.
pub fn program(name: &str, vertex: &str, fragment: &str, defines: &[(&str, &str)]) -> ProgramSource {
    let mut header = String::from(GLSL_VERSION);
    header.push('\n');
    for (define, value) in defines {
        header.push_str("#define ");
        header.push_str(define);
        if !value.is_empty() {
            header.push(' ');
            header.push_str(value);
        }
        header.push('\n');
    }
    ProgramSource {
        name: name.to_string(),
        vertex: format!("{header}{vertex}"),
        geometry: None,
        fragment: format!("{header}{fragment}"),
    }
}

/// A ready-made program for materials or lights of `kind`.
pub fn stock_source(kind: ShaderKind) -> ProgramSource {
    match kind {
        ShaderKind::SingleGeometry => program("stock-geometry-single", SINGLE_VERT, GEOMETRY_FRAG, &[]),
        ShaderKind::BatchedGeometry => {
            program("stock-geometry-batched", BATCHED_VERT, GEOMETRY_FRAG, &[])
        }
        ShaderKind::SingleDepth => program("stock-depth-single", SINGLE_VERT, DEPTH_FRAG, &[]),
        ShaderKind::BatchedDepth => program("stock-depth-batched", BATCHED_VERT, DEPTH_FRAG, &[]),
        ShaderKind::SingleTranslucent => {
            program("stock-translucent-single", SINGLE_VERT, TRANSLUCENT_FRAG, &[])
        }
        ShaderKind::BatchedTranslucent => {
            program("stock-translucent-batched", BATCHED_VERT, TRANSLUCENT_FRAG, &[])
        }
        ShaderKind::BillboardedTranslucent => program(
            "stock-translucent-billboarded",
            BILLBOARD_VERT,
            TRANSLUCENT_FRAG,
            &[],
        ),
        ShaderKind::AmbientLight => program(
            "stock-light-ambient",
            LIGHT_FULLSCREEN_VERT,
            LIGHT_FRAG,
            &[("LIGHT_AMBIENT", "")],
        ),
        ShaderKind::DirectionalLight => program(
            "stock-light-directional",
            LIGHT_FULLSCREEN_VERT,
            LIGHT_FRAG,
            &[("LIGHT_DIRECTIONAL", "")],
        ),
        ShaderKind::SphericalLight => program(
            "stock-light-spherical",
            SINGLE_VERT,
            LIGHT_FRAG,
            &[("LIGHT_SPHERICAL", "")],
        ),
        ShaderKind::ProjectiveLight => program(
            "stock-light-projective",
            SINGLE_VERT,
            LIGHT_FRAG,
            &[("LIGHT_PROJECTIVE", "")],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [ShaderKind; 11] = [
        ShaderKind::SingleGeometry,
        ShaderKind::BatchedGeometry,
        ShaderKind::SingleDepth,
        ShaderKind::BatchedDepth,
        ShaderKind::SingleTranslucent,
        ShaderKind::BatchedTranslucent,
        ShaderKind::BillboardedTranslucent,
        ShaderKind::AmbientLight,
        ShaderKind::DirectionalLight,
        ShaderKind::SphericalLight,
        ShaderKind::ProjectiveLight,
    ];

    #[test]
    fn test_stages_have_entry_points() {
        for source in [
            SINGLE_VERT,
            BATCHED_VERT,
            BILLBOARD_VERT,
            FULLSCREEN_VERT,
            COMPOSITE_VERT,
            LIGHT_FULLSCREEN_VERT,
            STENCIL_FRAG,
            MASK_FRAG,
            GEOMETRY_FRAG,
            DEPTH_FRAG,
            TRANSLUCENT_FRAG,
            LIGHT_FRAG,
            BOX_BLUR_HORIZONTAL_FRAG,
            BOX_BLUR_VERTICAL_FRAG,
            FXAA_FRAG,
            FOG_FRAG,
            EMISSION_FRAG,
            TEXTURE_INTENSITY_FRAG,
            OCCLUSION_FRAG,
            LIGHT_APPLICATOR_FRAG,
        ] {
            assert!(source.contains("void main()"));
            assert!(!source.contains("#version"));
        }
    }

    #[test]
    fn test_program_prepends_version_and_defines() {
        let source = program("fxaa", FULLSCREEN_VERT, FXAA_FRAG, &[("FXAA_QUALITY_PRESET", "25")]);
        assert!(source.fragment.starts_with("#version 330 core\n#define FXAA_QUALITY_PRESET 25\n"));
        assert!(source.vertex.starts_with(GLSL_VERSION));
        assert_eq!(source.name, "fxaa");
    }

    #[test]
    fn test_instance_stages_declare_the_standard_uniforms() {
        for uniform in [
            "transform_projection",
            "transform_view",
            "transform_view_inverse",
            "depth_coefficient",
        ] {
            assert!(SINGLE_VERT.contains(uniform));
            assert!(BATCHED_VERT.contains(uniform));
        }
        for uniform in ["transform_modelview", "transform_normal", "transform_uv"] {
            assert!(SINGLE_VERT.contains(uniform));
            assert!(!BATCHED_VERT.contains(uniform));
        }
    }

    #[test]
    fn test_every_kind_has_a_stock_program() {
        for kind in ALL_KINDS {
            let source = stock_source(kind);
            assert!(source.name.starts_with("stock-"), "{kind:?}");
            assert!(source.fragment.contains("void main()"));
        }
        assert!(stock_source(ShaderKind::ProjectiveLight)
            .fragment
            .contains("#define LIGHT_PROJECTIVE\n"));
    }
}
