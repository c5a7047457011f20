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

//! Fixed-function pipeline state: blending, culling, depth and stencil.

/// A blend factor applied to the source or destination color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// `0`
    Zero,
    /// `1`
    One,
    /// Source color.
    SrcColor,
    /// `1 - source color`
    OneMinusSrcColor,
    /// Source alpha.
    SrcAlpha,
    /// `1 - source alpha`
    OneMinusSrcAlpha,
    /// Destination color.
    DstColor,
    /// Destination alpha.
    DstAlpha,
}

/// How the weighted source and destination are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendEquation {
    /// `src + dst`
    Add,
    /// `src - dst`
    Subtract,
    /// `dst - src`
    ReverseSubtract,
    /// Component-wise minimum.
    Min,
    /// Component-wise maximum.
    Max,
}

/// A complete blending configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// Source factor for color channels.
    pub src_rgb: BlendFactor,
    /// Destination factor for color channels.
    pub dst_rgb: BlendFactor,
    /// Source factor for the alpha channel.
    pub src_alpha: BlendFactor,
    /// Destination factor for the alpha channel.
    pub dst_alpha: BlendFactor,
    /// Equation for color channels.
    pub equation_rgb: BlendEquation,
    /// Equation for the alpha channel.
    pub equation_alpha: BlendEquation,
}

impl BlendState {
    /// `src + dst`, used to accumulate light contributions.
    pub const ADDITIVE: BlendState = BlendState::uniform(BlendFactor::One, BlendFactor::One);

    /// Blending for colors with premultiplied alpha.
    pub const PREMULTIPLIED: BlendState =
        BlendState::uniform(BlendFactor::One, BlendFactor::OneMinusSrcAlpha);

    /// Classic straight-alpha blending.
    pub const ALPHA: BlendState =
        BlendState::uniform(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);

    /// `src * dst`, used to darken a buffer by a mask such as ambient occlusion.
    pub const MULTIPLY: BlendState = BlendState::uniform(BlendFactor::DstColor, BlendFactor::Zero);

    /// The same factors for color and alpha, combined with `Add`.
    pub const fn uniform(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            src_rgb: src,
            dst_rgb: dst,
            src_alpha: src,
            dst_alpha: dst,
            equation_rgb: BlendEquation::Add,
            equation_alpha: BlendEquation::Add,
        }
    }
}

/// Which faces are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FaceSelection {
    /// Back faces.
    #[default]
    Back,
    /// Front faces.
    Front,
    /// Both.
    FrontAndBack,
}

/// The vertex order that makes a face front-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FaceWinding {
    /// Counter-clockwise.
    #[default]
    CounterClockwise,
    /// Clockwise.
    Clockwise,
}

/// Face culling configuration. The default culls counter-clockwise back faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CullingState {
    /// The culled faces.
    pub faces: FaceSelection,
    /// The front-face winding.
    pub winding: FaceWinding,
}

/// A comparison used by depth and stencil tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// Passes if the incoming value is less.
    Less,
    /// Passes if equal.
    Equal,
    /// Passes if less or equal.
    LessEqual,
    /// Passes if greater.
    Greater,
    /// Passes if not equal.
    NotEqual,
    /// Passes if greater or equal.
    GreaterEqual,
    /// Always passes.
    Always,
}

/// Depth test and write configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    /// The depth test, or `None` to disable testing.
    pub test: Option<CompareFunction>,
    /// Whether passing fragments write their depth.
    pub write: bool,
    /// Whether depth values are clamped instead of clipped.
    pub clamp: bool,
}

impl DepthState {
    /// No depth test, no depth write.
    pub const DISABLED: DepthState = DepthState {
        test: None,
        write: false,
        clamp: false,
    };
}

impl Default for DepthState {
    fn default() -> Self {
        Self::DISABLED
    }
}

/// An action applied to the stencil value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOperation {
    /// Keep the current value.
    Keep,
    /// Set to zero.
    Zero,
    /// Replace with the reference value.
    Replace,
    /// Increment, clamping at the maximum.
    Increment,
    /// Decrement, clamping at zero.
    Decrement,
    /// Bitwise invert.
    Invert,
}

/// Stencil test and update configuration, applied to both faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    /// Whether the stencil test is enabled.
    pub enabled: bool,
    /// The comparison between `reference & test_mask` and `stored & test_mask`.
    pub function: CompareFunction,
    /// The reference value.
    pub reference: u8,
    /// The mask applied to both sides of the comparison.
    pub test_mask: u8,
    /// The bits that operations are allowed to change.
    pub write_mask: u8,
    /// Applied when the stencil test fails.
    pub on_stencil_fail: StencilOperation,
    /// Applied when the stencil test passes but the depth test fails.
    pub on_depth_fail: StencilOperation,
    /// Applied when both tests pass.
    pub on_pass: StencilOperation,
}

impl StencilState {
    /// Stencil testing disabled.
    pub const DISABLED: StencilState = StencilState {
        enabled: false,
        function: CompareFunction::Always,
        reference: 0,
        test_mask: 0xff,
        write_mask: 0,
        on_stencil_fail: StencilOperation::Keep,
        on_depth_fail: StencilOperation::Keep,
        on_pass: StencilOperation::Keep,
    };

    /// Passes where `stored & mask == reference & mask` and never writes.
    pub const fn test_equal(reference: u8, mask: u8) -> Self {
        Self {
            enabled: true,
            function: CompareFunction::Equal,
            reference,
            test_mask: mask,
            write_mask: 0,
            on_stencil_fail: StencilOperation::Keep,
            on_depth_fail: StencilOperation::Keep,
            on_pass: StencilOperation::Keep,
        }
    }
}

impl Default for StencilState {
    fn default() -> Self {
        Self::DISABLED
    }
}

/// The complete fixed-function state activated before a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    /// Blending, or `None` to overwrite.
    pub blending: Option<BlendState>,
    /// Face culling, or `None` to draw both faces.
    pub culling: Option<CullingState>,
    /// Depth configuration.
    pub depth: DepthState,
    /// Stencil configuration.
    pub stencil: StencilState,
    /// Whether color channels are written.
    pub color_write: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            blending: None,
            culling: None,
            depth: DepthState::DISABLED,
            stencil: StencilState::DISABLED,
            color_write: true,
        }
    }
}
