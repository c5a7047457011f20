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

//! The stencil byte layout shared by every pass.
//!
//! ```text
//!   bit  7    6 5 4 3    2 1    0
//!      allow  group      unused light-mask
//! ```
//!
//! The allow bit marks pixels that may be rendered at all. The group bits tag
//! each surface with the stencil group (1 to 15) whose lights may affect it.
//! The light-mask bit is set by light clip volumes.

use crate::renderer::error::StencilError;

/// The number of distinct group values, including the reserved group 0.
pub const MAXIMUM_GROUPS: u8 = 16;

const ALLOW_BIT: u8 = 0b1000_0000;
const LIGHT_MASK_BIT: u8 = 0b0000_0001;
const GROUP_BITS: u8 = 0b0111_1000;
const GROUP_LEFT_SHIFT: u32 = 3;

/// The bit that marks a pixel as renderable.
pub const fn allow_bit() -> u8 {
    ALLOW_BIT
}

/// The bit set inside a light clip volume.
pub const fn light_mask_bit() -> u8 {
    LIGHT_MASK_BIT
}

/// The mask covering the group value.
pub const fn group_bits() -> u8 {
    GROUP_BITS
}

/// The shift that moves a group number into [`group_bits`].
pub const fn group_left_shift() -> u32 {
    GROUP_LEFT_SHIFT
}

/// Returns `true` if `group` is a usable stencil group, that is, in `[1, 15]`.
pub fn is_valid_group(group: i64) -> bool {
    (1..i64::from(MAXIMUM_GROUPS)).contains(&group)
}

/// Validates a stencil group.
///
/// # Errors
///
/// Returns a [`StencilError`] for any value outside `[1, 15]`.
pub fn check_valid_group(group: i64) -> Result<u8, StencilError> {
    if is_valid_group(group) {
        Ok(group as u8)
    } else {
        Err(StencilError { group })
    }
}

/// The stencil bits representing `group`, without the allow bit.
pub fn group_value(group: u8) -> u8 {
    (group << GROUP_LEFT_SHIFT) & GROUP_BITS
}

/// Which stencil values the instances in a stencil scene produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilMode {
    /// The screen starts disallowed and instances allow rendering where they cover.
    InstancesArePositive,
    /// The screen starts allowed and instances forbid rendering where they cover.
    #[default]
    InstancesAreNegative,
}

impl StencilMode {
    /// The value the stencil buffer is cleared to before instances are drawn.
    pub fn clear_value(&self) -> u8 {
        match self {
            StencilMode::InstancesArePositive => 0,
            StencilMode::InstancesAreNegative => ALLOW_BIT,
        }
    }

    /// The value written where instances cover the screen.
    pub fn instance_value(&self) -> u8 {
        match self {
            StencilMode::InstancesArePositive => ALLOW_BIT,
            StencilMode::InstancesAreNegative => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_bit_exact() {
        assert_eq!(allow_bit(), 0x80);
        assert_eq!(light_mask_bit(), 0x01);
        assert_eq!(group_bits(), 0b0111_1000);
        assert_eq!(group_left_shift(), 3);
        assert_eq!(MAXIMUM_GROUPS, 16);
    }

    #[test]
    fn valid_groups_are_exactly_one_to_fifteen() {
        for group in -300i64..300 {
            let expected = (1..=15).contains(&group);
            assert_eq!(is_valid_group(group), expected, "group {group}");
            assert_eq!(check_valid_group(group).is_ok(), expected, "group {group}");
        }
        assert_eq!(check_valid_group(0), Err(StencilError { group: 0 }));
        assert_eq!(check_valid_group(16), Err(StencilError { group: 16 }));
        assert_eq!(check_valid_group(i64::MIN), Err(StencilError { group: i64::MIN }));
    }

    #[test]
    fn group_values_fit_in_group_bits() {
        for group in 1..MAXIMUM_GROUPS {
            let value = group_value(group);
            assert_eq!(value & !group_bits(), 0);
            assert_eq!(value >> group_left_shift(), group);
        }
    }

    #[test]
    fn default_mode_is_negative() {
        assert_eq!(StencilMode::default(), StencilMode::InstancesAreNegative);
        assert_eq!(StencilMode::InstancesAreNegative.clear_value(), allow_bit());
        assert_eq!(StencilMode::InstancesArePositive.instance_value(), allow_bit());
    }
}
