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

//! Drawable instances.
//!
//! - [`InstanceSingle`]: one mesh with its own transform.
//! - [`InstanceBatchedDynamic`]: up to N copies of a mesh drawn in one call,
//!   each slot bound to a shared transform.
//! - [`InstanceBillboardedDynamic`]: camera-facing points drawn in one call.

mod batched;
mod billboarded;
mod single;

pub use self::batched::*;
pub use self::billboarded::*;
pub use self::single::*;
