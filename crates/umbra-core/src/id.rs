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

//! Process-unique identifiers for engine objects.

use std::sync::atomic::{AtomicU64, Ordering};

/// Issues strictly increasing 64-bit identifiers, starting at zero.
///
/// This is the one renderer component that is safe to share between threads.
/// Identifiers are never reused. Running out of identifiers is treated as an
/// invariant violation and panics.
#[derive(Debug, Default)]
pub struct IdPool {
    next: AtomicU64,
}

impl IdPool {
    /// Creates a pool whose first identifier is `0`.
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    pub(crate) const fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Returns a fresh identifier.
    ///
    /// # Panics
    ///
    /// Panics if the identifier space is exhausted. `u64::MAX` itself is never
    /// issued.
    pub fn fresh_id(&self) -> u64 {
        match self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_add(1)
            }) {
            Ok(id) => id,
            Err(current) => panic!("IdPool: identifier space exhausted at {current}"),
        }
    }
}
