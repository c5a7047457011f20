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

//! A pool recycling render targets by structural description.

use super::RenderTarget;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use ahash::AHashMap;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Constructs new targets on a pool miss.
pub trait RenderTargetFactory<T: RenderTarget> {
    /// Creates a target matching `description`.
    fn create(
        &mut self,
        device: &dyn GraphicsDevice,
        description: &T::Description,
    ) -> Result<T, ResourceError>;
}

impl<T, F> RenderTargetFactory<T> for F
where
    T: RenderTarget,
    F: FnMut(&dyn GraphicsDevice, &T::Description) -> Result<T, ResourceError>,
{
    fn create(
        &mut self,
        device: &dyn GraphicsDevice,
        description: &T::Description,
    ) -> Result<T, ResourceError> {
        self(device, description)
    }
}

/// Byte limits applied to a pool.
///
/// The hard limit is enforced when a new target would be constructed. The
/// soft limit is only honoured by [`RenderTargetPool::evict_to_soft_limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Size the pool shrinks to when asked to.
    pub soft_bytes: u64,
    /// Size the pool never grows past.
    pub hard_bytes: u64,
}

impl PoolLimits {
    /// No limits at all.
    pub const UNLIMITED: PoolLimits = PoolLimits {
        soft_bytes: u64::MAX,
        hard_bytes: u64::MAX,
    };
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

struct PoolState<T: RenderTarget> {
    free: AHashMap<T::Description, Vec<Rc<T>>>,
    in_use: Vec<Rc<T>>,
    bytes: u64,
}

impl<T: RenderTarget> PoolState<T> {
    fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }
}

/// A pool of render targets of one type.
///
/// `acquire` hands out a previously released target with an equal description
/// when one exists and constructs a new one otherwise. A target handed out is
/// never handed out again until released. Released targets stay resident on
/// the GPU until evicted or until [`RenderTargetPool::delete_all`].
pub struct RenderTargetPool<T: RenderTarget> {
    factory: RefCell<Box<dyn RenderTargetFactory<T>>>,
    state: RefCell<PoolState<T>>,
    limits: PoolLimits,
}

impl<T: RenderTarget> fmt::Debug for RenderTargetPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("RenderTargetPool")
            .field("in_use", &state.in_use.len())
            .field("free", &state.free_count())
            .field("bytes", &state.bytes)
            .field("limits", &self.limits)
            .finish()
    }
}

impl<T: RenderTarget> RenderTargetPool<T> {
    /// Creates an unlimited pool constructing targets with `factory`.
    pub fn new(factory: impl RenderTargetFactory<T> + 'static) -> Self {
        Self::with_limits(factory, PoolLimits::UNLIMITED)
    }

    /// Creates a pool with the given byte limits.
    pub fn with_limits(factory: impl RenderTargetFactory<T> + 'static, limits: PoolLimits) -> Self {
        Self {
            factory: RefCell::new(Box::new(factory)),
            state: RefCell::new(PoolState {
                free: AHashMap::new(),
                in_use: Vec::new(),
                bytes: 0,
            }),
            limits,
        }
    }

    /// Acquires a target matching `description`.
    ///
    /// ## Errors
    ///
    /// Returns the factory's error if construction fails, or
    /// [`ResourceError::PoolExhausted`] if the new target would push the pool
    /// past its hard limit. In both cases the pool is left as it was.
    pub fn acquire(
        &self,
        device: &dyn GraphicsDevice,
        description: &T::Description,
    ) -> Result<Rc<T>, ResourceError> {
        {
            let mut state = self.state.borrow_mut();
            if let Some(target) = state.free.get_mut(description).and_then(Vec::pop) {
                log::trace!("RenderTargetPool: reusing target for {:?}", description);
                state.in_use.push(Rc::clone(&target));
                return Ok(target);
            }
        }

        let target = self.factory.borrow_mut().create(device, description)?;
        let size = target.byte_size();

        let mut state = self.state.borrow_mut();
        let requested = state.bytes.saturating_add(size);
        if requested > self.limits.hard_bytes {
            drop(state);
            if let Err(e) = target.delete(device) {
                log::warn!("RenderTargetPool: Failed to destroy rejected target: {:?}", e);
            }
            return Err(ResourceError::PoolExhausted {
                requested,
                limit: self.limits.hard_bytes,
            });
        }

        log::debug!(
            "RenderTargetPool: created target for {:?} ({} bytes, {} total)",
            description,
            size,
            requested
        );
        state.bytes = requested;
        let target = Rc::new(target);
        state.in_use.push(Rc::clone(&target));
        Ok(target)
    }

    /// Returns a target to the pool. The target stays GPU-resident.
    ///
    /// # Panics
    ///
    /// Panics if `target` was not acquired from this pool or was already
    /// released.
    pub fn release(&self, target: Rc<T>) {
        let mut state = self.state.borrow_mut();
        let position = state.in_use.iter().position(|t| Rc::ptr_eq(t, &target));
        match position {
            Some(index) => {
                state.in_use.swap_remove(index);
                let key = target.description().clone();
                state.free.entry(key).or_default().push(target);
            }
            None if target.is_deleted() => {
                log::debug!("RenderTargetPool: ignoring release of a deleted target");
            }
            None => panic!("RenderTargetPool: released a target this pool does not own"),
        }
    }

    /// Acquires a target held by a guard that releases it when dropped.
    pub fn acquire_scoped(
        &self,
        device: &dyn GraphicsDevice,
        description: &T::Description,
    ) -> Result<PooledTarget<'_, T>, ResourceError> {
        let target = self.acquire(device, description)?;
        Ok(PooledTarget {
            pool: self,
            target: Some(target),
        })
    }

    /// Runs `f` with a target matching `description` and releases the target
    /// afterwards, whether `f` succeeds, fails or panics.
    pub fn with_target<R, E, F>(
        &self,
        device: &dyn GraphicsDevice,
        description: &T::Description,
        f: F,
    ) -> Result<R, E>
    where
        E: From<ResourceError>,
        F: FnOnce(&T) -> Result<R, E>,
    {
        let guard = self.acquire_scoped(device, description)?;
        f(&guard)
    }

    /// Deletes every released target. Returns the number deleted.
    pub fn evict_unused(&self, device: &dyn GraphicsDevice) -> usize {
        let free: Vec<Rc<T>> = {
            let mut state = self.state.borrow_mut();
            state.free.drain().flat_map(|(_, targets)| targets).collect()
        };
        let count = free.len();
        for target in free {
            self.delete_owned(device, &target);
        }
        if count > 0 {
            log::debug!("RenderTargetPool: evicted {} unused targets", count);
        }
        count
    }

    /// Deletes released targets until the pool fits its soft limit, or until
    /// no released target is left. Returns the number deleted.
    pub fn evict_to_soft_limit(&self, device: &dyn GraphicsDevice) -> usize {
        let mut count = 0;
        loop {
            let victim = {
                let mut state = self.state.borrow_mut();
                if state.bytes <= self.limits.soft_bytes {
                    break;
                }
                let key = state
                    .free
                    .iter()
                    .find(|(_, targets)| !targets.is_empty())
                    .map(|(key, _)| key.clone());
                let Some(key) = key else {
                    break;
                };
                let victim = state.free.get_mut(&key).and_then(Vec::pop);
                if state.free.get(&key).is_some_and(Vec::is_empty) {
                    state.free.remove(&key);
                }
                victim
            };
            match victim {
                Some(target) => {
                    self.delete_owned(device, &target);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Deletes every target the pool owns, released or not. Deleting an
    /// empty pool does nothing.
    pub fn delete_all(&self, device: &dyn GraphicsDevice) {
        let targets: Vec<Rc<T>> = {
            let mut state = self.state.borrow_mut();
            let mut targets: Vec<Rc<T>> =
                state.free.drain().flat_map(|(_, targets)| targets).collect();
            targets.append(&mut state.in_use);
            targets
        };
        if targets.is_empty() {
            return;
        }
        log::debug!("RenderTargetPool: deleting {} targets", targets.len());
        for target in targets {
            self.delete_owned(device, &target);
        }
    }

    fn delete_owned(&self, device: &dyn GraphicsDevice, target: &T) {
        if let Err(e) = target.delete(device) {
            log::warn!("RenderTargetPool: Failed to destroy target: {:?}", e);
        }
        let mut state = self.state.borrow_mut();
        state.bytes = state.bytes.saturating_sub(target.byte_size());
    }

    /// Bytes held by every target the pool owns.
    pub fn bytes_allocated(&self) -> u64 {
        self.state.borrow().bytes
    }

    /// Number of targets currently handed out.
    pub fn in_use_count(&self) -> usize {
        self.state.borrow().in_use.len()
    }

    /// Number of released targets waiting for reuse.
    pub fn free_count(&self) -> usize {
        self.state.borrow().free_count()
    }

    /// The pool's byte limits.
    pub fn limits(&self) -> PoolLimits {
        self.limits
    }
}

impl<T: RenderTarget> Drop for RenderTargetPool<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let live = state.in_use.len() + state.free_count();
        if live > 0 {
            log::warn!(
                "RenderTargetPool: dropped while owning {} targets; call delete_all first",
                live
            );
        }
    }
}

/// A pooled target released back to its pool when dropped.
pub struct PooledTarget<'p, T: RenderTarget> {
    pool: &'p RenderTargetPool<T>,
    target: Option<Rc<T>>,
}

impl<T: RenderTarget> PooledTarget<'_, T> {
    /// A shared handle to the target. The guard still owns the release.
    pub fn handle(&self) -> Option<&Rc<T>> {
        self.target.as_ref()
    }
}

impl<T: RenderTarget> Deref for PooledTarget<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.target {
            Some(target) => target,
            None => unreachable!("PooledTarget is only emptied on drop"),
        }
    }
}

impl<T: RenderTarget> fmt::Debug for PooledTarget<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledTarget").field(&self.target).finish()
    }
}

impl<T: RenderTarget> Drop for PooledTarget<'_, T> {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            self.pool.release(target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Area;
    use crate::mock::MockGraphicsDevice;
    use crate::renderer::target::{
        GeometryBuffer, GeometryBufferComponents, GeometryBufferDescription, ImageBuffer,
        ImageBufferDescription,
    };
    use crate::renderer::RenderError;

    fn gbuffer_pool() -> RenderTargetPool<GeometryBuffer> {
        RenderTargetPool::new(GeometryBuffer::create)
    }

    #[test]
    fn release_then_acquire_returns_the_same_target() {
        let device = MockGraphicsDevice::new();
        let pool = gbuffer_pool();
        let description = GeometryBufferDescription::new(Area::new(640, 480));

        let first = pool.acquire(&device, &description).unwrap();
        pool.release(Rc::clone(&first));
        let second = pool.acquire(&device, &description).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(device.framebuffers_created.load(std::sync::atomic::Ordering::SeqCst), 1);
        pool.release(second);
        pool.delete_all(&device);
    }

    #[test]
    fn outstanding_targets_are_never_shared() {
        let device = MockGraphicsDevice::new();
        let pool = gbuffer_pool();
        let description = GeometryBufferDescription::new(Area::new(64, 64));

        let a = pool.acquire(&device, &description).unwrap();
        let b = pool.acquire(&device, &description).unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(pool.in_use_count(), 2);
        assert_eq!(pool.bytes_allocated(), 2 * 64 * 64 * 16);
        pool.delete_all(&device);
    }

    #[test]
    fn different_descriptions_do_not_match() {
        let device = MockGraphicsDevice::new();
        let pool = gbuffer_pool();
        let full = GeometryBufferDescription::new(Area::new(32, 32));
        let no_specular = GeometryBufferDescription {
            components: GeometryBufferComponents::NoSpecular,
            ..full
        };

        let a = pool.acquire(&device, &full).unwrap();
        pool.release(Rc::clone(&a));
        let b = pool.acquire(&device, &no_specular).unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(pool.free_count(), 1);
        pool.delete_all(&device);
    }

    #[test]
    fn failed_construction_leaves_the_pool_consistent() {
        let device = MockGraphicsDevice::new();
        let pool = gbuffer_pool();
        let description = GeometryBufferDescription::new(Area::new(16, 16));

        let kept = pool.acquire(&device, &description).unwrap();
        pool.release(Rc::clone(&kept));
        let other = GeometryBufferDescription::new(Area::new(8, 8));

        device.fail_texture_creation_after(1);
        assert!(pool.acquire(&device, &other).is_err());
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.bytes_allocated(), 16 * 16 * 16);

        let again = pool.acquire(&device, &description).unwrap();
        assert!(Rc::ptr_eq(&kept, &again));
        pool.release(again);
        pool.delete_all(&device);
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn hard_limit_rejects_new_targets() {
        let device = MockGraphicsDevice::new();
        let pool: RenderTargetPool<GeometryBuffer> = RenderTargetPool::with_limits(
            GeometryBuffer::create,
            PoolLimits {
                soft_bytes: 0,
                hard_bytes: 10 * 10 * 16,
            },
        );
        let description = GeometryBufferDescription::new(Area::new(10, 10));

        let _first = pool.acquire(&device, &description).unwrap();
        let live_before = device.live_texture_count();
        let err = pool.acquire(&device, &description).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::PoolExhausted {
                requested: 3200,
                limit: 1600,
            }
        ));
        assert_eq!(pool.in_use_count(), 1);
        assert_eq!(device.live_texture_count(), live_before);
        assert_eq!(pool.bytes_allocated(), 10 * 10 * 16);
        pool.delete_all(&device);
    }

    #[test]
    fn delete_all_is_idempotent() {
        let device = MockGraphicsDevice::new();
        let pool = gbuffer_pool();
        let description = GeometryBufferDescription::new(Area::new(4, 4));
        let target = pool.acquire(&device, &description).unwrap();
        pool.release(Rc::clone(&target));

        pool.delete_all(&device);
        pool.delete_all(&device);

        assert!(target.is_deleted());
        assert_eq!(pool.bytes_allocated(), 0);
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn eviction_only_touches_released_targets() {
        let device = MockGraphicsDevice::new();
        let pool: RenderTargetPool<ImageBuffer> = RenderTargetPool::with_limits(
            ImageBuffer::create,
            PoolLimits {
                soft_bytes: 0,
                hard_bytes: u64::MAX,
            },
        );
        let small = ImageBufferDescription::new(Area::new(2, 2));
        let large = ImageBufferDescription::new(Area::new(4, 4));

        let held = pool.acquire(&device, &small).unwrap();
        let released = pool.acquire(&device, &large).unwrap();
        pool.release(Rc::clone(&released));

        assert_eq!(pool.evict_to_soft_limit(&device), 1);
        assert!(released.is_deleted());
        assert!(!held.is_deleted());
        assert_eq!(pool.bytes_allocated(), 2 * 2 * 4);
        assert_eq!(pool.evict_unused(&device), 0);
        pool.delete_all(&device);
    }

    #[test]
    fn scoped_target_is_released_on_error() {
        let device = MockGraphicsDevice::new();
        let pool = gbuffer_pool();
        let description = GeometryBufferDescription::new(Area::new(8, 8));

        let result: Result<(), RenderError> = pool.with_target(&device, &description, |_| {
            Err(RenderError::RenderingFailed("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.free_count(), 1);
        pool.delete_all(&device);
    }

    #[test]
    #[should_panic(expected = "does not own")]
    fn releasing_a_foreign_target_panics() {
        let device = MockGraphicsDevice::new();
        let pool = gbuffer_pool();
        let stranger =
            GeometryBuffer::create(&device, &GeometryBufferDescription::new(Area::new(2, 2)))
                .unwrap();
        pool.release(Rc::new(stranger));
    }
}
