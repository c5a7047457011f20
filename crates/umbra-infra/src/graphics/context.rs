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

//! A worker thread that owns a device handle and runs GPU tasks submitted
//! from other threads, such as mesh and texture uploads.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use umbra_core::renderer::GraphicsDevice;

type Task = Box<dyn FnOnce(&dyn GraphicsDevice) + Send + 'static>;

/// An error raised by the [`AsyncGpuContext`].
#[derive(Debug)]
pub enum AsyncContextError {
    /// Work was submitted after shutdown was requested.
    ShutDown,
    /// The worker stopped accepting tasks.
    QueueClosed,
    /// The worker did not drain its queue within the allowed time. The
    /// context is unusable afterwards.
    ShutdownTimeout {
        /// The time that was allowed.
        timeout: Duration,
    },
    /// The task panicked before producing a result.
    TaskPanicked,
    /// The worker thread could not be spawned.
    Spawn(std::io::Error),
}

impl fmt::Display for AsyncContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncContextError::ShutDown => write!(f, "The GPU context is shut down"),
            AsyncContextError::QueueClosed => write!(f, "The GPU task queue is closed"),
            AsyncContextError::ShutdownTimeout { timeout } => write!(
                f,
                "The GPU worker did not stop within {} ms",
                timeout.as_millis()
            ),
            AsyncContextError::TaskPanicked => write!(f, "A GPU task panicked"),
            AsyncContextError::Spawn(err) => write!(f, "Failed to spawn the GPU worker: {err}"),
        }
    }
}

impl std::error::Error for AsyncContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AsyncContextError::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

/// The pending result of a submitted task.
#[derive(Debug)]
pub struct TaskHandle<R> {
    receiver: flume::Receiver<R>,
}

impl<R> TaskHandle<R> {
    /// Blocks until the task has run.
    /// ## Errors
    /// * `AsyncContextError::TaskPanicked` - If the task panicked.
    pub fn wait(self) -> Result<R, AsyncContextError> {
        self.receiver
            .recv()
            .map_err(|_| AsyncContextError::TaskPanicked)
    }

    /// Waits for the task without blocking the calling executor.
    pub async fn wait_async(self) -> Result<R, AsyncContextError> {
        self.receiver
            .recv_async()
            .await
            .map_err(|_| AsyncContextError::TaskPanicked)
    }

    /// Returns the result if the task already ran.
    pub fn try_take(&self) -> Option<R> {
        self.receiver.try_recv().ok()
    }
}

/// Runs GPU tasks on one dedicated thread with a bounded queue.
///
/// Tasks run in submission order. A panicking task is reported to its
/// [`TaskHandle`] and does not stop the worker.
pub struct AsyncGpuContext {
    sender: Mutex<Option<Sender<Task>>>,
    done: Receiver<()>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    completed: Arc<AtomicUsize>,
    capacity: usize,
}

impl fmt::Debug for AsyncGpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncGpuContext")
            .field("capacity", &self.capacity)
            .field("completed", &self.completed_tasks())
            .field("running", &self.is_running())
            .finish()
    }
}

impl AsyncGpuContext {
    /// Spawns the worker.
    /// ## Arguments
    /// * `device` - The device handed to every task.
    /// * `capacity` - How many tasks may wait in the queue before `submit` blocks.
    /// ## Errors
    /// * `AsyncContextError::Spawn` - If the thread cannot be created.
    pub fn start(
        device: Arc<dyn GraphicsDevice>,
        capacity: usize,
    ) -> Result<Self, AsyncContextError> {
        let (task_tx, task_rx) = crossbeam_channel::bounded::<Task>(capacity.max(1));
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let completed = Arc::new(AtomicUsize::new(0));
        let worker_completed = Arc::clone(&completed);

        let handle = thread::Builder::new()
            .name("umbra-gpu-worker".to_string())
            .spawn(move || {
                log::info!("AsyncGpuContext: worker started.");
                for task in task_rx.iter() {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(device.as_ref())));
                    if outcome.is_err() {
                        log::error!("AsyncGpuContext: a task panicked.");
                    }
                    worker_completed.fetch_add(1, Ordering::Relaxed);
                }
                log::debug!("AsyncGpuContext: queue drained.");
                let _ = done_tx.send(());
                log::info!("AsyncGpuContext: worker stopped.");
            })
            .map_err(AsyncContextError::Spawn)?;

        Ok(Self {
            sender: Mutex::new(Some(task_tx)),
            done: done_rx,
            handle: Mutex::new(Some(handle)),
            completed,
            capacity: capacity.max(1),
        })
    }

    /// Queues a task, blocking while the queue is full.
    /// ## Returns
    /// A handle that yields the task's return value.
    /// ## Errors
    /// * `AsyncContextError::ShutDown` - If shutdown was requested.
    /// * `AsyncContextError::QueueClosed` - If the worker is gone.
    pub fn submit<R, F>(&self, task: F) -> Result<TaskHandle<R>, AsyncContextError>
    where
        R: Send + 'static,
        F: FnOnce(&dyn GraphicsDevice) -> R + Send + 'static,
    {
        let (result_tx, result_rx) = flume::bounded(1);
        let boxed: Task = Box::new(move |device| {
            let _ = result_tx.send(task(device));
        });

        let sender = self
            .sender
            .lock()
            .map_err(|_| AsyncContextError::QueueClosed)?
            .clone()
            .ok_or(AsyncContextError::ShutDown)?;
        sender
            .send(boxed)
            .map_err(|_| AsyncContextError::QueueClosed)?;
        Ok(TaskHandle {
            receiver: result_rx,
        })
    }

    /// The number of tasks the worker has finished, including panicked ones.
    pub fn completed_tasks(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// The queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` until shutdown is requested.
    pub fn is_running(&self) -> bool {
        self.sender.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Returns `true` once the worker thread has been joined.
    pub fn is_stopped(&self) -> bool {
        match self.handle.lock() {
            Ok(handle) => handle.is_none(),
            Err(poisoned) => poisoned.get_ref().is_none(),
        }
    }

    /// Refuses new work, lets the worker drain the queue and joins it.
    /// Calling it again after a successful shutdown does nothing. After a
    /// timeout, every call waits again and keeps failing until the worker
    /// has actually stopped.
    /// ## Errors
    /// * `AsyncContextError::ShutdownTimeout` - If the queue is not drained within `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), AsyncContextError> {
        let sender = match self.sender.lock() {
            Ok(mut sender) => sender.take(),
            Err(mut poisoned) => poisoned.get_mut().take(),
        };
        drop(sender);

        let mut slot = match self.handle.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(handle) = slot.take() else {
            return Ok(());
        };

        log::debug!("AsyncGpuContext: shutting down, waiting up to {timeout:?}.");
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    log::warn!("AsyncGpuContext: worker thread panicked while stopping.");
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                log::error!("AsyncGpuContext: worker did not stop within {timeout:?}.");
                *slot = Some(handle);
                Err(AsyncContextError::ShutdownTimeout { timeout })
            }
        }
    }
}

impl Drop for AsyncGpuContext {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.shutdown(Duration::from_secs(5)) {
                log::error!("AsyncGpuContext: Failed to shut down on drop: {e}");
            }
        } else if !self.is_stopped() {
            log::error!("AsyncGpuContext: dropped while the worker is still busy, detaching it.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::headless::HeadlessDevice;
    use std::time::Instant;
    use umbra_core::math::Area;
    use umbra_core::renderer::api::{Texture2DDescriptor, TextureFormat};

    fn context(capacity: usize) -> (Arc<HeadlessDevice>, AsyncGpuContext) {
        let device = Arc::new(HeadlessDevice::new());
        let context = AsyncGpuContext::start(device.clone(), capacity).unwrap();
        (device, context)
    }

    #[test]
    fn tasks_run_against_the_device() {
        let (device, context) = context(4);
        let handle = context
            .submit(|device| {
                device.create_texture_2d(&Texture2DDescriptor::new(
                    "upload",
                    Area::new(4, 4),
                    TextureFormat::Rgba8,
                ))
            })
            .unwrap();
        let texture = handle.wait().unwrap().unwrap();
        assert!(device.is_texture_live(texture));
        context.shutdown(Duration::from_secs(1)).unwrap();
        assert_eq!(context.completed_tasks(), 1);
    }

    #[test]
    fn shutdown_drains_queued_work() {
        let (_, context) = context(8);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                context
                    .submit(move |_| {
                        thread::sleep(Duration::from_millis(2));
                        i
                    })
                    .unwrap()
            })
            .collect();
        context.shutdown(Duration::from_secs(5)).unwrap();
        let results: Vec<_> = handles.into_iter().map(|h| h.try_take()).collect();
        assert_eq!(results, (0..8).map(Some).collect::<Vec<_>>());
    }

    #[test]
    fn submit_after_shutdown_is_refused() {
        let (_, context) = context(1);
        context.shutdown(Duration::from_secs(1)).unwrap();
        assert!(!context.is_running());
        assert!(matches!(
            context.submit(|_| ()),
            Err(AsyncContextError::ShutDown)
        ));
        // Idempotent.
        context.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn a_panicking_task_does_not_stop_the_worker() {
        let (_, context) = context(2);
        let failed = context.submit(|_| -> u32 { panic!("upload failed") }).unwrap();
        assert!(matches!(failed.wait(), Err(AsyncContextError::TaskPanicked)));
        let ok = context.submit(|device| device.texture_units_max()).unwrap();
        assert_eq!(ok.wait().unwrap(), 16);
    }

    #[test]
    fn slow_worker_times_out() {
        let (_, context) = context(1);
        let _slow = context
            .submit(|_| thread::sleep(Duration::from_millis(500)))
            .unwrap();
        let started = Instant::now();
        let result = context.shutdown(Duration::from_millis(20));
        assert!(matches!(
            result,
            Err(AsyncContextError::ShutdownTimeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn a_timed_out_shutdown_keeps_failing_until_the_worker_stops() {
        let (_, context) = context(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let _blocked = context
            .submit(move |_| {
                let _ = release_rx.recv();
            })
            .unwrap();

        assert!(matches!(
            context.shutdown(Duration::from_millis(10)),
            Err(AsyncContextError::ShutdownTimeout { .. })
        ));
        assert!(matches!(
            context.shutdown(Duration::from_millis(10)),
            Err(AsyncContextError::ShutdownTimeout { .. })
        ));
        assert!(!context.is_stopped());

        release_tx.send(()).unwrap();
        context.shutdown(Duration::from_secs(5)).unwrap();
        assert!(context.is_stopped());
        context.shutdown(Duration::from_millis(10)).unwrap();
    }
}
