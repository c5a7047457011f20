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

use crate::graphics::{AsyncContextError, AsyncGpuContext, TaskHandle};
use async_trait::async_trait;
use std::sync::Arc;
use std::thread;
use umbra_core::renderer::api::ArrayObjectId;
use umbra_core::renderer::mesh::{AsyncMeshLoader, MeshData, MeshError, MeshLoader};

/// Runs a synchronous loader on a background thread per request.
#[derive(Debug)]
pub struct ThreadedMeshLoader<L> {
    inner: Arc<L>,
}

impl<L> Clone for ThreadedMeshLoader<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: MeshLoader + Send + Sync + 'static> ThreadedMeshLoader<L> {
    /// Wraps `loader`.
    pub fn new(loader: L) -> Self {
        Self {
            inner: Arc::new(loader),
        }
    }
}

#[async_trait]
impl<L: MeshLoader + Send + Sync + 'static> AsyncMeshLoader for ThreadedMeshLoader<L> {
    async fn load(&self, name: &str) -> Result<MeshData, MeshError> {
        let (tx, rx) = flume::bounded(1);
        let loader = Arc::clone(&self.inner);
        let owned = name.to_string();
        thread::Builder::new()
            .name(format!("umbra-mesh-{name}"))
            .spawn(move || {
                let _ = tx.send(loader.load(&owned));
            })
            .map_err(|e| MeshError::LoaderFailed(e.to_string()))?;
        rx.recv_async()
            .await
            .map_err(|_| MeshError::LoaderFailed(format!("loader thread for '{name}' panicked")))?
    }
}

/// Uploads `mesh` through the GPU worker.
/// ## Returns
/// A handle yielding the array object once the worker has run the upload.
/// ## Errors
/// * `AsyncContextError` - If the worker refuses the task.
pub fn upload_mesh(
    context: &AsyncGpuContext,
    mesh: MeshData,
    label: impl Into<String>,
) -> Result<TaskHandle<Result<ArrayObjectId, MeshError>>, AsyncContextError> {
    let label = label.into();
    context.submit(move |device| mesh.upload(device, &label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::HeadlessDevice;
    use crate::mesh::ProceduralMeshLoader;
    use std::time::Duration;
    use umbra_core::renderer::GraphicsDevice;

    #[tokio::test]
    async fn loads_off_thread() {
        let loader = ThreadedMeshLoader::new(ProceduralMeshLoader);
        let cube = loader.load("cube").await.unwrap();
        assert_eq!(cube.vertices.len(), 24);
        assert!(matches!(
            loader.load("missing").await,
            Err(MeshError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn uploads_through_the_worker() {
        let device = Arc::new(HeadlessDevice::new());
        let context = AsyncGpuContext::start(device.clone(), 4).unwrap();
        let loader = ThreadedMeshLoader::new(ProceduralMeshLoader);

        let mesh = loader.load("quad").await.unwrap();
        let array = upload_mesh(&context, mesh, "quad")
            .unwrap()
            .wait_async()
            .await
            .unwrap()
            .unwrap();
        context.shutdown(Duration::from_secs(1)).unwrap();

        assert_eq!(device.live_array_objects(), 1);
        device.destroy_array_object(array).unwrap();
    }
}
