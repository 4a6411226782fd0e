//! Process-wide cache of loaded diffusion handles.
//!
//! [`BackendRegistry`] owns the injected [`DiffusionBackend`] and keeps one
//! [`ManagedHandle`] per [`BackendKey`]. The first acquisition of a key
//! loads the model and runs a single warmup pass; later acquisitions reuse
//! the cached handle. Each key initializes behind its own cell, so a slow
//! load of one model never blocks requests for another, and concurrent
//! first requests for the same key share a single load. Inference on a
//! handle is serialized through its async mutex.

use std::collections::HashMap;
use std::sync::Arc;

use dreamcanvas_core::backend::{
    BackendError, BackendKey, DiffusionBackend, DiffusionHandle, InferenceParams, SeededSource,
};
use dreamcanvas_core::generation::{WARMUP_GUIDANCE_SCALE, WARMUP_PROMPT, WARMUP_STEPS};
use tokio::sync::{Mutex, MutexGuard, OnceCell};

/// Seed used for the warmup pass.
const WARMUP_SEED: u64 = 0;

/// Per-key slot; empty until a load and warmup succeed.
type HandleSlot = Arc<OnceCell<Arc<ManagedHandle>>>;

/// Loads, caches and releases backend handles.
pub struct BackendRegistry {
    backend: Arc<dyn DiffusionBackend>,
    /// Held only to look up or insert a slot, never across a load.
    handles: Mutex<HashMap<BackendKey, HandleSlot>>,
}

/// A loaded, warmed-up handle shared across requests.
pub struct ManagedHandle {
    key: BackendKey,
    device: String,
    handle: Mutex<Box<dyn DiffusionHandle>>,
}

impl ManagedHandle {
    pub fn key(&self) -> &BackendKey {
        &self.key
    }

    /// Device label reported by the backend at load time.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Exclusive access for a run of inference passes.
    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn DiffusionHandle>> {
        self.handle.lock().await
    }
}

impl BackendRegistry {
    pub fn new(backend: Arc<dyn DiffusionBackend>) -> Self {
        Self {
            backend,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Name of the injected backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Return the cached handle for `key`, loading and warming it up on
    /// first use. The warmup pass renders at `height` x `width`.
    ///
    /// A failed load or warmup caches nothing, so the next call retries.
    pub async fn acquire(
        &self,
        key: &BackendKey,
        height: u32,
        width: u32,
    ) -> Result<Arc<ManagedHandle>, BackendError> {
        let slot = {
            let mut handles = self.handles.lock().await;
            Arc::clone(handles.entry(key.clone()).or_default())
        };

        let managed = slot
            .get_or_try_init(|| self.load_and_warm_up(key, height, width))
            .await?;
        Ok(Arc::clone(managed))
    }

    async fn load_and_warm_up(
        &self,
        key: &BackendKey,
        height: u32,
        width: u32,
    ) -> Result<Arc<ManagedHandle>, BackendError> {
        tracing::info!(backend = self.backend.name(), key = %key, "Loading diffusion model");
        let mut handle = self.backend.load(&key.model_id, key.precision).await?;

        let warmup = InferenceParams {
            prompt: WARMUP_PROMPT,
            negative_prompt: "",
            steps: WARMUP_STEPS,
            guidance_scale: WARMUP_GUIDANCE_SCALE,
            height,
            width,
        };
        handle
            .infer(&warmup, &mut SeededSource::new(WARMUP_SEED))
            .await?;

        let device = handle.device().to_string();
        tracing::info!(key = %key, device = %device, "Diffusion model loaded and warmed up");

        Ok(Arc::new(ManagedHandle {
            key: key.clone(),
            device,
            handle: Mutex::new(handle),
        }))
    }

    /// Drop the cached handle for `key`. Returns whether one was cached.
    ///
    /// Callers still holding the `Arc` keep it alive until they finish.
    pub async fn release(&self, key: &BackendKey) -> bool {
        let removed = self
            .handles
            .lock()
            .await
            .remove(key)
            .is_some_and(|slot| slot.initialized());
        if removed {
            tracing::info!(key = %key, "Diffusion model released");
        }
        removed
    }

    /// Release every cached handle.
    pub async fn shutdown(&self) {
        let mut handles = self.handles.lock().await;
        let count = handles.values().filter(|slot| slot.initialized()).count();
        handles.clear();
        tracing::info!(released = count, "Backend registry shut down");
    }

    /// Keys with a cached handle.
    pub async fn loaded_keys(&self) -> Vec<BackendKey> {
        self.handles
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(key, _)| key.clone())
            .collect()
    }
}
