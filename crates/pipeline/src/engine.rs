//! Batch generation over a cached diffusion handle.
//!
//! A batch is validated up front, then run as `num_images` strictly
//! sequential single-image passes while holding the handle's lock. Any
//! failed pass fails the whole batch.

use std::sync::Arc;
use std::time::Instant;

use dreamcanvas_core::backend::{Precision, SeededSource};
use dreamcanvas_core::generation::{effective_seed, GenerationMetadata, GenerationRequest};
use dreamcanvas_core::provenance::{compute_params_hash, ParamsFingerprint};
use image::RgbImage;

use crate::error::GenerationError;
use crate::registry::BackendRegistry;

/// Output of one batch; `images[i]` belongs to `metadata[i]`.
#[derive(Debug, Clone)]
pub struct GenerationBatch {
    pub images: Vec<RgbImage>,
    pub metadata: Vec<GenerationMetadata>,
}

impl GenerationBatch {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Iterate `(image, metadata)` pairs in pass order.
    pub fn iter(&self) -> impl Iterator<Item = (&RgbImage, &GenerationMetadata)> {
        self.images.iter().zip(self.metadata.iter())
    }
}

pub struct GenerationEngine {
    registry: Arc<BackendRegistry>,
    precision: Precision,
}

impl GenerationEngine {
    pub fn new(registry: Arc<BackendRegistry>, precision: Precision) -> Self {
        Self {
            registry,
            precision,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Run a batch. Validation happens before the backend is touched.
    pub async fn generate_batch(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationBatch, GenerationError> {
        request.validate()?;

        let key = request.backend_key(self.precision);
        let managed = self
            .registry
            .acquire(&key, request.height, request.width)
            .await?;

        let config = request.resolved_config(self.precision);
        let params = request.inference_params();
        let num_images = request.num_images;

        let mut images = Vec::with_capacity(num_images as usize);
        let mut metadata = Vec::with_capacity(num_images as usize);

        let mut handle = managed.lock().await;
        for variation_index in 0..num_images {
            let seed = effective_seed(request.base_seed, variation_index)?;
            let mut source = SeededSource::new(seed);

            let started = Instant::now();
            let image = handle.infer(&params, &mut source).await.map_err(|e| {
                tracing::warn!(
                    key = %key,
                    seed,
                    variation_index,
                    error = %e,
                    "Generation pass failed; discarding batch",
                );
                e
            })?;
            let duration_sec = started.elapsed().as_secs_f64();

            let mut meta = GenerationMetadata {
                prompt: request.prompt.clone(),
                negative_prompt: params.negative_prompt.to_string(),
                seed,
                base_seed: request.base_seed,
                steps: request.num_inference_steps,
                guidance_scale: request.guidance_scale,
                height: request.height,
                width: request.width,
                model_id: request.model_id.clone(),
                duration_sec,
                device: handle.device().to_string(),
                config: config.clone(),
                variation_index,
                num_images,
                params_hash: String::new(),
            };
            meta.params_hash = compute_params_hash(&ParamsFingerprint::from(&meta));

            tracing::debug!(seed, variation_index, duration_sec, "Generation pass complete");

            images.push(image);
            metadata.push(meta);
        }
        drop(handle);

        tracing::info!(
            key = %key,
            num_images,
            base_seed = ?request.base_seed,
            "Generation batch complete",
        );

        Ok(GenerationBatch { images, metadata })
    }
}
