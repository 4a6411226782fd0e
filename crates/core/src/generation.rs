//! Generation request/metadata types, defaults, and validation.
//!
//! A [`GenerationRequest`] fans out into `num_images` sequential passes.
//! Pass `i` uses `effective_seed = base_seed.unwrap_or(0) + i`, so a batch
//! is fully determined by its request.

use serde::{Deserialize, Serialize};

use crate::backend::{BackendKey, InferenceParams, Precision};
use crate::error::CoreError;
use crate::resolution::{validate_resolution, RESOLUTION_SQUARE};
use crate::types::Seed;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL_ID: &str = "runwayml/stable-diffusion-v1-5";

/// Default number of denoising steps.
pub const DEFAULT_STEPS: u32 = 30;

/// Default classifier-free guidance scale.
pub const DEFAULT_GUIDANCE_SCALE: f64 = 7.5;

/// Largest batch a single request may ask for.
pub const MAX_NUM_IMAGES: u32 = 4;

/// Prompt used for the one-time warmup pass.
pub const WARMUP_PROMPT: &str = "warmup image of a simple object";

/// Steps used for the one-time warmup pass.
pub const WARMUP_STEPS: u32 = 1;

/// Guidance used for the one-time warmup pass.
pub const WARMUP_GUIDANCE_SCALE: f64 = 1.0;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Everything needed to run one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub base_seed: Option<Seed>,
    pub num_images: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub height: u32,
    pub width: u32,
    pub model_id: String,
    /// Opaque reference to a style preset; never validated here.
    pub preset_id: Option<String>,
}

impl GenerationRequest {
    /// A request for one 512x512 image with default sampler settings.
    pub fn new(prompt: impl Into<String>) -> Self {
        let (height, width) = RESOLUTION_SQUARE;
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            base_seed: None,
            num_images: 1,
            num_inference_steps: DEFAULT_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            height,
            width,
            model_id: DEFAULT_MODEL_ID.to_string(),
            preset_id: None,
        }
    }

    /// Validate the request. The resolution check runs first.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_resolution(self.height, self.width)?;

        if self.num_images < 1 {
            return Err(CoreError::Validation(format!(
                "num_images must be >= 1 (got {})",
                self.num_images
            )));
        }
        if self.num_images > MAX_NUM_IMAGES {
            return Err(CoreError::Validation(format!(
                "num_images must be <= {MAX_NUM_IMAGES} (got {})",
                self.num_images
            )));
        }
        if self.num_inference_steps < 1 {
            return Err(CoreError::Validation(
                "num_inference_steps must be >= 1".to_string(),
            ));
        }
        if !self.guidance_scale.is_finite() || self.guidance_scale < 0.0 {
            return Err(CoreError::Validation(format!(
                "guidance_scale must be a finite, non-negative number (got {})",
                self.guidance_scale
            )));
        }
        if self.model_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "model_id must not be empty".to_string(),
            ));
        }
        let last_index = self.num_images - 1;
        effective_seed(self.base_seed, last_index)?;

        Ok(())
    }

    /// Effective seeds for every pass, in order.
    pub fn seeds(&self) -> Result<Vec<Seed>, CoreError> {
        (0..self.num_images)
            .map(|i| effective_seed(self.base_seed, i))
            .collect()
    }

    /// Snapshot of the resolved configuration under `precision`.
    pub fn resolved_config(&self, precision: Precision) -> GenerationConfig {
        GenerationConfig {
            model_id: self.model_id.clone(),
            num_inference_steps: self.num_inference_steps,
            guidance_scale: self.guidance_scale,
            height: self.height,
            width: self.width,
            seed: self.base_seed,
            precision,
        }
    }

    /// Negative prompt text sent to the backend (empty when absent).
    pub fn negative_prompt_text(&self) -> &str {
        self.negative_prompt.as_deref().unwrap_or("")
    }

    pub fn inference_params(&self) -> InferenceParams<'_> {
        InferenceParams {
            prompt: &self.prompt,
            negative_prompt: self.negative_prompt_text(),
            steps: self.num_inference_steps,
            guidance_scale: self.guidance_scale,
            height: self.height,
            width: self.width,
        }
    }

    pub fn backend_key(&self, precision: Precision) -> BackendKey {
        BackendKey::new(self.model_id.clone(), precision)
    }
}

/// Compute the seed for pass `variation_index` of a batch.
pub fn effective_seed(base_seed: Option<Seed>, variation_index: u32) -> Result<Seed, CoreError> {
    base_seed
        .unwrap_or(0)
        .checked_add(u64::from(variation_index))
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "base_seed {} + variation {variation_index} overflows the seed range",
                base_seed.unwrap_or(0)
            ))
        })
}

// ---------------------------------------------------------------------------
// Config snapshot and metadata
// ---------------------------------------------------------------------------

/// Resolved generation configuration, captured verbatim in every sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model_id: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub height: u32,
    pub width: u32,
    /// Base seed as requested (`None` means the zero default was used).
    pub seed: Option<Seed>,
    #[serde(default)]
    pub precision: Precision,
}

/// Per-image provenance. Immutable once built by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub prompt: String,
    pub negative_prompt: String,
    /// Effective seed of this pass.
    pub seed: Seed,
    pub base_seed: Option<Seed>,
    pub steps: u32,
    pub guidance_scale: f64,
    pub height: u32,
    pub width: u32,
    pub model_id: String,
    pub duration_sec: f64,
    pub device: String,
    pub config: GenerationConfig,
    pub variation_index: u32,
    pub num_images: u32,
    pub params_hash: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
