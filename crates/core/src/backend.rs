//! Diffusion backend capability.
//!
//! A [`DiffusionBackend`] loads model handles; a [`DiffusionHandle`] runs a
//! single seeded inference pass and returns one image. The generation
//! engine only ever talks to these traits, so the model runtime (a ComfyUI
//! server, the synthetic renderer, a test double) is injected.

use std::fmt;

use async_trait::async_trait;
use image::RgbImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::types::Seed;

// ---------------------------------------------------------------------------
// Precision policy
// ---------------------------------------------------------------------------

/// Numeric precision requested when loading model weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Let the backend pick (half precision on accelerators, full on CPU).
    #[default]
    Auto,
    Fp16,
    Fp32,
}

impl Precision {
    /// Parse from a config/CLI value.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "fp16" | "float16" | "half" => Some(Self::Fp16),
            "fp32" | "float32" | "full" => Some(Self::Fp32),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Fp16 => "fp16",
            Self::Fp32 => "fp32",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cache key for a loaded backend handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendKey {
    pub model_id: String,
    pub precision: Precision,
}

impl BackendKey {
    pub fn new(model_id: impl Into<String>, precision: Precision) -> Self {
        Self {
            model_id: model_id.into(),
            precision,
        }
    }
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.model_id, self.precision)
    }
}

// ---------------------------------------------------------------------------
// Inference inputs
// ---------------------------------------------------------------------------

/// Parameters for one inference pass. The batch width at this level is
/// always 1.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams<'a> {
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub steps: u32,
    pub guidance_scale: f64,
    pub height: u32,
    pub width: u32,
}

/// Random source seeded from a single effective seed.
///
/// Backends that sample in-process draw from [`SeededSource::rng`];
/// remote backends forward [`SeededSource::seed`] to their own sampler.
pub struct SeededSource {
    seed: Seed,
    rng: StdRng,
}

impl SeededSource {
    pub fn new(seed: Seed) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> Seed {
        self.seed
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

impl fmt::Debug for SeededSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededSource").field("seed", &self.seed).finish()
    }
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Errors raised by a backend while loading or running a model.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Model weights could not be loaded.
    #[error("Failed to load model '{model_id}': {reason}")]
    Load { model_id: String, reason: String },

    /// The inference call itself failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// The backend returned no usable image.
    #[error("Backend returned no image")]
    EmptyOutput,
}

/// Loads model handles for a given model id and precision.
#[async_trait]
pub trait DiffusionBackend: Send + Sync {
    /// Short name for logs (e.g. `"synthetic"`, `"comfyui"`).
    fn name(&self) -> &str;

    async fn load(
        &self,
        model_id: &str,
        precision: Precision,
    ) -> Result<Box<dyn DiffusionHandle>, BackendError>;
}

/// A loaded model. Not assumed safe for concurrent use; callers serialize
/// access.
#[async_trait]
pub trait DiffusionHandle: Send {
    /// Device/backend label recorded in generation metadata.
    fn device(&self) -> &str;

    async fn infer(
        &mut self,
        params: &InferenceParams<'_>,
        source: &mut SeededSource,
    ) -> Result<RgbImage, BackendError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn precision_names_round_trip() {
        for p in [Precision::Auto, Precision::Fp16, Precision::Fp32] {
            assert_eq!(Precision::from_name(p.name()), Some(p));
        }
        assert_eq!(Precision::from_name("HALF"), Some(Precision::Fp16));
        assert_eq!(Precision::from_name("int8"), None);
    }

    #[test]
    fn seeded_source_is_deterministic() {
        let mut a = SeededSource::new(42);
        let mut b = SeededSource::new(42);
        let xs: Vec<u32> = (0..8).map(|_| a.rng().random()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.rng().random()).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.seed(), 42);
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = SeededSource::new(1);
        let mut b = SeededSource::new(2);
        let x: u64 = a.rng().random();
        let y: u64 = b.rng().random();
        assert_ne!(x, y);
    }

    #[test]
    fn backend_key_display() {
        let key = BackendKey::new("sd-1.5", Precision::Fp16);
        assert_eq!(key.to_string(), "sd-1.5@fp16");
    }
}
