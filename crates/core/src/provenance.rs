//! Deterministic hash of the parameters that define a generation.
//!
//! Two passes with equal hashes asked the backend for exactly the same
//! thing. Reproduction compares the replayed hash against the stored one.

use sha2::{Digest, Sha256};

use crate::generation::GenerationMetadata;
use crate::types::Seed;

/// Replay-relevant inputs of a single pass.
#[derive(Debug, Clone, Copy)]
pub struct ParamsFingerprint<'a> {
    pub model_id: &'a str,
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub steps: u32,
    pub guidance_scale: f64,
    pub height: u32,
    pub width: u32,
    pub seed: Seed,
}

impl<'a> From<&'a GenerationMetadata> for ParamsFingerprint<'a> {
    fn from(meta: &'a GenerationMetadata) -> Self {
        Self {
            model_id: &meta.model_id,
            prompt: &meta.prompt,
            negative_prompt: &meta.negative_prompt,
            steps: meta.steps,
            guidance_scale: meta.guidance_scale,
            height: meta.height,
            width: meta.width,
            seed: meta.seed,
        }
    }
}

/// Compute a SHA-256 hex digest over the fingerprint.
///
/// The concatenation order is fixed and must not change once sidecars
/// carrying the hash exist on disk.
pub fn compute_params_hash(fp: &ParamsFingerprint<'_>) -> String {
    let mut material = String::new();
    material.push_str(fp.model_id);
    material.push('|');
    material.push_str(fp.prompt);
    material.push('|');
    material.push_str(fp.negative_prompt);
    material.push('|');
    material.push_str(&fp.steps.to_string());
    material.push('|');
    material.push_str(&format!("{:.6}", fp.guidance_scale));
    material.push('|');
    material.push_str(&format!("{}x{}", fp.height, fp.width));
    material.push('|');
    material.push_str(&fp.seed.to_string());

    let hash = Sha256::digest(material.as_bytes());
    format!("{hash:x}")
}
