//! Persisted record types.
//!
//! [`SidecarDocument`] is the on-disk contract: every metadata field plus
//! the storage fields, enough to rebuild a [`GenerationRecord`] on its own.
//! Fields a reader cannot replay without (prompt, seed, sampler settings,
//! resolution, model) are required; the rest default so older sidecars
//! still list.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use dreamcanvas_core::backend::Precision;
use dreamcanvas_core::generation::{GenerationConfig, GenerationMetadata};
use dreamcanvas_core::types::{Seed, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Sidecar
// ---------------------------------------------------------------------------

fn default_num_images() -> u32 {
    1
}

/// Parse `created_at` as RFC 3339, or as a naive ISO timestamp in local
/// time (sidecars written by the earlier tool carry no offset).
fn deserialize_created_at<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_created_at(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid created_at timestamp: {raw}"))
    })
}

fn parse_created_at(raw: &str) -> Option<Timestamp> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = raw.parse::<NaiveDateTime>().ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// JSON metadata document written next to each image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarDocument {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    pub seed: Seed,
    #[serde(default)]
    pub base_seed: Option<Seed>,
    pub steps: u32,
    pub guidance_scale: f64,
    pub height: u32,
    pub width: u32,
    pub model_id: String,
    #[serde(default)]
    pub duration_sec: f64,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub config: Option<GenerationConfig>,
    #[serde(default)]
    pub variation_index: u32,
    #[serde(default = "default_num_images")]
    pub num_images: u32,
    #[serde(default)]
    pub params_hash: String,

    pub id: String,
    #[serde(deserialize_with = "deserialize_created_at")]
    pub created_at: Timestamp,
    pub image_path: PathBuf,
    #[serde(default)]
    pub preset_id: Option<String>,
}

impl SidecarDocument {
    pub fn new(
        metadata: &GenerationMetadata,
        id: &str,
        created_at: Timestamp,
        image_path: &Path,
        preset_id: Option<&str>,
    ) -> Self {
        Self {
            prompt: metadata.prompt.clone(),
            negative_prompt: metadata.negative_prompt.clone(),
            seed: metadata.seed,
            base_seed: metadata.base_seed,
            steps: metadata.steps,
            guidance_scale: metadata.guidance_scale,
            height: metadata.height,
            width: metadata.width,
            model_id: metadata.model_id.clone(),
            duration_sec: metadata.duration_sec,
            device: metadata.device.clone(),
            config: Some(metadata.config.clone()),
            variation_index: metadata.variation_index,
            num_images: metadata.num_images,
            params_hash: metadata.params_hash.clone(),
            id: id.to_string(),
            created_at,
            image_path: image_path.to_path_buf(),
            preset_id: preset_id.map(str::to_string),
        }
    }

    /// Rebuild the generation metadata this sidecar was written from.
    ///
    /// Sidecars without a `config` block get one synthesized from the
    /// top-level fields.
    pub fn metadata(&self) -> GenerationMetadata {
        let config = self.config.clone().unwrap_or_else(|| GenerationConfig {
            model_id: self.model_id.clone(),
            num_inference_steps: self.steps,
            guidance_scale: self.guidance_scale,
            height: self.height,
            width: self.width,
            seed: self.base_seed,
            precision: Precision::Auto,
        });

        GenerationMetadata {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            seed: self.seed,
            base_seed: self.base_seed,
            steps: self.steps,
            guidance_scale: self.guidance_scale,
            height: self.height,
            width: self.width,
            model_id: self.model_id.clone(),
            duration_sec: self.duration_sec,
            device: self.device.clone(),
            config,
            variation_index: self.variation_index,
            num_images: self.num_images,
            params_hash: self.params_hash.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A persisted generation as seen by readers. Never mutated after save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: String,
    pub created_at: Timestamp,
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
    pub prompt: String,
    pub negative_prompt: String,
    pub preset_id: Option<String>,
    pub seed: Seed,
    pub steps: u32,
    pub guidance_scale: f64,
    pub model_id: String,
    pub device: String,
    pub duration_sec: f64,
}

impl GenerationRecord {
    pub fn from_sidecar(doc: &SidecarDocument, metadata_path: &Path) -> Self {
        Self {
            id: doc.id.clone(),
            created_at: doc.created_at,
            image_path: doc.image_path.clone(),
            metadata_path: metadata_path.to_path_buf(),
            prompt: doc.prompt.clone(),
            negative_prompt: doc.negative_prompt.clone(),
            preset_id: doc.preset_id.clone(),
            seed: doc.seed,
            steps: doc.steps,
            guidance_scale: doc.guidance_scale,
            model_id: doc.model_id.clone(),
            device: doc.device.clone(),
            duration_sec: doc.duration_sec,
        }
    }

    /// Flat JSON projection of every field, for display and export.
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "created_at": self.created_at.to_rfc3339(),
            "image_path": self.image_path.display().to_string(),
            "metadata_path": self.metadata_path.display().to_string(),
            "prompt": self.prompt,
            "negative_prompt": self.negative_prompt,
            "preset_id": self.preset_id,
            "seed": self.seed,
            "steps": self.steps,
            "guidance_scale": self.guidance_scale,
            "model_id": self.model_id,
            "device": self.device,
            "duration_sec": self.duration_sec,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
