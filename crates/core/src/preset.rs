//! Style presets and prompt composition.
//!
//! A preset contributes a style prefix to the positive prompt and a block
//! of negative terms. Composition is a pure text transform; where presets
//! come from is the [`PresetCatalog`]'s business.

use serde::{Deserialize, Serialize};

/// A named style: prefix for the prompt, extra negative terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylePreset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub style_prefix: String,
    #[serde(default)]
    pub negative_prompt: String,
}

impl StylePreset {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        style_prefix: impl Into<String>,
        negative_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            style_prefix: style_prefix.into(),
            negative_prompt: negative_prompt.into(),
        }
    }
}

/// Source of style presets.
pub trait PresetCatalog: Send + Sync {
    /// All presets in display order.
    fn list(&self) -> Vec<StylePreset>;

    fn get(&self, id: &str) -> Option<StylePreset>;
}

/* --------------------------------------------------------------------------
   In-memory catalog
   -------------------------------------------------------------------------- */

/// Catalog backed by an ordered list held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPresetCatalog {
    presets: Vec<StylePreset>,
}

impl InMemoryPresetCatalog {
    /// Later entries with a duplicate id replace earlier ones in place.
    pub fn new(presets: impl IntoIterator<Item = StylePreset>) -> Self {
        let mut ordered: Vec<StylePreset> = Vec::new();
        for preset in presets {
            match ordered.iter_mut().find(|p| p.id == preset.id) {
                Some(existing) => *existing = preset,
                None => ordered.push(preset),
            }
        }
        Self { presets: ordered }
    }

    /// The presets shipped with the studio.
    pub fn builtin() -> Self {
        Self::new([
            StylePreset::new(
                "studio",
                "Studio Product",
                "professional studio product photography, softbox lighting, seamless backdrop, sharp focus",
                "cluttered background, harsh shadows",
            ),
            StylePreset::new(
                "cinematic",
                "Cinematic",
                "cinematic film still, anamorphic lens, dramatic lighting, shallow depth of field",
                "flat lighting, oversaturated",
            ),
            StylePreset::new(
                "watercolor",
                "Watercolor",
                "delicate watercolor painting, soft washes, paper texture",
                "photorealistic, 3d render",
            ),
            StylePreset::new(
                "isometric",
                "Isometric Illustration",
                "clean isometric vector illustration, pastel palette, minimal shading",
                "photo, noisy, grain",
            ),
        ])
    }
}

impl PresetCatalog for InMemoryPresetCatalog {
    fn list(&self) -> Vec<StylePreset> {
        self.presets.clone()
    }

    fn get(&self, id: &str) -> Option<StylePreset> {
        self.presets.iter().find(|p| p.id == id).cloned()
    }
}

/* --------------------------------------------------------------------------
   Composition
   -------------------------------------------------------------------------- */

/// Prefix the (trimmed) base prompt with the preset's style text.
pub fn compose_prompt(base_prompt: &str, preset: Option<&StylePreset>) -> String {
    let base_prompt = base_prompt.trim();
    let prefix = match preset {
        Some(p) if !p.style_prefix.is_empty() => p.style_prefix.as_str(),
        _ => return base_prompt.to_string(),
    };

    if base_prompt.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}, {base_prompt}")
    }
}

/// Preset negative terms first, then the caller's own, comma-joined.
pub fn compose_negative_prompt(base_negative: &str, preset: Option<&StylePreset>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(p) = preset {
        if !p.negative_prompt.is_empty() {
            parts.push(&p.negative_prompt);
        }
    }
    let base_negative = base_negative.trim();
    if !base_negative.is_empty() {
        parts.push(base_negative);
    }
    parts.join(", ")
}

/* --------------------------------------------------------------------------
   Tests
   -------------------------------------------------------------------------- */
