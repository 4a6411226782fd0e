//! Facade tying preset composition, generation and the record store
//! together. This is what the CLI talks to.

use std::path::Path;
use std::sync::Arc;

use dreamcanvas_core::error::CoreError;
use dreamcanvas_core::generation::GenerationRequest;
use dreamcanvas_core::preset::{compose_negative_prompt, compose_prompt, PresetCatalog, StylePreset};
use dreamcanvas_store::compare::{compare_records, diff_records, FieldDiff};
use dreamcanvas_store::{ExportedFiles, GenerationRecord, ListFilter, RecordListing, RecordStore};
use image::RgbImage;

use crate::engine::GenerationEngine;
use crate::error::StudioError;
use crate::reproduce;

pub struct Studio {
    engine: GenerationEngine,
    store: RecordStore,
    presets: Arc<dyn PresetCatalog>,
}

impl Studio {
    pub fn new(engine: GenerationEngine, store: RecordStore, presets: Arc<dyn PresetCatalog>) -> Self {
        Self {
            engine,
            store,
            presets,
        }
    }

    pub fn engine(&self) -> &GenerationEngine {
        &self.engine
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Apply the request's preset to its prompts.
    ///
    /// An unknown preset id composes as "no preset" but is kept on the
    /// request so it is still recorded.
    pub fn compose(&self, request: &GenerationRequest) -> GenerationRequest {
        let preset = request.preset_id.as_deref().and_then(|id| {
            let found = self.presets.get(id);
            if found.is_none() {
                tracing::warn!(preset_id = id, "Unknown style preset; composing without it");
            }
            found
        });

        let negative = compose_negative_prompt(request.negative_prompt_text(), preset.as_ref());
        GenerationRequest {
            prompt: compose_prompt(&request.prompt, preset.as_ref()),
            negative_prompt: Some(negative).filter(|n| !n.is_empty()),
            ..request.clone()
        }
    }

    /// Compose, generate and save every image of the batch.
    ///
    /// Nothing is saved unless the whole batch succeeds. A storage failure
    /// part-way leaves the records saved before it in place.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<GenerationRecord>, StudioError> {
        let composed = self.compose(request);
        let batch = self.engine.generate_batch(&composed).await?;

        let mut records = Vec::with_capacity(batch.len());
        for (image, metadata) in batch.iter() {
            let record = self
                .store
                .save(image, metadata, composed.preset_id.as_deref())
                .await?;
            records.push(record);
        }
        Ok(records)
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<RecordListing, StudioError> {
        Ok(self.store.list(filter).await?)
    }

    pub async fn find(&self, id: &str) -> Result<Option<GenerationRecord>, StudioError> {
        Ok(self.store.find(id).await?)
    }

    /// Like [`Studio::find`] but a missing id is an error.
    pub async fn get(&self, id: &str) -> Result<GenerationRecord, StudioError> {
        self.find(id).await?.ok_or_else(|| {
            StudioError::Core(CoreError::NotFound {
                entity: "record",
                id: id.to_string(),
            })
        })
    }

    pub async fn load_image(&self, record: &GenerationRecord) -> Result<RgbImage, StudioError> {
        Ok(self.store.load_image(record).await?)
    }

    /// Replay the record with `id` into a new record.
    pub async fn reproduce(&self, id: &str) -> Result<GenerationRecord, StudioError> {
        let source = self.get(id).await?;
        Ok(reproduce::reproduce(&self.engine, &self.store, &source).await?)
    }

    /// Comparison rows for the given ids, in the order requested.
    pub async fn compare(&self, ids: &[String]) -> Result<Vec<serde_json::Value>, StudioError> {
        let records = self.get_many(ids).await?;
        Ok(compare_records(&records))
    }

    /// Differing fields between two records.
    pub async fn diff(
        &self,
        left: &str,
        right: &str,
        include_volatile: bool,
    ) -> Result<Vec<FieldDiff>, StudioError> {
        let left = self.get(left).await?;
        let right = self.get(right).await?;
        Ok(diff_records(&left, &right, include_volatile))
    }

    pub async fn export(&self, id: &str, dest_dir: &Path) -> Result<ExportedFiles, StudioError> {
        let record = self.get(id).await?;
        Ok(self.store.export(&record, dest_dir).await?)
    }

    pub fn presets(&self) -> Vec<StylePreset> {
        self.presets.list()
    }

    /// Release cached backend handles.
    pub async fn shutdown(&self) {
        self.engine.registry().shutdown().await;
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<GenerationRecord>, StudioError> {
        let listing = self.store.list(&ListFilter::default()).await?;
        ids.iter()
            .map(|id| {
                listing
                    .iter()
                    .find(|r| &r.id == id)
                    .cloned()
                    .ok_or_else(|| {
                        StudioError::Core(CoreError::NotFound {
                            entity: "record",
                            id: id.clone(),
                        })
                    })
            })
            .collect()
    }
}
