//! Re-running a stored record as a new single-image generation.

use dreamcanvas_core::generation::{effective_seed, GenerationRequest};
use dreamcanvas_store::{GenerationRecord, RecordStore, SidecarDocument, StoreError};

use crate::engine::GenerationEngine;
use crate::error::ReproduceError;

/// Rebuild the request that reproduces the image behind `doc`.
///
/// The seed is the base seed plus the record's variation index, which is
/// the effective seed that produced this image; records without a base
/// seed fall back to the stored effective seed. The stored prompts are
/// already composed, so no preset is applied again.
pub fn replay_request(doc: &SidecarDocument) -> Result<GenerationRequest, String> {
    let seed = match doc.base_seed {
        Some(base) => effective_seed(Some(base), doc.variation_index).map_err(|e| e.to_string())?,
        None => doc.seed,
    };
    if seed != doc.seed {
        return Err(format!(
            "stored seed {} disagrees with base_seed {:?} + variation {}",
            doc.seed, doc.base_seed, doc.variation_index
        ));
    }
    if doc.model_id.trim().is_empty() {
        return Err("model_id is empty".to_string());
    }

    Ok(GenerationRequest {
        prompt: doc.prompt.clone(),
        negative_prompt: Some(doc.negative_prompt.clone()).filter(|n| !n.is_empty()),
        base_seed: Some(seed),
        num_images: 1,
        num_inference_steps: doc.steps,
        guidance_scale: doc.guidance_scale,
        height: doc.height,
        width: doc.width,
        model_id: doc.model_id.clone(),
        preset_id: doc.preset_id.clone(),
    })
}

/// Replay `source` and save the result as a new record carrying the
/// source's preset id. The source record is only read.
pub async fn reproduce(
    engine: &GenerationEngine,
    store: &RecordStore,
    source: &GenerationRecord,
) -> Result<GenerationRecord, ReproduceError> {
    let path = source.metadata_path.clone();
    let doc = match store.read_sidecar(source).await {
        Ok(doc) => doc,
        Err(StoreError::MalformedSidecar { source: err, .. }) => {
            return Err(ReproduceError::SourceMalformed {
                path,
                reason: err.to_string(),
            });
        }
        Err(err) => return Err(ReproduceError::SourceUnreadable { path, source: err }),
    };

    let request = replay_request(&doc)
        .map_err(|reason| ReproduceError::SourceMalformed { path: path.clone(), reason })?;

    let batch = engine.generate_batch(&request).await?;
    let (image, metadata) = batch
        .iter()
        .next()
        .ok_or_else(|| ReproduceError::SourceMalformed {
            path: path.clone(),
            reason: "replay produced no image".to_string(),
        })?;

    if !doc.params_hash.is_empty() && doc.params_hash != metadata.params_hash {
        tracing::warn!(
            source_id = %source.id,
            expected = %doc.params_hash,
            actual = %metadata.params_hash,
            "Replayed parameters hash differs from source record",
        );
    }

    let record = store
        .save(image, metadata, doc.preset_id.as_deref())
        .await?;

    tracing::info!(
        source_id = %source.id,
        record_id = %record.id,
        seed = metadata.seed,
        "Record reproduced",
    );

    Ok(record)
}
