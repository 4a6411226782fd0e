//! Integration tests for [`GenerationEngine`] against a recording backend.
//!
//! The backend records every inference call so tests can assert on seeds,
//! parameters, warmup behaviour and failure handling.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use dreamcanvas_core::backend::{
    BackendError, DiffusionBackend, DiffusionHandle, InferenceParams, Precision, SeededSource,
};
use dreamcanvas_core::error::CoreError;
use dreamcanvas_core::generation::{GenerationRequest, WARMUP_PROMPT};
use dreamcanvas_pipeline::{BackendRegistry, GenerationEngine, GenerationError};
use image::RgbImage;

#[derive(Debug, Clone, PartialEq)]
struct Call {
    prompt: String,
    negative_prompt: String,
    steps: u32,
    guidance_scale: f64,
    height: u32,
    width: u32,
    seed: u64,
}

#[derive(Default)]
struct Log {
    loads: usize,
    calls: Vec<Call>,
}

struct RecordingBackend {
    log: Arc<Mutex<Log>>,
    /// Fail the n-th non-warmup call (0-based).
    fail_on: Option<usize>,
}

struct RecordingHandle {
    log: Arc<Mutex<Log>>,
    fail_on: Option<usize>,
}

#[async_trait]
impl DiffusionBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn load(
        &self,
        _model_id: &str,
        _precision: Precision,
    ) -> Result<Box<dyn DiffusionHandle>, BackendError> {
        self.log.lock().unwrap().loads += 1;
        Ok(Box::new(RecordingHandle {
            log: Arc::clone(&self.log),
            fail_on: self.fail_on,
        }))
    }
}

#[async_trait]
impl DiffusionHandle for RecordingHandle {
    fn device(&self) -> &str {
        "test-device"
    }

    async fn infer(
        &mut self,
        params: &InferenceParams<'_>,
        source: &mut SeededSource,
    ) -> Result<RgbImage, BackendError> {
        let mut log = self.log.lock().unwrap();
        let generation_calls = log
            .calls
            .iter()
            .filter(|c| c.prompt != WARMUP_PROMPT)
            .count();
        log.calls.push(Call {
            prompt: params.prompt.to_string(),
            negative_prompt: params.negative_prompt.to_string(),
            steps: params.steps,
            guidance_scale: params.guidance_scale,
            height: params.height,
            width: params.width,
            seed: source.seed(),
        });
        if params.prompt != WARMUP_PROMPT && self.fail_on == Some(generation_calls) {
            return Err(BackendError::Inference("simulated failure".to_string()));
        }
        Ok(RgbImage::new(params.width, params.height))
    }
}

fn engine(fail_on: Option<usize>) -> (GenerationEngine, Arc<Mutex<Log>>) {
    let log = Arc::new(Mutex::new(Log::default()));
    let backend = RecordingBackend {
        log: Arc::clone(&log),
        fail_on,
    };
    let registry = Arc::new(BackendRegistry::new(Arc::new(backend)));
    (GenerationEngine::new(registry, Precision::Fp32), log)
}

fn generation_calls(log: &Mutex<Log>) -> Vec<Call> {
    log.lock()
        .unwrap()
        .calls
        .iter()
        .filter(|c| c.prompt != WARMUP_PROMPT)
        .cloned()
        .collect()
}

fn request(prompt: &str, base_seed: Option<u64>, num_images: u32) -> GenerationRequest {
    let mut req = GenerationRequest::new(prompt);
    req.base_seed = base_seed;
    req.num_images = num_images;
    req
}

// ---------------------------------------------------------------------------
// Test: sequential seeds and index-aligned output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_uses_sequential_seeds() {
    let (engine, log) = engine(None);
    let batch = engine
        .generate_batch(&request("a red car", Some(100), 4))
        .await
        .unwrap();

    assert_eq!(batch.images.len(), 4);
    assert_eq!(batch.metadata.len(), 4);

    let seeds: Vec<u64> = batch.metadata.iter().map(|m| m.seed).collect();
    assert_eq!(seeds, vec![100, 101, 102, 103]);
    let called: Vec<u64> = generation_calls(&log).iter().map(|c| c.seed).collect();
    assert_eq!(called, seeds);

    for (i, meta) in batch.metadata.iter().enumerate() {
        assert_eq!(meta.variation_index, i as u32);
        assert_eq!(meta.base_seed, Some(100));
        assert_eq!(meta.num_images, 4);
        assert_eq!(meta.device, "test-device");
        assert_eq!(meta.config.precision, Precision::Fp32);
        assert_eq!(meta.config.seed, Some(100));
        assert!(meta.duration_sec >= 0.0);
        assert_eq!(meta.params_hash.len(), 64);
    }
}

#[tokio::test]
async fn missing_base_seed_starts_at_zero() {
    let (engine, _) = engine(None);
    let batch = engine.generate_batch(&request("p", None, 2)).await.unwrap();
    let seeds: Vec<u64> = batch.metadata.iter().map(|m| m.seed).collect();
    assert_eq!(seeds, vec![0, 1]);
    assert_eq!(batch.metadata[0].base_seed, None);
}

// ---------------------------------------------------------------------------
// Test: validation happens before the backend is touched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_images_never_reaches_backend() {
    let (engine, log) = engine(None);
    let result = engine.generate_batch(&request("p", Some(1), 0)).await;

    assert_matches!(result, Err(GenerationError::Core(CoreError::Validation(_))));
    let log = log.lock().unwrap();
    assert_eq!(log.loads, 0);
    assert!(log.calls.is_empty());
}

#[tokio::test]
async fn oversized_batch_rejected_before_backend() {
    let (engine, log) = engine(None);
    let result = engine.generate_batch(&request("p", Some(1), u32::MAX)).await;

    assert_matches!(result, Err(GenerationError::Core(CoreError::Validation(_))));
    let log = log.lock().unwrap();
    assert_eq!(log.loads, 0);
    assert!(log.calls.is_empty());
}

#[tokio::test]
async fn unsupported_resolution_never_reaches_backend() {
    let (engine, log) = engine(None);
    let mut req = request("p", Some(1), 1);
    req.height = 500;
    req.width = 500;

    let err = engine.generate_batch(&req).await.unwrap_err();
    assert_matches!(err, GenerationError::Core(CoreError::Resolution(_)));
    assert!(err.to_string().contains("500x500"));
    assert_eq!(log.lock().unwrap().loads, 0);
}

// ---------------------------------------------------------------------------
// Test: warmup runs once per handle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn warmup_runs_once_with_request_resolution() {
    let (engine, log) = engine(None);
    let mut req = request("p", Some(1), 1);
    req.height = 512;
    req.width = 768;

    engine.generate_batch(&req).await.unwrap();
    engine.generate_batch(&req).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.loads, 1);
    let warmups: Vec<&Call> = log.calls.iter().filter(|c| c.prompt == WARMUP_PROMPT).collect();
    assert_eq!(warmups.len(), 1);
    assert_eq!(warmups[0].steps, 1);
    assert_eq!(warmups[0].guidance_scale, 1.0);
    assert_eq!((warmups[0].height, warmups[0].width), (512, 768));
    assert_eq!(log.calls[0].prompt, WARMUP_PROMPT);
}

// ---------------------------------------------------------------------------
// Test: identical requests produce identical backend invocations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identical_requests_invoke_backend_identically() {
    let (engine, log) = engine(None);
    let mut req = request("a lighthouse", Some(9), 3);
    req.negative_prompt = Some("blurry".to_string());
    req.num_inference_steps = 20;
    req.guidance_scale = 5.0;

    let first = engine.generate_batch(&req).await.unwrap();
    let second = engine.generate_batch(&req).await.unwrap();

    let calls = generation_calls(&log);
    assert_eq!(calls.len(), 6);
    assert_eq!(calls[..3], calls[3..]);
    assert_eq!(calls[0].negative_prompt, "blurry");

    let hashes = |b: &dreamcanvas_pipeline::GenerationBatch| {
        b.metadata.iter().map(|m| m.params_hash.clone()).collect::<Vec<_>>()
    };
    assert_eq!(hashes(&first), hashes(&second));
}

// ---------------------------------------------------------------------------
// Test: a failed pass discards the batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_pass_fails_whole_batch() {
    let (engine, log) = engine(Some(2));
    let result = engine.generate_batch(&request("p", Some(5), 4)).await;

    assert_matches!(result, Err(GenerationError::Backend(BackendError::Inference(_))));
    // Passes stop at the failure; no retry.
    let seeds: Vec<u64> = generation_calls(&log).iter().map(|c| c.seed).collect();
    assert_eq!(seeds, vec![5, 6, 7]);
}
