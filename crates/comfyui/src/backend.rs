//! [`DiffusionBackend`] implementation that drives a ComfyUI server.
//!
//! Each inference pass queues a single-image txt2img workflow, polls
//! `/history/{prompt_id}` until it finishes, downloads the saved image via
//! `/view` and decodes it. The model id is passed through as the
//! checkpoint file name.

use std::time::Duration;

use async_trait::async_trait;
use dreamcanvas_core::backend::{
    BackendError, DiffusionBackend, DiffusionHandle, InferenceParams, Precision, SeededSource,
};
use image::RgbImage;

use crate::api::{ComfyUiApi, ComfyUiApiError};
use crate::workflow::{build_txt2img_workflow, parse_history, HistoryState};

/// Default interval between history polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Device label used when the server does not report one.
const FALLBACK_DEVICE: &str = "comfyui";

/// Backend that loads "handles" bound to one ComfyUI checkpoint.
pub struct ComfyUiBackend {
    api: ComfyUiApi,
    poll_interval: Duration,
}

impl ComfyUiBackend {
    pub fn new(api: ComfyUiApi) -> Self {
        Self {
            api,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl DiffusionBackend for ComfyUiBackend {
    fn name(&self) -> &str {
        "comfyui"
    }

    async fn load(
        &self,
        model_id: &str,
        precision: Precision,
    ) -> Result<Box<dyn DiffusionHandle>, BackendError> {
        // ComfyUI owns weight loading; the stats request only confirms the server is
        // reachable and reports the compute device.
        let stats = self.api.system_stats().await.map_err(|e| BackendError::Load {
            model_id: model_id.to_string(),
            reason: e.to_string(),
        })?;
        let device = device_label(&stats);

        tracing::info!(
            api_url = %self.api.api_url(),
            model_id,
            %precision,
            device = %device,
            "ComfyUI backend ready",
        );

        Ok(Box::new(ComfyUiHandle {
            api: self.api.clone(),
            checkpoint: model_id.to_string(),
            device,
            poll_interval: self.poll_interval,
        }))
    }
}

/// A checkpoint bound to a ComfyUI server.
pub struct ComfyUiHandle {
    api: ComfyUiApi,
    checkpoint: String,
    device: String,
    poll_interval: Duration,
}

#[async_trait]
impl DiffusionHandle for ComfyUiHandle {
    fn device(&self) -> &str {
        &self.device
    }

    async fn infer(
        &mut self,
        params: &InferenceParams<'_>,
        source: &mut SeededSource,
    ) -> Result<RgbImage, BackendError> {
        let workflow = build_txt2img_workflow(&self.checkpoint, params, source.seed());
        let client_id = uuid::Uuid::new_v4().to_string();

        let submitted = self
            .api
            .submit_workflow(&workflow, &client_id)
            .await
            .map_err(inference_error)?;

        tracing::debug!(
            prompt_id = %submitted.prompt_id,
            queue_position = submitted.number,
            seed = source.seed(),
            "Workflow queued",
        );

        // No timeout: a long queue on the server is not an error.
        let images = loop {
            let history = self
                .api
                .get_history(&submitted.prompt_id)
                .await
                .map_err(inference_error)?;
            match parse_history(&history, &submitted.prompt_id) {
                HistoryState::Pending => tokio::time::sleep(self.poll_interval).await,
                HistoryState::Failed(detail) => {
                    return Err(BackendError::Inference(format!(
                        "ComfyUI execution failed for prompt {}: {detail}",
                        submitted.prompt_id
                    )));
                }
                HistoryState::Completed(images) => break images,
            }
        };

        let output = images.first().ok_or(BackendError::EmptyOutput)?;
        let bytes = self.api.fetch_output(output).await.map_err(inference_error)?;

        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| BackendError::Inference(format!("Undecodable output image: {e}")))?;
        Ok(decoded.to_rgb8())
    }
}

fn inference_error(err: ComfyUiApiError) -> BackendError {
    BackendError::Inference(err.to_string())
}

/// First device type reported by `/system_stats`, e.g. `"cuda"`.
fn device_label(stats: &serde_json::Value) -> String {
    stats
        .get("devices")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("type"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or(FALLBACK_DEVICE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn device_from_first_reported_device() {
        let stats = json!({
            "system": { "os": "posix" },
            "devices": [ { "name": "cuda:0 NVIDIA", "type": "cuda" }, { "type": "cpu" } ]
        });
        assert_eq!(device_label(&stats), "cuda");
    }

    #[test]
    fn device_falls_back_when_missing() {
        assert_eq!(device_label(&json!({})), FALLBACK_DEVICE);
        assert_eq!(device_label(&json!({ "devices": [] })), FALLBACK_DEVICE);
    }

    #[test]
    fn api_errors_become_inference_errors() {
        let err = inference_error(ComfyUiApiError::ApiError {
            status: 500,
            body: "boom".to_string(),
        });
        assert!(matches!(err, BackendError::Inference(msg) if msg.contains("500")));
    }
}
