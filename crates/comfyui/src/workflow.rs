//! Text-to-image workflow construction and history parsing.
//!
//! Workflows use ComfyUI's API format: a map of node id to
//! `{ class_type, inputs }`, with links written as `[node_id, output_index]`.

use dreamcanvas_core::backend::InferenceParams;
use dreamcanvas_core::types::Seed;
use serde_json::json;

use crate::api::OutputImage;

/// Node id of the `SaveImage` node whose outputs we collect.
pub const SAVE_NODE_ID: &str = "9";

/// Filename prefix for images ComfyUI writes on its side.
pub const OUTPUT_PREFIX: &str = "dreamcanvas";

/// Sampler settings that are fixed for every request.
const SAMPLER_NAME: &str = "euler";
const SCHEDULER: &str = "normal";

/// Build a single-image txt2img workflow.
///
/// `checkpoint` is the ComfyUI checkpoint file name the model id maps to.
pub fn build_txt2img_workflow(
    checkpoint: &str,
    params: &InferenceParams<'_>,
    seed: Seed,
) -> serde_json::Value {
    json!({
        "3": {
            "class_type": "KSampler",
            "inputs": {
                "seed": seed,
                "steps": params.steps,
                "cfg": params.guidance_scale,
                "sampler_name": SAMPLER_NAME,
                "scheduler": SCHEDULER,
                "denoise": 1.0,
                "model": ["4", 0],
                "positive": ["6", 0],
                "negative": ["7", 0],
                "latent_image": ["5", 0]
            }
        },
        "4": {
            "class_type": "CheckpointLoaderSimple",
            "inputs": { "ckpt_name": checkpoint }
        },
        "5": {
            "class_type": "EmptyLatentImage",
            "inputs": {
                "width": params.width,
                "height": params.height,
                "batch_size": 1
            }
        },
        "6": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": params.prompt, "clip": ["4", 1] }
        },
        "7": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": params.negative_prompt, "clip": ["4", 1] }
        },
        "8": {
            "class_type": "VAEDecode",
            "inputs": { "samples": ["3", 0], "vae": ["4", 2] }
        },
        SAVE_NODE_ID: {
            "class_type": "SaveImage",
            "inputs": { "filename_prefix": OUTPUT_PREFIX, "images": ["8", 0] }
        }
    })
}

/// Where a queued prompt stands according to `GET /history/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryState {
    /// Not finished yet (no history entry).
    Pending,
    /// Execution ended with an error.
    Failed(String),
    /// Finished; images produced by the save node, in order.
    Completed(Vec<OutputImage>),
}

/// Interpret a history response for `prompt_id`.
pub fn parse_history(history: &serde_json::Value, prompt_id: &str) -> HistoryState {
    let entry = match history.get(prompt_id) {
        Some(entry) => entry,
        None => return HistoryState::Pending,
    };

    let status = entry.get("status");
    if status.and_then(|s| s.get("status_str")).and_then(|s| s.as_str()) == Some("error") {
        let detail = status
            .and_then(|s| s.get("messages"))
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        return HistoryState::Failed(detail);
    }

    let images = entry
        .get("outputs")
        .and_then(|o| o.get(SAVE_NODE_ID))
        .and_then(|node| node.get("images"))
        .cloned()
        .and_then(|v| serde_json::from_value::<Vec<OutputImage>>(v).ok())
        .unwrap_or_default();

    let completed = status
        .and_then(|s| s.get("completed"))
        .and_then(|c| c.as_bool())
        .unwrap_or(true);

    if images.is_empty() && !completed {
        HistoryState::Pending
    } else {
        HistoryState::Completed(images)
    }
}
