//! ComfyUI REST client and diffusion backend.
//!
//! Provides HTTP API wrappers, txt2img workflow construction and a
//! [`backend::ComfyUiBackend`] that plugs a ComfyUI server into the
//! generation engine.

pub mod api;
pub mod backend;
pub mod workflow;
