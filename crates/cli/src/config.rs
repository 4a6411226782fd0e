use std::path::PathBuf;
use std::time::Duration;

use dreamcanvas_core::backend::Precision;
use dreamcanvas_core::generation::DEFAULT_MODEL_ID;

/// Which diffusion backend the studio drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process deterministic renderer; needs no model server.
    Synthetic,
    /// A ComfyUI server reachable over HTTP.
    ComfyUi,
}

impl BackendKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "synthetic" => Some(Self::Synthetic),
            "comfyui" => Some(Self::ComfyUi),
            _ => None,
        }
    }
}

/// A configuration value that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{var} has invalid value '{value}': expected {expected}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Studio configuration loaded from environment variables.
///
/// All fields have defaults suitable for local use.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// Root directory of the record store (default: `outputs`).
    pub output_root: PathBuf,
    pub backend: BackendKind,
    /// Model used when a command does not name one.
    pub model_id: String,
    pub precision: Precision,
    /// Base URL of the ComfyUI server (default: `http://127.0.0.1:8188`).
    pub comfyui_url: String,
    /// Delay between history polls while a ComfyUI prompt runs.
    pub comfyui_poll_interval: Duration,
}

impl StudioConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                          |
    /// |----------------------------|----------------------------------|
    /// | `DREAMCANVAS_OUTPUT_ROOT`  | `outputs`                        |
    /// | `DREAMCANVAS_BACKEND`      | `synthetic`                      |
    /// | `DREAMCANVAS_MODEL_ID`     | `runwayml/stable-diffusion-v1-5` |
    /// | `DREAMCANVAS_PRECISION`    | `auto`                           |
    /// | `COMFYUI_URL`              | `http://127.0.0.1:8188`          |
    /// | `COMFYUI_POLL_INTERVAL_MS` | `500`                            |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`StudioConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        let output_root = PathBuf::from(var("DREAMCANVAS_OUTPUT_ROOT", "outputs"));

        let backend_name = var("DREAMCANVAS_BACKEND", "synthetic");
        let backend = BackendKind::from_name(&backend_name).ok_or(ConfigError {
            var: "DREAMCANVAS_BACKEND",
            value: backend_name.clone(),
            expected: "synthetic or comfyui",
        })?;

        let model_id = var("DREAMCANVAS_MODEL_ID", DEFAULT_MODEL_ID);

        let precision_name = var("DREAMCANVAS_PRECISION", "auto");
        let precision = Precision::from_name(&precision_name).ok_or(ConfigError {
            var: "DREAMCANVAS_PRECISION",
            value: precision_name.clone(),
            expected: "auto, fp16 or fp32",
        })?;

        let comfyui_url = var("COMFYUI_URL", "http://127.0.0.1:8188");

        let poll_ms = var("COMFYUI_POLL_INTERVAL_MS", "500");
        let comfyui_poll_interval = poll_ms
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or(ConfigError {
                var: "COMFYUI_POLL_INTERVAL_MS",
                value: poll_ms.clone(),
                expected: "a positive integer",
            })?;

        Ok(Self {
            output_root,
            backend,
            model_id,
            precision,
            comfyui_url,
            comfyui_poll_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<StudioConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StudioConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.output_root, PathBuf::from("outputs"));
        assert_eq!(config.backend, BackendKind::Synthetic);
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.precision, Precision::Auto);
        assert_eq!(config.comfyui_url, "http://127.0.0.1:8188");
        assert_eq!(config.comfyui_poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn overrides_applied() {
        let config = load(&[
            ("DREAMCANVAS_BACKEND", "ComfyUI"),
            ("DREAMCANVAS_PRECISION", "fp16"),
            ("COMFYUI_POLL_INTERVAL_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.backend, BackendKind::ComfyUi);
        assert_eq!(config.precision, Precision::Fp16);
        assert_eq!(config.comfyui_poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn malformed_values_rejected() {
        let err = load(&[("DREAMCANVAS_BACKEND", "onnx")]).unwrap_err();
        assert_eq!(err.var, "DREAMCANVAS_BACKEND");

        let err = load(&[("COMFYUI_POLL_INTERVAL_MS", "0")]).unwrap_err();
        assert_eq!(err.var, "COMFYUI_POLL_INTERVAL_MS");

        assert!(load(&[("DREAMCANVAS_PRECISION", "int8")]).is_err());
    }
}
