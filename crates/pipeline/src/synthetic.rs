//! Offline renderer used when no model server is configured.
//!
//! Output depends only on the prompt, the step count, the resolution and
//! the seeded random source, so equal inputs give byte-identical images.

use async_trait::async_trait;
use dreamcanvas_core::backend::{
    BackendError, DiffusionBackend, DiffusionHandle, InferenceParams, Precision, SeededSource,
};
use image::{Rgb, RgbImage};
use rand::Rng;

/// Largest per-channel noise amplitude (at one step).
const MAX_NOISE: i16 = 48;

pub struct SyntheticBackend;

#[async_trait]
impl DiffusionBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn load(
        &self,
        model_id: &str,
        precision: Precision,
    ) -> Result<Box<dyn DiffusionHandle>, BackendError> {
        tracing::debug!(model_id, %precision, "Synthetic backend has no weights to load");
        Ok(Box::new(SyntheticHandle))
    }
}

pub struct SyntheticHandle;

#[async_trait]
impl DiffusionHandle for SyntheticHandle {
    fn device(&self) -> &str {
        "cpu"
    }

    async fn infer(
        &mut self,
        params: &InferenceParams<'_>,
        source: &mut SeededSource,
    ) -> Result<RgbImage, BackendError> {
        Ok(render(params, source))
    }
}

/// Bilinear blend of four seeded corner colours, tinted by the prompt,
/// with noise that shrinks as the step count grows.
fn render(params: &InferenceParams<'_>, source: &mut SeededSource) -> RgbImage {
    let tint = prompt_tint(params.prompt);
    let rng = source.rng();
    let corners: [[f32; 3]; 4] = std::array::from_fn(|_| {
        std::array::from_fn(|c| f32::from(rng.random::<u8>() / 2 + tint[c] / 2))
    });

    let amplitude = (MAX_NOISE / params.steps.clamp(1, MAX_NOISE as u32) as i16).max(1);
    let w = params.width.max(1);
    let h = params.height.max(1);
    let span_x = (w - 1).max(1) as f32;
    let span_y = (h - 1).max(1) as f32;

    let mut image = RgbImage::new(w, h);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let fx = x as f32 / span_x;
        let fy = y as f32 / span_y;
        let mut channel = |c: usize| {
            let top = corners[0][c] * (1.0 - fx) + corners[1][c] * fx;
            let bottom = corners[2][c] * (1.0 - fx) + corners[3][c] * fx;
            let base = top * (1.0 - fy) + bottom * fy;
            let noise = rng.random_range(-amplitude..=amplitude);
            (base as i16 + noise).clamp(0, 255) as u8
        };
        *pixel = Rgb([channel(0), channel(1), channel(2)]);
    }
    image
}

/// Stable colour derived from the prompt text (FNV-1a).
fn prompt_tint(prompt: &str) -> [u8; 3] {
    let hash = prompt.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
        (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    });
    [(hash >> 16) as u8, (hash >> 8) as u8, hash as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(prompt: &str) -> InferenceParams<'_> {
        InferenceParams {
            prompt,
            negative_prompt: "",
            steps: 30,
            guidance_scale: 7.5,
            height: 64,
            width: 32,
        }
    }

    #[tokio::test]
    async fn same_seed_same_pixels() {
        let mut handle = SyntheticHandle;
        let a = handle
            .infer(&params("a red car"), &mut SeededSource::new(7))
            .await
            .unwrap();
        let b = handle
            .infer(&params("a red car"), &mut SeededSource::new(7))
            .await
            .unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[tokio::test]
    async fn output_matches_requested_dimensions() {
        let image = SyntheticHandle
            .infer(&params("p"), &mut SeededSource::new(1))
            .await
            .unwrap();
        assert_eq!(image.dimensions(), (32, 64));
    }

    #[tokio::test]
    async fn different_seeds_differ() {
        let mut handle = SyntheticHandle;
        let a = handle.infer(&params("p"), &mut SeededSource::new(1)).await.unwrap();
        let b = handle.infer(&params("p"), &mut SeededSource::new(2)).await.unwrap();
        assert_ne!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn tint_is_stable() {
        assert_eq!(prompt_tint("a red car"), prompt_tint("a red car"));
        assert_ne!(prompt_tint("a red car"), prompt_tint("a blue bus"));
    }
}
