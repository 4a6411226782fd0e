//! Filesystem-backed [`RecordStore`].
//!
//! Saves stage both files as hidden temporaries, move the image into place,
//! then move the sidecar into place. Listing only sees sidecars, so a
//! record becomes visible exactly when it is complete. A crash between the
//! two renames can leave an orphaned image, which is never listed.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use dreamcanvas_core::generation::GenerationMetadata;
use dreamcanvas_core::types::Timestamp;
use image::{ImageFormat, RgbImage};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::layout;
use crate::query::{newest_first, ListFilter, RecordListing};
use crate::record::{GenerationRecord, SidecarDocument};

/// Last id handed out, used to bump the collision suffix when the clock
/// has not advanced between saves.
#[derive(Debug, Default)]
struct LastIssued {
    partition: String,
    base: String,
    seq: u32,
}

/// Paths written by [`RecordStore::export`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub image: PathBuf,
    pub sidecar: PathBuf,
}

/// Single-writer, append-only store rooted at a directory.
pub struct RecordStore {
    root: PathBuf,
    /// Serializes saves within the process (id allocation through publish).
    writer: Mutex<LastIssued>,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writer: Mutex::new(LastIssued::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist one image and its metadata as a new record.
    pub async fn save(
        &self,
        image: &RgbImage,
        metadata: &GenerationMetadata,
        preset_id: Option<&str>,
    ) -> Result<GenerationRecord, StoreError> {
        self.save_at(image, metadata, preset_id, Utc::now()).await
    }

    /// [`RecordStore::save`] with an explicit creation instant.
    pub async fn save_at(
        &self,
        image: &RgbImage,
        metadata: &GenerationMetadata,
        preset_id: Option<&str>,
        created_at: Timestamp,
    ) -> Result<GenerationRecord, StoreError> {
        let png = encode_png(image)?;

        let local = created_at.with_timezone(&Local);
        let partition = layout::partition_name(&local);
        let dir = self.root.join(&partition);

        let mut last = self.writer.lock().await;

        fs::create_dir_all(&dir)
            .await
            .map_err(StoreError::io(&dir))?;

        let base = layout::base_id(&local);
        let mut seq = if last.partition == partition && last.base == base {
            last.seq + 1
        } else {
            0
        };
        let id = loop {
            let candidate = layout::record_id(&base, seq);
            if !self.stem_taken(&dir, &candidate).await? {
                break candidate;
            }
            seq += 1;
        };

        let image_path = dir.join(layout::image_file_name(&id));
        let sidecar_path = dir.join(layout::sidecar_file_name(&id));
        let doc = SidecarDocument::new(metadata, &id, created_at, &image_path, preset_id);
        let json = serde_json::to_vec_pretty(&doc)?;

        publish(&image_path, &png, &sidecar_path, &json).await?;

        *last = LastIssued {
            partition,
            base,
            seq,
        };

        tracing::info!(
            record_id = %id,
            seed = metadata.seed,
            path = %sidecar_path.display(),
            "Generation record saved",
        );

        Ok(GenerationRecord::from_sidecar(&doc, &sidecar_path))
    }

    /// List records, newest first. Unreadable sidecars are skipped and
    /// counted in [`RecordListing::skipped`].
    pub async fn list(&self, filter: &ListFilter) -> Result<RecordListing, StoreError> {
        let partitions = match filter.partition()? {
            Some(date) => vec![self.root.join(date)],
            None => self.partitions().await?,
        };

        let mut listing = RecordListing::default();
        for dir in partitions {
            for path in sidecars_in(&dir).await? {
                match load_record(&path).await {
                    Ok(record) => {
                        if filter.matches(&record) {
                            listing.records.push(record);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable sidecar");
                        listing.skipped += 1;
                    }
                }
            }
        }

        listing.records.sort_by(newest_first);
        tracing::debug!(
            count = listing.records.len(),
            skipped = listing.skipped,
            "Listed generation records",
        );
        Ok(listing)
    }

    /// Look a record up by id across all partitions.
    pub async fn find(&self, id: &str) -> Result<Option<GenerationRecord>, StoreError> {
        let listing = self.list(&ListFilter::default()).await?;
        Ok(listing.into_iter().find(|r| r.id == id))
    }

    /// Decode the record's image artifact.
    pub async fn load_image(&self, record: &GenerationRecord) -> Result<RgbImage, StoreError> {
        let path = &record.image_path;
        let bytes = fs::read(path).await.map_err(StoreError::io(path))?;
        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .map_err(|source| StoreError::Decode {
                path: path.clone(),
                source,
            })?;
        Ok(image.to_rgb8())
    }

    /// Read the full sidecar behind a record.
    pub async fn read_sidecar(
        &self,
        record: &GenerationRecord,
    ) -> Result<SidecarDocument, StoreError> {
        read_sidecar(&record.metadata_path).await
    }

    /// Copy a record's image and sidecar into `dest_dir`.
    pub async fn export(
        &self,
        record: &GenerationRecord,
        dest_dir: &Path,
    ) -> Result<ExportedFiles, StoreError> {
        fs::create_dir_all(dest_dir)
            .await
            .map_err(StoreError::io(dest_dir))?;

        let image = dest_dir.join(layout::image_file_name(&record.id));
        let sidecar = dest_dir.join(layout::sidecar_file_name(&record.id));
        fs::copy(&record.image_path, &image)
            .await
            .map_err(StoreError::io(&record.image_path))?;
        fs::copy(&record.metadata_path, &sidecar)
            .await
            .map_err(StoreError::io(&record.metadata_path))?;

        tracing::info!(record_id = %record.id, dest = %dest_dir.display(), "Record exported");
        Ok(ExportedFiles { image, sidecar })
    }

    // ---- private helpers ----

    /// Partition directories under the root, oldest first. A missing root
    /// is an empty store.
    async fn partitions(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root)(e)),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StoreError::io(&self.root))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if is_dir && !hidden {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    async fn stem_taken(&self, dir: &Path, id: &str) -> Result<bool, StoreError> {
        for name in [layout::image_file_name(id), layout::sidecar_file_name(id)] {
            let path = dir.join(name);
            for candidate in [layout::staging_path(&path), path] {
                if fs::try_exists(&candidate)
                    .await
                    .map_err(StoreError::io(&candidate))?
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// Load a record from its sidecar path.
pub async fn load_record(sidecar_path: &Path) -> Result<GenerationRecord, StoreError> {
    let doc = read_sidecar(sidecar_path).await?;
    Ok(GenerationRecord::from_sidecar(&doc, sidecar_path))
}

async fn read_sidecar(path: &Path) -> Result<SidecarDocument, StoreError> {
    let bytes = fs::read(path).await.map_err(StoreError::io(path))?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::MalformedSidecar {
        path: path.to_path_buf(),
        source,
    })
}

/// Published sidecars in one partition, sorted by name. A missing
/// partition yields nothing.
async fn sidecars_in(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir)(e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(StoreError::io(dir))? {
        let path = entry.path();
        if layout::is_sidecar(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, StoreError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(StoreError::Encode)?;
    Ok(buf.into_inner())
}

/// Stage both files, then rename image and sidecar into place. On failure
/// every file this call may have created is removed.
async fn publish(
    image_path: &Path,
    png: &[u8],
    sidecar_path: &Path,
    json: &[u8],
) -> Result<(), StoreError> {
    let staged_image = layout::staging_path(image_path);
    let staged_sidecar = layout::staging_path(sidecar_path);

    let result = async {
        fs::write(&staged_image, png)
            .await
            .map_err(StoreError::io(&staged_image))?;
        fs::write(&staged_sidecar, json)
            .await
            .map_err(StoreError::io(&staged_sidecar))?;
        fs::rename(&staged_image, image_path)
            .await
            .map_err(StoreError::io(image_path))?;
        fs::rename(&staged_sidecar, sidecar_path)
            .await
            .map_err(StoreError::io(sidecar_path))?;
        Ok::<(), StoreError>(())
    }
    .await;

    if let Err(e) = result {
        tracing::error!(path = %sidecar_path.display(), error = %e, "Save failed, removing partial files");
        for path in [staged_image.as_path(), staged_sidecar.as_path(), image_path] {
            if let Err(cleanup) = fs::remove_file(path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove partial file");
                }
            }
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};
    use dreamcanvas_core::backend::Precision;
    use dreamcanvas_core::generation::GenerationConfig;
    use image::Rgb;

    use super::*;

    fn metadata(prompt: &str, seed: u64) -> GenerationMetadata {
        GenerationMetadata {
            prompt: prompt.to_string(),
            negative_prompt: String::new(),
            seed,
            base_seed: Some(seed),
            steps: 30,
            guidance_scale: 7.5,
            height: 512,
            width: 512,
            model_id: "sd".to_string(),
            duration_sec: 0.5,
            device: "cpu".to_string(),
            config: GenerationConfig {
                model_id: "sd".to_string(),
                num_inference_steps: 30,
                guidance_scale: 7.5,
                height: 512,
                width: 512,
                seed: Some(seed),
                precision: Precision::Auto,
            },
            variation_index: 0,
            num_images: 1,
            params_hash: String::new(),
        }
    }

    fn tiny_image() -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]))
    }

    fn at_noon(day: u32) -> Timestamp {
        Local
            .with_ymd_and_hms(2024, 6, day, 12, 0, 0)
            .single()
            .expect("unambiguous local time")
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn same_instant_saves_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let now = at_noon(1);

        let a = store.save_at(&tiny_image(), &metadata("a", 1), None, now).await.unwrap();
        let b = store.save_at(&tiny_image(), &metadata("b", 2), None, now).await.unwrap();
        let c = store.save_at(&tiny_image(), &metadata("c", 3), None, now).await.unwrap();

        assert_eq!(a.id, "120000000000");
        assert_eq!(b.id, "120000000000-001");
        assert_eq!(c.id, "120000000000-002");
        assert!(a.image_path.exists() && b.image_path.exists() && c.image_path.exists());
    }

    #[tokio::test]
    async fn existing_files_from_other_process_are_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let now = at_noon(2);
        let first = RecordStore::new(dir.path())
            .save_at(&tiny_image(), &metadata("a", 1), None, now)
            .await
            .unwrap();

        // A fresh store has no in-process memory of the first id.
        let second = RecordStore::new(dir.path())
            .save_at(&tiny_image(), &metadata("b", 2), None, now)
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.id, format!("{}-001", first.id));
    }

    #[tokio::test]
    async fn date_filter_selects_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        store.save_at(&tiny_image(), &metadata("day one", 1), None, at_noon(1)).await.unwrap();
        store.save_at(&tiny_image(), &metadata("day two", 2), None, at_noon(2)).await.unwrap();

        let listing = store.list(&ListFilter::new().date("2024-06-02")).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.records[0].prompt, "day two");

        let empty = store.list(&ListFilter::new().date("2024-06-03")).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn listing_orders_newest_first_across_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let t1 = at_noon(1);
        let t2 = t1 + Duration::days(1);
        store.save_at(&tiny_image(), &metadata("older", 1), None, t1).await.unwrap();
        store.save_at(&tiny_image(), &metadata("newer", 2), None, t2).await.unwrap();

        let listing = store.list(&ListFilter::default()).await.unwrap();
        let prompts: Vec<&str> = listing.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn staged_files_are_ignored_by_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let record = store.save_at(&tiny_image(), &metadata("a", 1), None, at_noon(3)).await.unwrap();

        let partition = record.metadata_path.parent().unwrap().to_path_buf();
        std::fs::write(partition.join(".999999999999.json.tmp"), b"{").unwrap();
        std::fs::write(partition.join("999999999999.png"), b"orphan").unwrap();

        let listing = store.list(&ListFilter::default()).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.skipped, 0);
    }

    #[tokio::test]
    async fn missing_root_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("does-not-exist"));
        let listing = store.list(&ListFilter::default()).await.unwrap();
        assert!(listing.is_empty());
        assert_eq!(listing.skipped, 0);
    }

    // -- failed saves --

    #[tokio::test]
    async fn failed_publish_removes_staged_and_published_files() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("120000000000.png");
        let sidecar_path = dir.path().join("absent").join("120000000000.json");

        let result = publish(&image_path, b"png", &sidecar_path, b"{}").await;

        assert_matches!(result, Err(StoreError::Io { .. }));
        assert!(!layout::staging_path(&image_path).exists());
        assert!(!layout::staging_path(&sidecar_path).exists());
        assert!(!image_path.exists());
    }

    #[tokio::test]
    async fn failed_sidecar_rename_unpublishes_image() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("120000000000.png");
        let sidecar_path = dir.path().join("120000000000.json");
        // A directory in the sidecar's place makes the final rename fail
        // after the image is already in place.
        std::fs::create_dir(&sidecar_path).unwrap();

        let result = publish(&image_path, b"png", &sidecar_path, b"{}").await;

        assert_matches!(result, Err(StoreError::Io { path, .. }) if path == sidecar_path);
        assert!(!image_path.exists());
        assert!(!layout::staging_path(&image_path).exists());
        assert!(!layout::staging_path(&sidecar_path).exists());
        assert!(sidecar_path.is_dir());
    }

    #[tokio::test]
    async fn failed_save_leaves_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let created_at = at_noon(4);
        let partition = layout::partition_name(&created_at.with_timezone(&Local));
        // A plain file where the partition directory should go.
        std::fs::write(dir.path().join(&partition), b"not a directory").unwrap();

        let result = store
            .save_at(&tiny_image(), &metadata("a", 1), None, created_at)
            .await;

        assert_matches!(result, Err(StoreError::Io { .. }));
        let listing = store.list(&ListFilter::default()).await.unwrap();
        assert!(listing.is_empty());
        assert_eq!(listing.skipped, 0);
    }
}
