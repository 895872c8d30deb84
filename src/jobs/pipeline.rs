//! Per-job execution: validate, fetch, tag, deliver.
//!
//! One pipeline run owns its job's state for the duration; readers only see
//! it through snapshots. Errors follow two policies, visible in
//! [`TrackOutcome`]: a malformed media path skips that track, everything
//! else aborts the job.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::error;

use crate::config::DeliveryMode;
use crate::delivery::{ArchiveBuilder, UploadClient};
use crate::fetch::MediaFetcher;
use crate::tagging::{CoverArt, ImageKind, TagWriter, TrackTags};

use super::models::{JobStatus, Manifest, TrackDescriptor};
use super::naming;
use super::table::SharedJobState;

/// Result of one track iteration. Fatal conditions are not represented
/// here; they propagate as `Err` and abort the job.
enum TrackOutcome {
    Processed,
    Skipped,
}

/// Executes jobs end-to-end against injected collaborators.
pub struct JobPipeline {
    fetcher: Arc<dyn MediaFetcher>,
    tag_writer: Arc<dyn TagWriter>,
    uploader: Option<Arc<dyn UploadClient>>,
    delivery_mode: DeliveryMode,
}

impl JobPipeline {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        tag_writer: Arc<dyn TagWriter>,
        uploader: Option<Arc<dyn UploadClient>>,
        delivery_mode: DeliveryMode,
    ) -> Self {
        Self {
            fetcher,
            tag_writer,
            uploader,
            delivery_mode,
        }
    }

    /// Run one job to completion, recording the outcome in its state.
    pub async fn process(&self, job_id: &str, manifest: &Manifest, state: &SharedJobState) {
        state.lock().unwrap().status = JobStatus::Running;

        // Preconditions are checked before any network activity.
        if self.delivery_mode == DeliveryMode::Upload && self.uploader.is_none() {
            state
                .lock()
                .unwrap()
                .fail("Upload auth headers are not configured");
            return;
        }

        if let Err(e) = self.run_job(job_id, manifest, state).await {
            error!("Unhandled error during job {}: {:#}", job_id, e);
            state.lock().unwrap().fail(format!("{:#}", e));
        }
    }

    async fn run_job(
        &self,
        job_id: &str,
        manifest: &Manifest,
        state: &SharedJobState,
    ) -> Result<()> {
        let total = manifest.tracks.len();
        {
            let mut state = state.lock().unwrap();
            state.total = total;
            state.log(format!("Starting job {} with {} tracks", job_id, total));
        }

        let cover = self.fetch_album_art(manifest, state).await?;

        let mut archive = match self.delivery_mode {
            DeliveryMode::Archive => Some(ArchiveBuilder::new()),
            DeliveryMode::Upload => None,
        };

        for (i, track) in manifest.tracks.iter().enumerate() {
            let track_num = i + 1;
            state
                .lock()
                .unwrap()
                .log(format!("Downloading track {}/{}", track_num, total));

            let outcome = self
                .process_track(manifest, track, track_num, total, &cover, &mut archive, state)
                .await?;

            if let TrackOutcome::Processed = outcome {
                state.lock().unwrap().progress = track_num;
            }
        }

        let mut state = state.lock().unwrap();
        if let Some(archive) = archive {
            if archive.is_empty() {
                state.log("No tracks were added to the archive");
            }
            let blob = archive.finish()?;
            state.log(format!("Archive finalized ({} bytes)", blob.len()));
            state.archive = Some(blob);
        }
        state.done = true;
        state.status = JobStatus::Completed;
        let msg = format!(
            "Job completed successfully (uploaded={}, progress={}/{})",
            state.uploaded, state.progress, state.total
        );
        state.log(msg);
        Ok(())
    }

    /// Fetch the optional album-art image. Its encoding is inferred from the
    /// URL extension, never from the bytes.
    async fn fetch_album_art(
        &self,
        manifest: &Manifest,
        state: &SharedJobState,
    ) -> Result<Option<CoverArt>> {
        let Some(url) = &manifest.album_art_url else {
            return Ok(None);
        };

        state
            .lock()
            .unwrap()
            .log(format!("Downloading album art: {}", url));
        let data = self
            .fetcher
            .fetch(url, None)
            .await
            .context("Failed to fetch album art")?;
        state
            .lock()
            .unwrap()
            .log(format!("Fetched album art bytes={}", data.len()));

        Ok(Some(CoverArt {
            kind: ImageKind::from_url(url),
            data,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_track(
        &self,
        manifest: &Manifest,
        track: &TrackDescriptor,
        track_num: usize,
        total: usize,
        cover: &Option<CoverArt>,
        archive: &mut Option<ArchiveBuilder>,
        state: &SharedJobState,
    ) -> Result<TrackOutcome> {
        let Some(filename) = naming::track_filename(&track.media_path) else {
            state
                .lock()
                .unwrap()
                .log(format!("Invalid m4a path: {}", track.media_path));
            return Ok(TrackOutcome::Skipped);
        };

        let url = format!("{}{}", manifest.base_url, track.media_path);
        state.lock().unwrap().log(format!("Fetching URL: {}", url));
        let data = self
            .fetcher
            .fetch(&url, Some(&manifest.cookie))
            .await
            .with_context(|| format!("Failed to fetch {}", filename))?;
        state
            .lock()
            .unwrap()
            .log(format!("Fetched bytes={} for {}", data.len(), filename));

        // Scoped to this track; the file is deleted when `temp` drops,
        // whether or not tagging and delivery succeed.
        let temp = tempfile::Builder::new()
            .suffix(".m4a")
            .tempfile()
            .context("Failed to create temp file")?;
        tokio::fs::write(temp.path(), &data)
            .await
            .context("Failed to write temp file")?;

        let (album, album_artist) = naming::split_catalogue_name(&track.album.catalogue_name)
            .ok_or_else(|| {
                anyhow!(
                    "Invalid album catalogue name: {}",
                    track.album.catalogue_name
                )
            })?;

        let tags = TrackTags {
            title: format!("{} - {}", track.work_name, track.title),
            artist: track.artist.clone(),
            album,
            album_artist,
            track_number: u16::try_from(track_num)
                .with_context(|| format!("Track number {} exceeds the MP4 atom range", track_num))?,
            total_tracks: u16::try_from(total)
                .with_context(|| format!("Track count {} exceeds the MP4 atom range", total))?,
            cover: cover.clone(),
        };

        state.lock().unwrap().log(format!("Tagging {}", filename));
        self.tag_writer
            .write(temp.path(), &tags)
            .with_context(|| format!("Failed to tag {}", filename))?;

        match archive {
            None => {
                let uploader = self
                    .uploader
                    .as_ref()
                    .ok_or_else(|| anyhow!("Upload client is not configured"))?;
                state
                    .lock()
                    .unwrap()
                    .log(format!("Uploading {} to the music service", filename));
                let result = uploader
                    .upload(temp.path())
                    .await
                    .with_context(|| format!("Failed to upload {}", filename))?;
                let mut state = state.lock().unwrap();
                state.log(format!("Upload result for {}: {}", filename, result));
                state.uploaded += 1;
            }
            Some(archive) => {
                let tagged = tokio::fs::read(temp.path())
                    .await
                    .context("Failed to read tagged file")?;
                archive.add_file(&filename, &tagged)?;
                state
                    .lock()
                    .unwrap()
                    .log(format!("Added {} to archive", filename));
            }
        }

        state.lock().unwrap().log(format!("Finished {}", filename));
        Ok(TrackOutcome::Processed)
    }
}
