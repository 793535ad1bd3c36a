use serde::Serialize;
use std::collections::BTreeMap;

use super::Pipeline;
use crate::database::{JobType, ProcessingJob};
use crate::error::AppError;
use crate::jobs::run_tracked;
use crate::transcript::parse_transcript;

#[derive(Debug, Serialize)]
pub struct TranscriptImportResult {
    pub job_id: i64,
    pub segment_count: usize,
    pub speaker_counts: BTreeMap<String, usize>,
    pub total_duration: f64,
    /// Segments linked to chapters that were already imported.
    pub segments_linked: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptStatus {
    pub has_segments: bool,
    pub segment_count: i64,
    pub linked_count: i64,
    pub speaker_counts: BTreeMap<String, usize>,
    pub total_duration: f64,
    pub latest_job: Option<ProcessingJob>,
}

/// Import the transcript at `url` (or the episode's own transcript URL).
///
/// Rejected up front if the episode already has segments; clear them first.
#[tracing::instrument(skip(pipeline))]
pub async fn import_transcript(
    pipeline: &Pipeline,
    episode_id: i64,
    url: Option<&str>,
) -> Result<TranscriptImportResult, AppError> {
    let episode = pipeline.require_episode(episode_id)?;

    let existing = pipeline.db.count_segments(episode_id)?;
    if existing > 0 {
        return Err(AppError::AlreadyExists(format!(
            "Episode already has {} segments. Delete them first to re-import.",
            existing
        )));
    }

    let url = url.map(str::to_string).or(episode.transcript_url.clone());
    let duration = Some(episode.duration).filter(|d| *d > 0.0);

    run_tracked(
        &pipeline.db,
        JobType::TranscriptImport,
        Some(episode_id),
        |job| async move {
            let url = url.ok_or_else(|| {
                AppError::Validation(format!("Episode {} has no transcript URL", episode_id))
            })?;

            let content = pipeline.fetch_allowed(&url).await?;
            if content.trim().is_empty() {
                return Err(AppError::Structural("Transcript is empty".to_string()));
            }

            let parsed = parse_transcript(&content, duration, pipeline.roster());
            for warning in &parsed.warnings {
                log::warn!("Episode {} transcript: {}", episode_id, warning);
            }
            if parsed.segments.is_empty() {
                let errors = if parsed.warnings.is_empty() {
                    "Unknown".to_string()
                } else {
                    parsed.warnings.join(", ")
                };
                return Err(AppError::Structural(format!(
                    "No segments parsed. Errors: {}",
                    errors
                )));
            }
            job.progress(50);

            let inserted = pipeline.db.insert_segments(episode_id, &parsed.segments)?;
            let segments_linked = if pipeline.db.count_chapters(episode_id)? > 0 {
                pipeline.db.link_segments_to_chapters(episode_id)?
            } else {
                0
            };

            log::info!(
                "Episode {}: imported {} segments ({} linked), {:.0}s",
                episode_id,
                inserted,
                segments_linked,
                parsed.total_duration
            );

            Ok(TranscriptImportResult {
                job_id: job.id(),
                segment_count: inserted,
                speaker_counts: parsed.speaker_counts,
                total_duration: parsed.total_duration,
                segments_linked,
                warnings: parsed.warnings,
            })
        },
    )
    .await
}

/// Delete every segment of the episode so its transcript can be re-imported.
#[tracing::instrument(skip(pipeline))]
pub fn clear_segments(pipeline: &Pipeline, episode_id: i64) -> Result<usize, AppError> {
    pipeline.require_episode(episode_id)?;
    let deleted = pipeline.db.delete_segments(episode_id)?;
    log::info!("Episode {}: deleted {} segments", episode_id, deleted);
    Ok(deleted)
}

pub fn transcript_status(pipeline: &Pipeline, episode_id: i64) -> Result<TranscriptStatus, AppError> {
    pipeline.require_episode(episode_id)?;
    let db = &pipeline.db;
    let segment_count = db.count_segments(episode_id)?;
    let total_duration = db
        .get_segments_for_episode(episode_id)?
        .iter()
        .map(|s| s.end_time)
        .fold(0.0, f64::max);

    Ok(TranscriptStatus {
        has_segments: segment_count > 0,
        segment_count,
        linked_count: db.count_linked_segments(episode_id)?,
        speaker_counts: db.speaker_counts(episode_id)?,
        total_duration,
        latest_job: db.latest_job_for_episode(episode_id, JobType::TranscriptImport)?,
    })
}
