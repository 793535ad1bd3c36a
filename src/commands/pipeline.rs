use serde::Serialize;

use super::{import_chapters, import_transcript, summarize_episode, Pipeline};
use super::{ChapterImportResult, TranscriptImportResult};
use crate::error::AppError;
use crate::summarize::SummarizationReport;

/// What `process_episode` did. `None` means the step was skipped.
#[derive(Debug, Default, Serialize)]
pub struct ProcessResult {
    pub transcript: Option<TranscriptImportResult>,
    pub chapters: Option<ChapterImportResult>,
    pub summaries: Option<SummarizationReport>,
}

/// Run every pipeline step that still applies to the episode: transcript
/// import, chapter import, then summarization of unsummarized chapters.
///
/// Steps whose records already exist, or whose source URL is unknown, are
/// skipped. The first failing step stops the run.
#[tracing::instrument(skip(pipeline))]
pub async fn process_episode(pipeline: &Pipeline, episode_id: i64) -> Result<ProcessResult, AppError> {
    let episode = pipeline.require_episode(episode_id)?;
    let db = &pipeline.db;
    let mut result = ProcessResult::default();

    if episode.transcript_url.is_some() && db.count_segments(episode_id)? == 0 {
        result.transcript = Some(import_transcript(pipeline, episode_id, None).await?);
    } else {
        log::debug!("Episode {}: transcript step skipped", episode_id);
    }

    if episode.chapters_url.is_some() && db.count_chapters(episode_id)? == 0 {
        result.chapters = Some(import_chapters(pipeline, episode_id, None).await?);
    } else {
        log::debug!("Episode {}: chapter step skipped", episode_id);
    }

    if db.count_chapters(episode_id)? > 0 {
        result.summaries = Some(summarize_episode(pipeline, episode_id).await?);
    }

    log::info!(
        "Episode {} processed: transcript={}, chapters={}, summaries={}",
        episode_id,
        result.transcript.is_some(),
        result.chapters.is_some(),
        result.summaries.is_some()
    );
    Ok(result)
}
