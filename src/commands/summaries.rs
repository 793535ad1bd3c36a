use std::sync::Arc;

use super::Pipeline;
use crate::database::JobType;
use crate::error::AppError;
use crate::jobs::run_tracked;
use crate::summarize::{SummarizationReport, SummarizeOptions, Summarizer};

/// Summarize every chapter of the episode that has no summary yet.
#[tracing::instrument(skip(pipeline))]
pub async fn summarize_episode(
    pipeline: &Pipeline,
    episode_id: i64,
) -> Result<SummarizationReport, AppError> {
    pipeline.require_episode(episode_id)?;

    let summarizer = Summarizer::new(
        Arc::clone(&pipeline.db),
        Arc::clone(&pipeline.completion),
        SummarizeOptions::from_config(&pipeline.config),
    );

    run_tracked(
        &pipeline.db,
        JobType::ChapterSummarization,
        Some(episode_id),
        |job| async move { summarizer.summarize_episode(episode_id, &job).await },
    )
    .await
}
