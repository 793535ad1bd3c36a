use serde::Serialize;

use super::Pipeline;
use crate::chapters::ChaptersDocument;
use crate::database::{Chapter, JobType, ProcessingJob};
use crate::error::AppError;
use crate::jobs::run_tracked;

#[derive(Debug, Serialize)]
pub struct ChapterImportResult {
    pub job_id: i64,
    pub chapter_count: usize,
    pub chapters: Vec<String>,
    pub segments_linked: usize,
}

#[derive(Debug, Serialize)]
pub struct ChapterStatus {
    pub chapter_count: usize,
    pub summarized_count: usize,
    pub linked_segments: i64,
    pub chapters: Vec<Chapter>,
    pub latest_import_job: Option<ProcessingJob>,
    pub latest_summary_job: Option<ProcessingJob>,
}

/// Import the chapters document at `url` (or the episode's chapters URL) and
/// link existing segments to the new chapters.
#[tracing::instrument(skip(pipeline))]
pub async fn import_chapters(
    pipeline: &Pipeline,
    episode_id: i64,
    url: Option<&str>,
) -> Result<ChapterImportResult, AppError> {
    let episode = pipeline.require_episode(episode_id)?;

    let existing = pipeline.db.count_chapters(episode_id)?;
    if existing > 0 {
        return Err(AppError::AlreadyExists(format!(
            "Episode already has {} chapters. Delete them first to re-import.",
            existing
        )));
    }

    let url = url.map(str::to_string).or(episode.chapters_url.clone());
    let duration = Some(episode.duration).filter(|d| *d > 0.0);

    run_tracked(
        &pipeline.db,
        JobType::ChapterImport,
        Some(episode_id),
        |job| async move {
            let url = url.ok_or_else(|| {
                AppError::Validation(format!("Episode {} has no chapters URL", episode_id))
            })?;

            let body = pipeline.fetch_allowed(&url).await?;
            let chapters = ChaptersDocument::parse(&body)?.into_chapters(duration)?;
            let titles: Vec<String> = chapters.iter().map(|c| c.title.clone()).collect();

            pipeline.db.insert_chapters(episode_id, &chapters)?;
            job.progress(50);
            let segments_linked = pipeline.db.link_segments_to_chapters(episode_id)?;

            log::info!(
                "Episode {}: imported {} chapters, linked {} segments",
                episode_id,
                chapters.len(),
                segments_linked
            );

            Ok(ChapterImportResult {
                job_id: job.id(),
                chapter_count: chapters.len(),
                chapters: titles,
                segments_linked,
            })
        },
    )
    .await
}

/// Unlink all segments and delete all chapters so chapters can be re-imported.
#[tracing::instrument(skip(pipeline))]
pub fn clear_chapters(pipeline: &Pipeline, episode_id: i64) -> Result<usize, AppError> {
    pipeline.require_episode(episode_id)?;
    let deleted = pipeline.db.clear_chapters(episode_id)?;
    log::info!("Episode {}: deleted {} chapters", episode_id, deleted);
    Ok(deleted)
}

pub fn chapter_status(pipeline: &Pipeline, episode_id: i64) -> Result<ChapterStatus, AppError> {
    pipeline.require_episode(episode_id)?;
    let db = &pipeline.db;
    let chapters = db.get_chapters_for_episode(episode_id)?;

    Ok(ChapterStatus {
        chapter_count: chapters.len(),
        summarized_count: chapters.iter().filter(|c| c.summary.is_some()).count(),
        linked_segments: db.count_linked_segments(episode_id)?,
        chapters,
        latest_import_job: db.latest_job_for_episode(episode_id, JobType::ChapterImport)?,
        latest_summary_job: db
            .latest_job_for_episode(episode_id, JobType::ChapterSummarization)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::*;
    use crate::commands::{clear_segments, import_transcript};
    use crate::database::JobStatus;

    fn fetcher() -> FakeFetcher {
        FakeFetcher::default()
            .with(TRANSCRIPT_URL, TRANSCRIPT)
            .with(CHAPTERS_URL, CHAPTERS)
    }

    #[tokio::test]
    async fn test_import_links_existing_segments() {
        let (_dir, pipeline, _fetcher, episode_id) = pipeline(fetcher());
        import_transcript(&pipeline, episode_id, None).await.unwrap();

        let result = import_chapters(&pipeline, episode_id, None).await.unwrap();
        assert_eq!(result.chapter_count, 2);
        assert_eq!(result.chapters, vec!["Intro", "Hiring"]);
        assert_eq!(result.segments_linked, 3);

        let chapters = pipeline.db.get_chapters_for_episode(episode_id).unwrap();
        let intro = pipeline.db.get_segments_for_chapter(chapters[0].id).unwrap();
        let hiring = pipeline.db.get_segments_for_chapter(chapters[1].id).unwrap();
        assert_eq!(intro.len(), 2);
        assert_eq!(hiring.len(), 1);
        assert_eq!(hiring[0].speaker, "Fraser");
    }

    #[tokio::test]
    async fn test_transcript_after_chapters_is_linked() {
        let (_dir, pipeline, _fetcher, episode_id) = pipeline(fetcher());
        let chapters = import_chapters(&pipeline, episode_id, None).await.unwrap();
        assert_eq!(chapters.segments_linked, 0);

        let transcript = import_transcript(&pipeline, episode_id, None).await.unwrap();
        assert_eq!(transcript.segments_linked, 3);
    }

    #[tokio::test]
    async fn test_clear_then_reimport() {
        let (_dir, pipeline, _fetcher, episode_id) = pipeline(fetcher());
        import_transcript(&pipeline, episode_id, None).await.unwrap();
        import_chapters(&pipeline, episode_id, None).await.unwrap();

        let err = import_chapters(&pipeline, episode_id, None).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(msg) if msg.contains("2 chapters")));

        assert_eq!(clear_chapters(&pipeline, episode_id).unwrap(), 2);
        let status = chapter_status(&pipeline, episode_id).unwrap();
        assert_eq!(status.chapter_count, 0);
        assert_eq!(status.linked_segments, 0);

        let again = import_chapters(&pipeline, episode_id, None).await.unwrap();
        assert_eq!(again.segments_linked, 3);

        assert_eq!(clear_segments(&pipeline, episode_id).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_chapters_document_fails_job() {
        let (_dir, pipeline, _fetcher, episode_id) = pipeline(
            FakeFetcher::default().with(CHAPTERS_URL, r#"{"version": "1.2.0", "chapters": []}"#),
        );
        let err = import_chapters(&pipeline, episode_id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Structural(_)));

        let status = chapter_status(&pipeline, episode_id).unwrap();
        let job = status.latest_import_job.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("No chapters found in chapters document"));
    }

    #[tokio::test]
    async fn test_wrong_scheme_rejected_before_fetch() {
        let (_dir, pipeline, fetcher, episode_id) = pipeline(fetcher());
        let err = import_chapters(
            &pipeline,
            episode_id,
            Some("http://share.transistor.fm/s/abc/chapters.json"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(fetcher.request_count(), 0);
    }
}
