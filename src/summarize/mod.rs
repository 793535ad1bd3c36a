//! Chapter summarization
//!
//! Chapters without a summary are processed in fixed-size groups. Every
//! chapter in a group is dispatched concurrently and the group is awaited as a
//! whole, so one failing chapter never cancels its siblings. Progress is
//! recorded after each group.

pub mod prompt;

pub use prompt::{parse_summary_response, ChapterSummary};

use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::database::{Chapter, Database, TranscriptSegment};
use crate::error::AppError;
use crate::jobs::JobHandle;
use crate::llm::{CompletionRequest, CompletionService};
use crate::transcript::build_excerpt;

pub const PLACEHOLDER_SUMMARY: &str = "No transcript available for this chapter.";

#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub show_name: String,
    pub batch_size: usize,
    pub max_transcript_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl SummarizeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            show_name: config.show_name.clone(),
            batch_size: config.summarization.batch_size.max(1),
            max_transcript_chars: config.summarization.max_transcript_chars,
            max_tokens: config.completion.max_tokens,
            temperature: config.completion.temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterFailure {
    pub chapter_id: i64,
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SummarizationReport {
    /// Chapters that lacked a summary when the run started.
    pub total: usize,
    pub summarized: usize,
    /// Chapters with no linked segments, given the placeholder summary.
    pub placeholders: usize,
    pub failed: Vec<ChapterFailure>,
}

impl SummarizationReport {
    pub fn processed(&self) -> usize {
        self.summarized + self.placeholders
    }
}

enum ChapterOutcome {
    Summarized,
    Placeholder,
}

pub struct Summarizer {
    db: Arc<Database>,
    completion: Arc<dyn CompletionService>,
    options: SummarizeOptions,
}

impl Summarizer {
    pub fn new(
        db: Arc<Database>,
        completion: Arc<dyn CompletionService>,
        options: SummarizeOptions,
    ) -> Self {
        Self {
            db,
            completion,
            options,
        }
    }

    /// Summarize every chapter of `episode_id` that has no summary yet.
    ///
    /// Per-chapter failures are logged and listed in the report and the job
    /// detail. Only failures to load the episode or its records are returned
    /// as errors.
    pub async fn summarize_episode(
        &self,
        episode_id: i64,
        job: &JobHandle,
    ) -> Result<SummarizationReport, AppError> {
        self.db
            .get_episode_by_id(episode_id)?
            .ok_or_else(|| AppError::NotFound(format!("episode {}", episode_id)))?;

        let pending: Vec<Chapter> = self
            .db
            .get_chapters_for_episode(episode_id)?
            .into_iter()
            .filter(|c| c.summary.is_none())
            .collect();

        let total = pending.len();
        let mut report = SummarizationReport {
            total,
            ..Default::default()
        };

        if total == 0 {
            log::info!("Episode {}: no chapters need summaries", episode_id);
            return Ok(report);
        }

        let mut by_chapter: HashMap<i64, Vec<TranscriptSegment>> = HashMap::new();
        for segment in self.db.get_segments_for_episode(episode_id)? {
            if let Some(chapter_id) = segment.chapter_id {
                by_chapter.entry(chapter_id).or_default().push(segment);
            }
        }

        log::info!(
            "Episode {}: summarizing {} chapters in groups of {}",
            episode_id,
            total,
            self.options.batch_size
        );

        let mut attempted = 0usize;
        for group in pending.chunks(self.options.batch_size) {
            let results = join_all(group.iter().map(|chapter| {
                let segments = by_chapter
                    .get(&chapter.id)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                self.summarize_chapter(chapter, segments)
            }))
            .await;

            for (chapter, result) in group.iter().zip(results) {
                match result {
                    Ok(ChapterOutcome::Summarized) => report.summarized += 1,
                    Ok(ChapterOutcome::Placeholder) => report.placeholders += 1,
                    Err(e) => {
                        log::error!(
                            "Failed to summarize chapter {} \"{}\" of episode {}: {}",
                            chapter.id,
                            chapter.title,
                            episode_id,
                            e
                        );
                        report.failed.push(ChapterFailure {
                            chapter_id: chapter.id,
                            title: chapter.title.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            attempted += group.len();
            job.progress(((attempted as f64 / total as f64) * 100.0).round() as i64);
        }

        if !report.failed.is_empty() {
            let list = report
                .failed
                .iter()
                .map(|f| format!("chapter {} \"{}\": {}", f.chapter_id, f.title, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            job.detail(&format!(
                "{} of {} chapters failed: {}",
                report.failed.len(),
                total,
                list
            ));
        }

        log::info!(
            "Episode {}: {} summarized, {} placeholders, {} failed",
            episode_id,
            report.summarized,
            report.placeholders,
            report.failed.len()
        );

        Ok(report)
    }

    async fn summarize_chapter(
        &self,
        chapter: &Chapter,
        segments: &[TranscriptSegment],
    ) -> Result<ChapterOutcome, AppError> {
        if segments.is_empty() {
            self.db
                .update_chapter_summary(chapter.id, PLACEHOLDER_SUMMARY, &[])?;
            return Ok(ChapterOutcome::Placeholder);
        }

        let excerpt = build_excerpt(segments, self.options.max_transcript_chars);
        if excerpt.omitted > 0 {
            log::debug!(
                "Chapter {}: excerpt omits {} of {} segments",
                chapter.id,
                excerpt.omitted,
                segments.len()
            );
        }

        let request = CompletionRequest {
            system: prompt::system_prompt(&self.options.show_name),
            user: prompt::user_prompt(&chapter.title, &excerpt.text),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            json_output: true,
        };

        let response = self.completion.complete(&request).await?;
        let parsed = parse_summary_response(&response)?;

        self.db
            .update_chapter_summary(chapter.id, &parsed.summary, &parsed.semantic_tags)?;
        Ok(ChapterOutcome::Summarized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{JobStatus, JobType, NewChapter, NewEpisode, ParsedSegment};
    use crate::jobs::run_tracked;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Answers every prompt with a fixed summary, except chapters titled "Broken".
    struct FakeCompletion {
        calls: AtomicUsize,
    }

    impl FakeCompletion {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionService for FakeCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.json_output);
            if request.user.contains("Chapter: \"Broken\"") {
                return Err(AppError::Completion("model unavailable".to_string()));
            }
            Ok("```json\n{\"summary\": \"Two sentences. Here.\", \"semanticTags\": [\"startups\", \"pricing\"]}\n```".to_string())
        }
    }

    /// Holds every call open across one yield and records how many calls are
    /// in flight together, plus the job's progress as each call starts.
    struct CountingCompletion {
        db: Arc<Database>,
        episode_id: i64,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        progress_seen: std::sync::Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl CompletionService for CountingCompletion {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, AppError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let progress = self
                .db
                .latest_job_for_episode(self.episode_id, JobType::ChapterSummarization)?
                .map(|job| job.progress)
                .unwrap_or(-1);
            self.progress_seen.lock().unwrap().push(progress);

            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(r#"{"summary": "Short.", "semanticTags": ["ai"]}"#.to_string())
        }
    }

    fn options(batch_size: usize) -> SummarizeOptions {
        SummarizeOptions {
            show_name: "Hallway Chat".to_string(),
            batch_size,
            max_transcript_chars: 12_000,
            max_tokens: 500,
            temperature: 0.3,
        }
    }

    /// Episode with one chapter per title, each 60s long with one segment inside
    /// unless `empty` lists its index.
    fn setup(titles: &[&str], empty: &[usize]) -> (TempDir, Arc<Database>, i64) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("summaries.db")).unwrap();
        let episode_id = db
            .create_episode(&NewEpisode {
                title: "Ep".to_string(),
                audio_url: "https://media.transistor.fm/1.mp3".to_string(),
                duration: 60.0 * titles.len() as f64,
                ..Default::default()
            })
            .unwrap();

        let chapters: Vec<NewChapter> = titles
            .iter()
            .enumerate()
            .map(|(i, title)| NewChapter {
                title: title.to_string(),
                start_time: i as f64 * 60.0,
                end_time: (i + 1) as f64 * 60.0,
                order_index: i as i64,
            })
            .collect();
        db.insert_chapters(episode_id, &chapters).unwrap();

        let segments: Vec<ParsedSegment> = (0..titles.len())
            .filter(|i| !empty.contains(i))
            .map(|i| ParsedSegment {
                speaker: "Fraser".to_string(),
                text: format!("Talking about topic {}.", i),
                start_time: i as f64 * 60.0 + 5.0,
                end_time: i as f64 * 60.0 + 50.0,
            })
            .collect();
        db.insert_segments(episode_id, &segments).unwrap();
        db.link_segments_to_chapters(episode_id).unwrap();

        (dir, Arc::new(db), episode_id)
    }

    async fn run(
        db: &Arc<Database>,
        completion: Arc<FakeCompletion>,
        episode_id: i64,
        batch_size: usize,
    ) -> Result<SummarizationReport, AppError> {
        let summarizer = Summarizer::new(Arc::clone(db), completion, options(batch_size));
        run_tracked(db, JobType::ChapterSummarization, Some(episode_id), |job| async move {
            summarizer.summarize_episode(episode_id, &job).await
        })
        .await
    }

    #[tokio::test]
    async fn test_one_failing_chapter_does_not_abort_batch() {
        let titles = ["Intro", "Pricing", "Broken", "Hiring", "Agents", "Design", "Outro"];
        let (_dir, db, episode_id) = setup(&titles, &[]);
        let completion = FakeCompletion::new();

        let report = run(&db, completion.clone(), episode_id, 5).await.unwrap();
        assert_eq!(report.total, 7);
        assert_eq!(report.summarized, 6);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].title, "Broken");
        assert_eq!(completion.calls.load(Ordering::SeqCst), 7);

        let chapters = db.get_chapters_for_episode(episode_id).unwrap();
        for chapter in &chapters {
            if chapter.title == "Broken" {
                assert!(chapter.summary.is_none());
                assert!(chapter.semantic_tags.is_none());
            } else {
                assert_eq!(chapter.summary.as_deref(), Some("Two sentences. Here."));
                assert_eq!(
                    chapter.semantic_tags.as_deref(),
                    Some(&["startups".to_string(), "pricing".to_string()][..])
                );
            }
        }

        let job = db
            .latest_job_for_episode(episode_id, JobType::ChapterSummarization)
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.error.is_none());
        assert!(job.detail.unwrap().contains("Broken"));
    }

    #[tokio::test]
    async fn test_groups_run_one_after_another_with_progress_between() {
        let titles = ["A", "B", "C", "D", "E", "F", "G"];
        let (_dir, db, episode_id) = setup(&titles, &[]);
        let completion = Arc::new(CountingCompletion {
            db: Arc::clone(&db),
            episode_id,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            progress_seen: std::sync::Mutex::new(Vec::new()),
        });

        let summarizer = Summarizer::new(Arc::clone(&db), completion.clone(), options(5));
        let report = run_tracked(&db, JobType::ChapterSummarization, Some(episode_id), |job| async move {
            summarizer.summarize_episode(episode_id, &job).await
        })
        .await
        .unwrap();
        assert_eq!(report.summarized, 7);

        // First group of five runs together; the second only starts after it settles
        assert_eq!(completion.peak.load(Ordering::SeqCst), 5);
        assert_eq!(
            *completion.progress_seen.lock().unwrap(),
            vec![0, 0, 0, 0, 0, 71, 71]
        );
    }

    #[tokio::test]
    async fn test_chapter_without_segments_gets_placeholder() {
        let (_dir, db, episode_id) = setup(&["Intro", "Silence"], &[1]);
        let completion = FakeCompletion::new();

        let report = run(&db, completion.clone(), episode_id, 5).await.unwrap();
        assert_eq!(report.summarized, 1);
        assert_eq!(report.placeholders, 1);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);

        let chapters = db.get_chapters_for_episode(episode_id).unwrap();
        assert_eq!(chapters[1].summary.as_deref(), Some(PLACEHOLDER_SUMMARY));
        assert_eq!(chapters[1].semantic_tags.as_deref(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_rerun_only_retries_unsummarized_chapters() {
        let (_dir, db, episode_id) = setup(&["Intro", "Broken", "Outro"], &[]);
        let completion = FakeCompletion::new();
        run(&db, completion.clone(), episode_id, 2).await.unwrap();
        assert_eq!(completion.calls.load(Ordering::SeqCst), 3);

        let report = run(&db, completion.clone(), episode_id, 2).await.unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_missing_episode_fails_job() {
        let (_dir, db, _episode_id) = setup(&["Intro"], &[]);
        let summarizer = Summarizer::new(Arc::clone(&db), FakeCompletion::new(), options(5));
        // Job is not attached to the episode: the row does not exist
        let err = run_tracked(&db, JobType::ChapterSummarization, None, |job| async move {
            summarizer.summarize_episode(999, &job).await
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let failed = db.jobs_by_status(JobStatus::Failed).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("Not found: episode 999"));
    }

    #[tokio::test]
    async fn test_no_pending_chapters_completes_immediately() {
        let (_dir, db, episode_id) = setup(&[], &[]);
        let report = run(&db, FakeCompletion::new(), episode_id, 5).await.unwrap();
        assert_eq!(report.total, 0);
        let job = db
            .latest_job_for_episode(episode_id, JobType::ChapterSummarization)
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
    }
}
