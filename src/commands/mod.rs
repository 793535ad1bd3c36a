//! Externally triggered pipeline operations
//!
//! Each operation takes the shared [`Pipeline`] context. Operations that
//! import or enrich records run inside a tracked job; precondition failures
//! (unknown episode, records already present) are returned before a job
//! exists.

pub mod chapters;
pub mod episodes;
pub mod jobs;
pub mod pipeline;
pub mod summaries;
pub mod transcripts;

pub use chapters::{chapter_status, clear_chapters, import_chapters, ChapterImportResult, ChapterStatus};
pub use episodes::{create_episode, list_feed, set_episode_status, sync_feed, SyncResult};
pub use jobs::{get_job, job_status, jobs_by_status, JobStatusReport};
pub use pipeline::{process_episode, ProcessResult};
pub use summaries::summarize_episode;
pub use transcripts::{
    clear_segments, import_transcript, transcript_status, TranscriptImportResult, TranscriptStatus,
};

use std::sync::Arc;

use crate::config::Config;
use crate::database::{Database, Episode};
use crate::error::AppError;
use crate::fetch::{ContentFetcher, HostAllowList};
use crate::llm::CompletionService;
use crate::transcript::SpeakerRoster;

/// Shared state for every operation.
#[derive(Clone)]
pub struct Pipeline {
    pub db: Arc<Database>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub completion: Arc<dyn CompletionService>,
    pub config: Arc<Config>,
    allow_list: HostAllowList,
    roster: SpeakerRoster,
}

impl Pipeline {
    pub fn new(
        db: Arc<Database>,
        fetcher: Arc<dyn ContentFetcher>,
        completion: Arc<dyn CompletionService>,
        config: Config,
    ) -> Self {
        Self {
            allow_list: config.allow_list(),
            roster: config.roster(),
            db,
            fetcher,
            completion,
            config: Arc::new(config),
        }
    }

    pub fn allow_list(&self) -> &HostAllowList {
        &self.allow_list
    }

    pub fn roster(&self) -> &SpeakerRoster {
        &self.roster
    }

    fn require_episode(&self, episode_id: i64) -> Result<Episode, AppError> {
        self.db
            .get_episode_by_id(episode_id)?
            .ok_or_else(|| AppError::NotFound(format!("episode {}", episode_id)))
    }

    /// Validate `url` against the allow-list and fetch its body.
    async fn fetch_allowed(&self, url: &str) -> Result<String, AppError> {
        let url = self.allow_list.validate(url)?;
        self.fetcher.get_text(&url).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the operation tests.

    use super::*;
    use crate::database::NewEpisode;
    use crate::llm::CompletionRequest;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use url::Url;

    /// Serves canned bodies by URL and records every request.
    #[derive(Default)]
    pub struct FakeFetcher {
        pub bodies: Mutex<HashMap<String, String>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn with(self, url: &str, body: &str) -> Self {
            self.bodies
                .lock()
                .unwrap()
                .insert(url.to_string(), body.to_string());
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ContentFetcher for FakeFetcher {
        async fn get_text(&self, url: &Url) -> Result<String, AppError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.bodies
                .lock()
                .unwrap()
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| AppError::Fetch(format!("HTTP 404 Not Found: {}", url)))
        }
    }

    pub struct FixedCompletion(pub String);

    #[async_trait]
    impl CompletionService for FixedCompletion {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, AppError> {
            Ok(self.0.clone())
        }
    }

    pub const TRANSCRIPT_URL: &str = "https://share.transistor.fm/s/abc/transcript.txt";
    pub const CHAPTERS_URL: &str = "https://share.transistor.fm/s/abc/chapters.json";

    pub const TRANSCRIPT: &str = "[00:00:05] Fraser: Welcome to the show.\n\
        [00:00:40] Nabeel: Today we talk pricing.\n\
        [00:01:30] Fraser: Let's get into hiring.\n";

    pub const CHAPTERS: &str = r#"{"version": "1.2.0", "chapters": [
        {"title": "Intro", "startTime": 0, "endTime": 60},
        {"title": "Hiring", "startTime": 60, "endTime": 120}
    ]}"#;

    pub fn pipeline(fetcher: FakeFetcher) -> (TempDir, Pipeline, Arc<FakeFetcher>, i64) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::new(&dir.path().join("ops.db")).unwrap());
        let episode_id = db
            .create_episode(&NewEpisode {
                title: "Pricing".to_string(),
                episode_number: 7,
                audio_url: "https://media.transistor.fm/7.mp3".to_string(),
                duration: 120.0,
                transcript_url: Some(TRANSCRIPT_URL.to_string()),
                chapters_url: Some(CHAPTERS_URL.to_string()),
                ..Default::default()
            })
            .unwrap();
        let fetcher = Arc::new(fetcher);
        let completion = Arc::new(FixedCompletion(
            r#"{"summary": "They discuss pricing. Pricing is hard.", "semanticTags": ["saas"]}"#
                .to_string(),
        ));
        let pipeline = Pipeline::new(db, fetcher.clone(), completion, Config::default());
        (dir, pipeline, fetcher, episode_id)
    }
}
