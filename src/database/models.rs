use serde::{Deserialize, Serialize};

// ============================================================================
// Episodes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Draft,
    Processing,
    Published,
}

impl Default for EpisodeStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl EpisodeStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Processing => 1,
            Self::Published => 2,
        }
    }

    /// Lifecycle only moves forward: draft -> processing -> published.
    pub fn can_transition_to(self, next: EpisodeStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Processing => write!(f, "processing"),
            Self::Published => write!(f, "published"),
        }
    }
}

impl From<String> for EpisodeStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "processing" => Self::Processing,
            "published" => Self::Published,
            _ => Self::Draft,
        }
    }
}

impl std::str::FromStr for EpisodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "processing" => Ok(Self::Processing),
            "published" => Ok(Self::Published),
            other => Err(format!("Unknown episode status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub guid: Option<String>,
    pub episode_number: i64,
    pub title: String,
    pub description: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub published_at: i64,
    /// Seconds.
    pub duration: f64,
    pub audio_url: String,
    pub transcript_url: Option<String>,
    pub chapters_url: Option<String>,
    pub status: EpisodeStatus,
    pub created_at: String,
}

/// Fields supplied when an episode is created or refreshed from the feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEpisode {
    pub guid: Option<String>,
    pub episode_number: i64,
    pub title: String,
    pub description: Option<String>,
    pub published_at: i64,
    pub duration: f64,
    pub audio_url: String,
    pub transcript_url: Option<String>,
    pub chapters_url: Option<String>,
}

// ============================================================================
// Transcript segments
// ============================================================================

/// A segment as produced by the transcript parser, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSegment {
    pub speaker: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: i64,
    pub episode_id: i64,
    pub chapter_id: Option<i64>,
    pub speaker: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

// ============================================================================
// Chapters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChapter {
    pub title: String,
    pub start_time: f64,
    pub end_time: f64,
    pub order_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub episode_id: i64,
    pub title: String,
    pub start_time: f64,
    pub end_time: f64,
    pub order_index: i64,
    pub summary: Option<String>,
    pub semantic_tags: Option<Vec<String>>,
}

// ============================================================================
// Processing jobs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    TranscriptImport,
    ChapterImport,
    ChapterSummarization,
    ClipSegmentation,
    EmbeddingGeneration,
    VisualGeneration,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TranscriptImport => "transcript_import",
            Self::ChapterImport => "chapter_import",
            Self::ChapterSummarization => "chapter_summarization",
            Self::ClipSegmentation => "clip_segmentation",
            Self::EmbeddingGeneration => "embedding_generation",
            Self::VisualGeneration => "visual_generation",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcript_import" => Ok(Self::TranscriptImport),
            "chapter_import" => Ok(Self::ChapterImport),
            "chapter_summarization" => Ok(Self::ChapterSummarization),
            "clip_segmentation" => Ok(Self::ClipSegmentation),
            "embedding_generation" => Ok(Self::EmbeddingGeneration),
            "visual_generation" => Ok(Self::VisualGeneration),
            other => Err(format!("Unknown job type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// pending -> processing -> completed | failed. No state is re-entered and
    /// terminal states accept nothing. A pending job may fail before work starts.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: i64,
    pub job_type: String,
    pub episode_id: Option<i64>,
    pub chapter_id: Option<i64>,
    pub status: JobStatus,
    pub progress: i64,
    pub error: Option<String>,
    pub detail: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_transitions_are_one_directional() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Processing));
    }

    #[test]
    fn test_episode_status_moves_forward_only() {
        assert!(EpisodeStatus::Draft.can_transition_to(EpisodeStatus::Processing));
        assert!(EpisodeStatus::Processing.can_transition_to(EpisodeStatus::Published));
        assert!(!EpisodeStatus::Published.can_transition_to(EpisodeStatus::Draft));
        assert!(!EpisodeStatus::Draft.can_transition_to(EpisodeStatus::Draft));
    }

    #[test]
    fn test_job_type_round_trips_through_str() {
        let parsed: JobType = "chapter_summarization".parse().unwrap();
        assert_eq!(parsed, JobType::ChapterSummarization);
        assert!("bogus".parse::<JobType>().is_err());
    }
}
