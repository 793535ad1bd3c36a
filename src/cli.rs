//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::database::{EpisodeStatus, JobType};

#[derive(Parser, Debug)]
#[command(name = "hallway-ingest")]
#[command(version, about = "Podcast transcript and chapter ingestion pipeline", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long, global = true, env = "HALLWAY_DB")]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the feed and upsert its episodes as drafts
    SyncFeed,

    /// Fetch the feed and print its episodes without storing them
    ListFeed,

    /// Create an episode by hand
    CreateEpisode {
        #[arg(long)]
        title: String,
        #[arg(long)]
        audio_url: String,
        #[arg(long, default_value_t = 0)]
        number: i64,
        /// Duration in seconds
        #[arg(long, default_value_t = 0.0)]
        duration: f64,
        #[arg(long)]
        transcript_url: Option<String>,
        #[arg(long)]
        chapters_url: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Move an episode forward: draft, processing, published
    SetStatus {
        episode_id: i64,
        #[arg(value_parser = parse_episode_status)]
        status: EpisodeStatus,
    },

    /// Import an episode transcript
    ImportTranscript {
        episode_id: i64,
        /// Transcript URL (defaults to the episode's own)
        #[arg(long)]
        url: Option<String>,
    },

    /// Import an episode's chapters and link its segments
    ImportChapters {
        episode_id: i64,
        /// Chapters document URL (defaults to the episode's own)
        #[arg(long)]
        url: Option<String>,
    },

    /// Summarize every chapter without a summary
    Summarize { episode_id: i64 },

    /// Run transcript import, chapter import and summarization as needed
    Process { episode_id: i64 },

    /// Delete an episode's segments so the transcript can be re-imported
    ClearSegments { episode_id: i64 },

    /// Delete an episode's chapters so they can be re-imported
    ClearChapters { episode_id: i64 },

    /// Show import and summarization state for an episode
    JobStatus {
        episode_id: i64,
        /// Limit to one job type (e.g. transcript_import)
        #[arg(long, value_parser = parse_job_type)]
        job_type: Option<JobType>,
    },

    /// Sync the feed daily and process new episodes
    Watch {
        /// Run one sync immediately before waiting for the schedule
        #[arg(long)]
        now: bool,
    },
}

impl Commands {
    /// Whether the command may call the completion service.
    pub fn needs_completion(&self) -> bool {
        matches!(
            self,
            Commands::Summarize { .. } | Commands::Process { .. } | Commands::Watch { .. }
        )
    }
}

fn parse_episode_status(s: &str) -> Result<EpisodeStatus, String> {
    s.parse()
}

fn parse_job_type(s: &str) -> Result<JobType, String> {
    s.parse()
}
