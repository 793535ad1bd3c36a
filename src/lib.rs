pub mod chapters;
pub mod cli;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod jobs;
pub mod llm;
pub mod summarize;
pub mod transcript;

use chrono::{Local, NaiveDateTime, NaiveTime};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use commands::Pipeline;
use config::Config;
use database::{Database, NewEpisode};
use error::AppError;
use fetch::HttpFetcher;
use llm::{build_completion_service, CompletionService, UnconfiguredCompletion};

/// Install the global subscriber. `RUST_LOG` wins over the verbosity flag;
/// `log` records from the library are forwarded into it.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(cli))
}

fn build_pipeline(cli: &Cli) -> Result<Pipeline, AppError> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let mut config = Config::load(Some(config_path.as_path()))?;
    if let Some(db_path) = &cli.db {
        config.database_path = db_path.clone();
    }

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(Database::new(&config.database_path)?);
    log::info!("Database ready at {}", config.database_path.display());

    let env_dir = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let api_key = config.completion_api_key(&env_dir);

    let completion: Arc<dyn CompletionService> = match build_completion_service(&config.completion, api_key) {
        Ok(service) => service,
        Err(e) if !cli.command.needs_completion() => {
            log::debug!("Completion service unavailable: {}", e);
            Arc::new(UnconfiguredCompletion::new(e.to_string()))
        }
        Err(e) => return Err(e),
    };

    Ok(Pipeline::new(
        db,
        Arc::new(HttpFetcher::new(config.allow_list())),
        completion,
        config,
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(cli: Cli) -> Result<(), AppError> {
    let pipeline = build_pipeline(&cli)?;
    let json = cli.json;

    match cli.command {
        Commands::SyncFeed => {
            let result = commands::sync_feed(&pipeline).await?;
            if json {
                print_json(&result)?;
            } else {
                println!(
                    "{} added, {} updated, {} skipped",
                    result.added, result.updated, result.skipped
                );
            }
        }

        Commands::ListFeed => {
            let episodes = commands::list_feed(&pipeline).await?;
            if json {
                print_json(&episodes)?;
            } else {
                for ep in &episodes {
                    println!(
                        "#{:<4} {:>6.0}s  {}{}{}",
                        ep.episode_number,
                        ep.duration,
                        ep.title,
                        if ep.transcript_url.is_some() { "  [transcript]" } else { "" },
                        if ep.chapters_url.is_some() { "  [chapters]" } else { "" },
                    );
                }
            }
        }

        Commands::CreateEpisode {
            title,
            audio_url,
            number,
            duration,
            transcript_url,
            chapters_url,
            description,
        } => {
            let episode = commands::create_episode(
                &pipeline,
                &NewEpisode {
                    guid: None,
                    episode_number: number,
                    title,
                    description,
                    published_at: chrono::Utc::now().timestamp_millis(),
                    duration,
                    audio_url,
                    transcript_url,
                    chapters_url,
                },
            )?;
            if json {
                print_json(&episode)?;
            } else {
                println!("Created episode {} \"{}\"", episode.id, episode.title);
            }
        }

        Commands::SetStatus { episode_id, status } => {
            let episode = commands::set_episode_status(&pipeline, episode_id, status)?;
            if json {
                print_json(&episode)?;
            } else {
                println!("Episode {} is now {}", episode.id, episode.status);
            }
        }

        Commands::ImportTranscript { episode_id, url } => {
            let result = commands::import_transcript(&pipeline, episode_id, url.as_deref()).await?;
            if json {
                print_json(&result)?;
            } else {
                println!(
                    "Imported {} segments ({:.0}s, {} linked to chapters)",
                    result.segment_count, result.total_duration, result.segments_linked
                );
                for (speaker, count) in &result.speaker_counts {
                    println!("  {}: {}", speaker, count);
                }
                for warning in &result.warnings {
                    println!("  warning: {}", warning);
                }
            }
        }

        Commands::ImportChapters { episode_id, url } => {
            let result = commands::import_chapters(&pipeline, episode_id, url.as_deref()).await?;
            if json {
                print_json(&result)?;
            } else {
                println!(
                    "Imported {} chapters, linked {} segments",
                    result.chapter_count, result.segments_linked
                );
            }
        }

        Commands::Summarize { episode_id } => {
            let report = commands::summarize_episode(&pipeline, episode_id).await?;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "{} summarized, {} placeholders, {} failed",
                    report.summarized,
                    report.placeholders,
                    report.failed.len()
                );
                for failure in &report.failed {
                    println!("  chapter {} \"{}\": {}", failure.chapter_id, failure.title, failure.error);
                }
            }
        }

        Commands::Process { episode_id } => {
            let result = commands::process_episode(&pipeline, episode_id).await?;
            print_json(&result)?;
        }

        Commands::ClearSegments { episode_id } => {
            let deleted = commands::clear_segments(&pipeline, episode_id)?;
            println!("Deleted {} segments", deleted);
        }

        Commands::ClearChapters { episode_id } => {
            let deleted = commands::clear_chapters(&pipeline, episode_id)?;
            println!("Deleted {} chapters", deleted);
        }

        Commands::JobStatus {
            episode_id,
            job_type,
        } => {
            let report = commands::job_status(&pipeline, episode_id, job_type)?;
            if json {
                print_json(&report)?;
            } else {
                let transcript = commands::transcript_status(&pipeline, episode_id)?;
                let chapters = commands::chapter_status(&pipeline, episode_id)?;
                println!(
                    "Episode {}: {} segments ({} linked), {} chapters ({} summarized)",
                    episode_id,
                    transcript.segment_count,
                    transcript.linked_count,
                    chapters.chapter_count,
                    chapters.summarized_count
                );
                for job in &report.latest {
                    println!(
                        "  {:<22} {:<10} {:>3}%  {}",
                        job.job_type,
                        job.status,
                        job.progress,
                        job.error.as_deref().or(job.detail.as_deref()).unwrap_or("")
                    );
                }
            }
        }

        Commands::Watch { now } => {
            tokio::select! {
                _ = feed_sync_scheduler(pipeline, now) => {}
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Interrupted, stopping feed sync scheduler");
                }
            }
        }
    }

    Ok(())
}

/// Next local time at `hour`:00 strictly after `now`.
fn next_run_after(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let target_time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today_target = now.date().and_time(target_time);
    if now < today_target {
        today_target
    } else {
        today_target + chrono::Duration::days(1)
    }
}

/// Daily feed sync: runs at the configured hour, then processes every newly
/// discovered episode that has a transcript or chapters URL.
async fn feed_sync_scheduler(pipeline: Pipeline, run_now: bool) {
    let hour = pipeline.config.sync_hour;
    log::info!("Feed sync scheduler started (daily at {:02}:00)", hour);

    if run_now {
        scheduled_sync(&pipeline).await;
    }

    loop {
        let now = Local::now().naive_local();
        let next_run = next_run_after(now, hour);
        let wait_duration = (next_run - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(3600));

        log::info!(
            "Next feed sync scheduled for {} (in {:.1} hours)",
            next_run.format("%Y-%m-%d %H:%M"),
            wait_duration.as_secs_f64() / 3600.0
        );

        tokio::time::sleep(wait_duration).await;
        scheduled_sync(&pipeline).await;
    }
}

async fn scheduled_sync(pipeline: &Pipeline) {
    log::info!("Running scheduled feed sync...");

    let result = match commands::sync_feed(pipeline).await {
        Ok(result) => result,
        Err(e) => {
            log::error!("Scheduled sync failed: {}", e);
            return;
        }
    };

    log::info!(
        "Scheduled sync: {} added, {} updated",
        result.added,
        result.updated
    );

    for episode_id in result.new_episode_ids {
        let has_sources = match pipeline.db.get_episode_by_id(episode_id) {
            Ok(Some(ep)) => ep.transcript_url.is_some() || ep.chapters_url.is_some(),
            Ok(None) => false,
            Err(e) => {
                log::error!("Failed to load episode {}: {}", episode_id, e);
                false
            }
        };
        if !has_sources {
            continue;
        }

        if let Err(e) = commands::process_episode(pipeline, episode_id).await {
            log::error!("Processing new episode {} failed: {}", episode_id, e);
        }
    }
}
