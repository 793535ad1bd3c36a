use serde::Serialize;

use super::Pipeline;
use crate::database::{JobStatus, JobType, ProcessingJob};
use crate::error::AppError;

/// Latest job of each type for an episode, plus its full history.
#[derive(Debug, Serialize)]
pub struct JobStatusReport {
    pub episode_id: i64,
    pub latest: Vec<ProcessingJob>,
    pub history: Vec<ProcessingJob>,
}

const REPORTED_TYPES: [JobType; 3] = [
    JobType::TranscriptImport,
    JobType::ChapterImport,
    JobType::ChapterSummarization,
];

/// Poll job state for an episode, optionally narrowed to one job type.
pub fn job_status(
    pipeline: &Pipeline,
    episode_id: i64,
    job_type: Option<JobType>,
) -> Result<JobStatusReport, AppError> {
    pipeline.require_episode(episode_id)?;
    let db = &pipeline.db;

    let types: Vec<JobType> = match job_type {
        Some(t) => vec![t],
        None => REPORTED_TYPES.to_vec(),
    };

    let mut latest = Vec::new();
    for t in types {
        if let Some(job) = db.latest_job_for_episode(episode_id, t)? {
            latest.push(job);
        }
    }

    let history = db
        .jobs_for_episode(episode_id)?
        .into_iter()
        .filter(|j| job_type.map_or(true, |t| j.job_type == t.as_str()))
        .collect();

    Ok(JobStatusReport {
        episode_id,
        latest,
        history,
    })
}

pub fn get_job(pipeline: &Pipeline, job_id: i64) -> Result<ProcessingJob, AppError> {
    pipeline
        .db
        .get_job(job_id)?
        .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))
}

pub fn jobs_by_status(pipeline: &Pipeline, status: JobStatus) -> Result<Vec<ProcessingJob>, AppError> {
    Ok(pipeline.db.jobs_by_status(status)?)
}
