//! Job tracking around pipeline operations
//!
//! Every externally triggered operation runs inside [`run_tracked`], which owns
//! the job record for that invocation: it is created pending, moved to
//! processing before the work starts, and finished exactly once.

use std::future::Future;
use std::sync::Arc;

use crate::database::{Database, JobType};
use crate::error::AppError;

/// The running job, handed to the work closure for progress reporting.
#[derive(Clone)]
pub struct JobHandle {
    db: Arc<Database>,
    id: i64,
}

impl JobHandle {
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Record cumulative progress. Failures are logged; progress is advisory.
    pub fn progress(&self, percent: i64) {
        if let Err(e) = self.db.update_job_progress(self.id, percent) {
            log::warn!("Failed to update progress for job {}: {}", self.id, e);
        }
    }

    pub fn detail(&self, detail: &str) {
        if let Err(e) = self.db.set_job_detail(self.id, detail) {
            log::warn!("Failed to set detail for job {}: {}", self.id, e);
        }
    }
}

/// Run `work` as a tracked job of `job_type`.
///
/// On success the job is marked completed; on error it is marked failed with
/// the error's message and the same error is returned to the caller.
pub async fn run_tracked<T, F, Fut>(
    db: &Arc<Database>,
    job_type: JobType,
    episode_id: Option<i64>,
    work: F,
) -> Result<T, AppError>
where
    F: FnOnce(JobHandle) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let id = db.create_job(job_type, episode_id, None)?;
    if let Err(e) = db.mark_job_processing(id) {
        return Err(fail_job(db, id, job_type, e.into()));
    }
    log::info!("Job {} ({}) started for episode {:?}", id, job_type, episode_id);

    let handle = JobHandle {
        db: Arc::clone(db),
        id,
    };

    let value = match work(handle).await {
        Ok(value) => value,
        Err(e) => return Err(fail_job(db, id, job_type, e)),
    };

    if let Err(e) = db.mark_job_completed(id) {
        return Err(fail_job(db, id, job_type, e.into()));
    }
    log::info!("Job {} ({}) completed", id, job_type);
    Ok(value)
}

/// Record `err` on the job and hand it back for the caller to return.
fn fail_job(db: &Database, id: i64, job_type: JobType, err: AppError) -> AppError {
    let message = err.to_string();
    log::error!("Job {} ({}) failed: {}", id, job_type, message);
    if let Err(record_err) = db.mark_job_failed(id, &message) {
        log::error!("Failed to record failure of job {}: {}", id, record_err);
    }
    err
}
