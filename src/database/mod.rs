pub mod models;


use anyhow::{anyhow, bail, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::chapters::linker;

pub use models::*;

const EPISODE_COLUMNS: &str = "id, guid, episode_number, title, description, published_at, duration,
     audio_url, transcript_url, chapters_url, status, created_at";

const SEGMENT_COLUMNS: &str = "id, episode_id, chapter_id, speaker, text, start_time, end_time";

const CHAPTER_COLUMNS: &str =
    "id, episode_id, title, start_time, end_time, order_index, summary, semantic_tags";

const JOB_COLUMNS: &str = "id, job_type, episode_id, chapter_id, status, progress, error, detail,
     started_at, completed_at";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA temp_store=MEMORY;
        ",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guid TEXT UNIQUE,
                episode_number INTEGER NOT NULL DEFAULT 0,
                title TEXT NOT NULL,
                description TEXT,
                published_at INTEGER NOT NULL,
                duration REAL NOT NULL DEFAULT 0,
                audio_url TEXT NOT NULL,
                transcript_url TEXT,
                chapters_url TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_episodes_number ON episodes(episode_number DESC);
            CREATE INDEX IF NOT EXISTS idx_episodes_audio_url ON episodes(audio_url);

            -- Chapters (curated time ranges, enriched with AI summaries)
            CREATE TABLE IF NOT EXISTS chapters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                episode_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                start_time REAL NOT NULL,
                end_time REAL NOT NULL,
                order_index INTEGER NOT NULL,
                summary TEXT,
                semantic_tags TEXT, -- JSON array of strings
                FOREIGN KEY (episode_id) REFERENCES episodes(id) ON DELETE CASCADE,
                UNIQUE(episode_id, order_index)
            );

            CREATE INDEX IF NOT EXISTS idx_chapters_episode ON chapters(episode_id, start_time);

            -- Speaker-attributed transcript slices
            CREATE TABLE IF NOT EXISTS transcript_segments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                episode_id INTEGER NOT NULL,
                chapter_id INTEGER,
                speaker TEXT NOT NULL,
                text TEXT NOT NULL,
                start_time REAL NOT NULL,
                end_time REAL NOT NULL,
                FOREIGN KEY (episode_id) REFERENCES episodes(id) ON DELETE CASCADE,
                FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE SET NULL,
                UNIQUE(episode_id, start_time)
            );

            CREATE INDEX IF NOT EXISTS idx_segments_episode ON transcript_segments(episode_id, start_time);
            CREATE INDEX IF NOT EXISTS idx_segments_chapter ON transcript_segments(chapter_id);

            -- One row per pipeline invocation
            CREATE TABLE IF NOT EXISTS processing_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_type TEXT NOT NULL,
                episode_id INTEGER,
                chapter_id INTEGER,
                status TEXT NOT NULL DEFAULT 'pending',
                progress INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                detail TEXT,
                started_at TEXT,
                completed_at TEXT,
                FOREIGN KEY (episode_id) REFERENCES episodes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_episode ON processing_jobs(episode_id, job_type);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON processing_jobs(status);
        "#,
        )?;

        Ok(())
    }

    // =========================================================================
    // Episode queries
    // =========================================================================

    pub fn create_episode(&self, episode: &NewEpisode) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO episodes (guid, episode_number, title, description, published_at, duration,
                                   audio_url, transcript_url, chapters_url, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'draft', ?10)",
            params![
                non_empty(episode.guid.as_deref()),
                episode.episode_number,
                episode.title,
                episode.description,
                episode.published_at,
                episode.duration,
                episode.audio_url,
                episode.transcript_url,
                episode.chapters_url,
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a new episode or refresh it if it exists (by guid, else by audio_url).
    ///
    /// Duration and audio location are never overwritten on refresh.
    pub fn upsert_episode(&self, episode: &NewEpisode) -> Result<(i64, bool)> {
        let guid = non_empty(episode.guid.as_deref());
        let existing_id: Option<i64> = {
            let conn = self.conn.lock().unwrap();
            let by_guid = match guid {
                Some(guid) => conn
                    .query_row(
                        "SELECT id FROM episodes WHERE guid = ?1",
                        params![guid],
                        |row| row.get(0),
                    )
                    .optional()?,
                None => None,
            };
            match by_guid {
                Some(id) => Some(id),
                None => conn
                    .query_row(
                        "SELECT id FROM episodes WHERE audio_url = ?1",
                        params![episode.audio_url],
                        |row| row.get(0),
                    )
                    .optional()?,
            }
        };

        match existing_id {
            Some(id) => {
                let conn = self.conn.lock().unwrap();
                conn.execute(
                    "UPDATE episodes SET
                        guid = COALESCE(guid, ?8),
                        episode_number = ?1,
                        title = ?2,
                        description = COALESCE(?3, description),
                        published_at = ?4,
                        transcript_url = COALESCE(?5, transcript_url),
                        chapters_url = COALESCE(?6, chapters_url)
                     WHERE id = ?7",
                    params![
                        episode.episode_number,
                        episode.title,
                        episode.description,
                        episode.published_at,
                        episode.transcript_url,
                        episode.chapters_url,
                        id,
                        guid
                    ],
                )?;
                Ok((id, false))
            }
            None => Ok((self.create_episode(episode)?, true)),
        }
    }

    pub fn get_episode_by_id(&self, id: i64) -> Result<Option<Episode>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM episodes WHERE id = ?1", EPISODE_COLUMNS);
        let episode = conn
            .query_row(&sql, params![id], episode_from_row)
            .optional()?;
        Ok(episode)
    }

    /// All episodes, newest episode number first
    pub fn list_episodes(&self) -> Result<Vec<Episode>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM episodes ORDER BY episode_number DESC, published_at DESC",
            EPISODE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let episodes = stmt
            .query_map([], episode_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(episodes)
    }

    pub fn set_episode_status(&self, episode_id: i64, status: EpisodeStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let current: String = conn
            .query_row(
                "SELECT status FROM episodes WHERE id = ?1",
                params![episode_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| anyhow!("Episode {} not found", episode_id))?;
        let current = EpisodeStatus::from(current);

        if !current.can_transition_to(status) {
            bail!(
                "Episode {} cannot move from {} to {}",
                episode_id,
                current,
                status
            );
        }

        conn.execute(
            "UPDATE episodes SET status = ?1 WHERE id = ?2",
            params![status.to_string(), episode_id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Transcript segments
    // =========================================================================

    pub fn count_segments(&self, episode_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transcript_segments WHERE episode_id = ?1",
            params![episode_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_linked_segments(&self, episode_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transcript_segments WHERE episode_id = ?1 AND chapter_id IS NOT NULL",
            params![episode_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Insert parsed segments in one transaction.
    ///
    /// The `(episode_id, start_time)` uniqueness constraint makes a racing
    /// duplicate import fail as a whole instead of interleaving rows.
    pub fn insert_segments(&self, episode_id: i64, segments: &[ParsedSegment]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transcript_segments (episode_id, speaker, text, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for segment in segments {
                stmt.execute(params![
                    episode_id,
                    segment.speaker,
                    segment.text,
                    segment.start_time,
                    segment.end_time
                ])?;
            }
        }
        tx.commit()?;
        Ok(segments.len())
    }

    pub fn get_segments_for_episode(&self, episode_id: i64) -> Result<Vec<TranscriptSegment>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM transcript_segments WHERE episode_id = ?1 ORDER BY start_time",
            SEGMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let segments = stmt
            .query_map(params![episode_id], segment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(segments)
    }

    pub fn get_segments_for_chapter(&self, chapter_id: i64) -> Result<Vec<TranscriptSegment>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM transcript_segments WHERE chapter_id = ?1 ORDER BY start_time",
            SEGMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let segments = stmt
            .query_map(params![chapter_id], segment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(segments)
    }

    /// Segment counts per speaker, used for import status reporting
    pub fn speaker_counts(&self, episode_id: i64) -> Result<BTreeMap<String, usize>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT speaker, COUNT(*) FROM transcript_segments WHERE episode_id = ?1 GROUP BY speaker",
        )?;
        let counts = stmt
            .query_map(params![episode_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(counts)
    }

    /// Delete all segments for an episode (for re-import)
    pub fn delete_segments(&self, episode_id: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM transcript_segments WHERE episode_id = ?1",
            params![episode_id],
        )?;
        Ok(deleted)
    }

    // =========================================================================
    // Chapters
    // =========================================================================

    pub fn count_chapters(&self, episode_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM chapters WHERE episode_id = ?1",
            params![episode_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn insert_chapters(&self, episode_id: i64, chapters: &[NewChapter]) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(chapters.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chapters (episode_id, title, start_time, end_time, order_index)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for chapter in chapters {
                stmt.execute(params![
                    episode_id,
                    chapter.title,
                    chapter.start_time,
                    chapter.end_time,
                    chapter.order_index
                ])?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    pub fn get_chapters_for_episode(&self, episode_id: i64) -> Result<Vec<Chapter>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM chapters WHERE episode_id = ?1 ORDER BY order_index",
            CHAPTER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let chapters = stmt
            .query_map(params![episode_id], chapter_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chapters)
    }

    pub fn get_chapter(&self, chapter_id: i64) -> Result<Option<Chapter>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM chapters WHERE id = ?1", CHAPTER_COLUMNS);
        let chapter = conn
            .query_row(&sql, params![chapter_id], chapter_from_row)
            .optional()?;
        Ok(chapter)
    }

    /// Point every segment of the episode at the chapter containing its start time.
    ///
    /// Existing links are reset first, so segments that no longer fall inside a
    /// chapter end up unlinked. Returns the number of linked segments.
    pub fn link_segments_to_chapters(&self, episode_id: i64) -> Result<usize> {
        let chapters = self.get_chapters_for_episode(episode_id)?;
        let segments = self.get_segments_for_episode(episode_id)?;
        let links = linker::assign_chapters(&chapters, &segments);

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE transcript_segments SET chapter_id = NULL WHERE episode_id = ?1",
            params![episode_id],
        )?;
        {
            let mut stmt =
                tx.prepare("UPDATE transcript_segments SET chapter_id = ?1 WHERE id = ?2")?;
            for link in &links {
                stmt.execute(params![link.chapter_id, link.segment_id])?;
            }
        }
        tx.commit()?;

        Ok(links.len())
    }

    /// Unlink every segment and delete every chapter of the episode (for re-import)
    pub fn clear_chapters(&self, episode_id: i64) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE transcript_segments SET chapter_id = NULL WHERE episode_id = ?1",
            params![episode_id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM chapters WHERE episode_id = ?1",
            params![episode_id],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Summary and tags are always written together
    pub fn update_chapter_summary(
        &self,
        chapter_id: i64,
        summary: &str,
        semantic_tags: &[String],
    ) -> Result<()> {
        let tags_json = serde_json::to_string(semantic_tags)?;
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE chapters SET summary = ?1, semantic_tags = ?2 WHERE id = ?3",
            params![summary, tags_json, chapter_id],
        )?;
        if updated == 0 {
            bail!("Chapter {} not found", chapter_id);
        }
        Ok(())
    }

    // =========================================================================
    // Processing jobs
    // =========================================================================

    pub fn create_job(
        &self,
        job_type: JobType,
        episode_id: Option<i64>,
        chapter_id: Option<i64>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO processing_jobs (job_type, episode_id, chapter_id, status, progress, started_at)
             VALUES (?1, ?2, ?3, 'pending', 0, ?4)",
            params![job_type.as_str(), episode_id, chapter_id, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_job(&self, job_id: i64) -> Result<Option<ProcessingJob>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM processing_jobs WHERE id = ?1", JOB_COLUMNS);
        let job = conn.query_row(&sql, params![job_id], job_from_row).optional()?;
        Ok(job)
    }

    pub fn mark_job_processing(&self, job_id: i64) -> Result<()> {
        self.transition_job(job_id, JobStatus::Processing, None)
    }

    pub fn mark_job_completed(&self, job_id: i64) -> Result<()> {
        self.transition_job(job_id, JobStatus::Completed, None)
    }

    pub fn mark_job_failed(&self, job_id: i64, error: &str) -> Result<()> {
        self.transition_job(job_id, JobStatus::Failed, Some(error))
    }

    fn transition_job(&self, job_id: i64, next: JobStatus, error: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let current: String = conn
            .query_row(
                "SELECT status FROM processing_jobs WHERE id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| anyhow!("Processing job {} not found", job_id))?;
        let current = JobStatus::from(current);

        if !current.can_transition_to(next) {
            bail!(
                "Processing job {} cannot move from {} to {}",
                job_id,
                current,
                next
            );
        }

        let now = chrono::Utc::now().to_rfc3339();
        match next {
            JobStatus::Processing => {
                conn.execute(
                    "UPDATE processing_jobs SET status = 'processing', started_at = ?1 WHERE id = ?2",
                    params![now, job_id],
                )?;
            }
            JobStatus::Completed => {
                conn.execute(
                    "UPDATE processing_jobs SET status = 'completed', progress = 100, completed_at = ?1
                     WHERE id = ?2",
                    params![now, job_id],
                )?;
            }
            JobStatus::Failed => {
                conn.execute(
                    "UPDATE processing_jobs SET status = 'failed', error = ?1, completed_at = ?2
                     WHERE id = ?3",
                    params![error.unwrap_or("Unknown error"), now, job_id],
                )?;
            }
            JobStatus::Pending => bail!("Processing job {} cannot return to pending", job_id),
        }

        Ok(())
    }

    /// Record progress for a running job; values are clamped and never decrease
    #[cfg(test)]
    pub(crate) fn force_job_status(&self, job_id: i64, status: JobStatus) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE processing_jobs SET status = ?1 WHERE id = ?2",
            params![status.to_string(), job_id],
        )
        .unwrap();
    }

    pub fn update_job_progress(&self, job_id: i64, progress: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE processing_jobs SET progress = MAX(progress, ?1)
             WHERE id = ?2 AND status = 'processing'",
            params![progress.clamp(0, 100), job_id],
        )?;
        Ok(())
    }

    pub fn set_job_detail(&self, job_id: i64, detail: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE processing_jobs SET detail = ?1 WHERE id = ?2",
            params![detail, job_id],
        )?;
        Ok(())
    }

    /// Latest job of a given type for an episode
    pub fn latest_job_for_episode(
        &self,
        episode_id: i64,
        job_type: JobType,
    ) -> Result<Option<ProcessingJob>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM processing_jobs WHERE episode_id = ?1 AND job_type = ?2
             ORDER BY id DESC LIMIT 1",
            JOB_COLUMNS
        );
        let job = conn
            .query_row(&sql, params![episode_id, job_type.as_str()], job_from_row)
            .optional()?;
        Ok(job)
    }

    pub fn jobs_for_episode(&self, episode_id: i64) -> Result<Vec<ProcessingJob>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM processing_jobs WHERE episode_id = ?1 ORDER BY id DESC",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![episode_id], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    pub fn jobs_by_status(&self, status: JobStatus) -> Result<Vec<ProcessingJob>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM processing_jobs WHERE status = ?1 ORDER BY id DESC",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![status.to_string()], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn episode_from_row(row: &Row<'_>) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: row.get(0)?,
        guid: row.get(1)?,
        episode_number: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        published_at: row.get(5)?,
        duration: row.get(6)?,
        audio_url: row.get(7)?,
        transcript_url: row.get(8)?,
        chapters_url: row.get(9)?,
        status: row.get::<_, String>(10)?.into(),
        created_at: row.get(11)?,
    })
}

fn segment_from_row(row: &Row<'_>) -> rusqlite::Result<TranscriptSegment> {
    Ok(TranscriptSegment {
        id: row.get(0)?,
        episode_id: row.get(1)?,
        chapter_id: row.get(2)?,
        speaker: row.get(3)?,
        text: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
    })
}

fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    let tags: Option<String> = row.get(7)?;
    Ok(Chapter {
        id: row.get(0)?,
        episode_id: row.get(1)?,
        title: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        order_index: row.get(5)?,
        summary: row.get(6)?,
        semantic_tags: tags.and_then(|t| serde_json::from_str(&t).ok()),
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessingJob> {
    Ok(ProcessingJob {
        id: row.get(0)?,
        job_type: row.get(1)?,
        episode_id: row.get(2)?,
        chapter_id: row.get(3)?,
        status: row.get::<_, String>(4)?.into(),
        progress: row.get(5)?,
        error: row.get(6)?,
        detail: row.get(7)?,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}
