//! Chapters JSON document (`{ "version": ..., "chapters": [...] }`).

use serde::Deserialize;

use crate::database::NewChapter;
use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterEntry {
    #[serde(default)]
    pub title: String,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChaptersDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterEntry>,
}

impl ChaptersDocument {
    pub fn parse(body: &str) -> Result<Self, AppError> {
        serde_json::from_str(body)
            .map_err(|e| AppError::Structural(format!("Invalid chapters document: {}", e)))
    }

    /// Convert entries to chapter records, array index becoming `order_index`.
    ///
    /// A missing `endTime` is taken from the next entry's `startTime`, or from
    /// the episode duration for the final entry.
    pub fn into_chapters(self, episode_duration: Option<f64>) -> Result<Vec<NewChapter>, AppError> {
        if self.chapters.is_empty() {
            return Err(AppError::Structural(
                "No chapters found in chapters document".to_string(),
            ));
        }

        let next_starts: Vec<Option<f64>> = self
            .chapters
            .iter()
            .skip(1)
            .map(|c| Some(c.start_time))
            .chain(std::iter::once(episode_duration.filter(|d| *d > 0.0)))
            .collect();

        self.chapters
            .into_iter()
            .zip(next_starts)
            .enumerate()
            .map(|(index, (entry, next_start))| {
                let end_time = entry.end_time.or(next_start).ok_or_else(|| {
                    AppError::Structural(format!(
                        "Chapter {} (\"{}\") has no end time",
                        index, entry.title
                    ))
                })?;

                if end_time <= entry.start_time {
                    return Err(AppError::Structural(format!(
                        "Chapter {} (\"{}\") ends at {}s, not after its start {}s",
                        index, entry.title, end_time, entry.start_time
                    )));
                }

                Ok(NewChapter {
                    title: entry.title.trim().to_string(),
                    start_time: entry.start_time,
                    end_time,
                    order_index: index as i64,
                })
            })
            .collect()
    }
}
