use serde::Serialize;

use super::Pipeline;
use crate::database::{Episode, EpisodeStatus, NewEpisode};
use crate::error::AppError;
use crate::feed::{extract_episodes, FeedEpisode};

#[derive(Debug, Serialize)]
pub struct SyncResult {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Ids of episodes created by this sync, newest first.
    pub new_episode_ids: Vec<i64>,
}

/// Fetch the configured feed and return its episodes without storing them.
#[tracing::instrument(skip(pipeline))]
pub async fn list_feed(pipeline: &Pipeline) -> Result<Vec<FeedEpisode>, AppError> {
    let feed_url = &pipeline.config.feed_url;
    log::info!("Fetching RSS from: {}", feed_url);

    let body = pipeline.fetch_allowed(feed_url).await?;
    let episodes = extract_episodes(&body);

    log::info!("Parsed {} entries from RSS feed", episodes.len());
    Ok(episodes)
}

/// Upsert every feed episode as a draft (keyed by guid, else audio URL).
#[tracing::instrument(skip(pipeline))]
pub async fn sync_feed(pipeline: &Pipeline) -> Result<SyncResult, AppError> {
    let episodes = list_feed(pipeline).await?;

    let mut result = SyncResult {
        added: 0,
        updated: 0,
        skipped: 0,
        new_episode_ids: Vec::new(),
    };

    for entry in &episodes {
        // Entries without audio cannot become episodes
        if entry.audio_url.is_empty() {
            log::debug!("Skipping feed entry without enclosure: {}", entry.title);
            result.skipped += 1;
            continue;
        }

        let (id, is_new) = pipeline.db.upsert_episode(&entry.to_new_episode())?;
        if is_new {
            result.added += 1;
            result.new_episode_ids.push(id);
        } else {
            result.updated += 1;
        }
    }

    log::info!(
        "sync_feed completed: {} added, {} updated, {} skipped",
        result.added,
        result.updated,
        result.skipped
    );
    Ok(result)
}

pub fn create_episode(pipeline: &Pipeline, episode: &NewEpisode) -> Result<Episode, AppError> {
    if episode.title.trim().is_empty() {
        return Err(AppError::Validation("Episode title is required".to_string()));
    }
    if episode.audio_url.trim().is_empty() {
        return Err(AppError::Validation("Episode audio URL is required".to_string()));
    }
    if !episode.duration.is_finite() || episode.duration < 0.0 {
        return Err(AppError::Validation(format!(
            "Invalid episode duration: {}",
            episode.duration
        )));
    }

    let id = pipeline.db.create_episode(episode)?;
    log::info!("Created episode {} \"{}\"", id, episode.title);
    pipeline.require_episode(id)
}

/// Move an episode forward in its lifecycle (draft, processing, published).
pub fn set_episode_status(
    pipeline: &Pipeline,
    episode_id: i64,
    status: EpisodeStatus,
) -> Result<Episode, AppError> {
    let episode = pipeline.require_episode(episode_id)?;
    if !episode.status.can_transition_to(status) {
        return Err(AppError::Validation(format!(
            "Episode {} cannot move from {} to {}",
            episode_id, episode.status, status
        )));
    }

    pipeline.db.set_episode_status(episode_id, status)?;
    pipeline.require_episode(episode_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::*;

    const FEED_URL: &str = "https://feeds.transistor.fm/hallway-chat";

    const FEED: &str = r#"<rss><channel>
        <item>
            <title>Pricing</title>
            <itunes:episode>7</itunes:episode>
            <guid>ep-7</guid>
            <enclosure url="https://media.transistor.fm/7.mp3"/>
            <podcast:transcript url="https://share.transistor.fm/s/7/transcript.txt"/>
        </item>
        <item>
            <title>Hiring</title>
            <itunes:episode>8</itunes:episode>
            <guid>ep-8</guid>
            <enclosure url="https://media.transistor.fm/8.mp3"/>
            <itunes:duration>45:00</itunes:duration>
        </item>
        <item>
            <title>Trailer without audio</title>
        </item>
    </channel></rss>"#;

    #[tokio::test]
    async fn test_sync_feed_upserts_by_audio_then_guid() {
        let (_dir, pipeline, _fetcher, existing_id) =
            pipeline(FakeFetcher::default().with(FEED_URL, FEED));

        let first = sync_feed(&pipeline).await.unwrap();
        // Episode 7 already exists with the same audio URL and no guid
        assert_eq!(first.added, 1);
        assert_eq!(first.updated, 1);
        assert_eq!(first.skipped, 1);

        let episodes = pipeline.db.list_episodes().unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].title, "Hiring");
        assert_eq!(episodes[0].duration, 2700.0);
        assert_eq!(episodes[0].status, EpisodeStatus::Draft);
        assert_eq!(episodes[0].id, first.new_episode_ids[0]);

        // Existing duration is preserved on refresh
        let existing = pipeline.db.get_episode_by_id(existing_id).unwrap().unwrap();
        assert_eq!(existing.duration, 120.0);

        let second = sync_feed(&pipeline).await.unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.updated, 2);
    }

    #[tokio::test]
    async fn test_feed_fetch_failure_propagates() {
        let (_dir, pipeline, _fetcher, _id) = pipeline(FakeFetcher::default());
        assert!(matches!(sync_feed(&pipeline).await, Err(AppError::Fetch(_))));
    }

    #[test]
    fn test_create_episode_validates_input() {
        let (_dir, pipeline, _fetcher, _id) = pipeline(FakeFetcher::default());
        let err = create_episode(&pipeline, &NewEpisode::default()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let episode = create_episode(
            &pipeline,
            &NewEpisode {
                title: "Bonus".to_string(),
                audio_url: "https://media.transistor.fm/bonus.mp3".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(episode.status, EpisodeStatus::Draft);
    }

    #[test]
    fn test_status_only_moves_forward() {
        let (_dir, pipeline, _fetcher, id) = pipeline(FakeFetcher::default());
        let episode = set_episode_status(&pipeline, id, EpisodeStatus::Published).unwrap();
        assert_eq!(episode.status, EpisodeStatus::Published);

        let err = set_episode_status(&pipeline, id, EpisodeStatus::Draft).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
