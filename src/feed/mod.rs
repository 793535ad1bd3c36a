//! Best-effort episode extraction from a podcast RSS document.
//!
//! Each `<item>` is scanned field by field with bounded tag patterns rather
//! than parsed as XML, so unexpected markup degrades a single field to its
//! default instead of failing the whole feed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::database::NewEpisode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEpisode {
    pub title: String,
    pub episode_number: i64,
    pub audio_url: String,
    pub transcript_url: Option<String>,
    pub chapters_url: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub published_at: i64,
    /// Seconds.
    pub duration: f64,
    pub description: String,
    pub guid: String,
}

impl FeedEpisode {
    pub fn to_new_episode(&self) -> NewEpisode {
        NewEpisode {
            guid: Some(self.guid.clone()).filter(|g| !g.is_empty()),
            episode_number: self.episode_number,
            title: self.title.clone(),
            description: Some(self.description.clone()).filter(|d| !d.is_empty()),
            published_at: self.published_at,
            duration: self.duration,
            audio_url: self.audio_url.clone(),
            transcript_url: self.transcript_url.clone(),
            chapters_url: self.chapters_url.clone(),
        }
    }
}

fn item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<item\b[^>]*>(.*?)</item>").expect("valid item pattern"))
}

/// Text content of the first `<tag>…</tag>`, trimmed. CDATA is unwrapped.
pub fn tag_content(xml: &str, tag: &str) -> Option<String> {
    let escaped = regex::escape(tag);
    let pattern = format!(
        r"(?is)<{tag}(?:\s[^>]*)?>\s*(?:<!\[CDATA\[(.*?)\]\]>|([^<]*))\s*</{tag}>",
        tag = escaped
    );
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(xml)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
}

/// Value of `attr` on the first `<tag …>` element.
pub fn tag_attribute(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let pattern = format!(
        r#"(?i)<{tag}\b[^>]*\b{attr}="([^"]*)""#,
        tag = regex::escape(tag),
        attr = regex::escape(attr)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(xml).map(|caps| caps[1].to_string())
}

/// Parse `3600`, `MM:SS` or `HH:MM:SS` into seconds. Anything else is 0.
pub fn parse_duration(value: &str) -> f64 {
    let value = value.trim();
    if value.contains(':') {
        let parts: Option<Vec<u64>> = value.split(':').map(|p| p.trim().parse().ok()).collect();
        let seconds = match parts.as_deref() {
            Some([h, m, s]) => h
                .checked_mul(3600)
                .and_then(|h| m.checked_mul(60).and_then(|m| h.checked_add(m)))
                .and_then(|hm| hm.checked_add(*s)),
            Some([m, s]) => m.checked_mul(60).and_then(|m| m.checked_add(*s)),
            _ => None,
        };
        return seconds.map_or(0.0, |s| s as f64);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(f64::trunc)
        .unwrap_or(0.0)
}

fn parse_leading_int(value: &str) -> i64 {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// RFC 2822 (the RSS norm), then RFC 3339; missing or unreadable dates are "now".
fn parse_pub_date(value: Option<&str>) -> i64 {
    value
        .and_then(|v| {
            chrono::DateTime::parse_from_rfc2822(v)
                .or_else(|_| chrono::DateTime::parse_from_rfc3339(v))
                .ok()
        })
        .map(|d| d.timestamp_millis())
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
}

fn parse_item(item: &str) -> Option<FeedEpisode> {
    let title = tag_content(item, "title").filter(|t| !t.is_empty())?;

    let episode_number = tag_content(item, "itunes:episode")
        .or_else(|| tag_content(item, "podcast:episode"))
        .map(|n| parse_leading_int(&n))
        .unwrap_or(0);

    let duration = tag_content(item, "itunes:duration")
        .map(|d| parse_duration(&d))
        .unwrap_or(0.0);

    let description = tag_content(item, "description")
        .filter(|d| !d.is_empty())
        .or_else(|| tag_content(item, "itunes:summary"))
        .unwrap_or_default();

    Some(FeedEpisode {
        title,
        episode_number,
        audio_url: tag_attribute(item, "enclosure", "url").unwrap_or_default(),
        transcript_url: tag_attribute(item, "podcast:transcript", "url"),
        chapters_url: tag_attribute(item, "podcast:chapters", "url"),
        published_at: parse_pub_date(tag_content(item, "pubDate").as_deref()),
        duration,
        description,
        guid: tag_content(item, "guid").unwrap_or_default(),
    })
}

/// Extract every titled `<item>` from a feed document, highest episode number first.
pub fn extract_episodes(xml: &str) -> Vec<FeedEpisode> {
    let mut episodes: Vec<FeedEpisode> = item_regex()
        .captures_iter(xml)
        .filter_map(|caps| parse_item(caps.get(1)?.as_str()))
        .collect();

    episodes.sort_by(|a, b| b.episode_number.cmp(&a.episode_number));
    episodes
}
