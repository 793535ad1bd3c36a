//! Time-range linking of transcript segments to chapters.

use crate::database::{Chapter, TranscriptSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLink {
    pub segment_id: i64,
    pub chapter_id: i64,
}

/// Whether `time` falls inside the chapter's half-open `[start, end)` range.
pub fn chapter_contains(chapter: &Chapter, time: f64) -> bool {
    time >= chapter.start_time && time < chapter.end_time
}

/// Find the chapter containing `time`.
///
/// Chapter ranges are expected not to overlap. That is not checked here: if
/// they do, the first chapter in iteration order wins.
pub fn find_chapter(chapters: &[Chapter], time: f64) -> Option<&Chapter> {
    chapters.iter().find(|ch| chapter_contains(ch, time))
}

/// Assign each segment to the chapter containing its start time.
///
/// Linear scan per segment; episodes carry at most a few hundred segments.
/// Segments falling in gaps between chapters produce no link.
pub fn assign_chapters(chapters: &[Chapter], segments: &[TranscriptSegment]) -> Vec<SegmentLink> {
    segments
        .iter()
        .filter_map(|segment| {
            find_chapter(chapters, segment.start_time).map(|chapter| SegmentLink {
                segment_id: segment.id,
                chapter_id: chapter.id,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: i64, start: f64, end: f64) -> Chapter {
        Chapter {
            id,
            episode_id: 1,
            title: format!("Chapter {}", id),
            start_time: start,
            end_time: end,
            order_index: id,
            summary: None,
            semantic_tags: None,
        }
    }

    fn segment(id: i64, start: f64) -> TranscriptSegment {
        TranscriptSegment {
            id,
            episode_id: 1,
            chapter_id: None,
            speaker: "Fraser".to_string(),
            text: "words".to_string(),
            start_time: start,
            end_time: start + 5.0,
        }
    }

    #[test]
    fn test_segment_inside_single_chapter_is_linked() {
        let chapters = vec![chapter(10, 0.0, 60.0), chapter(11, 60.0, 120.0)];
        let segments = vec![segment(1, 30.0), segment(2, 75.0)];

        let links = assign_chapters(&chapters, &segments);
        assert_eq!(
            links,
            vec![
                SegmentLink { segment_id: 1, chapter_id: 10 },
                SegmentLink { segment_id: 2, chapter_id: 11 },
            ]
        );
    }

    #[test]
    fn test_chapter_end_is_exclusive() {
        let chapters = vec![chapter(10, 0.0, 60.0), chapter(11, 60.0, 120.0)];
        let links = assign_chapters(&chapters, &[segment(1, 60.0)]);
        assert_eq!(links[0].chapter_id, 11);
    }

    #[test]
    fn test_segment_in_gap_stays_unlinked() {
        let chapters = vec![chapter(10, 0.0, 60.0), chapter(11, 90.0, 120.0)];
        let links = assign_chapters(&chapters, &[segment(1, 70.0)]);
        assert!(links.is_empty());
    }

    #[test]
    fn test_no_chapters_yields_no_links() {
        let links = assign_chapters(&[], &[segment(1, 0.0), segment(2, 10.0)]);
        assert!(links.is_empty());
    }

    #[test]
    fn test_overlapping_chapters_first_match_wins() {
        let chapters = vec![chapter(10, 0.0, 100.0), chapter(11, 50.0, 150.0)];
        let links = assign_chapters(&chapters, &[segment(1, 75.0)]);
        assert_eq!(links[0].chapter_id, 10);
    }
}
