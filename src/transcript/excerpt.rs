//! Bounded transcript excerpts for prompt construction.

use crate::database::TranscriptSegment;

/// Character budget for a chapter excerpt sent to the completion service.
pub const MAX_TRANSCRIPT_CHARS: usize = 12_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub text: String,
    /// Segments that made it into `text` (fully or, for a lone oversized first
    /// line, truncated).
    pub included: usize,
    /// Trailing segments dropped once the budget was reached.
    pub omitted: usize,
}

/// Build `"{speaker}: {text}\n"` lines in start-time order until the next line
/// would exceed `budget` characters. Earliest dialogue wins over completeness.
pub fn build_excerpt(segments: &[TranscriptSegment], budget: usize) -> Excerpt {
    let mut sorted: Vec<&TranscriptSegment> = segments.iter().collect();
    sorted.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let mut text = String::new();
    let mut used = 0usize;
    let mut included = 0usize;

    for segment in &sorted {
        let line = format!("{}: {}\n", segment.speaker, segment.text);
        let line_chars = line.chars().count();

        if used + line_chars > budget {
            if included == 0 && budget > 0 {
                text = line.chars().take(budget).collect();
                included = 1;
            }
            break;
        }

        text.push_str(&line);
        used += line_chars;
        included += 1;
    }

    Excerpt {
        text,
        included,
        omitted: sorted.len() - included,
    }
}
