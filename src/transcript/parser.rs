//! Parser for timestamped transcripts.
//!
//! The format is free text with inline `[HH:MM:SS]` markers; each marker opens
//! a block that runs until the next marker. Lines inside a block may carry a
//! `Speaker:` label, and short label-less lines are topical dividers
//! ("Cold Open") rather than dialogue.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::speakers::SpeakerRoster;
use crate::database::ParsedSegment;

/// Gap left between a segment's end and the next marker so ranges never touch.
pub const SEGMENT_END_EPSILON: f64 = 0.001;

/// Length given to the final segment when the episode duration is unknown.
pub const FINAL_SEGMENT_FALLBACK_SECS: f64 = 30.0;

const SECTION_HEADER_MAX_CHARS: usize = 30;

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d{2}):(\d{2}):(\d{2})\]").expect("valid marker pattern"))
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[?(\d{2}):(\d{2}):(\d{2})\]?").expect("valid timestamp pattern")
    })
}

fn speaker_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z]+(?:\s+[A-Za-z]+)?):\s*").expect("valid speaker label pattern")
    })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseResult {
    pub segments: Vec<ParsedSegment>,
    pub total_duration: f64,
    pub speaker_counts: BTreeMap<String, usize>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    start: usize,
    end: usize,
    seconds: f64,
}

/// Convert `[HH:MM:SS]` (brackets optional) to seconds; 0 if it does not match.
pub fn timestamp_to_seconds(timestamp: &str) -> f64 {
    timestamp_regex()
        .captures(timestamp)
        .map(|caps| hms_to_seconds(&caps[1], &caps[2], &caps[3]))
        .unwrap_or(0.0)
}

fn hms_to_seconds(h: &str, m: &str, s: &str) -> f64 {
    let part = |v: &str| v.parse::<u32>().unwrap_or(0) as f64;
    part(h) * 3600.0 + part(m) * 60.0 + part(s)
}

/// A line of only dashes, or a short line with neither `:` nor `.`.
pub fn is_section_header(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c == '-') {
        return true;
    }
    trimmed.chars().count() < SECTION_HEADER_MAX_CHARS
        && !trimmed.contains(':')
        && !trimmed.contains('.')
}

/// Split a leading one-or-two-word `Label:` off a line.
///
/// Returns the raw label and the remaining text, trimmed.
pub fn split_speaker_label(line: &str) -> Option<(&str, &str)> {
    let caps = speaker_label_regex().captures(line)?;
    let whole = caps.get(0)?;
    let label = caps.get(1)?.as_str();
    Some((label, line[whole.end()..].trim()))
}

fn find_markers(content: &str) -> Vec<Marker> {
    marker_regex()
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Marker {
                start: whole.start(),
                end: whole.end(),
                seconds: hms_to_seconds(&caps[1], &caps[2], &caps[3]),
            })
        })
        .collect()
}

/// Read one block's lines, returning the speaker in effect afterwards and the
/// dialogue text found.
fn read_block(block: &str, speaker: String, roster: &SpeakerRoster) -> (String, Vec<String>) {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_section_header(line))
        .fold((speaker, Vec::new()), |(speaker, mut parts), line| {
            match split_speaker_label(line) {
                Some((label, rest)) => {
                    if !rest.is_empty() {
                        parts.push(rest.to_string());
                    }
                    (roster.normalize(label), parts)
                }
                None => {
                    parts.push(line.to_string());
                    (speaker, parts)
                }
            }
        })
}

/// Accumulator threaded through the block pass.
struct ParseState {
    speaker: String,
    segments: Vec<ParsedSegment>,
    speaker_counts: BTreeMap<String, usize>,
    warnings: Vec<String>,
}

impl ParseState {
    fn new(initial_speaker: String) -> Self {
        Self {
            speaker: initial_speaker,
            segments: Vec::new(),
            speaker_counts: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    fn push_block(
        self,
        block: &str,
        start_time: f64,
        end_time: f64,
        roster: &SpeakerRoster,
    ) -> Self {
        let ParseState {
            speaker,
            mut segments,
            mut speaker_counts,
            mut warnings,
        } = self;

        let (speaker, parts) = read_block(block, speaker, roster);
        if parts.is_empty() {
            return ParseState { speaker, segments, speaker_counts, warnings };
        }

        if end_time <= start_time {
            warnings.push(format!(
                "Skipped segment at {}s: invalid duration (endTime {})",
                start_time, end_time
            ));
            return ParseState { speaker, segments, speaker_counts, warnings };
        }

        if let Some(previous) = segments.last() {
            if start_time < previous.end_time {
                warnings.push(format!(
                    "Skipped segment at {}s: starts before previous segment ends ({}s)",
                    start_time, previous.end_time
                ));
                return ParseState { speaker, segments, speaker_counts, warnings };
            }
        }

        *speaker_counts.entry(speaker.clone()).or_insert(0) += 1;
        segments.push(ParsedSegment {
            speaker: speaker.clone(),
            text: parts.join(" ").trim().to_string(),
            start_time,
            end_time,
        });

        ParseState { speaker, segments, speaker_counts, warnings }
    }

    fn finish(self) -> ParseResult {
        let total_duration = self.segments.last().map(|s| s.end_time).unwrap_or(0.0);
        ParseResult {
            segments: self.segments,
            total_duration,
            speaker_counts: self.speaker_counts,
            warnings: self.warnings,
        }
    }
}

/// Parse a timestamped transcript into ordered, non-overlapping segments.
///
/// Never fails outright: malformed blocks are dropped and reported in
/// `warnings`. A document without any marker yields no segments and a warning.
pub fn parse_transcript(
    content: &str,
    episode_duration: Option<f64>,
    roster: &SpeakerRoster,
) -> ParseResult {
    let markers = find_markers(content);

    if markers.is_empty() {
        return ParseResult {
            warnings: vec!["No timestamps found in transcript".to_string()],
            ..ParseResult::default()
        };
    }

    let final_end = |start: f64| {
        episode_duration
            .filter(|d| *d > 0.0)
            .unwrap_or(start + FINAL_SEGMENT_FALLBACK_SECS)
    };

    markers
        .iter()
        .enumerate()
        .fold(ParseState::new(roster.primary()), |state, (i, marker)| {
            let next = markers.get(i + 1);
            let block_end = next.map(|n| n.start).unwrap_or(content.len());
            let block = &content[marker.end..block_end];
            let end_time = match next {
                Some(n) => n.seconds - SEGMENT_END_EPSILON,
                None => final_end(marker.seconds),
            };
            state.push_block(block, marker.seconds, end_time, roster)
        })
        .finish()
}
