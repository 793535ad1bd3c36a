//! Transcript parsing, speaker normalization and prompt excerpts

pub mod excerpt;
pub mod parser;
pub mod speakers;

pub use excerpt::{build_excerpt, Excerpt, MAX_TRANSCRIPT_CHARS};
pub use parser::{parse_transcript, ParseResult};
pub use speakers::{Host, SpeakerRoster};
