//! Chapter documents and segment-to-chapter linking

pub mod document;
pub mod linker;

pub use document::{ChapterEntry, ChaptersDocument};
pub use linker::{assign_chapters, find_chapter, SegmentLink};
