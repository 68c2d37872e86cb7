//! Core types for the audiobook synthesis pipeline
//!
//! This crate provides foundational types used across all other crates:
//! - Text chunk and hierarchical code types
//! - Synthesis result and chapter timeline types
//! - Error types
//! - Audio sample math (RMS, silence, fades)

pub mod audio;
pub mod error;
pub mod types;

pub use audio::{fade_edges, rms, silence, trim_warmup, AudioStats};
pub use error::{Error, Result};
pub use types::{
    Chapter, ChapterTimeline, ChunkState, HierarchicalCode, JobResult, JobState,
    SynthesisResult, TextChunk, TimelineSegment,
};
