//! Shared data types for the chunked synthesis pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded unit of text submitted to the inference engine in one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chapter this chunk belongs to (0-based)
    pub chapter_id: usize,
    /// Position within the chapter (0-based, contiguous)
    pub index: usize,
    /// The text to synthesize; may contain inline annotation markers
    pub text: String,
    /// Word count, annotation markers excluded
    pub word_count: usize,
    /// Character count, annotation markers excluded
    pub char_count: usize,
}

impl TextChunk {
    /// Short preview of the chunk text for progress display
    pub fn preview(&self) -> String {
        const MAX: usize = 80;
        if self.text.chars().count() <= MAX {
            self.text.clone()
        } else {
            let cut: String = self.text.chars().take(MAX).collect();
            format!("{cut}...")
        }
    }
}

/// Three-level hierarchical code arrays consumed by the waveform decoder
///
/// Frame `i` contributes one code to `l1`, two to `l2`, and four to `l3`,
/// so `l2.len() == 2 * l1.len()` and `l3.len() == 4 * l1.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchicalCode {
    pub l1: Vec<u32>,
    pub l2: Vec<u32>,
    pub l3: Vec<u32>,
}

impl HierarchicalCode {
    /// Number of complete frames represented
    pub fn frames(&self) -> usize {
        self.l1.len()
    }

    /// True when no frame was decoded
    pub fn is_empty(&self) -> bool {
        self.l1.is_empty()
    }

    /// Check the 1:2:4 level-length coupling
    pub fn is_well_formed(&self) -> bool {
        self.l2.len() == 2 * self.l1.len() && self.l3.len() == 4 * self.l1.len()
    }
}

/// Outcome of synthesizing one chunk
///
/// Created once by the synthesizer, immutable afterwards, consumed exactly
/// once by the assembler.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub chapter_id: usize,
    pub chunk_index: usize,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Root-mean-square amplitude of `samples`
    pub rms: f32,
    /// Attempts spent, including the successful one
    pub attempts_used: u32,
    /// False when every attempt failed the quality gate
    pub quality_ok: bool,
    /// Last engine error message, if any attempt raised one
    pub engine_error: Option<String>,
}

impl SynthesisResult {
    /// Duration of the synthesized audio in seconds
    pub fn duration_s(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Placement of one chunk on the output timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    pub chunk_index: usize,
    pub start_s: f64,
    pub end_s: f64,
}

/// Timing record for one assembled chapter
///
/// Built incrementally by the assembler; append-only; never mutated after
/// the chapter closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterTimeline {
    pub chapter_id: usize,
    pub title: String,
    pub segments: Vec<TimelineSegment>,
    pub total_duration_s: f64,
}

impl ChapterTimeline {
    /// Chapter start on the book timeline (first segment start)
    pub fn start_s(&self) -> f64 {
        self.segments.first().map(|s| s.start_s).unwrap_or(0.0)
    }

    /// Chapter end on the book timeline (last segment end)
    pub fn end_s(&self) -> f64 {
        self.segments.last().map(|s| s.end_s).unwrap_or(0.0)
    }
}

/// One chapter of input text, already free of markup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: usize,
    pub title: String,
    pub text: String,
}

impl Chapter {
    pub fn new(id: usize, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            text: text.into(),
        }
    }
}

/// Per-chunk synthesis state tracked by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Queued,
    /// Currently synthesizing; the payload is the attempt number (1-based)
    Attempting(u32),
    Delivered,
    /// All attempts failed the quality gate; delivered degraded
    Exhausted,
}

/// Job-level state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Completed,
    Cancelled,
}

/// Final result of one book conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    /// Global indices of chunks delivered with `quality_ok == false`
    pub failed_chunk_indices: Vec<usize>,
    pub cancelled: bool,
    pub chapter_timelines: Vec<ChapterTimeline>,
    pub total_duration_s: f64,
    /// Handles produced by the export sink (paths or descriptors)
    pub output_handles: Vec<String>,
}

impl JobResult {
    /// Fraction of chunks that passed the quality gate
    pub fn success_rate(&self) -> f64 {
        if self.total_chunks == 0 {
            return 1.0;
        }
        let ok = self.completed_chunks - self.failed_chunk_indices.len();
        ok as f64 / self.total_chunks as f64
    }
}
