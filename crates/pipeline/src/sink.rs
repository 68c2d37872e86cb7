//! Export sinks for assembled audio
//!
//! The assembler streams samples into an `AudioSink` as chunks are delivered;
//! a multi-hour book is never held in memory. `WavSink` is the default
//! concrete sink; container muxing (M4B and friends) lives with the export
//! collaborator outside this crate.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info};

use crate::PipelineError;
use bookvoice_core::ChapterTimeline;

/// Incremental audio export collaborator
pub trait AudioSink: Send {
    /// Append samples for a chapter; called many times per chapter
    fn write(&mut self, chapter_id: usize, samples: &[f32]) -> Result<(), PipelineError>;

    /// Close the output and hand back handles (paths or descriptors)
    fn finalize(
        &mut self,
        timelines: &[ChapterTimeline],
        total_duration_s: f64,
    ) -> Result<Vec<String>, PipelineError>;
}

/// Streams the whole book into one WAV file plus a chapter metadata sidecar
pub struct WavSink {
    path: PathBuf,
    chapters_path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavSink {
    /// Create the output file eagerly so open failures abort the job before
    /// any synthesis starts
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, PipelineError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::Sink(e.to_string()))?;
            }
        }

        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer =
            WavWriter::create(&path, spec).map_err(|e| PipelineError::Sink(e.to_string()))?;

        let chapters_path = path.with_extension("chapters.json");
        info!("WAV sink opened at {}", path.display());
        Ok(Self {
            path,
            chapters_path,
            writer: Some(writer),
        })
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, _chapter_id: usize, samples: &[f32]) -> Result<(), PipelineError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or(PipelineError::NotInitialized)?;
        for sample in samples {
            writer
                .write_sample(*sample)
                .map_err(|e| PipelineError::Sink(e.to_string()))?;
        }
        Ok(())
    }

    fn finalize(
        &mut self,
        timelines: &[ChapterTimeline],
        total_duration_s: f64,
    ) -> Result<Vec<String>, PipelineError> {
        let writer = self
            .writer
            .take()
            .ok_or(PipelineError::NotInitialized)?;
        writer
            .finalize()
            .map_err(|e| PipelineError::Sink(e.to_string()))?;

        let metadata = serde_json::json!({
            "total_duration_s": total_duration_s,
            "chapters": timelines,
        });
        let raw = serde_json::to_string_pretty(&metadata)
            .map_err(|e| PipelineError::Sink(e.to_string()))?;
        std::fs::write(&self.chapters_path, raw)
            .map_err(|e| PipelineError::Sink(e.to_string()))?;

        info!(
            chapters = timelines.len(),
            duration_s = total_duration_s,
            "WAV sink finalized at {}",
            self.path.display()
        );
        Ok(vec![
            self.path.display().to_string(),
            self.chapters_path.display().to_string(),
        ])
    }
}

/// In-memory sink for tests and dry runs
#[derive(Default)]
pub struct MemorySink {
    pub samples: Vec<f32>,
    /// (chapter_id, samples written) per write call
    pub writes: Vec<(usize, usize)>,
    pub finalized: Option<(Vec<ChapterTimeline>, f64)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, chapter_id: usize, samples: &[f32]) -> Result<(), PipelineError> {
        debug!(chapter_id, n = samples.len(), "memory sink write");
        self.samples.extend_from_slice(samples);
        self.writes.push((chapter_id, samples.len()));
        Ok(())
    }

    fn finalize(
        &mut self,
        timelines: &[ChapterTimeline],
        total_duration_s: f64,
    ) -> Result<Vec<String>, PipelineError> {
        self.finalized = Some((timelines.to_vec(), total_duration_s));
        Ok(vec![format!("memory:{}", self.samples.len())])
    }
}
