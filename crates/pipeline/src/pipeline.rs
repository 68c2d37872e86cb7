//! Book-level pipeline runner
//!
//! Wires chunker, coordinator, and assembler for one conversion run. The
//! engine and decoder handles are constructed once by the caller and passed
//! in; there is no implicit module-level model state.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::assembler::ChapterAssembler;
use crate::chunker::chunk_book;
use crate::coordinator::{CancelToken, PipelineJob, ProgressCallback, SynthesisCoordinator};
use crate::engine::{InferenceEngine, WaveformDecoder};
use crate::progress::ProgressTracker;
use crate::sink::AudioSink;
use crate::synthesizer::ChunkSynthesizer;
use bookvoice_config::Settings;
use bookvoice_core::error::EngineError;
use bookvoice_core::{Chapter, Error, JobResult, JobState, Result};

/// One-book conversion pipeline
///
/// Holds the collaborator handles for the lifetime of the process; each
/// `run` call owns exactly one job.
pub struct AudiobookPipeline {
    engine: Arc<dyn InferenceEngine>,
    decoder: Arc<dyn WaveformDecoder>,
    settings: Settings,
}

impl AudiobookPipeline {
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        decoder: Arc<dyn WaveformDecoder>,
        settings: Settings,
    ) -> Self {
        Self {
            engine,
            decoder,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Convert a book and stream it into `sink`
    ///
    /// Per-chunk failures are data, not errors: degraded chunks end up in
    /// `JobResult::failed_chunk_indices` and the job keeps going. Only
    /// initialization problems (an engine without state reset, a broken
    /// sink) abort the run.
    pub async fn run(
        &self,
        chapters: &[Chapter],
        sink: Box<dyn AudioSink>,
        progress: Option<ProgressCallback>,
        cancel: CancelToken,
    ) -> Result<JobResult> {
        // Without a state reset one chunk's audio bleeds into the next, a
        // known failure mode. Refuse to start rather than produce a
        // corrupted book.
        if !self.engine.supports_state_reset() {
            return Err(Error::Engine(EngineError::StateResetUnsupported));
        }

        let started_at = Utc::now();
        let chunks = chunk_book(chapters, &self.settings.chunking);
        let total = chunks.len();
        info!(chapters = chapters.len(), chunks = total, "book chunked");

        let job = Arc::new(PipelineJob::new(total, cancel));
        let synthesizer = Arc::new(ChunkSynthesizer::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.decoder),
            self.settings.synthesis.clone(),
        ));
        let coordinator = SynthesisCoordinator::new(
            synthesizer,
            self.settings.voice.clone(),
            self.settings.synthesis.workers,
        );

        let mut rx = coordinator.spawn(chunks, Arc::clone(&job), progress);
        let mut assembler =
            ChapterAssembler::new(sink, self.settings.assembly.clone(), chapters);
        let mut tracker = ProgressTracker::new(total);

        while let Some(result) = rx.recv().await {
            tracker.record(&result, "");
            assembler.push(result)?;
        }

        let output = assembler.finish()?;
        let cancelled = job.is_cancelled();
        job.set_state(if cancelled {
            JobState::Cancelled
        } else {
            JobState::Completed
        });

        let result = JobResult {
            job_id: job.id(),
            started_at,
            finished_at: Utc::now(),
            total_chunks: total,
            completed_chunks: tracker.completed(),
            failed_chunk_indices: job.failed_indices(),
            cancelled,
            chapter_timelines: output.timelines,
            total_duration_s: output.total_duration_s,
            output_handles: output.output_handles,
        };
        info!(
            job = %result.job_id,
            completed = result.completed_chunks,
            failed = result.failed_chunk_indices.len(),
            cancelled = result.cancelled,
            duration_s = result.total_duration_s,
            "job finished"
        );
        Ok(result)
    }
}
