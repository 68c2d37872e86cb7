//! Chunked audiobook synthesis pipeline
//!
//! This crate provides the core conversion pipeline:
//! - Dual-constraint text chunking (word and character limits)
//! - Hierarchical audio-token codec (7-slot frame unpacking)
//! - Quality-gated, deterministically seeded per-chunk synthesis
//! - Ordered delivery despite parallel completion (reorder buffer)
//! - Incremental chapter assembly with timeline tracking

pub mod assembler;
pub mod chunker;
pub mod codec;
pub mod coordinator;
pub mod engine;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod synthesizer;

// Chunker exports
pub use chunker::{chunk_book, chunk_chapter};

// Codec exports
pub use codec::{unpack, UnpackOutcome, ALPHABET_SIZE, CODE_TOKEN_OFFSET, FRAME_SLOTS};

// Collaborator trait exports
pub use engine::{
    DecodedAudio, InferenceEngine, PromptEnvelope, StubInferenceEngine, StubWaveformDecoder,
    WaveformDecoder,
};

// Synthesis exports
pub use synthesizer::ChunkSynthesizer;

// Coordination exports
pub use coordinator::{CancelToken, PipelineJob, ProgressCallback, SynthesisCoordinator};

// Assembly exports
pub use assembler::{AssemblyOutput, ChapterAssembler};
pub use sink::{AudioSink, MemorySink, WavSink};

// Runner exports
pub use pipeline::AudiobookPipeline;
pub use progress::{ProgressSnapshot, ProgressTracker};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Job cancelled")]
    Cancelled,

    #[error("Engine does not support state reset")]
    StateResetUnsupported,

    #[error("Not initialized")]
    NotInitialized,
}

impl From<PipelineError> for bookvoice_core::Error {
    fn from(err: PipelineError) -> Self {
        use bookvoice_core::error::PipelineError as CorePipelineError;
        let inner = match &err {
            PipelineError::Assembly(msg) | PipelineError::Sink(msg) => {
                CorePipelineError::Assembly(msg.clone())
            }
            PipelineError::ChannelClosed => CorePipelineError::ChannelClosed,
            PipelineError::Cancelled => CorePipelineError::Cancelled,
            PipelineError::NotInitialized => CorePipelineError::NotInitialized,
            _ => CorePipelineError::Synthesis(err.to_string()),
        };
        bookvoice_core::Error::Pipeline(inner)
    }
}
