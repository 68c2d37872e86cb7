//! Error types for the audiobook pipeline

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the audiobook pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Audio errors
    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    // Pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    // Engine/collaborator errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Audio-specific errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Sample rate mismatch: expected {expected}, got {got}")]
    SampleRateMismatch { expected: u32, got: u32 },

    #[error("Empty audio buffer")]
    EmptyBuffer,

    #[error("Sink error: {0}")]
    Sink(String),
}

/// Pipeline processing errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Job cancelled")]
    Cancelled,

    #[error("Pipeline not initialized")]
    NotInitialized,
}

/// Inference/decoder collaborator errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine failed to load: {0}")]
    LoadError(String),

    #[error("State reset not supported by this engine")]
    StateResetUnsupported,

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Waveform decode failed: {0}")]
    Decode(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}
