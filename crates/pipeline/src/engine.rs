//! Collaborator traits for token generation and waveform decoding
//!
//! The neural engines live outside this crate. The pipeline talks to them
//! through these traits and sizes its worker pool from the capability flags.

use async_trait::async_trait;

use crate::codec::{ALPHABET_SIZE, CODE_TOKEN_OFFSET, FRAME_SLOTS};
use crate::PipelineError;
use bookvoice_core::HierarchicalCode;

/// Everything the engine needs for one generation call
#[derive(Debug, Clone, PartialEq)]
pub struct PromptEnvelope {
    /// Natural language voice description
    pub voice_description: String,
    /// Chunk text, annotation markers included
    pub text: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Top-p nucleus sampling
    pub top_p: f32,
    /// Generation budget in tokens
    pub max_tokens: usize,
    /// Deterministic sampling seed for this attempt
    pub seed: u64,
}

/// Text-to-token inference collaborator
///
/// Implementations own the prompt wire format (special tokens, tokenizer).
/// `reset_state` MUST clear any recurrent/causal cache carried over from a
/// previous call; audio from one chunk must never leak into the next.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Generate a flat audio-token stream for one prompt
    async fn generate(&self, prompt: &PromptEnvelope) -> Result<Vec<u32>, PipelineError>;

    /// Clear internal state before the next generation
    async fn reset_state(&self) -> Result<(), PipelineError>;

    /// Safe to invoke from multiple workers concurrently?
    fn concurrency_safe(&self) -> bool;

    /// Can honor the mandatory pre-generate state reset?
    ///
    /// The pipeline refuses to start a job when this is false.
    fn supports_state_reset(&self) -> bool;
}

/// Decoded waveform for one chunk
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Hierarchical-codes-to-waveform collaborator
#[async_trait]
pub trait WaveformDecoder: Send + Sync {
    /// Decode three-level codes into float samples
    async fn decode(&self, codes: &HierarchicalCode) -> Result<DecodedAudio, PipelineError>;

    /// Output sample rate of this decoder
    fn sample_rate(&self) -> u32;
}

/// Stub engine for dry runs and tests (no model required)
///
/// Emits a deterministic, seed-dependent stream of valid frame tokens sized
/// to the input text.
pub struct StubInferenceEngine {
    concurrency_safe: bool,
}

impl StubInferenceEngine {
    pub fn new(concurrency_safe: bool) -> Self {
        tracing::warn!("Using stub inference engine - output tokens are synthetic");
        Self { concurrency_safe }
    }
}

#[async_trait]
impl InferenceEngine for StubInferenceEngine {
    async fn generate(&self, prompt: &PromptEnvelope) -> Result<Vec<u32>, PipelineError> {
        // Roughly four frames per word keeps durations text-proportional
        let words = prompt.text.split_whitespace().count().max(1);
        let frames = (words * 4).min(prompt.max_tokens / FRAME_SLOTS);

        let mut tokens = Vec::with_capacity(frames * FRAME_SLOTS);
        let mut state = prompt.seed | 1;
        for _ in 0..frames * FRAME_SLOTS {
            // xorshift keeps the stream deterministic per seed
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            tokens.push(CODE_TOKEN_OFFSET + (state % (FRAME_SLOTS as u64 * ALPHABET_SIZE as u64)) as u32);
        }
        Ok(tokens)
    }

    async fn reset_state(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn concurrency_safe(&self) -> bool {
        self.concurrency_safe
    }

    fn supports_state_reset(&self) -> bool {
        true
    }
}

/// Stub decoder emitting a quiet constant tone (passes the RMS gate)
pub struct StubWaveformDecoder {
    sample_rate: u32,
    /// Samples produced per frame of codes
    hop: usize,
}

impl StubWaveformDecoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            hop: 512,
        }
    }
}

#[async_trait]
impl WaveformDecoder for StubWaveformDecoder {
    async fn decode(&self, codes: &HierarchicalCode) -> Result<DecodedAudio, PipelineError> {
        Ok(DecodedAudio {
            samples: vec![0.1; codes.frames() * self.hop],
            sample_rate: self.sample_rate,
        })
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
