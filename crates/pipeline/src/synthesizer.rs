//! Quality-gated, deterministically seeded per-chunk synthesis
//!
//! One call drives the full chunk path: prompt envelope, engine state reset,
//! token generation, hierarchical unpack, waveform decode, edge conditioning,
//! RMS gate. Failed attempts retry with a fresh deterministic seed; exhaustion
//! is a recoverable outcome, never an error.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codec::{self, ALPHABET_SIZE, CODE_TOKEN_OFFSET};
use crate::engine::{InferenceEngine, PromptEnvelope, WaveformDecoder};
use crate::PipelineError;
use bookvoice_config::{SynthesisConfig, VoiceParams};
use bookvoice_core::audio::{fade_edges, rms, trim_warmup};
use bookvoice_core::{SynthesisResult, TextChunk};

/// Called at the start of every attempt with the 1-based attempt number
pub type AttemptObserver<'a> = &'a (dyn Fn(u32) + Send + Sync);

/// Synthesizes one chunk at a time against the external collaborators
pub struct ChunkSynthesizer {
    engine: Arc<dyn InferenceEngine>,
    decoder: Arc<dyn WaveformDecoder>,
    config: SynthesisConfig,
    /// Serializes the reset+generate pair when the engine is not safe to
    /// call from multiple workers; one chunk's reset must never interleave
    /// with another chunk's generation.
    generation_lock: Mutex<()>,
}

impl ChunkSynthesizer {
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        decoder: Arc<dyn WaveformDecoder>,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            engine,
            decoder,
            config,
            generation_lock: Mutex::new(()),
        }
    }

    /// Whether the engine tolerates concurrent generation calls
    pub fn concurrency_safe(&self) -> bool {
        self.engine.concurrency_safe()
    }

    /// Whether the engine can honor the mandatory pre-generate state reset
    pub fn supports_state_reset(&self) -> bool {
        self.engine.supports_state_reset()
    }

    /// Synthesize one chunk, retrying silent or failed attempts
    ///
    /// Always returns a result; when every attempt fails the gate the last
    /// attempt's audio is returned with `quality_ok == false`.
    pub async fn synthesize(&self, chunk: &TextChunk, voice: &VoiceParams) -> SynthesisResult {
        self.synthesize_observed(chunk, voice, None).await
    }

    /// As `synthesize`, reporting each attempt start to `observer`
    pub async fn synthesize_observed(
        &self,
        chunk: &TextChunk,
        voice: &VoiceParams,
        observer: Option<AttemptObserver<'_>>,
    ) -> SynthesisResult {
        let mut last_samples: Vec<f32> = Vec::new();
        let mut last_rate = self.decoder.sample_rate();
        let mut last_rms = 0.0f32;
        let mut last_error: Option<String> = None;

        for attempt in 1..=self.config.max_attempts.max(1) {
            if let Some(observe) = observer {
                observe(attempt);
            }

            let seed = attempt_seed(&chunk.text, voice, attempt - 1);
            let envelope = PromptEnvelope {
                voice_description: voice.description.clone(),
                text: chunk.text.clone(),
                temperature: voice.temperature,
                top_p: voice.top_p,
                max_tokens: self.config.max_tokens,
                seed,
            };
            debug!(
                chunk = chunk.index,
                attempt, seed, "starting generation attempt"
            );

            match self.attempt(chunk, &envelope).await {
                Ok((samples, sample_rate, level)) => {
                    if level >= self.config.min_rms {
                        return SynthesisResult {
                            chapter_id: chunk.chapter_id,
                            chunk_index: chunk.index,
                            samples,
                            sample_rate,
                            rms: level,
                            attempts_used: attempt,
                            quality_ok: true,
                            engine_error: None,
                        };
                    }
                    warn!(
                        chunk = chunk.index,
                        attempt,
                        rms = level,
                        threshold = self.config.min_rms,
                        "audio below RMS threshold; retrying with new seed"
                    );
                    last_samples = samples;
                    last_rate = sample_rate;
                    last_rms = level;
                }
                Err(e) => {
                    warn!(chunk = chunk.index, attempt, error = %e, "generation attempt failed");
                    last_samples = Vec::new();
                    last_rate = self.decoder.sample_rate();
                    last_rms = 0.0;
                    last_error = Some(e.to_string());
                }
            }
        }

        warn!(
            chunk = chunk.index,
            attempts = self.config.max_attempts,
            "all attempts exhausted; keeping degraded chunk"
        );
        SynthesisResult {
            chapter_id: chunk.chapter_id,
            chunk_index: chunk.index,
            samples: last_samples,
            sample_rate: last_rate,
            rms: last_rms,
            attempts_used: self.config.max_attempts.max(1),
            quality_ok: false,
            engine_error: last_error,
        }
    }

    /// One attempt: reset+generate (atomic), unpack, decode, condition
    async fn attempt(
        &self,
        chunk: &TextChunk,
        envelope: &PromptEnvelope,
    ) -> Result<(Vec<f32>, u32, f32), PipelineError> {
        let tokens = if self.engine.concurrency_safe() {
            self.engine.reset_state().await?;
            self.engine.generate(envelope).await?
        } else {
            let _guard = self.generation_lock.lock().await;
            self.engine.reset_state().await?;
            self.engine.generate(envelope).await?
        };

        let outcome = codec::unpack(&tokens, CODE_TOKEN_OFFSET, ALPHABET_SIZE);
        if outcome.anomalies > 0 {
            warn!(
                chunk = chunk.index,
                anomalies = outcome.anomalies,
                frames = outcome.frames,
                "out-of-range tokens excluded during unpack"
            );
        }
        if outcome.codes.is_empty() {
            // No frame survived; report silence so the RMS gate trips
            return Ok((Vec::new(), self.decoder.sample_rate(), 0.0));
        }

        let decoded = self.decoder.decode(&outcome.codes).await?;
        let mut samples = trim_warmup(decoded.samples, self.config.trim_samples);
        fade_edges(&mut samples, self.config.fade_samples);
        let level = rms(&samples);

        debug!(
            chunk = chunk.index,
            frames = outcome.frames,
            samples = samples.len(),
            rms = level,
            "attempt decoded"
        );
        Ok((samples, decoded.sample_rate, level))
    }
}

/// Stable seed for one generation attempt
///
/// FNV-1a over the voice parameters and chunk text, with the attempt number
/// mixed in for retries. Identical inputs produce identical seeds across
/// runs and processes; each retry differs from the first attempt.
pub fn attempt_seed(text: &str, voice: &VoiceParams, attempt: u32) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    let mut feed = |bytes: &[u8]| {
        for b in bytes {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(PRIME);
        }
    };

    feed(voice.description.as_bytes());
    feed(&voice.temperature.to_bits().to_le_bytes());
    feed(&voice.top_p.to_bits().to_le_bytes());
    feed(b"\n");
    feed(text.as_bytes());
    if attempt > 0 {
        feed(b"\n");
        feed(&attempt.to_le_bytes());
    }
    hash
}
