//! Pipeline settings with serde defaults

use bookvoice_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Top-level settings for one conversion run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Text chunking limits
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Per-chunk synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Chapter assembly configuration
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// Narrator voice parameters
    #[serde(default)]
    pub voice: VoiceParams,
}

impl Settings {
    /// Load settings from `bookvoice.toml` (optional) and `BOOKVOICE_*`
    /// environment variables (e.g. `BOOKVOICE_SYNTHESIS__MAX_ATTEMPTS=5`).
    pub fn load() -> Result<Self> {
        Self::load_from("bookvoice")
    }

    /// Load settings from a named config file base (without extension)
    pub fn load_from(name: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix("BOOKVOICE").separator("__"))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        cfg.try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

/// Dual-constraint chunking limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum words per chunk (annotation markers excluded)
    #[serde(default = "default_max_words")]
    pub max_words: usize,

    /// Maximum characters per chunk (annotation markers excluded)
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_max_words() -> usize {
    70
}
fn default_max_chars() -> usize {
    1200
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            max_chars: default_max_chars(),
        }
    }
}

/// Per-chunk synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Maximum tokens to generate per chunk
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Attempts per chunk before giving up (quality gate + engine errors)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// RMS below this marks an attempt as silent/failed
    #[serde(default = "default_min_rms")]
    pub min_rms: f32,

    /// Codec warmup samples trimmed from the start of each chunk
    #[serde(default = "default_trim_samples")]
    pub trim_samples: usize,

    /// Fade ramp length applied to chunk edges, in samples
    #[serde(default = "default_fade_samples")]
    pub fade_samples: usize,

    /// Worker pool size when the engine is concurrency-safe
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_max_tokens() -> usize {
    2500
}
fn default_max_attempts() -> u32 {
    3
}
fn default_min_rms() -> f32 {
    1e-3
}
fn default_trim_samples() -> usize {
    512
}
fn default_fade_samples() -> usize {
    320
}
fn default_workers() -> usize {
    2
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            max_attempts: default_max_attempts(),
            min_rms: default_min_rms(),
            trim_samples: default_trim_samples(),
            fade_samples: default_fade_samples(),
            workers: default_workers(),
        }
    }
}

/// Chapter assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Silence between chunks within a chapter, in seconds
    #[serde(default = "default_chunk_gap")]
    pub chunk_gap_s: f64,

    /// Silence between chapters, in seconds
    #[serde(default = "default_chapter_gap")]
    pub chapter_gap_s: f64,

    /// Output sample rate; every decoded chunk must match
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_chunk_gap() -> f64 {
    0.25
}
fn default_chapter_gap() -> f64 {
    2.0
}
fn default_sample_rate() -> u32 {
    24000
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            chunk_gap_s: default_chunk_gap(),
            chapter_gap_s: default_chapter_gap(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Narrator voice parameters passed to the inference engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceParams {
    /// Natural language voice description
    #[serde(default = "default_voice_description")]
    pub description: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_voice_description() -> String {
    "A female speaker with a warm, calm, and clear voice, delivering the \
     narration in a standard American English accent."
        .to_string()
}
fn default_temperature() -> f32 {
    0.4
}
fn default_top_p() -> f32 {
    0.9
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            description: default_voice_description(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.chunking.max_words, 70);
        assert_eq!(settings.chunking.max_chars, 1200);
        assert_eq!(settings.synthesis.max_attempts, 3);
        assert_eq!(settings.assembly.sample_rate, 24000);
        assert!((settings.assembly.chunk_gap_s - 0.25).abs() < 1e-9);
        assert!((settings.voice.temperature - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [chunking]
            max_words = 50

            [voice]
            description = "A deep, gravelly narrator"
            "#,
        )
        .unwrap();

        assert_eq!(settings.chunking.max_words, 50);
        assert_eq!(settings.chunking.max_chars, 1200);
        assert_eq!(settings.voice.description, "A deep, gravelly narrator");
        assert!((settings.voice.top_p - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let settings = Settings::load_from("no_such_config_file").unwrap();
        assert_eq!(settings.synthesis.max_tokens, 2500);
    }
}
