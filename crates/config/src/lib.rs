//! Configuration management for the audiobook pipeline
//!
//! Settings load from an optional `bookvoice.toml` plus `BOOKVOICE_*`
//! environment overrides. Named setting profiles persist to a JSON store.

mod profiles;
mod settings;

pub use profiles::ProfileStore;
pub use settings::{
    AssemblyConfig, ChunkingConfig, Settings, SynthesisConfig, VoiceParams,
};
