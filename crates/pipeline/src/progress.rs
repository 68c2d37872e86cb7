//! Progress tracking with ETA and speed metrics
//!
//! Wraps the coordinator's raw `(completed, total, preview)` signal into
//! richer snapshots for logging and front ends.

use std::time::Instant;

use tracing::info;

use bookvoice_core::SynthesisResult;

/// Point-in-time view of job progress
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub percent: f32,
    pub elapsed_s: f64,
    /// None until at least one chunk has completed
    pub eta_s: Option<f64>,
    pub chunks_per_min: f64,
    pub preview: String,
}

impl ProgressSnapshot {
    /// Human-readable one-line summary
    pub fn display_line(&self) -> String {
        let eta = self
            .eta_s
            .map(format_duration)
            .unwrap_or_else(|| "calculating".to_string());
        format!(
            "{}/{} chunks ({:.1}%) | elapsed {} | eta {}",
            self.completed,
            self.total,
            self.percent,
            format_duration(self.elapsed_s),
            eta
        )
    }
}

/// Tracks delivery-order progress for one job
pub struct ProgressTracker {
    total: usize,
    completed: usize,
    failed: usize,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            started: Instant::now(),
        }
    }

    /// Record one delivered result and produce a fresh snapshot
    pub fn record(&mut self, result: &SynthesisResult, preview: &str) -> ProgressSnapshot {
        self.completed += 1;
        if !result.quality_ok {
            self.failed += 1;
        }

        let snapshot = self.snapshot(preview);
        info!(
            chunk = result.chunk_index,
            attempts = result.attempts_used,
            quality_ok = result.quality_ok,
            "{}",
            snapshot.display_line()
        );
        snapshot
    }

    pub fn snapshot(&self, preview: &str) -> ProgressSnapshot {
        let elapsed_s = self.started.elapsed().as_secs_f64();
        let percent = if self.total == 0 {
            100.0
        } else {
            self.completed as f32 / self.total as f32 * 100.0
        };
        let eta_s = if self.completed > 0 && elapsed_s > 0.0 {
            let per_chunk = elapsed_s / self.completed as f64;
            Some(per_chunk * (self.total - self.completed) as f64)
        } else {
            None
        };
        let chunks_per_min = if elapsed_s > 0.0 {
            self.completed as f64 / elapsed_s * 60.0
        } else {
            0.0
        };

        ProgressSnapshot {
            completed: self.completed,
            failed: self.failed,
            total: self.total,
            percent,
            elapsed_s,
            eta_s,
            chunks_per_min,
            preview: preview.to_string(),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
