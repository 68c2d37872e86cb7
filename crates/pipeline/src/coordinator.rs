//! Synthesis coordination: bounded workers, strict output ordering
//!
//! Workers pull chunks from a shared queue and synthesize independently.
//! Completions flow into a reorder buffer that releases results strictly in
//! chunk-index order, so downstream assembly never sees chunk `i+1` before
//! chunk `i` no matter how completion times interleave.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::synthesizer::ChunkSynthesizer;
use bookvoice_config::VoiceParams;
use bookvoice_core::{ChunkState, JobState, SynthesisResult, TextChunk};

/// Fires once per chunk, in delivery order: `(completed, total, preview)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Cooperative cancellation flag shared between the caller and the job
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; in-flight chunks finish, nothing new dispatches
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-book orchestration state, owned by the coordinator
///
/// Lifetime is one conversion run; chunk states are keyed by global chunk
/// index.
pub struct PipelineJob {
    id: Uuid,
    total: usize,
    states: DashMap<usize, ChunkState>,
    failed: Mutex<Vec<usize>>,
    state: Mutex<JobState>,
    cancel: CancelToken,
}

impl PipelineJob {
    pub fn new(total: usize, cancel: CancelToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            total,
            states: (0..total).map(|i| (i, ChunkState::Queued)).collect(),
            failed: Mutex::new(Vec::new()),
            state: Mutex::new(JobState::Running),
            cancel,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn chunk_state(&self, index: usize) -> Option<ChunkState> {
        self.states.get(&index).map(|s| *s)
    }

    /// Global indices of chunks delivered with `quality_ok == false`, sorted
    pub fn failed_indices(&self) -> Vec<usize> {
        let mut failed = self.failed.lock().clone();
        failed.sort_unstable();
        failed
    }

    pub fn delivered_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| matches!(*s.value(), ChunkState::Delivered | ChunkState::Exhausted))
            .count()
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn mark_attempting(&self, index: usize, attempt: u32) {
        self.states.insert(index, ChunkState::Attempting(attempt));
    }

    pub(crate) fn mark_delivered(&self, index: usize, quality_ok: bool) {
        if quality_ok {
            self.states.insert(index, ChunkState::Delivered);
        } else {
            self.states.insert(index, ChunkState::Exhausted);
            self.failed.lock().push(index);
        }
    }

    pub(crate) fn set_state(&self, state: JobState) {
        *self.state.lock() = state;
    }
}

/// Runs chunk synthesis over a worker pool with ordered delivery
pub struct SynthesisCoordinator {
    synthesizer: Arc<ChunkSynthesizer>,
    voice: VoiceParams,
    configured_workers: usize,
}

impl SynthesisCoordinator {
    pub fn new(
        synthesizer: Arc<ChunkSynthesizer>,
        voice: VoiceParams,
        configured_workers: usize,
    ) -> Self {
        Self {
            synthesizer,
            voice,
            configured_workers,
        }
    }

    /// Worker pool size derived from the engine's concurrency capability
    ///
    /// A single loaded model instance usually cannot be driven from several
    /// threads at once; the pool collapses to one worker in that case.
    pub fn worker_count(&self) -> usize {
        if self.synthesizer.concurrency_safe() {
            self.configured_workers.max(1)
        } else {
            1
        }
    }

    /// Start synthesis and return the strictly ordered result stream
    ///
    /// Results arrive on the receiver in chunk-index order regardless of
    /// completion order. The channel is bounded, so a slow consumer applies
    /// backpressure instead of buffering the book in memory.
    pub fn spawn(
        &self,
        chunks: Vec<TextChunk>,
        job: Arc<PipelineJob>,
        progress: Option<ProgressCallback>,
    ) -> mpsc::Receiver<SynthesisResult> {
        let workers = self.worker_count();
        let total = chunks.len();
        let first_index = chunks.first().map(|c| c.index).unwrap_or(0);
        let previews: Arc<HashMap<usize, String>> =
            Arc::new(chunks.iter().map(|c| (c.index, c.preview())).collect());

        info!(
            job = %job.id(),
            chunks = total,
            workers,
            "starting synthesis job"
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(chunks)));
        let (done_tx, mut done_rx) = mpsc::channel::<SynthesisResult>(workers * 2);
        let (out_tx, out_rx) = mpsc::channel::<SynthesisResult>(workers * 2);

        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let job = Arc::clone(&job);
            let synthesizer = Arc::clone(&self.synthesizer);
            let voice = self.voice.clone();
            let done = done_tx.clone();

            tokio::spawn(async move {
                loop {
                    // Cancellation is checked only at dispatch boundaries;
                    // in-flight generation is never interrupted
                    if job.is_cancelled() {
                        debug!(worker, "cancellation observed; worker stopping");
                        break;
                    }
                    let chunk = { queue.lock().pop_front() };
                    let Some(chunk) = chunk else { break };

                    let index = chunk.index;
                    let observer = |attempt: u32| job.mark_attempting(index, attempt);
                    let result = synthesizer
                        .synthesize_observed(&chunk, &voice, Some(&observer))
                        .await;

                    if done.send(result).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);

        // Delivery loop: re-sequences out-of-order completions
        tokio::spawn(async move {
            let mut buffer: BTreeMap<usize, SynthesisResult> = BTreeMap::new();
            let mut next = first_index;
            let mut delivered = 0usize;

            while let Some(result) = done_rx.recv().await {
                buffer.insert(result.chunk_index, result);

                while let Some(result) = buffer.remove(&next) {
                    job.mark_delivered(result.chunk_index, result.quality_ok);
                    delivered += 1;
                    if let Some(cb) = &progress {
                        let preview = previews
                            .get(&result.chunk_index)
                            .map(String::as_str)
                            .unwrap_or("");
                        cb(delivered, total, preview);
                    }
                    if out_tx.send(result).await.is_err() {
                        return;
                    }
                    next += 1;
                }
            }

            if !buffer.is_empty() {
                // A gap before these results was never synthesized (cancel)
                debug!(
                    undeliverable = buffer.len(),
                    "dropping out-of-order results stranded by cancellation"
                );
            }
        });

        out_rx
    }
}
