//! Incremental chapter assembly
//!
//! Consumes the coordinator's ordered result stream, inserts silence gaps,
//! and streams samples straight to the export sink. Chapter timelines are
//! closed as the stream crosses chapter boundaries; nothing larger than one
//! chunk is ever buffered.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::sink::AudioSink;
use crate::PipelineError;
use bookvoice_config::AssemblyConfig;
use bookvoice_core::audio::{silence, AudioStats};
use bookvoice_core::{Chapter, ChapterTimeline, SynthesisResult, TimelineSegment};

/// Final assembly artifacts for one job
#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    pub timelines: Vec<ChapterTimeline>,
    pub total_duration_s: f64,
    pub output_handles: Vec<String>,
}

struct OpenChapter {
    chapter_id: usize,
    segments: Vec<TimelineSegment>,
}

/// Streams ordered synthesis results into the export sink
pub struct ChapterAssembler {
    sink: Box<dyn AudioSink>,
    config: AssemblyConfig,
    titles: BTreeMap<usize, String>,
    current: Option<OpenChapter>,
    finished: Vec<ChapterTimeline>,
    /// Running position on the book timeline, in seconds
    clock_s: f64,
}

impl ChapterAssembler {
    pub fn new(sink: Box<dyn AudioSink>, config: AssemblyConfig, chapters: &[Chapter]) -> Self {
        let titles = chapters
            .iter()
            .map(|c| (c.id, c.title.clone()))
            .collect();
        Self {
            sink,
            config,
            titles,
            current: None,
            finished: Vec::new(),
            clock_s: 0.0,
        }
    }

    /// Append the next in-order result
    ///
    /// Degraded results (`quality_ok == false`) are concatenated like any
    /// other so downstream timing stays intact.
    pub fn push(&mut self, result: SynthesisResult) -> Result<(), PipelineError> {
        if !result.samples.is_empty() && result.sample_rate != self.config.sample_rate {
            return Err(PipelineError::Assembly(format!(
                "sample rate mismatch on chunk {}: expected {}, got {}",
                result.chunk_index, self.config.sample_rate, result.sample_rate
            )));
        }

        match &self.current {
            Some(open) if open.chapter_id == result.chapter_id => {
                self.write_gap(result.chapter_id, self.config.chunk_gap_s)?;
            }
            Some(_) => {
                self.close_chapter();
                self.write_gap(result.chapter_id, self.config.chapter_gap_s)?;
                self.open_chapter(result.chapter_id);
            }
            None => self.open_chapter(result.chapter_id),
        }

        if !result.quality_ok {
            let stats = AudioStats::analyze(&result.samples, self.config.sample_rate);
            warn!(
                chunk = result.chunk_index,
                attempts = result.attempts_used,
                rms = stats.rms,
                silence_ratio = stats.silence_ratio,
                error = result.engine_error.as_deref().unwrap_or("rms below threshold"),
                "concatenating degraded chunk to preserve timing"
            );
        }

        let start_s = self.clock_s;
        self.sink.write(result.chapter_id, &result.samples)?;
        self.clock_s += result.samples.len() as f64 / self.config.sample_rate as f64;

        let open = self.current.as_mut().expect("chapter opened above");
        open.segments.push(TimelineSegment {
            chunk_index: result.chunk_index,
            start_s,
            end_s: self.clock_s,
        });

        debug!(
            chunk = result.chunk_index,
            chapter = result.chapter_id,
            start_s,
            end_s = self.clock_s,
            "chunk assembled"
        );
        Ok(())
    }

    /// Close the last chapter and finalize the sink
    pub fn finish(mut self) -> Result<AssemblyOutput, PipelineError> {
        self.close_chapter();
        let output_handles = self.sink.finalize(&self.finished, self.clock_s)?;

        info!(
            chapters = self.finished.len(),
            duration_s = self.clock_s,
            "assembly complete"
        );
        Ok(AssemblyOutput {
            timelines: self.finished,
            total_duration_s: self.clock_s,
            output_handles,
        })
    }

    fn open_chapter(&mut self, chapter_id: usize) {
        debug!(chapter = chapter_id, at_s = self.clock_s, "chapter opened");
        self.current = Some(OpenChapter {
            chapter_id,
            segments: Vec::new(),
        });
    }

    fn close_chapter(&mut self) {
        let Some(open) = self.current.take() else {
            return;
        };
        let start = open.segments.first().map(|s| s.start_s).unwrap_or(self.clock_s);
        let end = open.segments.last().map(|s| s.end_s).unwrap_or(self.clock_s);
        let title = self
            .titles
            .get(&open.chapter_id)
            .cloned()
            .unwrap_or_else(|| format!("Chapter {}", open.chapter_id + 1));

        info!(
            chapter = open.chapter_id,
            title = %title,
            start_s = start,
            end_s = end,
            "chapter closed"
        );
        self.finished.push(ChapterTimeline {
            chapter_id: open.chapter_id,
            title,
            segments: open.segments,
            total_duration_s: end - start,
        });
    }

    fn write_gap(&mut self, chapter_id: usize, seconds: f64) -> Result<(), PipelineError> {
        if seconds <= 0.0 {
            return Ok(());
        }
        let gap = silence(seconds, self.config.sample_rate);
        self.sink.write(chapter_id, &gap)?;
        // Advance by the samples actually written, not the nominal seconds
        self.clock_s += gap.len() as f64 / self.config.sample_rate as f64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    const SR: u32 = 24000;

    fn result(chapter_id: usize, chunk_index: usize, seconds: f64, quality_ok: bool) -> SynthesisResult {
        SynthesisResult {
            chapter_id,
            chunk_index,
            samples: vec![0.1; (seconds * SR as f64) as usize],
            sample_rate: SR,
            rms: if quality_ok { 0.1 } else { 0.0 },
            attempts_used: 1,
            quality_ok,
            engine_error: None,
        }
    }

    fn config() -> AssemblyConfig {
        AssemblyConfig {
            chunk_gap_s: 0.25,
            chapter_gap_s: 2.0,
            sample_rate: SR,
        }
    }

    fn chapters() -> Vec<Chapter> {
        vec![
            Chapter::new(0, "Intro", ""),
            Chapter::new(1, "Middle", ""),
        ]
    }

    #[test]
    fn test_gap_math_and_total_duration() {
        let mut assembler = ChapterAssembler::new(Box::new(MemorySink::new()), config(), &chapters());

        assembler.push(result(0, 0, 1.0, true)).unwrap();
        assembler.push(result(0, 1, 1.0, true)).unwrap();
        assembler.push(result(1, 2, 1.0, true)).unwrap();

        let output = assembler.finish().unwrap();
        // 3s of audio + one 0.25s chunk gap + one 2s chapter gap
        assert!((output.total_duration_s - 5.25).abs() < 1e-9);
        assert_eq!(output.timelines.len(), 2);
    }

    #[test]
    fn test_timelines_contiguous_and_non_overlapping() {
        let mut assembler = ChapterAssembler::new(Box::new(MemorySink::new()), config(), &chapters());
        assembler.push(result(0, 0, 0.5, true)).unwrap();
        assembler.push(result(0, 1, 0.5, true)).unwrap();
        assembler.push(result(1, 2, 0.5, true)).unwrap();
        assembler.push(result(1, 3, 0.5, true)).unwrap();
        let output = assembler.finish().unwrap();

        let first = &output.timelines[0];
        let second = &output.timelines[1];
        assert_eq!(first.title, "Intro");
        assert_eq!(second.title, "Middle");
        assert!(first.end_s() <= second.start_s());
        // Chapter gap separates them
        assert!((second.start_s() - first.end_s() - 2.0).abs() < 1e-9);

        for timeline in &output.timelines {
            for pair in timeline.segments.windows(2) {
                assert!(pair[0].end_s <= pair[1].start_s);
            }
        }
    }

    #[test]
    fn test_degraded_chunk_still_concatenated() {
        let mut assembler = ChapterAssembler::new(Box::new(MemorySink::new()), config(), &chapters());
        assembler.push(result(0, 0, 1.0, true)).unwrap();
        assembler.push(result(0, 1, 1.0, false)).unwrap();
        let output = assembler.finish().unwrap();

        // Both chunks present on the timeline
        assert_eq!(output.timelines[0].segments.len(), 2);
        assert!((output.total_duration_s - 2.25).abs() < 1e-9);
    }

    #[test]
    fn test_sample_rate_mismatch_rejected() {
        let mut assembler = ChapterAssembler::new(Box::new(MemorySink::new()), config(), &chapters());
        let mut bad = result(0, 0, 1.0, true);
        bad.sample_rate = 22050;
        assert!(assembler.push(bad).is_err());
    }

    #[test]
    fn test_empty_degraded_chunk_keeps_timeline_position() {
        let mut assembler = ChapterAssembler::new(Box::new(MemorySink::new()), config(), &chapters());
        assembler.push(result(0, 0, 1.0, true)).unwrap();

        let mut empty = result(0, 1, 0.0, false);
        empty.samples.clear();
        empty.sample_rate = 0;
        assembler.push(empty).unwrap();

        assembler.push(result(0, 2, 1.0, true)).unwrap();
        let output = assembler.finish().unwrap();

        let segments = &output.timelines[0].segments;
        assert_eq!(segments.len(), 3);
        // Zero-length segment, but position recorded
        assert!((segments[1].end_s - segments[1].start_s).abs() < 1e-9);
        // 2s audio + two 0.25s gaps
        assert!((output.total_duration_s - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_no_input_produces_empty_output() {
        let assembler = ChapterAssembler::new(Box::new(MemorySink::new()), config(), &chapters());
        let output = assembler.finish().unwrap();
        assert!(output.timelines.is_empty());
        assert_eq!(output.total_duration_s, 0.0);
    }
}
