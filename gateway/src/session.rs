//! The streaming transcription engine for one connected client: owns the
//! audio buffer, decides when enough audio has accumulated to warrant an
//! inference pass, and turns the recognizer's output into an incremental
//! textual delta.

use crate::config::{DerivedConstants, SessionParams};
use crate::delta::compute_delta;
use crate::engine::{options_from_params, Engine, EngineSegment};
use crate::window::assemble;
use std::time::{Duration, Instant};

pub struct Session {
    engine: Box<dyn Engine>,
    buffer: Vec<f32>,
    tail: Vec<f32>,
    prompt_tokens: Vec<i32>,
    last_emission: String,
    last_run_at: Instant,
    iteration: u64,
    params: SessionParams,
    derived: DerivedConstants,
    user_id: u64,
}

impl Session {
    pub fn new(engine: Box<dyn Engine>, params: SessionParams, sample_rate: u32, user_id: u64) -> Self {
        let derived = DerivedConstants::compute(&params, sample_rate);
        Self {
            engine,
            buffer: Vec::new(),
            tail: Vec::new(),
            prompt_tokens: Vec::new(),
            last_emission: String::new(),
            last_run_at: Instant::now(),
            iteration: 0,
            params,
            derived,
            user_id,
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Appends float samples already normalized to `[-1, 1]`. No inference
    /// is triggered here; the caller (Connection Handler) decodes PCM
    /// frames into this form before calling.
    pub fn push_audio(&mut self, samples: &[f32]) {
        self.buffer.extend_from_slice(samples);
        if self.buffer.len() > self.derived.n_max {
            let excess = self.buffer.len() - self.derived.n_max;
            self.buffer.drain(0..excess);
        }
    }

    fn is_ready(&self, now: Instant) -> bool {
        self.buffer.len() >= self.derived.n_step
            && now.saturating_duration_since(self.last_run_at)
                >= Duration::from_millis(self.params.step_ms as u64)
    }

    /// Returns an incremental transcript, possibly empty.
    pub fn drain_if_ready(&mut self, now: Instant) -> String {
        if !self.is_ready(now) {
            return String::new();
        }
        self.run_pass(now, false)
    }

    /// Submits every remaining sample regardless of readiness, then clears
    /// `buffer` and `tail`. No-op (and returns an empty string) if `buffer`
    /// is already empty.
    pub fn flush(&mut self, now: Instant) -> String {
        if self.buffer.is_empty() {
            return String::new();
        }
        let delta = self.run_pass(now, true);
        self.buffer.clear();
        self.tail.clear();
        delta
    }

    /// Clears all state, including acoustic and token context, so the next
    /// emission starts from a blank slate rather than as a prefix
    /// extension of whatever came before. `flush` deliberately stops short
    /// of this: it submits the remaining buffer but keeps context intact,
    /// for callers that want a final partial result without resetting the
    /// stream.
    pub fn reset(&mut self, now: Instant) {
        self.buffer.clear();
        self.tail.clear();
        self.prompt_tokens.clear();
        self.last_emission.clear();
        self.iteration = 0;
        self.last_run_at = now;
    }

    fn run_pass(&mut self, now: Instant, is_final: bool) -> String {
        let n_new = if is_final {
            self.buffer.len()
        } else {
            self.buffer.len().min(self.derived.n_step)
        };
        if n_new == 0 {
            return String::new();
        }

        let (window, _n_take) = assemble(
            &self.tail,
            &self.buffer,
            n_new,
            self.derived.n_keep,
            self.derived.n_len,
        );
        self.tail = window.clone();
        self.buffer.drain(0..n_new);
        self.last_run_at = now;
        self.iteration += 1;

        let options = options_from_params(&self.params);
        let prompt: &[i32] = if self.params.no_context { &[] } else { &self.prompt_tokens };

        match self.engine.transcribe(&window, prompt, &options) {
            Ok(output) => {
                if !self.params.no_context && !output.segments.is_empty() {
                    self.prompt_tokens = output
                        .segments
                        .iter()
                        .flat_map(|s| s.token_ids.iter().copied())
                        .collect();
                }
                let formatted = self.format_transcript(&output.segments);
                let delta = compute_delta(&formatted, &self.last_emission);
                self.last_emission = formatted;
                delta
            }
            Err(e) => {
                tracing::warn!(user_id = self.user_id, error = %e, "engine transcribe failed");
                String::new()
            }
        }
    }

    fn format_transcript(&self, segments: &[EngineSegment]) -> String {
        let mut out = String::new();
        for segment in segments {
            if !self.params.no_timestamps {
                out.push_str(&format!(
                    "[{:.2} --> {:.2}]  ",
                    segment.start_ms as f64 / 1000.0,
                    segment.end_ms as f64 / 1000.0
                ));
            }
            out.push_str(&segment.text);
            if self.params.tinydiarize && segment.speaker_turn {
                out.push_str(" [SPEAKER_TURN]");
            }
        }
        out
    }
}
