//! A narrow, synchronous interface over the external speech recognizer,
//! plus the `whisper-rs`-backed implementation of it.

use crate::config::SessionParams;
use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperState};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("recognizer failed: {0}")]
    Recognition(String),
    #[error("failed to create recognizer state: {0}")]
    StateInit(String),
}

/// A single recognized span of text, with the metadata the Session Core
/// needs to format a transcript line and to know whether a speaker change
/// was flagged at this boundary.
#[derive(Debug, Clone)]
pub struct EngineSegment {
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub speaker_turn: bool,
    pub token_ids: Vec<i32>,
}

/// The result of one `transcribe` invocation.
pub struct EngineOutput {
    pub segments: Vec<EngineSegment>,
}

/// Flat options record derived from `SessionParams` for one inference
/// pass.
pub struct EngineOptions {
    pub language: Option<String>,
    pub translate: bool,
    pub max_tokens: i32,
    pub threads: i32,
    pub audio_ctx: i32,
    pub diarize: bool,
    pub beam_size: i32,
    pub no_fallback: bool,
    pub single_segment: bool,
}

/// Narrow interface over the external recognizer. One instance is owned
/// per session, so no locking is required here beyond what a single
/// session's own task already serializes.
pub trait Engine: Send {
    fn transcribe(
        &mut self,
        samples: &[f32],
        prompt_tokens: &[i32],
        options: &EngineOptions,
    ) -> Result<EngineOutput, EngineError>;
}

/// `whisper-rs`-backed engine. Holds its own decode state, created once
/// per session and reused across inference passes for performance.
pub struct WhisperEngine {
    ctx: std::sync::Arc<WhisperContext>,
    state: WhisperState,
}

impl WhisperEngine {
    pub fn new(ctx: std::sync::Arc<WhisperContext>) -> Result<Self, EngineError> {
        let state = ctx
            .create_state()
            .map_err(|e| EngineError::StateInit(e.to_string()))?;
        Ok(Self { ctx, state })
    }
}

impl Engine for WhisperEngine {
    fn transcribe(
        &mut self,
        samples: &[f32],
        prompt_tokens: &[i32],
        options: &EngineOptions,
    ) -> Result<EngineOutput, EngineError> {
        let strategy = if options.beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size: options.beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        };

        let mut params = FullParams::new(strategy);
        params.set_language(options.language.as_deref());
        params.set_translate(options.translate);
        params.set_max_tokens(options.max_tokens);
        params.set_n_threads(options.threads);
        params.set_single_segment(options.single_segment);
        params.set_token_timestamps(true);
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_tdrz_enable(options.diarize);

        if options.audio_ctx != 0 {
            params.set_audio_ctx(options.audio_ctx);
        }
        if options.no_fallback {
            params.set_temperature_inc(0.0);
        }
        if !prompt_tokens.is_empty() {
            params.set_tokens(prompt_tokens);
        }

        self.state
            .full(params, samples)
            .map_err(|e| EngineError::Recognition(e.to_string()))?;

        let n_segments = self.state.full_n_segments();
        let mut segments = Vec::with_capacity(n_segments.max(0) as usize);

        for i in 0..n_segments {
            let Some(segment) = self.state.get_segment(i) else {
                continue;
            };
            let text = segment
                .to_str_lossy()
                .map_err(|e| EngineError::Recognition(e.to_string()))?
                .trim()
                .to_string();
            let eot_id = self.ctx.token_eot();
            let n_tokens = segment.n_tokens();
            let mut token_ids = Vec::with_capacity(n_tokens.max(0) as usize);
            for j in 0..n_tokens {
                if let Some(token) = segment.get_token(j) {
                    if token.token_id() < eot_id {
                        token_ids.push(token.token_id());
                    }
                }
            }
            segments.push(EngineSegment {
                text,
                start_ms: segment.start_timestamp() * 10,
                end_ms: segment.end_timestamp() * 10,
                speaker_turn: options.diarize && segment.speaker_turn_next(),
                token_ids,
            });
        }

        Ok(EngineOutput { segments })
    }
}

/// Translates immutable session configuration into one pass's flat
/// options record.
pub fn options_from_params(params: &SessionParams) -> EngineOptions {
    EngineOptions {
        language: Some(params.language.clone()),
        translate: params.translate,
        max_tokens: params.max_tokens,
        threads: params.threads as i32,
        audio_ctx: params.audio_ctx,
        diarize: params.tinydiarize,
        beam_size: params.beam_size,
        no_fallback: params.no_fallback,
        single_segment: true,
    }
}
