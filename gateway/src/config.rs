//! CLI surface and per-session configuration defaults.

use clap::Parser;

/// Command-line arguments, parsed once at startup.
#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Real-time speech transcription gateway")]
pub struct Args {
    #[arg(long, default_value_t = 8081, help = "listen port")]
    pub port: u16,

    #[arg(
        long,
        default_value = "127.0.0.1",
        help = "informational only; bind is by port"
    )]
    pub host: String,

    #[arg(
        long,
        default_value = "models/ggml-base.en.bin",
        help = "path to the recognizer model file"
    )]
    pub model: String,

    #[arg(long, help = "disable hardware acceleration")]
    pub no_gpu: bool,
}

/// Immutable per-session parameters, supplied at session construction.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub step_ms: u32,
    pub length_ms: u32,
    pub keep_ms: u32,
    pub max_tokens: i32,
    pub audio_ctx: i32,
    /// `-1` means greedy decoding; any value `> 1` selects beam search.
    pub beam_size: i32,
    pub translate: bool,
    pub no_context: bool,
    pub no_timestamps: bool,
    pub tinydiarize: bool,
    pub language: String,
    pub threads: u32,
    /// Force the temperature-increment fallback off. Defaults to `false`,
    /// leaving the engine's own fallback behavior untouched.
    pub no_fallback: bool,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            step_ms: 3000,
            length_ms: 10000,
            keep_ms: 200,
            max_tokens: 32,
            audio_ctx: 0,
            beam_size: -1,
            translate: false,
            no_context: true,
            no_timestamps: false,
            tinydiarize: false,
            language: "en".to_string(),
            threads: default_thread_count(),
            no_fallback: false,
        }
    }
}

fn default_thread_count() -> u32 {
    (num_cpus::get() as u32).min(4)
}

/// Constants derived from `SessionParams` and the engine's native sample
/// rate.
#[derive(Debug, Clone, Copy)]
pub struct DerivedConstants {
    pub n_step: usize,
    pub n_len: usize,
    pub n_keep: usize,
    pub n_max: usize,
}

impl DerivedConstants {
    pub fn compute(params: &SessionParams, sample_rate: u32) -> Self {
        let n_step = ms_to_samples(params.step_ms, sample_rate);
        let n_len = ms_to_samples(params.length_ms, sample_rate);
        let n_keep = ms_to_samples(params.keep_ms, sample_rate);
        Self {
            n_step,
            n_len,
            n_keep,
            n_max: 2 * n_len,
        }
    }
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}
