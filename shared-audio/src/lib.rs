//! PCM framing utilities shared between the connection handler and tests.
//!
//! Binary frames arrive as raw PCM with no header; the only signal for
//! which sample format was used is the frame's byte length.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("binary frame length {0} is not a multiple of 2 or 4 bytes")]
    UnalignedLength(usize),
}

/// Classifies a binary frame's sample encoding by its byte length.
///
/// A length divisible by 4 is always also divisible by 2, so float32 is
/// checked first: an int16 frame can never have a length divisible by 4
/// unless it's also a valid (shorter) float32 frame, and we prefer the
/// higher-fidelity interpretation when both are possible.
pub fn decode_pcm(bytes: &[u8]) -> Result<Vec<f32>, FrameError> {
    if bytes.len() % 4 == 0 {
        Ok(decode_f32le(bytes))
    } else if bytes.len() % 2 == 0 {
        Ok(decode_i16le(bytes))
    } else {
        Err(FrameError::UnalignedLength(bytes.len()))
    }
}

fn decode_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn decode_i16le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
        .collect()
}
