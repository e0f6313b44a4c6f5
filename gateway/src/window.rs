//! The sliding-window overlap formula: kept as a pure function, tested
//! directly, independent of `Session`'s mutable state.

/// Assembles one inference window from the retained tail and the new
/// samples about to be consumed from the buffer.
///
/// Returns `(window, n_take)` where `n_take` is how many trailing samples
/// of `tail` were drawn into the window.
pub fn assemble(tail: &[f32], buffer: &[f32], n_new: usize, n_keep: usize, n_len: usize) -> (Vec<f32>, usize) {
    let target = n_keep.saturating_add(n_len).saturating_sub(n_new);
    let n_take = target.min(tail.len());

    let mut window = Vec::with_capacity(n_take + n_new);
    window.extend_from_slice(&tail[tail.len() - n_take..]);
    window.extend_from_slice(&buffer[..n_new.min(buffer.len())]);
    (window, n_take)
}
