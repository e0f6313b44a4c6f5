//! Incremental text extraction: turns each full-window transcript into
//! the suffix of new text relative to the last emission, so a client
//! only ever receives the part it hasn't seen yet.

/// Strips every `[...]` bracketed span (timestamps, speaker markers) and
/// trims ASCII whitespace from both ends.
pub fn clean(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth: u32 = 0;
    for c in s.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim_matches(|c: char| c.is_ascii_whitespace()).to_string()
}

/// Computes the incremental delta between a freshly formatted transcript
/// and the previously emitted one: strict prefix extension, exact repeat,
/// or full-text divergence.
pub fn compute_delta(current: &str, last_emission: &str) -> String {
    let clean_current = clean(current);
    let clean_last = clean(last_emission);

    if clean_current.len() > clean_last.len() && clean_current.starts_with(&clean_last) {
        clean_current[clean_last.len()..]
            .trim_start_matches(|c: char| c.is_ascii_whitespace())
            .to_string()
    } else if clean_current == clean_last {
        String::new()
    } else {
        clean_current
    }
}
