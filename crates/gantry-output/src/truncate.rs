/// Default cap for human renderings, in bytes.
pub const MAX_TEXT_BYTES: usize = 30_000;

/// Cap `text` at roughly `max_bytes`. The first three quarters of the budget
/// go to the head and the rest to the tail, with a notice counting the bytes
/// dropped in between. Cuts never split a char.
#[must_use]
pub fn truncate_text(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_owned();
    }

    let tail_budget = max_bytes / 4;
    let head_end = floor_boundary(text, max_bytes - tail_budget);
    let tail_start = ceil_boundary(text, text.len() - tail_budget);
    let omitted = tail_start - head_end;
    tracing::debug!(omitted, max_bytes, "truncating rendered output");

    format!(
        "{}\n[... {omitted} bytes omitted ...]\n{}",
        &text[..head_end],
        &text[tail_start..]
    )
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
