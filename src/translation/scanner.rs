/// Lexical state of the placeholder scan. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// Advance the scan by one step from `idx`.
///
/// Returns the next state and the index of the first byte not yet consumed. Escaped quotes
/// (`''`, `""`) and the two-byte comment delimiters are consumed whole.
pub(super) fn step(state: State, bytes: &[u8], idx: usize) -> (State, usize) {
    use super::parsers::{is_block_comment_end, is_block_comment_start, is_line_comment_start};

    let b = bytes[idx];
    match state {
        State::Normal => match b {
            b'\'' => (State::SingleQuoted, idx + 1),
            b'"' => (State::DoubleQuoted, idx + 1),
            _ if is_line_comment_start(bytes, idx) => (State::LineComment, idx + 2),
            _ if is_block_comment_start(bytes, idx) => (State::BlockComment, idx + 2),
            _ => (State::Normal, idx + 1),
        },
        State::SingleQuoted => close_quote(bytes, idx, b'\'', State::SingleQuoted),
        State::DoubleQuoted => close_quote(bytes, idx, b'"', State::DoubleQuoted),
        State::LineComment if b == b'\n' => (State::Normal, idx + 1),
        State::LineComment => (State::LineComment, idx + 1),
        State::BlockComment if is_block_comment_end(bytes, idx) => (State::Normal, idx + 2),
        State::BlockComment => (State::BlockComment, idx + 1),
    }
}

fn close_quote(bytes: &[u8], idx: usize, quote: u8, inside: State) -> (State, usize) {
    if bytes[idx] != quote {
        return (inside, idx + 1);
    }
    if bytes.get(idx + 1) == Some(&quote) {
        // doubled quote: still inside the literal
        (inside, idx + 2)
    } else {
        (State::Normal, idx + 1)
    }
}
