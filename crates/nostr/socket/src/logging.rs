//! Frame traffic logging.
//!
//! Relay frames can carry thousands of events. Long frames are logged as
//! numbered segments instead of one oversized line.

use tracing::debug;

/// Direction of a logged frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    fn arrow(self) -> &'static str {
        match self {
            Direction::Outgoing => "-->",
            Direction::Incoming => "<--",
        }
    }
}

/// Log frame text at debug level, in segments of at most `chunk_size` chars.
pub fn log_frame(direction: Direction, url: &str, text: &str, chunk_size: usize) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let chunks = chunk_text(text, chunk_size);
    if chunks.len() == 1 {
        debug!("{} {} {}", direction.arrow(), url, text);
        return;
    }

    let total = chunks.len();
    for (index, chunk) in chunks.into_iter().enumerate() {
        debug!("{} {} [{}/{}] {}", direction.arrow(), url, index + 1, total, chunk);
    }
}

/// Split `text` into slices of at most `chunk_size` characters.
///
/// Always returns at least one slice. A `chunk_size` of zero disables
/// chunking.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<&str> {
    if chunk_size == 0 {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while let Some((split, _)) = rest.char_indices().nth(chunk_size) {
        let (head, tail) = rest.split_at(split);
        chunks.push(head);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}
