//! Text chunking for embedding.
//!
//! Splits a document into chunks of at most `chunk_size` characters with
//! `overlap` characters shared between neighbors. Cuts snap backwards to the
//! nearest natural boundary (paragraph break, newline, space) when one lies
//! in the second half of the window, so chunks rarely split mid-word.

/// Split `text` into overlapping chunks.
///
/// Guarantees: every chunk is non-empty after trimming, no chunk exceeds
/// `chunk_size` characters, and the concatenation covers the whole document.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    let chars: Vec<char> = text.chars().collect();
    if text.trim().is_empty() {
        return Vec::new();
    }
    if chars.len() <= chunk_size {
        return vec![text.trim().to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let window_end = (start + chunk_size).min(chars.len());

        let cut = if window_end == chars.len() {
            window_end
        } else {
            match boundary(&chars[start..window_end]) {
                Some(offset) => start + offset,
                None => window_end,
            }
        };

        let chunk: String = chars[start..cut].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if cut >= chars.len() {
            break;
        }
        // Step back for overlap, but always make forward progress.
        start = cut.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// The best cut offset within one window: prefer a paragraph break, then a
/// line break, then a space — scanning from the end, but only past the
/// window's midpoint so chunks stay reasonably full.
fn boundary(window: &[char]) -> Option<usize> {
    let min = window.len() / 2;

    // Paragraph break ("\n\n"): cut after the pair.
    for i in (min..window.len().saturating_sub(1)).rev() {
        if window[i] == '\n' && window[i + 1] == '\n' {
            return Some(i + 2);
        }
    }
    for i in (min..window.len()).rev() {
        if window[i] == '\n' {
            return Some(i + 1);
        }
    }
    for i in (min..window.len()).rev() {
        if window[i] == ' ' {
            return Some(i + 1);
        }
    }
    None
}
