/// Splits text into overlapping chunks for retrieval. Break points inside a
/// window prefer a paragraph break, then a line break, then a space, and only
/// then a hard character cut.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let window_end = ceil_char_boundary(text, (start + chunk_size).min(text.len()));
        let end = if window_end < text.len() {
            find_break_point(text, start, window_end)
        } else {
            window_end
        };

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end == text.len() {
            break;
        }

        let next_start = if end > start + overlap {
            floor_char_boundary(text, end - overlap)
        } else {
            end
        };

        // Guarantee forward progress even when the overlap window would
        // land at or before the current start.
        start = if next_start <= start { end } else { next_start };
    }

    chunks
}

fn find_break_point(text: &str, start: usize, max_end: usize) -> usize {
    let window = &text[start..max_end];

    if let Some(pos) = window.rfind("\n\n") {
        return start + pos + 2;
    }
    if let Some(pos) = window.rfind('\n') {
        return start + pos + 1;
    }
    if let Some(pos) = window.rfind(' ') {
        return start + pos + 1;
    }

    max_end
}

fn ceil_char_boundary(text: &str, byte_pos: usize) -> usize {
    if byte_pos >= text.len() {
        return text.len();
    }
    let mut pos = byte_pos;
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

fn floor_char_boundary(text: &str, byte_pos: usize) -> usize {
    if byte_pos >= text.len() {
        return text.len();
    }
    let mut pos = byte_pos;
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}
