pub const LOCAL_MAX_CHUNK_CHARS: usize = 220;
pub const REMOTE_MAX_CHUNK_CHARS: usize = 420;

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];
const SENTENCE_CLOSERS: [char; 7] = ['"', '\'', ')', ']', '\u{201d}', '\u{2019}', '\u{bb}'];

/// Splits `text` into speakable chunks of at most `max_chars` characters.
///
/// Whitespace is collapsed to single spaces. With `split_on_paragraphs`,
/// blank lines separate paragraphs and each paragraph is chunked on its own.
/// A single word longer than `max_chars` is emitted as its own oversized chunk.
pub fn split_text_into_chunks(text: &str, max_chars: usize, split_on_paragraphs: bool) -> Vec<String> {
    let raw = text.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let max_chars = usize::max(1, max_chars);

    if split_on_paragraphs {
        let paragraphs = split_paragraphs(raw);
        if paragraphs.len() > 1 {
            return paragraphs
                .iter()
                .flat_map(|paragraph| chunk_normalized(&normalize_whitespace(paragraph), max_chars))
                .collect();
        }
    }

    chunk_normalized(&normalize_whitespace(raw), max_chars)
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_paragraphs(raw: &str) -> Vec<String> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }
    paragraphs
}

fn chunk_normalized(normalized: &str, max_chars: usize) -> Vec<String> {
    if normalized.is_empty() {
        return Vec::new();
    }
    if char_len(normalized) <= max_chars {
        return vec![normalized.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for piece in split_sentences(normalized) {
        if current.is_empty() {
            start_chunk(&mut chunks, &mut current, piece, max_chars);
            continue;
        }

        let next_len = char_len(&current) + 1 + char_len(piece);
        if next_len <= max_chars {
            current.push(' ');
            current.push_str(piece);
        } else {
            chunks.push(std::mem::take(&mut current));
            start_chunk(&mut chunks, &mut current, piece, max_chars);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn start_chunk(chunks: &mut Vec<String>, current: &mut String, piece: &str, max_chars: usize) {
    if char_len(piece) <= max_chars {
        current.push_str(piece);
    } else {
        chunks.extend(split_long_segment_by_words(piece, max_chars));
    }
}

/// Sentence-like pieces of whitespace-normalized text. A boundary sits after
/// a run of terminal punctuation (plus closing quotes or brackets) that is
/// followed by a space, so the pieces joined with single spaces give back the
/// input.
fn split_sentences(normalized: &str) -> Vec<&str> {
    let mut pieces: Vec<&str> = Vec::new();
    let mut start = 0usize;
    let mut chars = normalized.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !SENTENCE_TERMINATORS.contains(&ch) {
            continue;
        }
        while let Some(&(_, next)) = chars.peek() {
            if SENTENCE_TERMINATORS.contains(&next) || SENTENCE_CLOSERS.contains(&next) {
                chars.next();
            } else {
                break;
            }
        }
        if let Some(&(space_at, ' ')) = chars.peek() {
            pieces.push(&normalized[start..space_at]);
            chars.next();
            start = space_at + 1;
        }
    }

    if start < normalized.len() {
        pieces.push(&normalized[start..]);
    }
    pieces
}

fn split_long_segment_by_words(input: &str, max_chars: usize) -> Vec<String> {
    let mut output: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in input.split(' ').filter(|word| !word.is_empty()) {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let next_len = char_len(&current) + 1 + char_len(word);
        if next_len > max_chars {
            output.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }

    if !current.is_empty() {
        output.push(current);
    }
    output
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}
