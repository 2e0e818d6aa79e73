use crate::TtsError;

/// Lower bound of the character budget used when re-splitting a silent chunk.
pub const RECOVERY_MIN_CHARS: usize = 200;

/// Upper bound of the character budget used when re-splitting a silent chunk.
pub const RECOVERY_MAX_CHARS: usize = 800;

/// Counts model tokens for token-bounded segmentation.
///
/// Implemented by engines that can tokenize with their own model vocabulary,
/// and by any `FnMut(&str) -> Result<usize, TtsError>` closure.
pub trait TokenCounter {
    fn count_tokens(&mut self, text: &str) -> Result<usize, TtsError>;
}

impl<F> TokenCounter for F
where
    F: FnMut(&str) -> Result<usize, TtsError>,
{
    fn count_tokens(&mut self, text: &str) -> Result<usize, TtsError> {
        self(text)
    }
}

/// Collapse every whitespace run to a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into chunks of at most `max_chars` characters.
///
/// Chunks follow paragraph and sentence boundaries where possible. A sentence
/// longer than the budget is wrapped on spaces, and a single word longer than
/// the budget is sliced at fixed width. Joining the chunks with single spaces
/// gives back the whitespace-normalized input, except inside sliced words.
pub fn split_text_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }
    if char_len(&normalized) <= max_chars {
        return vec![normalized];
    }

    let mut chunks = ChunkBuffer::new(max_chars);
    for paragraph in paragraphs(text) {
        for sentence in split_sentences(&paragraph) {
            if char_len(sentence) > max_chars {
                chunks.flush();
                chunks.extend(wrap_words(sentence, max_chars));
            } else {
                chunks.push(sentence);
            }
        }
        chunks.flush();
    }
    chunks.finish()
}

/// Split text into chunks whose token count stays within `max_tokens`.
///
/// Words are added greedily; the candidate chunk is re-tokenized before each
/// addition. A single word that alone exceeds the budget becomes its own chunk.
pub fn split_text_by_tokens(
    text: &str,
    max_tokens: usize,
    counter: &mut dyn TokenCounter,
) -> Result<Vec<String>, TtsError> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    for word in text.split_whitespace() {
        if buffer.is_empty() {
            buffer.push_str(word);
            continue;
        }
        let candidate = format!("{buffer} {word}");
        if counter.count_tokens(&candidate)? > max_tokens {
            chunks.push(std::mem::replace(&mut buffer, word.to_string()));
        } else {
            buffer = candidate;
        }
    }
    if !buffer.is_empty() {
        chunks.push(buffer);
    }
    Ok(chunks)
}

/// Re-split a chunk whose synthesized audio was judged silent.
///
/// Tries a smaller character budget first, then half the token budget when a
/// token counter is available. Returns `None` when the chunk cannot be split
/// into more than one piece.
pub fn recovery_split(
    chunk: &str,
    max_tokens: usize,
    counter: Option<&mut dyn TokenCounter>,
) -> Result<Option<Vec<String>>, TtsError> {
    let budget = recovery_char_budget(chunk);
    let pieces = split_text_for_tts(chunk, budget);
    if pieces.len() > 1 {
        return Ok(Some(pieces));
    }
    if let Some(counter) = counter {
        let pieces = split_text_by_tokens(chunk, (max_tokens / 2).max(1), counter)?;
        if pieces.len() > 1 {
            return Ok(Some(pieces));
        }
    }
    Ok(None)
}

/// `min(800, max(200, len / 2))`, counted in characters.
pub fn recovery_char_budget(chunk: &str) -> usize {
    (char_len(chunk) / 2).clamp(RECOVERY_MIN_CHARS, RECOVERY_MAX_CHARS)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Blank-line delimited paragraphs with internal whitespace collapsed.
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(normalize_whitespace(&current.join(" ")));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(normalize_whitespace(&current.join(" ")));
    }
    out
}

/// Split a whitespace-normalized paragraph after `.`, `!` or `?` followed by a space.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut previous = None;
    for (idx, ch) in paragraph.char_indices() {
        if ch == ' ' && matches!(previous, Some('.' | '!' | '?')) {
            sentences.push(&paragraph[start..idx]);
            start = idx + 1;
        }
        previous = Some(ch);
    }
    if start < paragraph.len() {
        sentences.push(&paragraph[start..]);
    }
    sentences
}

/// Wrap an over-long sentence on word boundaries, slicing words that cannot fit.
fn wrap_words(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = ChunkBuffer::new(max_chars);
    for word in sentence.split(' ').filter(|w| !w.is_empty()) {
        if char_len(word) > max_chars {
            chunks.flush();
            let chars: Vec<char> = word.chars().collect();
            chunks.extend(chars.chunks(max_chars).map(|piece| piece.iter().collect()));
        } else {
            chunks.push(word);
        }
    }
    chunks.finish()
}

/// Accumulates space-joined pieces and emits a chunk before the budget overflows.
struct ChunkBuffer {
    max_chars: usize,
    buffer: String,
    buffer_chars: usize,
    chunks: Vec<String>,
}

impl ChunkBuffer {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            buffer: String::new(),
            buffer_chars: 0,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, piece: &str) {
        let piece_chars = char_len(piece);
        if self.buffer_chars > 0 && self.buffer_chars + 1 + piece_chars > self.max_chars {
            self.flush();
        }
        if self.buffer_chars > 0 {
            self.buffer.push(' ');
            self.buffer_chars += 1;
        }
        self.buffer.push_str(piece);
        self.buffer_chars += piece_chars;
    }

    fn extend(&mut self, pieces: impl IntoIterator<Item = String>) {
        self.chunks
            .extend(pieces.into_iter().filter(|piece| !piece.is_empty()));
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            self.chunks.push(std::mem::take(&mut self.buffer));
        }
        self.buffer_chars = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}
