// ABOUTME: Sentence buffering for speech output - collects visible text fragments
// ABOUTME: and releases whole sentences, never splitting inside <command> tags.

use tracing::error;

/// Default ceiling for text waiting to complete a sentence.
pub const DEFAULT_SENTENCE_BUFFER_CAP: usize = 10 * 1024 * 1024;

const COMMAND_OPEN: &[u8] = b"<command>";
const COMMAND_CLOSE: &[u8] = b"</command>";

/// Accumulates streamed text and yields complete sentences.
///
/// A sentence ends at `.`, `!`, `?` or `:` followed by a space, newline or
/// carriage return. A terminator at the very end of the buffered text waits
/// for the next fragment, since `3.` may still become `3.5`.
#[derive(Debug, Clone)]
pub struct SentenceBuffer {
    pending: String,
    cap: usize,
}

impl Default for SentenceBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_SENTENCE_BUFFER_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            pending: String::new(),
            cap,
        }
    }

    /// Add a fragment and return the sentences it completed, trimmed and
    /// in order. Fragments that would overflow the cap are dropped.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        if fragment.is_empty() {
            return Vec::new();
        }
        if self.pending.len() + fragment.len() > self.cap {
            error!(
                buffered = self.pending.len(),
                incoming = fragment.len(),
                limit = self.cap,
                "Sentence buffer limit exceeded, dropping fragment"
            );
            return Vec::new();
        }
        self.pending.push_str(fragment);

        let mut sentences = Vec::new();
        let mut consumed = 0;
        while let Some(end) = sentence_end(&self.pending[consumed..]) {
            let sentence = trim_speech(&self.pending[consumed..consumed + end]);
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            consumed += end;
        }
        self.pending.drain(..consumed);

        sentences
    }

    /// Return whatever text remains, trimmed, and clear the buffer.
    pub fn flush(&mut self) -> Option<String> {
        let rest = trim_speech(&self.pending).to_string();
        self.pending.clear();
        Some(rest).filter(|s| !s.is_empty())
    }

    /// Text still waiting for a sentence boundary.
    pub fn pending(&self) -> &str {
        &self.pending
    }
}

/// Byte offset just past the first sentence boundary in `text`, including
/// the whitespace character after the terminator.
fn sentence_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut in_command = false;
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(COMMAND_OPEN) {
            in_command = true;
            i += COMMAND_OPEN.len();
            continue;
        }
        if rest.starts_with(COMMAND_CLOSE) {
            in_command = false;
            i += COMMAND_CLOSE.len();
            continue;
        }

        if !in_command && matches!(bytes[i], b'.' | b'!' | b'?' | b':') {
            match bytes.get(i + 1) {
                None => return None,
                Some(b' ' | b'\n' | b'\r') => return Some(i + 2),
                Some(_) => {}
            }
        }
        i += 1;
    }

    None
}

fn trim_speech(s: &str) -> &str {
    s.trim_matches(|c| matches!(c, ' ' | '\n' | '\r'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_terminator_and_space() {
        let mut buffer = SentenceBuffer::new();
        assert!(buffer.push("Hello there").is_empty());
        assert_eq!(buffer.push(". How are"), vec!["Hello there."]);
        assert_eq!(buffer.push(" you? Fine"), vec!["How are you?"]);
        assert_eq!(buffer.pending(), "Fine");
        assert_eq!(buffer.flush(), Some("Fine".to_string()));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_terminator_at_end_waits() {
        let mut buffer = SentenceBuffer::new();
        assert!(buffer.push("Pi is 3.").is_empty());
        assert!(buffer.push("14 roughly").is_empty());
        assert_eq!(buffer.push("! Yes\n"), vec!["Pi is 3.14 roughly!"]);
    }

    #[test]
    fn test_colon_and_newline_terminate() {
        let mut buffer = SentenceBuffer::new();
        let sentences = buffer.push("Steps:\nFirst, preheat.\r\nThen bake. ");
        assert_eq!(sentences, vec!["Steps:", "First, preheat.", "Then bake."]);
        assert_eq!(buffer.pending(), "");
    }

    #[test]
    fn test_command_tags_never_split() {
        let mut buffer = SentenceBuffer::new();
        let sentences =
            buffer.push("Okay. <command>{\"device\": \"lights. kitchen\"}</command> Done. ");
        assert_eq!(
            sentences,
            vec!["Okay.", "<command>{\"device\": \"lights. kitchen\"}</command> Done."]
        );
    }

    #[test]
    fn test_open_command_tag_holds_text() {
        let mut buffer = SentenceBuffer::new();
        assert!(buffer.push("<command>{\"a\": 1. ").is_empty());
        assert_eq!(buffer.push("}</command>. Next"), vec!["<command>{\"a\": 1. }</command>."]);
        assert_eq!(buffer.flush(), Some("Next".to_string()));
    }

    #[test]
    fn test_trailing_whitespace_flushes_nothing() {
        let mut buffer = SentenceBuffer::new();
        assert_eq!(buffer.push("Done. \n "), vec!["Done."]);
        assert_eq!(buffer.pending(), "\n ");
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_cap_drops_fragment() {
        let mut buffer = SentenceBuffer::with_cap(8);
        assert!(buffer.push("abcdef").is_empty());
        assert!(buffer.push("ghijk").is_empty());
        assert_eq!(buffer.pending(), "abcdef");
    }

    #[test]
    fn test_multibyte_text() {
        let mut buffer = SentenceBuffer::new();
        assert_eq!(buffer.push("Ça va? Très bien. "), vec!["Ça va?", "Très bien."]);
    }
}
