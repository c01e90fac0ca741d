//! Incremental UTF-8 decoding for pipe chunks
//!
//! Interpreter output is mostly Arabic text, so a two-byte character split
//! across reads is common. Incomplete trailing sequences are held back until
//! the next chunk completes them.

#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode `chunk`, returning all text that is complete so far.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_owned();
                self.pending.clear();
                text
            }
            // Incomplete sequence at the end: emit the valid prefix, keep the tail
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                text
            }
        }
    }

    /// Flush whatever is left once the stream has ended.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(b"hello"), "hello");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_split_arabic_character_is_held_back() {
        // "ض" is 0xD8 0xB6
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[b'a', 0xD8]), "a");
        assert_eq!(decoder.push(&[0xB6, b'b']), "ضb");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_three_way_split() {
        // "€" is 0xE2 0x82 0xAC
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[0xE2]), "");
        assert_eq!(decoder.push(&[0x82]), "");
        assert_eq!(decoder.push(&[0xAC]), "€");
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[b'x', 0xFF, b'y']), "x\u{FFFD}y");
    }

    #[test]
    fn test_truncated_tail_flushed_on_finish() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[0xD8]), "");
        assert_eq!(decoder.finish().as_deref(), Some("\u{FFFD}"));
    }
}
