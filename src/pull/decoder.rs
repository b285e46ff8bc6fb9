// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Line buffering for newline-delimited response bodies.
//!
//! Network reads hand back arbitrary byte chunks. A JSON line may be cut in
//! half, and so may a multi-byte UTF-8 character inside it. The decoder
//! keeps the raw bytes of the unfinished line and only decodes a line once
//! its terminating `\n` has arrived, so chunk boundaries never change the
//! lines produced.

/// Splits a byte stream into complete `\n`-terminated lines.
#[derive(Debug, Default, Clone)]
pub struct LineDecoder {
    /// Bytes of the current, not yet terminated line.
    carry: Vec<u8>,
}

impl LineDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes.
    ///
    /// The trailing fragment after the last `\n` is kept for the next call.
    /// Returned lines do not include the `\n`. Invalid UTF-8 is replaced
    /// with U+FFFD rather than failing the stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        if chunk.is_empty() {
            return lines;
        }

        // '\n' never occurs inside a multi-byte UTF-8 sequence, so splitting
        // on the raw byte is safe.
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.carry.extend_from_slice(&rest[..pos]);
            lines.push(String::from_utf8_lossy(&self.carry).into_owned());
            self.carry.clear();
            rest = &rest[pos + 1..];
        }
        self.carry.extend_from_slice(rest);

        lines
    }

    /// Take whatever is left once the stream has ended.
    ///
    /// Returns `None` if the leftover fragment is empty or whitespace only.
    pub fn flush(&mut self) -> Option<String> {
        let carry = std::mem::take(&mut self.carry);
        let fragment = String::from_utf8_lossy(&carry).into_owned();
        if fragment.trim().is_empty() {
            None
        } else {
            Some(fragment)
        }
    }

    /// Number of buffered bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_in_chunks(input: &[u8], splits: &[usize]) -> Vec<String> {
        let mut decoder = LineDecoder::new();
        let mut lines = Vec::new();
        let mut start = 0;
        for &end in splits {
            lines.extend(decoder.feed(&input[start..end]));
            start = end;
        }
        lines.extend(decoder.feed(&input[start..]));
        lines.extend(decoder.flush());
        lines
    }

    #[test]
    fn test_empty_chunk_yields_nothing() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"").is_empty());
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.flush(), None);
    }

    #[test]
    fn test_chunk_without_newline_is_buffered() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"{\"status\":").is_empty());
        assert_eq!(decoder.pending(), 10);

        let lines = decoder.feed(b"\"Downloading\"}\n");
        assert_eq!(lines, vec!["{\"status\":\"Downloading\"}".to_string()]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_chunk_ending_on_newline_leaves_no_fragment() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.feed(b"one\ntwo\n");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.flush(), None);
    }

    #[test]
    fn test_consecutive_newlines_produce_empty_lines() {
        let mut decoder = LineDecoder::new();
        assert_eq!(decoder.feed(b"a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_flush_returns_trailing_fragment() {
        let mut decoder = LineDecoder::new();
        decoder.feed(b"first\n{\"status\":\"done\"}");
        assert_eq!(decoder.flush().as_deref(), Some("{\"status\":\"done\"}"));
        // Flushing clears the buffer
        assert_eq!(decoder.flush(), None);
    }

    #[test]
    fn test_flush_discards_whitespace_fragment() {
        let mut decoder = LineDecoder::new();
        decoder.feed(b"line\n  \r");
        assert_eq!(decoder.flush(), None);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_every_split_point_gives_same_lines() {
        let input = "{\"status\":\"Pulling fs layer\",\"id\":\"a1\"}\n\
                     {\"status\":\"Downloading\",\"id\":\"a1\",\"progressDetail\":{\"current\":5,\"total\":9}}\n\
                     {\"stream\":\"Étape terminée ✓\"}\n\
                     tail"
            .as_bytes();
        let whole = decode_in_chunks(input, &[]);
        assert_eq!(whole.len(), 4);

        for split in 0..=input.len() {
            assert_eq!(decode_in_chunks(input, &[split]), whole, "split at {}", split);
        }
        for a in (0..input.len()).step_by(7) {
            for b in (a..input.len()).step_by(11) {
                assert_eq!(decode_in_chunks(input, &[a, b]), whole, "splits at {} and {}", a, b);
            }
        }
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let line = "{\"status\":\"拉取完成 - ok\"}\n";
        let bytes = line.as_bytes();
        // Bytes 11..14 hold the first CJK character; split inside it.
        let (head, tail) = bytes.split_at(13);

        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(head).is_empty());
        let lines = decoder.feed(tail);
        assert_eq!(lines, vec![line.trim_end_matches('\n').to_string()]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let input = "αβγ\nδ\n".as_bytes();
        let mut decoder = LineDecoder::new();
        let mut lines = Vec::new();
        for byte in input {
            lines.extend(decoder.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(lines, vec!["αβγ", "δ"]);
    }
}
