use std::string::FromUtf8Error;

/// Byte that ends a line in both directions
pub const LINE_TERMINATOR: u8 = b'\n';

/// Splits an inbound byte stream into newline-terminated text lines.
///
/// Bytes are buffered until a terminator arrives, so reads may split a line
/// (or a multi-byte UTF-8 character) anywhere. Each complete line is decoded
/// as a whole and stripped of surrounding whitespace.
///
/// The buffer is unbounded: a device that never sends `\n` grows it until
/// the session stops.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
    // Bytes of `pending` already known to hold no terminator
    scanned: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read from the port
    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Take the next complete line, if one is buffered.
    ///
    /// A line that is not valid UTF-8 is returned as an error; it has already
    /// been removed from the buffer.
    pub fn next_line(&mut self) -> Option<Result<String, FromUtf8Error>> {
        let Some(offset) = self.pending[self.scanned..]
            .iter()
            .position(|&b| b == LINE_TERMINATOR)
        else {
            self.scanned = self.pending.len();
            return None;
        };

        let end = self.scanned + offset;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        self.scanned = 0;

        Some(String::from_utf8(line).map(|text| text.trim().to_string()))
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(framer: &mut LineFramer) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = framer.next_line() {
            lines.push(line.unwrap());
        }
        lines
    }

    #[test]
    fn test_single_chunk_two_lines() {
        let mut framer = LineFramer::new();
        framer.extend(b"abc\ndef\n");
        assert_eq!(drain(&mut framer), vec!["abc", "def"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_partial_line_is_held() {
        let mut framer = LineFramer::new();
        framer.extend(b"hel");
        assert!(framer.next_line().is_none());
        framer.extend(b"lo\nwor");
        assert_eq!(drain(&mut framer), vec!["hello"]);
        assert_eq!(framer.pending_len(), 3);
    }

    #[test]
    fn test_carriage_return_and_padding_stripped() {
        let mut framer = LineFramer::new();
        framer.extend(b"  OK\r\n\r\n");
        assert_eq!(drain(&mut framer), vec!["OK", ""]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "temp 21\u{00b0}C\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC2).unwrap() + 1;

        let mut framer = LineFramer::new();
        framer.extend(&bytes[..split]);
        assert!(framer.next_line().is_none());
        framer.extend(&bytes[split..]);
        assert_eq!(drain(&mut framer), vec!["temp 21\u{00b0}C"]);
    }

    #[test]
    fn test_invalid_utf8_line_is_an_error() {
        let mut framer = LineFramer::new();
        framer.extend(b"ok\n\xff\xfe\nafter\n");
        assert_eq!(framer.next_line().unwrap().unwrap(), "ok");
        assert!(framer.next_line().unwrap().is_err());
        assert_eq!(framer.next_line().unwrap().unwrap(), "after");
    }

    proptest! {
        #[test]
        fn prop_split_points_do_not_change_lines(
            cuts in proptest::collection::vec(0usize..=8, 0..6)
        ) {
            let stream = b"abc\ndef\n";
            let mut cuts = cuts;
            cuts.push(0);
            cuts.push(stream.len());
            cuts.sort_unstable();

            let mut framer = LineFramer::new();
            let mut lines = Vec::new();
            for window in cuts.windows(2) {
                framer.extend(&stream[window[0]..window[1]]);
                lines.extend(drain(&mut framer));
            }

            prop_assert_eq!(lines, vec!["abc".to_string(), "def".to_string()]);
        }

        #[test]
        fn prop_arbitrary_lines_survive_chunking(
            lines in proptest::collection::vec("[a-zA-Z0-9 ,.:=]{0,24}", 1..8),
            chunk in 1usize..16
        ) {
            let stream: Vec<u8> = lines
                .iter()
                .flat_map(|l| l.bytes().chain(std::iter::once(LINE_TERMINATOR)))
                .collect();

            let mut framer = LineFramer::new();
            let mut received = Vec::new();
            for piece in stream.chunks(chunk) {
                framer.extend(piece);
                received.extend(drain(&mut framer));
            }

            let expected: Vec<String> = lines.iter().map(|l| l.trim().to_string()).collect();
            prop_assert_eq!(received, expected);
        }
    }
}
