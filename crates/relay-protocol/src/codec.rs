//! Line framing for the client byte stream.
//!
//! [`LineCodec`] splits incoming bytes on `\n`, drops a trailing `\r`, and
//! decodes lossily so a stray invalid byte never tears down a session.
//! A run of more than `max_length` bytes without a terminator is cut into
//! `max_length`-byte units, each yielded as its own line.
//!
//! A codec built [`with_handshake`](LineCodec::with_handshake) yields its
//! first frame from whatever bytes the first read delivered, capped at the
//! handshake limit, without waiting for a terminator. If that frame had no
//! terminator, a bare `\n` or `\r\n` arriving next is taken as its late
//! line ending rather than an empty line.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::MAX_LINE_LEN;

/// Decoder yielding one `String` per protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes of the buffer already scanned for a terminator.
    next_index: usize,
    /// Byte limit of the first frame while the handshake is pending.
    handshake_limit: Option<usize>,
    /// The handshake frame ended without its terminator.
    expect_late_terminator: bool,
}

impl LineCodec {
    /// Creates a codec with the protocol's line limit.
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LEN)
    }

    /// Creates a codec with a custom line limit (minimum 1).
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            next_index: 0,
            handshake_limit: None,
            expect_late_terminator: false,
        }
    }

    /// Makes the first frame a single-read handshake of at most `limit`
    /// bytes (minimum 1).
    pub fn with_handshake(mut self, limit: usize) -> Self {
        self.handshake_limit = Some(limit.max(1));
        self
    }

    /// Returns the maximum payload length of a yielded line.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn decode_handshake(&mut self, buf: &mut BytesMut, limit: usize) -> String {
        let window = terminator_window(buf, limit);
        let newline = buf
            .get(..window)
            .and_then(|scan| scan.iter().position(|b| *b == b'\n'));

        if let Some(pos) = newline {
            let line = buf.split_to(pos + 1);
            return to_text(line.get(..pos).unwrap_or_default());
        }

        let available = buf.get(..limit.min(buf.len())).unwrap_or_default();
        let name = buf.split_to(utf8_prefix_len(available));
        self.expect_late_terminator = true;
        to_text(&name)
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if buf.is_empty() {
            return Ok(None);
        }

        if let Some(limit) = self.handshake_limit.take() {
            return Ok(Some(self.decode_handshake(buf, limit)));
        }

        if self.expect_late_terminator {
            match buf.first().copied() {
                Some(b'\n') => {
                    buf.advance(1);
                    self.expect_late_terminator = false;
                    return self.decode(buf);
                }
                Some(b'\r') if buf.len() == 1 => return Ok(None),
                Some(b'\r') if buf.get(1) == Some(&b'\n') => {
                    buf.advance(2);
                    self.expect_late_terminator = false;
                    return self.decode(buf);
                }
                _ => self.expect_late_terminator = false,
            }
        }

        let window = terminator_window(buf, self.max_length);
        let newline = buf
            .get(self.next_index..window)
            .and_then(|scan| scan.iter().position(|b| *b == b'\n'))
            .map(|offset| offset + self.next_index);

        if let Some(pos) = newline {
            self.next_index = 0;
            let line = buf.split_to(pos + 1);
            let payload = line.get(..pos).unwrap_or_default();
            return Ok(Some(to_text(payload)));
        }

        if buf.len() > self.max_length {
            // A `\r` just past the limit may be the first half of `\r\n`
            if buf.len() == self.max_length + 1 && buf.get(self.max_length) == Some(&b'\r') {
                self.next_index = buf.len();
                return Ok(None);
            }
            self.next_index = 0;
            let chunk = buf.split_to(self.max_length);
            return Ok(Some(to_text(&chunk)));
        }

        self.next_index = buf.len();
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if self.expect_late_terminator && buf[..] == b"\r"[..] {
            buf.clear();
        }
        if buf.is_empty() {
            return Ok(None);
        }
        self.next_index = 0;
        let rest = buf.split_to(buf.len());
        Ok(Some(to_text(&rest)))
    }
}

/// Length of the prefix that may hold the `\n` ending a payload of at most
/// `limit` bytes, allowing for a `\r` before it.
fn terminator_window(buf: &[u8], limit: usize) -> usize {
    let reach = if buf.get(limit) == Some(&b'\r') {
        limit + 2
    } else {
        limit + 1
    };
    buf.len().min(reach)
}

/// Drops an incomplete UTF-8 sequence cut off at the end of `bytes`.
fn utf8_prefix_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => e.valid_up_to(),
        _ => bytes.len(),
    }
}

fn to_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_util::codec::FramedRead;

    fn decode_all(codec: &mut LineCodec, input: &[u8]) -> Vec<String> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_splits_on_newline_and_strips_cr() {
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"hello\r\nworld\npartial");
        assert_eq!(lines, vec!["hello", "world"]);
    }

    #[test]
    fn test_partial_line_waits_for_more_input() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"hel"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"lo\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("hello".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_overlong_run_is_chunked() {
        let mut codec = LineCodec::with_max_length(4);
        let lines = decode_all(&mut codec, b"abcdefghij\n");
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_line_at_exact_limit_is_not_split() {
        let mut codec = LineCodec::with_max_length(4);
        let lines = decode_all(&mut codec, b"abcd\nxy\n");
        assert_eq!(lines, vec!["abcd", "xy"]);
    }

    #[test]
    fn test_crlf_at_exact_limit_is_one_line() {
        let mut codec = LineCodec::with_max_length(4);
        let lines = decode_all(&mut codec, b"abcd\r\nxy\n");
        assert_eq!(lines, vec!["abcd", "xy"]);
    }

    #[test]
    fn test_crlf_at_limit_split_across_reads() {
        let mut codec = LineCodec::with_max_length(4);
        let mut buf = BytesMut::from(&b"abcd\r"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("abcd".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_cr_at_limit_without_newline_is_chunked() {
        let mut codec = LineCodec::with_max_length(4);
        let lines = decode_all(&mut codec, b"abcd\rxy\n");
        assert_eq!(lines, vec!["abcd", "\rxy"]);
    }

    #[test]
    fn test_handshake_unterminated_name() {
        let mut codec = LineCodec::new().with_handshake(15);
        let mut buf = BytesMut::from(&b"alice"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("alice".to_string()));
        assert!(buf.is_empty());

        // The late terminator is swallowed, later lines frame normally
        buf.extend_from_slice(b"\r\nhello\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("hello".to_string()));
    }

    #[test]
    fn test_handshake_terminated_name() {
        let mut codec = LineCodec::new().with_handshake(15);
        let lines = decode_all(&mut codec, b"alice\n\nlist\n");
        // The second newline is a real empty line
        assert_eq!(lines, vec!["alice", "", "list"]);
    }

    #[test]
    fn test_handshake_is_capped_at_limit() {
        let mut codec = LineCodec::new().with_handshake(5);
        let lines = decode_all(&mut codec, b"abcdefgh\n");
        assert_eq!(lines, vec!["abcde", "fgh"]);
    }

    #[test]
    fn test_handshake_cap_keeps_whole_chars() {
        let mut codec = LineCodec::new().with_handshake(4);
        // 'é' is two bytes straddling the cap
        let lines = decode_all(&mut codec, "abcé\n".as_bytes());
        assert_eq!(lines, vec!["abc", "é"]);
    }

    #[test]
    fn test_handshake_waits_for_first_bytes() {
        let mut codec = LineCodec::new().with_handshake(15);
        let mut buf = BytesMut::new();
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"ok\xFFok\n");
        assert_eq!(lines, vec!["ok\u{FFFD}ok"]);
    }

    #[test]
    fn test_decode_eof_flushes_unterminated_tail() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"GONE"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("GONE".to_string()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_max_length_floor() {
        assert_eq!(LineCodec::with_max_length(0).max_length(), 1);
        assert_eq!(LineCodec::default().max_length(), MAX_LINE_LEN);
    }

    #[tokio::test]
    async fn test_framed_read_over_stream() {
        let input: &[u8] = b"alice\nlist\nMESG bob hi\n";
        let mut framed = FramedRead::new(input, LineCodec::new());

        let mut lines = Vec::new();
        while let Some(line) = framed.next().await {
            lines.push(line.unwrap());
        }
        assert_eq!(lines, vec!["alice", "list", "MESG bob hi"]);
    }
}
