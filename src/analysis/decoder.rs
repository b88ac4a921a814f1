//! Line framing for `data: ...` event streams.
//!
//! Chunks arrive with arbitrary boundaries, including in the middle of a
//! line or a multi-byte character. Bytes are buffered until a newline is
//! seen, so a record is only ever decoded from a complete line.

/// Prefix marking a data line. Anything else on the wire is ignored.
pub const RECORD_MARKER: &str = "data: ";

/// Payload value that signals the logical end of a provider stream.
pub const TERMINAL_SENTINEL: &str = "[DONE]";

/// One decoded data line, marker stripped. Provider JSON is not parsed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEventRecord {
    payload: String,
}

impl StreamEventRecord {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Incremental decoder from raw bytes to [`StreamEventRecord`]s.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    saw_terminator: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every record completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEventRecord> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(|line| self.decode_line(line))
            .collect()
    }

    /// Flush the trailing unterminated line, if it is a data line.
    ///
    /// The decoder is empty afterwards and can be reused.
    pub fn finish(&mut self) -> Vec<StreamEventRecord> {
        let trailing = std::mem::take(&mut self.buffer);
        let records = self.decode_line(&trailing).into_iter().collect();
        self.saw_terminator = false;
        records
    }

    /// Whether the terminal sentinel has been seen since the last `finish`.
    pub fn saw_terminator(&self) -> bool {
        self.saw_terminator
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<StreamEventRecord> {
        let text = String::from_utf8_lossy(line);
        let line = text.strip_suffix('\r').unwrap_or(text.as_ref());

        let payload = line.strip_prefix(RECORD_MARKER)?;
        if payload == TERMINAL_SENTINEL {
            self.saw_terminator = true;
            return None;
        }
        if payload.trim().is_empty() {
            return None;
        }
        Some(StreamEventRecord::new(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(records: &[StreamEventRecord]) -> Vec<&str> {
        records.iter().map(|r| r.payload()).collect()
    }

    #[test]
    fn test_feed_complete_lines() {
        let mut decoder = StreamDecoder::new();
        let records = decoder.feed(b"data: {\"a\":1}\ndata: {\"b\":2}\n");
        assert_eq!(payloads(&records), vec!["{\"a\":1}", "{\"b\":2}"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(b"data: {\"te").is_empty());
        assert!(decoder.feed(b"xt\":\"hi\"}").is_empty());
        let records = decoder.feed(b"\n");
        assert_eq!(payloads(&records), vec!["{\"text\":\"hi\"}"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "data: {\"zh\":\"名称\"}\n".as_bytes();
        // Split inside the first CJK character.
        let split = bytes.iter().position(|&b| b >= 0x80).unwrap() + 1;
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(&bytes[..split]).is_empty());
        let records = decoder.feed(&bytes[split..]);
        assert_eq!(payloads(&records), vec!["{\"zh\":\"名称\"}"]);
    }

    #[test]
    fn test_sentinel_and_noise_are_dropped() {
        let mut decoder = StreamDecoder::new();
        let records = decoder.feed(b": keep-alive\n\nevent: ping\ndata: [DONE]\ndata: x\n");
        assert_eq!(payloads(&records), vec!["x"]);
        assert!(decoder.saw_terminator());
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = StreamDecoder::new();
        let records = decoder.feed(b"data: {\"a\":1}\r\n\r\ndata: [DONE]\r\n");
        assert_eq!(payloads(&records), vec!["{\"a\":1}"]);
        assert!(decoder.saw_terminator());
    }

    #[test]
    fn test_finish_flushes_trailing_data_line() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(b"data: {\"tail\":true}").is_empty());
        let records = decoder.finish();
        assert_eq!(payloads(&records), vec!["{\"tail\":true}"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_finish_discards_partial_non_data_line() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(b"dat");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let stream = "data: {\"candidates\":[1]}\n: comment\ndata: 名称 ✓\r\ndata: [DONE]\ndata: last".as_bytes();

        let mut whole = StreamDecoder::new();
        let mut expected = whole.feed(stream);
        expected.extend(whole.finish());

        for chunk_size in 1..stream.len() {
            let mut decoder = StreamDecoder::new();
            let mut records = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                records.extend(decoder.feed(chunk));
            }
            records.extend(decoder.finish());
            assert_eq!(records, expected, "chunk size {}", chunk_size);
        }
        assert_eq!(expected.len(), 3);
    }
}
