/// Incremental parser for the upstream's event framing.
///
/// The upstream emits newline-delimited `data: <json>` lines; no `event:`,
/// `id:` or blank-line dispatch semantics are consumed. Chunks arrive at
/// arbitrary byte boundaries, so the parser buffers across chunks, processes
/// every complete line, and retains the trailing fragment for the next feed.
use memchr::memchr_iter;

pub struct DataLineParser {
    buffer: Vec<u8>,
    read_offset: usize,
}

impl DataLineParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            read_offset: 0,
        }
    }

    /// Feed a raw chunk and return the complete `data:` payloads it yields.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed a raw chunk and append complete payloads into a caller-provided buffer.
    ///
    /// Lines not prefixed with `data: ` are ignored, as are payloads that are
    /// empty after trimming. A line holding invalid UTF-8 is dropped without
    /// aborting the stream.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        self.buffer.extend_from_slice(chunk);
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &self.buffer[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            if let Some(payload) = data_payload(line) {
                out.push(payload);
            }
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}

impl Default for DataLineParser {
    fn default() -> Self {
        Self::new()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let rest = line.strip_prefix(b"data: ")?;
    let text = std::str::from_utf8(rest).ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_data_line() {
        let mut parser = DataLineParser::new();
        let payloads = parser.feed(b"data: {\"type\":\"session.idle\"}\n");
        assert_eq!(payloads, vec!["{\"type\":\"session.idle\"}"]);
    }

    #[test]
    fn test_parse_multiple_lines_one_chunk() {
        let mut parser = DataLineParser::new();
        let payloads = parser.feed(b"data: first\ndata: second\n");
        assert_eq!(payloads, vec!["first", "second"]);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut parser = DataLineParser::new();
        assert!(parser.feed(b"data: {\"ty").is_empty());
        let payloads = parser.feed(b"pe\":\"x\"}\n");
        assert_eq!(payloads, vec!["{\"type\":\"x\"}"]);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut parser = DataLineParser::new();
        let payloads = parser.feed(b": heartbeat\nevent: ping\nretry: 500\ndata: kept\n");
        assert_eq!(payloads, vec!["kept"]);
    }

    #[test]
    fn test_data_without_space_ignored() {
        let mut parser = DataLineParser::new();
        assert!(parser.feed(b"data:nospace\n").is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = DataLineParser::new();
        let payloads = parser.feed(b"data: hello\r\n");
        assert_eq!(payloads, vec!["hello"]);
    }

    #[test]
    fn test_blank_payload_skipped() {
        let mut parser = DataLineParser::new();
        assert!(parser.feed(b"data:  \n\n").is_empty());
    }

    #[test]
    fn test_incomplete_tail_retained() {
        let mut parser = DataLineParser::new();
        assert!(parser.feed(b"data: tail-without-newline").is_empty());
        let payloads = parser.feed(b"\n");
        assert_eq!(payloads, vec!["tail-without-newline"]);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let mut parser = DataLineParser::new();
        let line = "data: caf\u{e9}\n".as_bytes();
        // Split inside the two-byte sequence for é.
        let (head, tail) = line.split_at(line.len() - 2);
        assert!(parser.feed(head).is_empty());
        let payloads = parser.feed(tail);
        assert_eq!(payloads, vec!["caf\u{e9}"]);
    }

    #[test]
    fn test_invalid_utf8_line_dropped() {
        let mut parser = DataLineParser::new();
        let payloads = parser.feed(b"data: \xff\xfe\ndata: ok\n");
        assert_eq!(payloads, vec!["ok"]);
    }

    #[test]
    fn test_feed_into_appends_without_clearing_output() {
        let mut parser = DataLineParser::new();
        let mut out = vec!["seed".to_string()];
        parser.feed_into(b"data: a\n", &mut out);
        assert_eq!(out, vec!["seed", "a"]);
    }

    #[test]
    fn test_large_buffer_compaction_keeps_tail() {
        let mut parser = DataLineParser::new();
        let mut chunk = Vec::new();
        for i in 0..600 {
            chunk.extend_from_slice(format!("data: frame-{i}\n").as_bytes());
        }
        chunk.extend_from_slice(b"data: partial");
        let payloads = parser.feed(&chunk);
        assert_eq!(payloads.len(), 600);
        let tail = parser.feed(b"-done\n");
        assert_eq!(tail, vec!["partial-done"]);
    }
}
