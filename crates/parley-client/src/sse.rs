//! Incremental decoder for the upstream's streamed completion frames
//!
//! Raw bytes go in through [`FrameDecoder::push`]; text deltas come out by
//! iterating the decoder. Only complete, newline-terminated lines are ever
//! decoded, so frames split across network reads (including multi-byte
//! characters split mid-sequence) reassemble correctly.

use serde::Deserialize;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Longest line the decoder buffers; anything longer is counted as malformed
/// and dropped up to its terminating newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<FrameChoice>,
}

#[derive(Debug, Deserialize)]
struct FrameChoice {
    #[serde(default)]
    delta: Option<FrameDelta>,
}

#[derive(Debug, Deserialize)]
struct FrameDelta {
    #[serde(default)]
    content: Option<String>,
}

/// What a single line of the stream turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameLine {
    Blank,
    Done,
    Content(String),
    /// A well-formed frame that carries no text (role preamble, finish marker).
    NoContent,
    Malformed(String),
}

/// Classifies one complete line, without its trailing newline.
pub fn classify_line(line: &str) -> FrameLine {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return FrameLine::Blank;
    }
    let payload = line.strip_prefix(DATA_PREFIX).unwrap_or(line);
    if payload == DONE_SENTINEL {
        return FrameLine::Done;
    }
    match serde_json::from_str::<StreamFrame>(payload) {
        Ok(frame) => frame
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map(FrameLine::Content)
            .unwrap_or(FrameLine::NoContent),
        Err(e) => FrameLine::Malformed(e.to_string()),
    }
}

/// Byte buffer scoped to one streaming call.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    /// Set while dropping the rest of an oversized line.
    skipping: bool,
    frames: usize,
    malformed: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of frames that failed to parse and were skipped.
    pub fn malformed_frames(&self) -> usize {
        self.malformed
    }

    /// Number of content frames produced so far.
    pub fn content_frames(&self) -> usize {
        self.frames
    }

    /// Ends the call. Bytes after the last newline are dropped; their count is
    /// returned.
    pub fn finish(self) -> usize {
        if !self.buffer.is_empty() {
            debug!(
                "Discarding {} trailing bytes without a line terminator",
                self.buffer.len()
            );
        }
        self.buffer.len()
    }

    fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n')
            else {
                self.scanned = self.buffer.len();
                if self.buffer.len() > MAX_LINE_BYTES {
                    self.drop_oversized();
                }
                return None;
            };
            let end = self.scanned + offset;
            self.scanned = 0;
            let line: Vec<u8> = self.buffer.drain(..=end).collect();

            if std::mem::take(&mut self.skipping) {
                continue;
            }
            if end > MAX_LINE_BYTES {
                self.reject_oversized(end);
                continue;
            }
            return Some(String::from_utf8_lossy(&line[..end]).into_owned());
        }
    }

    fn drop_oversized(&mut self) {
        if !self.skipping {
            self.reject_oversized(self.buffer.len());
        }
        self.skipping = true;
        self.buffer.clear();
        self.scanned = 0;
    }

    fn reject_oversized(&mut self, len: usize) {
        self.malformed += 1;
        warn!(
            "Skipping stream line of {} bytes, limit is {}",
            len, MAX_LINE_BYTES
        );
    }
}

impl Iterator for FrameDecoder {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let line = self.next_line()?;
            match classify_line(&line) {
                FrameLine::Content(content) => {
                    self.frames += 1;
                    return Some(content);
                }
                FrameLine::Malformed(reason) => {
                    self.malformed += 1;
                    warn!("Skipping malformed stream frame: {}, raw: {}", reason, line);
                }
                FrameLine::Blank | FrameLine::Done | FrameLine::NoContent => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn decode_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.push(chunk);
            out.extend(decoder.by_ref());
        }
        out
    }

    #[test]
    fn test_classify_data_line() {
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"content":"A"}}]}"#),
            FrameLine::Content("A".into())
        );
    }

    #[test]
    fn test_classify_without_prefix() {
        assert_eq!(
            classify_line(r#"{"choices":[{"delta":{"content":"A"}}]}"#),
            FrameLine::Content("A".into())
        );
    }

    #[test]
    fn test_classify_special_lines() {
        assert_eq!(classify_line(""), FrameLine::Blank);
        assert_eq!(classify_line("   \r"), FrameLine::Blank);
        assert_eq!(classify_line("data: [DONE]"), FrameLine::Done);
        assert_eq!(classify_line("data: [DONE]\r"), FrameLine::Done);
        assert_eq!(classify_line("[DONE]"), FrameLine::Done);
    }

    #[test]
    fn test_classify_frames_without_text() {
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            FrameLine::NoContent
        );
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            FrameLine::NoContent
        );
        assert_eq!(classify_line(r#"data: {"choices":[]}"#), FrameLine::NoContent);
        assert_eq!(
            classify_line(r#"data: {"choices":[{"finish_reason":"stop","delta":{}}]}"#),
            FrameLine::NoContent
        );
    }

    #[test]
    fn test_classify_malformed() {
        assert!(matches!(classify_line("notjson"), FrameLine::Malformed(_)));
        assert!(matches!(
            classify_line(r#"data: {"choices":"#),
            FrameLine::Malformed(_)
        ));
    }

    #[test]
    fn test_two_frames_then_done() {
        let input = format!("{}{}data: [DONE]\n", frame("A"), frame("B"));
        assert_eq!(decode_all(&[input.as_bytes()]), vec!["A", "B"]);
    }

    #[test]
    fn test_malformed_line_between_frames_is_skipped() {
        let input = format!("{}notjson\n{}[DONE]\n", frame("one"), frame("two"));
        let mut decoder = FrameDecoder::new();
        decoder.push(input.as_bytes());
        let out: Vec<String> = decoder.by_ref().collect();
        assert_eq!(out, vec!["one", "two"]);
        assert_eq!(decoder.malformed_frames(), 1);
        assert_eq!(decoder.content_frames(), 2);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let input = frame("hello");
        let (head, tail) = input.as_bytes().split_at(17);
        assert_eq!(decode_all(&[head, tail]), vec!["hello"]);
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let input = frame("你好");
        let bytes = input.as_bytes();
        let split = input.find('你').unwrap() + 1;
        assert_eq!(
            decode_all(&[&bytes[..split], &bytes[split..]]),
            vec!["你好"]
        );
    }

    #[test]
    fn test_partial_trailing_line_is_discarded() {
        let input = format!("{}{}", frame("kept"), frame("lost").trim_end());
        let mut decoder = FrameDecoder::new();
        decoder.push(input.as_bytes());
        let out: Vec<String> = decoder.by_ref().collect();
        assert_eq!(out, vec!["kept"]);
        assert!(decoder.finish() > 0);
    }

    #[test]
    fn test_blank_lines_between_frames() {
        let input = format!("\n{}\n\n{}\n", frame("x"), frame("y"));
        assert_eq!(decode_all(&[input.as_bytes()]), vec!["x", "y"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let input = "data: {\"choices\":[{\"delta\":{\"content\":\"r\"}}]}\r\ndata: [DONE]\r\n";
        assert_eq!(decode_all(&[input.as_bytes()]), vec!["r"]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let input = format!("{}{}data: [DONE]\n", frame("slow"), frame("drip"));
        let chunks: Vec<&[u8]> = input.as_bytes().chunks(1).collect();
        assert_eq!(decode_all(&chunks), vec!["slow", "drip"]);
    }

    #[test]
    fn test_oversized_line_is_dropped() {
        let filler = vec![b'x'; 64 * 1024];
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for _ in 0..(MAX_LINE_BYTES / filler.len() + 2) {
            decoder.push(&filler);
            out.extend(decoder.by_ref());
        }
        assert!(decoder.buffer.len() <= MAX_LINE_BYTES);

        decoder.push(b"tail of the long line\n");
        decoder.push(frame("after").as_bytes());
        out.extend(decoder.by_ref());
        assert_eq!(out, vec!["after"]);
        assert_eq!(decoder.malformed_frames(), 1);
    }

    #[test]
    fn test_oversized_line_in_one_read() {
        let mut input = vec![b'y'; MAX_LINE_BYTES + 1];
        input.push(b'\n');
        input.extend_from_slice(frame("ok").as_bytes());
        let mut decoder = FrameDecoder::new();
        decoder.push(&input);
        let out: Vec<String> = decoder.by_ref().collect();
        assert_eq!(out, vec!["ok"]);
        assert_eq!(decoder.malformed_frames(), 1);
    }

    #[test]
    fn test_empty_finish() {
        assert_eq!(FrameDecoder::new().finish(), 0);
    }
}
