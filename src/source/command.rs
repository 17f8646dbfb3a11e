//! Line-buffered command channel layered over whatever chunking the frame
//! codec happens to hand it, plus the per-version Music-Info encoding.

use crate::constants::LINE_ENDING;
use std::collections::HashMap;

/// Splits a raw command-channel byte stream into `NAME: value` lines.
///
/// Re-entrant across arbitrary feed sizes, same contract as the frame
/// codecs: `feed` buffers, `next_command` returns `None` until a full line
/// is available.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Creates an empty line buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `bytes` for subsequent line extraction.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops and parses one complete line, if buffered.
    pub fn next_command(&mut self) -> Option<(String, String)> {
        let pos = self.buf.windows(2).position(|w| w == b"\r\n")?;
        let line_bytes: Vec<u8> = self.buf.drain(..pos + 2).collect();
        let line = String::from_utf8_lossy(&line_bytes[..pos]);
        parse_command_line(&line)
    }
}

fn parse_command_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.splitn(2, ':');
    let name = parts.next()?.trim().to_ascii_lowercase();
    let value = parts.next()?.trim().to_string();
    Some((name, value))
}

/// Encodes a single `NAME: value\r\n` command line.
pub fn encode_command(name: &str, value: &str) -> Vec<u8> {
    format!("{}: {}{}", name, value, LINE_ENDING).into_bytes()
}

/// Encodes a music-info tag map for the given protocol major version,
/// injecting `offset` alongside the caller-supplied tags. v1 uses
/// form-urlencoded pairs; v2 uses a JSON object.
pub fn encode_music_info(major: u16, tags: &HashMap<String, String>, offset: u64) -> String {
    if major == 1 {
        let mut pairs: Vec<String> = tags
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        pairs.sort();
        pairs.push(format!("offset={}", offset));
        pairs.join("&")
    } else {
        let mut map = serde_json::Map::new();
        for (k, v) in tags {
            map.insert(k.clone(), serde_json::Value::String(v.clone()));
        }
        map.insert("offset".to_string(), serde_json::Value::from(offset));
        serde_json::Value::Object(map).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_line() {
        let mut buf = LineBuffer::new();
        buf.feed(b"User: bob\r\n");
        assert_eq!(buf.next_command(), Some(("user".to_string(), "bob".to_string())));
        assert_eq!(buf.next_command(), None);
    }

    #[test]
    fn reassembles_a_line_split_across_feeds() {
        let mut buf = LineBuffer::new();
        buf.feed(b"Sal");
        assert_eq!(buf.next_command(), None);
        buf.feed(b"t: abc\r\n");
        assert_eq!(buf.next_command(), Some(("salt".to_string(), "abc".to_string())));
    }

    #[test]
    fn values_may_contain_colons() {
        let mut buf = LineBuffer::new();
        buf.feed(b"Error: 101 bad protocol: 1/9\r\n");
        assert_eq!(
            buf.next_command(),
            Some(("error".to_string(), "101 bad protocol: 1/9".to_string()))
        );
    }

    #[test]
    fn music_info_v1_is_form_urlencoded_with_offset() {
        let mut tags = HashMap::new();
        tags.insert("artist".to_string(), "A B".to_string());
        let encoded = encode_music_info(1, &tags, 42);
        assert!(encoded.contains("artist=A%20B") || encoded.contains("artist=A+B"));
        assert!(encoded.ends_with("offset=42"));
    }

    #[test]
    fn music_info_v2_is_json_with_offset() {
        let mut tags = HashMap::new();
        tags.insert("artist".to_string(), "A B".to_string());
        let encoded = encode_music_info(2, &tags, 42);
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["artist"], "A B");
        assert_eq!(value["offset"], 42);
    }
}
