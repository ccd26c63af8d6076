//! JSON block framing
//!
//! The door sends JSON objects back-to-back over the socket with no
//! delimiter between them. A message is complete when the `{`/`}` nesting
//! depth returns to zero; the wire never puts braces inside string values.

/// Streaming decoder that splits raw socket bytes into complete JSON blocks
pub struct BlockDecoder {
    buffer: Vec<u8>,
}

impl Default for BlockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDecoder {
    /// Create a new block decoder
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(512),
        }
    }

    /// Feed bytes into the decoder and extract complete blocks
    ///
    /// Returns a vector of complete JSON blocks (may be empty if no
    /// complete block has arrived yet). Bytes before the first `{` are
    /// line noise and get discarded.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);

        let mut blocks = Vec::new();
        loop {
            // Drop anything before the opening brace
            match self.buffer.iter().position(|&b| b == b'{') {
                Some(0) => {}
                Some(start) => {
                    tracing::warn!("Discarding {} bytes before block start", start);
                    self.buffer.drain(..start);
                }
                None => {
                    if !self.buffer.is_empty() {
                        tracing::warn!("Discarding {} bytes before block start", self.buffer.len());
                        self.buffer.clear();
                    }
                    break;
                }
            }

            match find_end(&self.buffer) {
                Some(end) => {
                    let rest = self.buffer.split_off(end);
                    blocks.push(std::mem::replace(&mut self.buffer, rest));
                }
                None => break,
            }
        }

        blocks
    }

    /// Clear the decoder state
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Find the end of the first balanced `{ ... }` block
///
/// Returns the index one past the closing brace, or `None` if the block is
/// still incomplete. The buffer must start with `{`.
fn find_end(buffer: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &byte) in buffer.iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block() {
        let mut decoder = BlockDecoder::new();
        let blocks = decoder.feed(b"{\"success\":\"true\"}");
        assert_eq!(blocks, vec![b"{\"success\":\"true\"}".to_vec()]);
    }

    #[test]
    fn test_partial_block() {
        let mut decoder = BlockDecoder::new();

        let blocks = decoder.feed(b"{\"success\":");
        assert!(blocks.is_empty());

        let blocks = decoder.feed(b"\"true\"}");
        assert_eq!(blocks, vec![b"{\"success\":\"true\"}".to_vec()]);
    }

    #[test]
    fn test_multiple_blocks_in_one_read() {
        let mut decoder = BlockDecoder::new();
        let blocks = decoder.feed(b"{\"a\":1}{\"b\":2}");
        assert_eq!(blocks, vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
    }

    #[test]
    fn test_nested_object() {
        let mut decoder = BlockDecoder::new();
        let blocks = decoder.feed(b"{\"settings\":{\"inside\":\"true\"}}");
        assert_eq!(blocks, vec![b"{\"settings\":{\"inside\":\"true\"}}".to_vec()]);
    }

    #[test]
    fn test_leading_noise_discarded() {
        let mut decoder = BlockDecoder::new();
        let blocks = decoder.feed(b"\r\n{\"a\":1}");
        assert_eq!(blocks, vec![b"{\"a\":1}".to_vec()]);
    }

    #[test]
    fn test_block_split_across_three_reads() {
        let mut decoder = BlockDecoder::new();
        assert!(decoder.feed(b"{\"settings\":{\"ins").is_empty());
        assert!(decoder.feed(b"ide\":\"true\"}").is_empty());
        let blocks = decoder.feed(b"}{\"b\":2}");
        assert_eq!(
            blocks,
            vec![
                b"{\"settings\":{\"inside\":\"true\"}}".to_vec(),
                b"{\"b\":2}".to_vec()
            ]
        );
    }
}
