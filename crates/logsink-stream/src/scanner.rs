use std::ops::Range;

/// Result of scanning a byte buffer for line terminators
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scan {
    /// Complete, non-empty lines in the order found
    pub segments: Vec<Range<usize>>,

    /// Trailing bytes not yet known to be complete
    pub remainder: Range<usize>,
}

fn is_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

/// Split `bytes` into complete lines and an unterminated remainder.
///
/// Any run of `\r` and `\n` bytes counts as a single boundary, so no empty
/// segment is ever produced.
pub fn scan(bytes: &[u8]) -> Scan {
    let mut segments = Vec::new();
    let mut start = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if is_terminator(byte) {
            if i > start {
                segments.push(start..i);
            }
            start = i + 1;
        }
    }

    Scan {
        segments,
        remainder: start..bytes.len(),
    }
}
