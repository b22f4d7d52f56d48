//! Incremental line framing over a raw byte stream
//!
//! The serial link delivers bytes in arbitrary chunks: a read may return
//! half a line, three lines, or a line plus a fragment. [`LineFramer`]
//! buffers bytes until a `\n` terminator, hands each complete line to the
//! caller, and recovers from two corruption modes without ever failing:
//!
//! - an unterminated run longer than [`MAX_FRAME_LEN`](crate::MAX_FRAME_LEN)
//!   is discarded in its entirety up to the next terminator;
//! - bytes that do not form valid UTF-8 drop just that line.
//!
//! The framer itself never logs; it keeps counters and leaves reporting
//! to the link layer that owns it.

use crate::MAX_FRAME_LEN;

/// Running totals kept by a [`LineFramer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    /// Complete lines delivered to the caller.
    pub lines: u32,
    /// Lines discarded for exceeding the maximum frame length.
    pub dropped_oversize: u32,
    /// Lines discarded for invalid UTF-8.
    pub dropped_invalid_utf8: u32,
}

/// Reassembles newline-terminated lines from arbitrary byte chunks.
pub struct LineFramer {
    buf: heapless::Vec<u8, MAX_FRAME_LEN>,
    discarding: bool,
    stats: FramerStats,
}

impl LineFramer {
    /// Create an empty framer.
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            discarding: false,
            stats: FramerStats {
                lines: 0,
                dropped_oversize: 0,
                dropped_invalid_utf8: 0,
            },
        }
    }

    /// Feed a chunk of bytes, invoking `on_line` for each complete line.
    ///
    /// Lines are delivered with the terminator and any trailing `\r`
    /// stripped. Empty lines are skipped.
    pub fn push(&mut self, bytes: &[u8], mut on_line: impl FnMut(&str)) {
        for &byte in bytes {
            if byte == b'\n' {
                if self.discarding {
                    // End of a poisoned run; resume normal framing.
                    self.discarding = false;
                } else {
                    match core::str::from_utf8(&self.buf) {
                        Ok(line) => {
                            let line = line.trim_end_matches('\r');
                            if !line.is_empty() {
                                self.stats.lines += 1;
                                on_line(line);
                            }
                        }
                        Err(_) => self.stats.dropped_invalid_utf8 += 1,
                    }
                }
                self.buf.clear();
            } else if self.discarding {
                // Swallow until the next terminator.
            } else if self.buf.push(byte).is_err() {
                self.stats.dropped_oversize += 1;
                self.discarding = true;
                self.buf.clear();
            }
        }
    }

    /// Counters since construction.
    pub const fn stats(&self) -> FramerStats {
        self.stats
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(framer: &mut LineFramer, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        framer.push(bytes, |line| lines.push(line.to_owned()));
        lines
    }

    #[test]
    fn whole_line_in_one_chunk() {
        let mut framer = LineFramer::new();
        assert_eq!(collect(&mut framer, b"ACK id=1 ok=1\n"), vec!["ACK id=1 ok=1"]);
    }

    #[test]
    fn line_split_across_reads() {
        let mut framer = LineFramer::new();
        assert!(collect(&mut framer, b"TEL ts=5 ").is_empty());
        assert!(collect(&mut framer, b"co2=800").is_empty());
        assert_eq!(collect(&mut framer, b"\n"), vec!["TEL ts=5 co2=800"]);
    }

    #[test]
    fn multiple_lines_in_one_chunk() {
        let mut framer = LineFramer::new();
        let lines = collect(&mut framer, b"EVT kind=boot\r\nACK id=2 ok=1\n");
        assert_eq!(lines, vec!["EVT kind=boot", "ACK id=2 ok=1"]);
    }

    #[test]
    fn oversize_run_discarded_up_to_terminator() {
        let mut framer = LineFramer::new();
        let noise = vec![b'x'; MAX_FRAME_LEN * 2];
        assert!(collect(&mut framer, &noise).is_empty());
        // The tail of the poisoned run must not leak into the next line.
        let lines = collect(&mut framer, b"tail\nACK id=3 ok=1\n");
        assert_eq!(lines, vec!["ACK id=3 ok=1"]);
        assert_eq!(framer.stats().dropped_oversize, 1);
    }

    #[test]
    fn invalid_utf8_drops_only_that_line() {
        let mut framer = LineFramer::new();
        assert!(collect(&mut framer, b"\xff\xfe\n").is_empty());
        assert_eq!(collect(&mut framer, b"EVT kind=boot\n"), vec!["EVT kind=boot"]);
        assert_eq!(framer.stats().dropped_invalid_utf8, 1);
    }

    #[test]
    fn empty_lines_skipped() {
        let mut framer = LineFramer::new();
        assert!(collect(&mut framer, b"\n\r\n\n").is_empty());
        assert_eq!(framer.stats().lines, 0);
    }
}
