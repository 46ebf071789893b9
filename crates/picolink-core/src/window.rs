//! Bounded history of the most recently written bytes.

use std::collections::VecDeque;

/// Number of trailing bytes kept by default.
pub const WRITE_WINDOW_CAPACITY: usize = 20;

/// FIFO window over the tail of everything written to the link.
///
/// Used to spot duplicated writes and for debugging what was last sent to
/// the REPL. Once full, each new byte evicts the oldest one.
#[derive(Debug, Clone)]
pub struct WriteWindow {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl Default for WriteWindow {
    fn default() -> Self {
        Self::with_capacity(WRITE_WINDOW_CAPACITY)
    }
}

impl WriteWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `data`, evicting from the front to stay within capacity.
    pub fn record(&mut self, data: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        // Only the tail of an oversized chunk can survive.
        let tail = data.len().saturating_sub(self.capacity);
        for byte in data.iter().skip(tail) {
            if self.bytes.len() == self.capacity {
                self.bytes.pop_front();
            }
            self.bytes.push_back(*byte);
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.to_vec()).into_owned()
    }

    /// Returns true if the window currently ends with `suffix`.
    pub fn ends_with(&self, suffix: &[u8]) -> bool {
        suffix.len() <= self.bytes.len()
            && self
                .bytes
                .iter()
                .skip(self.bytes.len() - suffix.len())
                .eq(suffix.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_writes_accumulate() {
        let mut window = WriteWindow::default();
        window.record(b"import ");
        window.record(b"os");
        assert_eq!(window.to_string_lossy(), "import os");
    }

    #[test]
    fn test_keeps_exactly_last_twenty() {
        let mut window = WriteWindow::default();
        let mut all = Vec::new();
        for chunk in ["print('hello')", "\r\n", "x = 1", "for i in range(3):", "  pass"] {
            window.record(chunk.as_bytes());
            all.extend_from_slice(chunk.as_bytes());
        }
        assert!(all.len() > 20);
        assert_eq!(window.len(), 20);
        assert_eq!(window.to_vec(), all[all.len() - 20..].to_vec());
    }

    #[test]
    fn test_oversized_single_write() {
        let mut window = WriteWindow::default();
        window.record(b"0123456789abcdefghijKLMNOP");
        assert_eq!(window.to_string_lossy(), "6789abcdefghijKLMNOP");
    }

    #[test]
    fn test_clear() {
        let mut window = WriteWindow::default();
        window.record(b"abc");
        window.clear();
        assert!(window.is_empty());
    }

    #[test]
    fn test_ends_with() {
        let mut window = WriteWindow::default();
        window.record(b">>> ");
        assert!(window.ends_with(b">>> "));
        assert!(!window.ends_with(b"... "));
        assert!(!window.ends_with(b"longer than what was written"));
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let mut window = WriteWindow::with_capacity(0);
        window.record(b"abc");
        assert!(window.is_empty());
    }
}
