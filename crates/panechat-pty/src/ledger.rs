/// Raw session output, kept for on-demand retrieval.
///
/// Everything the child writes is appended here byte for byte. A single read
/// cursor tracks how much has been handed out by [`read_new`](Self::read_new).
#[derive(Debug, Default)]
pub struct OutputLedger {
    buffer: Vec<u8>,
    read_offset: usize,
}

impl OutputLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Everything since the last clear. Invalid UTF-8 becomes U+FFFD.
    pub fn read_all(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Output appended since the previous call, then mark it read.
    pub fn read_new(&mut self) -> String {
        let fresh = String::from_utf8_lossy(&self.buffer[self.read_offset..]).into_owned();
        self.read_offset = self.buffer.len();
        fresh
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_offset = 0;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bytes not yet returned by `read_new`.
    pub fn unread_len(&self) -> usize {
        self.buffer.len() - self.read_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_new_advances() {
        let mut ledger = OutputLedger::new();
        ledger.append(b"$ ls\r\n");
        assert_eq!(ledger.unread_len(), 6);
        assert_eq!(ledger.read_new(), "$ ls\r\n");
        assert_eq!(ledger.read_new(), "");
        assert_eq!(ledger.unread_len(), 0);

        ledger.append(b"a.txt\r\n");
        assert_eq!(ledger.read_new(), "a.txt\r\n");
        assert_eq!(ledger.read_new(), "");
    }

    #[test]
    fn test_read_all_is_independent_of_read_new() {
        let mut ledger = OutputLedger::new();
        ledger.append(b"one ");
        ledger.read_new();
        ledger.append(b"two");
        assert_eq!(ledger.read_all(), "one two");
        assert_eq!(ledger.read_new(), "two");
        assert_eq!(ledger.read_all(), "one two");
        assert_eq!(ledger.len(), 7);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut ledger = OutputLedger::new();
        ledger.append(b"ok\xff");
        assert_eq!(ledger.read_all(), "ok\u{fffd}");
    }

    #[test]
    fn test_clear_resets_offset() {
        let mut ledger = OutputLedger::new();
        ledger.append(b"old");
        ledger.read_new();
        ledger.clear();
        assert!(ledger.is_empty());
        ledger.append(b"new");
        assert_eq!(ledger.read_new(), "new");
    }
}
