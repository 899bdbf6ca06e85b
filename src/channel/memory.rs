//! In-memory append log.

use super::AppendLog;
use std::io;
use std::sync::{Mutex, MutexGuard};

/// Lines held in a vector behind a mutex. Used for tests and for runs that
/// do not need the channels on disk.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of every line written so far.
    pub fn lines(&self) -> Vec<String> {
        self.guard().clone()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

impl AppendLog for MemoryLog {
    fn reset(&self) -> io::Result<()> {
        self.guard().clear();
        Ok(())
    }

    fn append(&self, line: &str) -> io::Result<()> {
        self.guard().push(line.to_string());
        Ok(())
    }

    fn last_line(&self) -> io::Result<Option<String>> {
        Ok(self
            .guard()
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log_lifecycle() {
        let log = MemoryLog::new();
        assert_eq!(log.last_line().unwrap(), None);
        log.append("a").unwrap();
        log.append("b").unwrap();
        log.append(" ").unwrap();
        assert_eq!(log.last_line().unwrap().as_deref(), Some("b"));
        assert_eq!(log.len(), 3);
        log.reset().unwrap();
        assert!(log.is_empty());
    }
}
