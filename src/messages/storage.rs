use super::types::{LogEntry, Role};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Bounded, shareable conversation history; the oldest entries fall off
#[derive(Debug, Clone)]
pub struct ConversationLog {
    entries: Arc<RwLock<VecDeque<LogEntry>>>,
    limit: usize,
}

impl ConversationLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            limit: limit.max(1),
        }
    }

    pub fn add(&self, entry: LogEntry) {
        let mut entries = self.entries.write();
        if entries.len() == self.limit {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn get_all(&self) -> Vec<LogEntry> {
        self.entries.read().iter().cloned().collect()
    }

    /// Up to `n` newest entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.read();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn by_role(&self, role: Role) -> Vec<LogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.role == role)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_read() {
        let log = ConversationLog::default();
        assert!(log.is_empty());

        log.add(LogEntry::user("run the login test"));
        log.add(LogEntry::assistant("Good news"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.get_all()[0].text, "run the login test");
        assert_eq!(log.by_role(Role::Assistant).len(), 1);
    }

    #[test]
    fn test_bounded() {
        let log = ConversationLog::new(3);
        for i in 0..5 {
            log.add(LogEntry::assistant(format!("entry {}", i)));
        }
        let texts: Vec<_> = log.get_all().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn test_recent_and_shared() {
        let log = ConversationLog::new(10);
        let other = log.clone();
        for i in 0..4 {
            other.add(LogEntry::progress(format!("{}", i)));
        }
        let recent: Vec<_> = log.recent(2).into_iter().map(|e| e.text).collect();
        assert_eq!(recent, vec!["2", "3"]);
        assert_eq!(log.recent(10).len(), 4);

        log.clear();
        assert!(other.is_empty());
    }

    #[test]
    fn test_zero_limit_keeps_one() {
        let log = ConversationLog::new(0);
        log.add(LogEntry::user("a"));
        log.add(LogEntry::user("b"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.limit(), 1);
    }
}
