/// Thread aggregator: bounded message log plus per-thread state
///
/// The aggregator is a plain value with a single owner. Every `ingest`
/// runs to completion before the next, so no interior locking is needed.
use crate::classifier::{classify, SPAM_BIN};
use crate::message::{Message, MessageType};
use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default capacity of the global message log
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Default length of the recent feed
pub const DEFAULT_FEED_SIZE: usize = 20;

/// One conversational thread
#[derive(Debug, Clone)]
pub struct Thread {
    pub id: String,
    /// Type of the message that created the thread
    pub kind: MessageType,
    /// Unique authors in first-seen order
    pub participants: Vec<String>,
    pub messages: VecDeque<Arc<Message>>,
    /// Timestamp of the most recently appended message
    pub last_activity: i64,
}

impl Thread {
    fn new(id: String, kind: MessageType, created_at: i64) -> Self {
        Self {
            id,
            kind,
            participants: Vec::new(),
            messages: VecDeque::new(),
            last_activity: created_at,
        }
    }

    fn append(&mut self, message: Arc<Message>) {
        self.last_activity = message.timestamp;
        if !self.participants.iter().any(|p| p == &message.author) {
            self.participants.push(message.author.clone());
        }
        self.messages.push_back(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.back().map(|m| m.as_ref())
    }

    pub fn is_spam(&self) -> bool {
        self.kind == MessageType::Spam
    }
}

#[derive(Debug, Clone)]
struct LogEntry {
    message: Arc<Message>,
    thread_id: String,
}

/// Bounded log of messages and the thread table built from it.
///
/// Thread histories stay consistent with the log: a message evicted from the
/// log is also dropped from its thread. Threads themselves are never removed.
#[derive(Debug, Clone)]
pub struct Aggregator {
    log: VecDeque<LogEntry>,
    threads: HashMap<String, Thread>,
    capacity: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            log: VecDeque::with_capacity(capacity + 1),
            threads: HashMap::new(),
            capacity,
        }
    }

    /// Record a message and return the id of the thread it joined
    pub fn ingest(&mut self, message: Message) -> String {
        let thread_id = classify(&message);
        let message = Arc::new(message);

        self.log.push_back(LogEntry {
            message: message.clone(),
            thread_id: thread_id.clone(),
        });

        let thread = self.threads.entry(thread_id.clone()).or_insert_with(|| {
            debug!("Created thread {} ({})", thread_id, message.kind);
            Thread::new(thread_id.clone(), message.kind.clone(), message.timestamp)
        });
        thread.append(message);

        while self.log.len() > self.capacity {
            self.evict_oldest();
        }

        trace!("Ingested message into {}", thread_id);
        thread_id
    }

    fn evict_oldest(&mut self) {
        let Some(entry) = self.log.pop_front() else {
            return;
        };
        if let Some(thread) = self.threads.get_mut(&entry.thread_id) {
            // Per-thread order follows log order, so the evicted message is
            // always the oldest one left in its thread.
            let front = thread.messages.pop_front();
            debug_assert!(front.map_or(false, |m| Arc::ptr_eq(&m, &entry.message)));
        }
    }

    /// Log capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages currently in the log
    pub fn total_count(&self) -> usize {
        self.log.len()
    }

    /// Messages in the log, oldest first
    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.log.iter().map(|e| e.message.as_ref())
    }

    pub fn thread(&self, thread_id: &str) -> Option<&Thread> {
        self.threads.get(thread_id)
    }

    /// All threads, in no particular order
    pub fn threads(&self) -> impl Iterator<Item = &Thread> + '_ {
        self.threads.values()
    }

    /// Number of threads that are not spam
    pub fn thread_count(&self) -> usize {
        self.threads.values().filter(|t| !t.is_spam()).count()
    }

    pub fn direct_count(&self) -> usize {
        self.threads
            .values()
            .filter(|t| t.kind == MessageType::Direct)
            .count()
    }

    /// Messages held by the spam bin, zero when no spam has arrived
    pub fn spam_count(&self) -> usize {
        self.threads
            .get(SPAM_BIN)
            .map(|t| t.messages.len())
            .unwrap_or(0)
    }

    /// Non-spam threads, most recently active first (ties by id)
    pub fn sorted_threads(&self) -> Vec<&Thread> {
        let mut list: Vec<&Thread> = self.threads.values().filter(|t| !t.is_spam()).collect();
        list.sort_by(|a, b| {
            Reverse(a.last_activity)
                .cmp(&Reverse(b.last_activity))
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    /// The last `limit` messages, newest first
    pub fn recent_feed(&self, limit: usize) -> Vec<&Message> {
        self.log
            .iter()
            .rev()
            .take(limit)
            .map(|e| e.message.as_ref())
            .collect()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
