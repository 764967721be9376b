use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tradelens_models::ErrorKind;

/// What happened during one step of a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    CacheHit,
    AttemptStarted { attempt: u32 },
    BackoffScheduled {
        attempt: u32,
        delay_ms: u64,
        reason: ErrorKind,
    },
    Succeeded { attempt: u32, status: u16 },
    Failed { attempt: u32, error: ErrorKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub at: DateTime<Utc>,
    pub url: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Append-only diagnostic log. Once full, the oldest entry is evicted.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<Event>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.clamp(1, 1024))),
        }
    }

    pub fn record(&self, url: &str, kind: EventKind) {
        let event = Event {
            at: Utc::now(),
            url: url.to_string(),
            kind,
        };
        match self.entries.lock() {
            Ok(mut entries) => {
                if entries.len() == self.capacity {
                    entries.pop_front();
                }
                entries.push_back(event);
            }
            Err(e) => tracing::warn!(error = %e, "Event log mutex poisoned; dropping event"),
        }
    }

    /// Copy of all retained events, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&EventKind) -> bool) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.iter().filter(|e| predicate(&e.kind)).count())
            .unwrap_or(0)
    }

    pub fn backoff_count(&self) -> usize {
        self.count(|k| matches!(k, EventKind::BackoffScheduled { .. }))
    }

    pub fn attempt_count(&self) -> usize {
        self.count(|k| matches!(k, EventKind::AttemptStarted { .. }))
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn evicts_oldest_when_full() {
        let log = EventLog::new(3);
        for attempt in 0..5 {
            log.record("https://a.test", EventKind::AttemptStarted { attempt });
        }
        let events = log.snapshot();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::AttemptStarted { attempt: 2 });
        assert_eq!(events[2].kind, EventKind::AttemptStarted { attempt: 4 });
    }

    #[test]
    fn counts_by_kind() {
        let log = EventLog::new(10);
        log.record("u", EventKind::AttemptStarted { attempt: 0 });
        log.record(
            "u",
            EventKind::BackoffScheduled {
                attempt: 0,
                delay_ms: 5,
                reason: ErrorKind::RateLimit,
            },
        );
        log.record("u", EventKind::AttemptStarted { attempt: 1 });
        log.record("u", EventKind::Succeeded { attempt: 1, status: 200 });

        assert_eq!(log.attempt_count(), 2);
        assert_eq!(log.backoff_count(), 1);
        assert_eq!(log.count(|k| matches!(k, EventKind::CacheHit)), 0);
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let log = EventLog::new(0);
        log.record("u", EventKind::CacheHit);
        log.record("u", EventKind::CacheHit);
        assert_eq!(log.len(), 1);
        assert_eq!(log.capacity(), 1);
    }

    #[test]
    fn concurrent_writers_respect_capacity() {
        let log = Arc::new(EventLog::new(50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        log.record("u", EventKind::CacheHit);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 50);
    }

    #[test]
    fn serializes_with_flat_kind() {
        let log = EventLog::new(2);
        log.record("https://a.test", EventKind::Failed {
            attempt: 0,
            error: ErrorKind::ClientError,
        });
        let json = serde_json::to_value(&log.snapshot()[0]).unwrap();
        assert_eq!(json["kind"], "failed");
        assert_eq!(json["url"], "https://a.test");
        assert_eq!(json["error"], "ClientError");
    }
}
