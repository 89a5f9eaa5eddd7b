//! Fire-and-forget notice queue with timed expiry.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A single queued notice. Expired notices are pruned on every access.
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    created: Instant,
}

/// Shared notice queue consumed by the presentation layer.
/// Pushing never blocks and never fails; consumers poll `active()`.
pub struct NotificationSink {
    inner: Arc<Mutex<VecDeque<Notice>>>,
    ttl: Duration,
}

impl NotificationSink {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            ttl,
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Info, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Error, message.into());
    }

    /// Notices that have not yet expired, oldest first.
    pub fn active(&self) -> Vec<Notice> {
        let mut queue = self.lock();
        let ttl = self.ttl;
        queue.retain(|n| n.created.elapsed() < ttl);
        queue.iter().cloned().collect()
    }

    fn push(&self, level: NoticeLevel, message: String) {
        let mut queue = self.lock();
        let ttl = self.ttl;
        queue.retain(|n| n.created.elapsed() < ttl);
        queue.push_back(Notice {
            level,
            message,
            created: Instant::now(),
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Notice>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Notice queue lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

// Shared queue; clones observe the same notices.
impl Clone for NotificationSink {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            ttl: self.ttl,
        }
    }
}
