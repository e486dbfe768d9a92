//! The read side of the message store, as the feed sees it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agora_shared::{FeedError, Message, Page};

use crate::cursor::PageRequest;

/// Backward paging over one scope's messages, newest first.
///
/// Implementations may block; the driver calls them off the async runtime.
pub trait MessageSource: Send + Sync + 'static {
    fn list_messages(&self, request: &PageRequest) -> Result<Page, FeedError>;
}

impl<T: MessageSource> MessageSource for Arc<T> {
    fn list_messages(&self, request: &PageRequest) -> Result<Page, FeedError> {
        (**self).list_messages(request)
    }
}

/// A message source held in memory. Can be told to fail, and counts the
/// requests it served.
#[derive(Default)]
pub struct MemorySource {
    messages: Mutex<Vec<Message>>,
    failures: AtomicUsize,
    requests: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let source = Self::new();
        for message in messages {
            source.insert(message);
        }
        source
    }

    /// Insert or replace by id.
    pub fn insert(&self, message: Message) {
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        messages.retain(|m| m.id != message.id);
        messages.push(message);
    }

    /// Make the next `n` requests fail as if the store were unreachable.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl MessageSource for MemorySource {
    fn list_messages(&self, request: &PageRequest) -> Result<Page, FeedError> {
        request.scope.validate()?;
        self.requests.fetch_add(1, Ordering::SeqCst);

        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            return Err(FeedError::TransientFetchFailure("store unavailable".into()));
        }

        let messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        let mut items: Vec<Message> = messages
            .iter()
            .filter(|m| m.scope == request.scope)
            .cloned()
            .collect();
        items.sort_by_key(|m| std::cmp::Reverse(m.sort_key()));

        if let Some(before) = &request.before {
            let bound = messages
                .iter()
                .find(|m| &m.id == before)
                .map(Message::sort_key)
                .ok_or_else(|| {
                    FeedError::TransientFetchFailure(format!("unknown cursor {before}"))
                })?;
            items.retain(|m| m.sort_key() < bound);
        }

        let limit = request.limit.max(1) as usize;
        let has_more = items.len() > limit;
        items.truncate(limit);
        Ok(Page::from_items(items, has_more))
    }
}
