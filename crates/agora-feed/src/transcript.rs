//! In-memory transcript of one feed scope.
//!
//! Messages are kept oldest-first under their [`SortKey`], never twice.
//! Only [`crate::reconciler`] changes a transcript; everything else reads.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use agora_shared::{Message, MessageId, SortKey};

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub(crate) entries: BTreeMap<SortKey, Message>,
    pub(crate) index: HashMap<MessageId, SortKey>,
    /// Deletions seen so far, including ones for messages not loaded yet.
    pub(crate) tombstones: HashMap<MessageId, DateTime<Utc>>,
    /// Latest edit seen for a message that was neither loaded nor covered.
    pub(crate) pending_edits: HashMap<MessageId, Message>,
    /// Oldest message covered by an applied page.
    pub(crate) boundary: Option<SortKey>,
    pub(crate) has_more: bool,
    pub(crate) pages_applied: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            index: HashMap::new(),
            tombstones: HashMap::new(),
            pending_edits: HashMap::new(),
            boundary: None,
            has_more: true,
            pages_applied: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.index.get(id).and_then(|key| self.entries.get(key))
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.values()
    }

    /// Id of the oldest message fetched through a page, the exclusive
    /// bound of the next history request.
    pub fn cursor(&self) -> Option<&MessageId> {
        self.boundary.as_ref().map(|key| &key.id)
    }

    /// Whether older history may still exist. True until a page says otherwise.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn pages_applied(&self) -> usize {
        self.pages_applied
    }

    /// Whether a message with this key falls inside the loaded range, so
    /// inserting it cannot open a hole in the history.
    pub(crate) fn covers(&self, key: &SortKey) -> bool {
        if self.pages_applied == 0 {
            return false;
        }
        !self.has_more || self.boundary.as_ref().map_or(true, |b| key >= b)
    }

    pub(crate) fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        let key = self.index.get(id)?;
        self.entries.get_mut(key)
    }

    /// Insert or replace by id. `created_at` is immutable, but a replacement
    /// is re-keyed anyway so the index can never point at a stale key.
    pub(crate) fn upsert(&mut self, message: Message) {
        let key = message.sort_key();
        if let Some(old_key) = self.index.insert(message.id.clone(), key.clone()) {
            if old_key != key {
                self.entries.remove(&old_key);
            }
        }
        self.entries.insert(key, message);
    }

    /// Remember a deletion; the latest timestamp wins.
    pub(crate) fn record_tombstone(&mut self, id: &MessageId, at: DateTime<Utc>) -> DateTime<Utc> {
        let entry = self.tombstones.entry(id.clone()).or_insert(at);
        if at > *entry {
            *entry = at;
        }
        *entry
    }

    /// Hold an edit until the message itself arrives; the latest one wins.
    pub(crate) fn record_pending_edit(&mut self, message: &Message) {
        match self.pending_edits.get(&message.id) {
            Some(held) if held.updated_at > message.updated_at => {}
            _ => {
                self.pending_edits.insert(message.id.clone(), message.clone());
            }
        }
    }

    /// Carry a held edit into an arriving message if it is not older.
    pub(crate) fn fold_pending_edit(&self, message: &mut Message) {
        if let Some(held) = self.pending_edits.get(&message.id) {
            if held.updated_at >= message.updated_at {
                message.content = held.content.clone();
                message.updated_at = held.updated_at;
            }
        }
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
