//! Merges history pages and live events into a [`Transcript`].
//!
//! Every operation takes the transcript by value and hands back the next
//! state. Applying the same page twice, or the same events in any order,
//! converges on the same transcript:
//!
//! - one entry per message id;
//! - a deletion is final: once a tombstone is seen the message stays
//!   deleted, whatever arrives later;
//! - an update only lands if it is at least as recent as what is stored;
//!   one that arrives before its message is held and folded in later.

use tracing::{debug, trace};

use agora_shared::{FeedEvent, Message, Page};

use crate::transcript::Transcript;

/// Merge a page of history. Page contents are authoritative as of the fetch
/// and replace what is stored, except that deletions already seen are kept.
pub fn apply_page(mut transcript: Transcript, page: &Page) -> Transcript {
    for item in &page.items {
        let mut incoming = item.clone();
        transcript.fold_pending_edit(&mut incoming);
        if incoming.deleted {
            transcript.record_tombstone(&incoming.id, incoming.updated_at);
        }
        if let Some(at) = transcript.tombstones.get(&incoming.id).copied() {
            incoming.tombstone(at);
        }
        transcript.upsert(incoming);
    }

    let oldest = page.items.iter().map(Message::sort_key).min();
    match oldest {
        Some(key) => {
            let extends = transcript.boundary.as_ref().map_or(true, |b| key <= *b);
            if extends {
                transcript.boundary = Some(key);
                transcript.has_more = page.has_more;
            }
        }
        // Nothing older than the cursor.
        None => transcript.has_more = transcript.has_more && page.has_more,
    }
    transcript.pages_applied += 1;

    debug!(
        items = page.items.len(),
        total = transcript.len(),
        has_more = transcript.has_more,
        "page applied"
    );
    transcript
}

/// Merge one live event.
pub fn apply_live_event(mut transcript: Transcript, event: &FeedEvent) -> Transcript {
    match event {
        FeedEvent::MessageCreated(message) => {
            if transcript.contains(&message.id) {
                trace!(id = %message.id, "duplicate create ignored");
                return transcript;
            }
            let mut message = message.clone();
            transcript.fold_pending_edit(&mut message);
            if let Some(at) = transcript.tombstones.get(&message.id).copied() {
                message.tombstone(at);
            }
            transcript.upsert(message);
        }
        FeedEvent::MessageUpdated(message) => {
            if message.deleted {
                transcript.record_tombstone(&message.id, message.updated_at);
            }
            if let Some(existing) = transcript.get_mut(&message.id) {
                merge_update(existing, message);
            } else {
                insert_if_covered(&mut transcript, message);
            }
        }
        FeedEvent::MessageDeleted(message) => {
            let at = transcript.record_tombstone(&message.id, message.updated_at);
            if let Some(existing) = transcript.get_mut(&message.id) {
                existing.tombstone(at);
            } else {
                insert_if_covered(&mut transcript, message);
            }
        }
    }
    transcript
}

/// Messages oldest to newest.
pub fn snapshot(transcript: &Transcript) -> Vec<Message> {
    transcript.iter().cloned().collect()
}

fn merge_update(existing: &mut Message, incoming: &Message) {
    if existing.deleted || incoming.deleted {
        existing.tombstone(incoming.updated_at);
        return;
    }
    if incoming.updated_at < existing.updated_at {
        trace!(id = %incoming.id, "stale update ignored");
        return;
    }
    existing.content = incoming.content.clone();
    existing.updated_at = incoming.updated_at;
}

/// An update or delete for a message that is not loaded. Inserting it is
/// only safe if it sits inside the range the pages already cover;
/// otherwise it waits for the page or create that brings the message.
fn insert_if_covered(transcript: &mut Transcript, message: &Message) {
    let key = message.sort_key();
    if !transcript.covers(&key) {
        if !message.deleted {
            transcript.record_pending_edit(message);
        }
        debug!(id = %message.id, "event for message outside loaded range held");
        return;
    }
    let mut message = message.clone();
    if let Some(at) = transcript.tombstones.get(&message.id).copied() {
        message.tombstone(at);
    }
    transcript.upsert(message);
}
