//! Page request construction.

use agora_shared::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use agora_shared::{FeedError, FeedScope, MessageId};

use crate::transcript::Transcript;

/// Tunables for a feed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedConfig {
    /// Messages per history page, clamped to `1..=MAX_PAGE_SIZE`.
    pub page_size: u32,
}

impl FeedConfig {
    pub fn with_page_size(page_size: u32) -> Self {
        Self { page_size }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One history request against the message store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub scope: FeedScope,
    /// Exclusive upper bound; `None` asks for the newest page.
    pub before: Option<MessageId>,
    pub limit: u32,
}

/// Turns the state of a transcript into the next history request.
///
/// The cursor it hands out is always the oldest message an applied page
/// returned, so a range that was fetched is never asked for again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorEngine {
    page_size: u32,
}

impl CursorEngine {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            page_size: config.page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn next_page_request(
        &self,
        scope: &FeedScope,
        transcript: &Transcript,
    ) -> Result<PageRequest, FeedError> {
        scope.validate()?;
        let before = if transcript.pages_applied() == 0 {
            None
        } else {
            transcript.cursor().cloned()
        };
        Ok(PageRequest {
            scope: scope.clone(),
            before,
            limit: self.page_size,
        })
    }
}

impl Default for CursorEngine {
    fn default() -> Self {
        Self::new(FeedConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{apply_live_event, apply_page};
    use agora_shared::{FeedEvent, MemberId, Message, Page};
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, secs: i64) -> Message {
        let at = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        Message {
            id: MessageId::from(id),
            scope: FeedScope::channel("ch1"),
            content: id.into(),
            file_url: None,
            file_type: None,
            author_member_id: MemberId::from("alice"),
            created_at: at,
            updated_at: at,
            deleted: false,
        }
    }

    #[test]
    fn test_first_request_has_no_cursor() {
        let engine = CursorEngine::default();
        let req = engine
            .next_page_request(&FeedScope::channel("ch1"), &Transcript::new())
            .unwrap();
        assert_eq!(req.before, None);
        assert_eq!(req.limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_cursor_follows_oldest_paged_message() {
        let engine = CursorEngine::new(FeedConfig::with_page_size(2));
        let scope = FeedScope::channel("ch1");
        let t = apply_page(Transcript::new(), &Page::from_items(vec![msg("m5", 5), msg("m4", 4)], true));
        assert_eq!(
            engine.next_page_request(&scope, &t).unwrap().before,
            Some(MessageId::from("m4"))
        );

        // Live messages never move the cursor.
        let t = apply_live_event(t, &FeedEvent::MessageCreated(msg("m6", 6)));
        let t = apply_live_event(t, &FeedEvent::MessageCreated(msg("m0", 0)));
        assert_eq!(
            engine.next_page_request(&scope, &t).unwrap().before,
            Some(MessageId::from("m4"))
        );
    }

    #[test]
    fn test_invalid_scope_is_rejected() {
        let engine = CursorEngine::default();
        let err = engine
            .next_page_request(&FeedScope::channel(""), &Transcript::new())
            .unwrap_err();
        assert!(matches!(err, FeedError::InvalidScope(_)));
    }

    #[test]
    fn test_page_size_is_clamped() {
        assert_eq!(CursorEngine::new(FeedConfig::with_page_size(0)).page_size(), 1);
        assert_eq!(
            CursorEngine::new(FeedConfig::with_page_size(10_000)).page_size(),
            MAX_PAGE_SIZE
        );
    }
}
