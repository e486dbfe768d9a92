//! Feed behaviour end to end, driving a session by hand so every
//! interleaving is deterministic.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::sync::mpsc;

use agora_feed::reconciler::{apply_live_event, apply_page, snapshot};
use agora_feed::{
    FeedConfig, FeedSession, FeedState, FetchCommand, LoadKind, MemorySource, MessageSource,
    PushChannel, PushHub, Transcript,
};
use agora_shared::{FeedError, FeedEvent, FeedScope, MemberId, Message, MessageId, Page};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn msg(scope: &FeedScope, n: i64) -> Message {
    Message {
        id: MessageId::from(format!("m{n}")),
        scope: scope.clone(),
        content: format!("message {n}"),
        file_url: None,
        file_type: None,
        author_member_id: MemberId::from("alice"),
        created_at: at(n),
        updated_at: at(n),
        deleted: false,
    }
}

fn ids(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.id.to_string()).collect()
}

struct Harness {
    hub: Arc<PushHub>,
    source: MemorySource,
    session: FeedSession,
    events: mpsc::UnboundedReceiver<FeedEvent>,
}

impl Harness {
    fn new(scope: &FeedScope, count: i64, page_size: u32) -> Self {
        let hub = Arc::new(PushHub::new());
        let (tx, events) = mpsc::unbounded_channel();
        let push: Arc<dyn PushChannel> = hub.clone();
        Self {
            hub,
            source: MemorySource::with_messages((1..=count).map(|n| msg(scope, n))),
            session: FeedSession::new(FeedConfig::with_page_size(page_size), push, tx),
            events,
        }
    }

    fn fetch(&self, cmd: &FetchCommand) -> Page {
        self.source.list_messages(&cmd.request).unwrap()
    }

    /// Move whatever the hub delivered into the session.
    fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.session.on_live_event(event);
        }
    }
}

#[test]
fn test_live_message_during_first_load_then_load_more() {
    let scope = FeedScope::channel("ch1");
    let mut h = Harness::new(&scope, 5, 3);

    let cmd = h.session.open(scope.clone()).unwrap().unwrap();
    let page = h.fetch(&cmd);
    assert_eq!(ids(&page.items), ["m5", "m4", "m3"]);
    assert!(page.has_more);

    // m6 is pushed before the page callback resolves.
    h.hub.publish(&FeedEvent::MessageCreated(msg(&scope, 6)));
    h.pump();
    assert!(h.session.snapshot().is_empty());

    h.session.on_page_arrived(cmd.ticket, page);
    assert_eq!(ids(&h.session.snapshot()), ["m3", "m4", "m5", "m6"]);
    assert_eq!(h.session.state(), &FeedState::Ready);

    let more = h.session.load_more().unwrap();
    assert_eq!(more.request.before, Some(MessageId::from("m3")));
    assert_eq!(h.session.state(), &FeedState::Loading(LoadKind::More));

    let older = h.fetch(&more);
    assert_eq!(ids(&older.items), ["m2", "m1"]);
    assert!(!older.has_more);
    h.session.on_page_arrived(more.ticket, older);

    assert_eq!(ids(&h.session.snapshot()), ["m1", "m2", "m3", "m4", "m5", "m6"]);
    assert!(!h.session.has_more());
    assert!(h.session.load_more().is_none());
    assert_eq!(h.source.requests(), 2);
}

#[test]
fn test_double_load_more_issues_one_request() {
    let scope = FeedScope::channel("ch1");
    let mut h = Harness::new(&scope, 9, 3);

    let cmd = h.session.open(scope.clone()).unwrap().unwrap();
    let page = h.fetch(&cmd);
    h.session.on_page_arrived(cmd.ticket, page);

    let first = h.session.load_more();
    let second = h.session.load_more();
    assert!(second.is_none());

    let more = first.unwrap();
    let older = h.fetch(&more);
    h.session.on_page_arrived(more.ticket, older);

    // The first page plus exactly one older page.
    assert_eq!(h.source.requests(), 2);
    assert_eq!(ids(&h.session.snapshot()), ["m4", "m5", "m6", "m7", "m8", "m9"]);
}

#[test]
fn test_late_page_after_close_is_discarded() {
    let scope = FeedScope::channel("ch1");
    let mut h = Harness::new(&scope, 3, 3);

    let cmd = h.session.open(scope.clone()).unwrap().unwrap();
    let page = h.fetch(&cmd);
    h.session.close();
    h.session.on_page_arrived(cmd.ticket, page);

    assert_eq!(h.session.state(), &FeedState::Closed);
    assert!(h.session.snapshot().is_empty());

    // Nothing is delivered for a closed scope.
    assert_eq!(h.hub.publish(&FeedEvent::MessageCreated(msg(&scope, 4))), 0);
}

#[test]
fn test_stale_update_does_not_roll_back_content() {
    let scope = FeedScope::channel("ch1");
    let mut h = Harness::new(&scope, 1, 10);
    let cmd = h.session.open(scope.clone()).unwrap().unwrap();
    let page = h.fetch(&cmd);
    h.session.on_page_arrived(cmd.ticket, page);

    let mut newer = msg(&scope, 1);
    newer.content = "second edit".into();
    newer.updated_at = at(20);
    let mut older = msg(&scope, 1);
    older.content = "first edit".into();
    older.updated_at = at(10);

    h.hub.publish(&FeedEvent::MessageUpdated(newer));
    h.hub.publish(&FeedEvent::MessageUpdated(older));
    h.pump();

    let snap = h.session.snapshot();
    assert_eq!(snap[0].content, "second edit");
    assert!(snap[0].is_edited());
}

#[test]
fn test_delete_and_update_converge_in_either_order() {
    let scope = FeedScope::channel("ch1");
    let base = apply_page(Transcript::new(), &Page::from_items(vec![msg(&scope, 1)], false));

    let mut edit = msg(&scope, 1);
    edit.content = "edited".into();
    edit.updated_at = at(5);
    let mut gone = msg(&scope, 1);
    gone.tombstone(at(4));

    let update = FeedEvent::MessageUpdated(edit);
    let delete = FeedEvent::MessageDeleted(gone);

    let a = apply_live_event(apply_live_event(base.clone(), &update), &delete);
    let b = apply_live_event(apply_live_event(base, &delete), &update);
    assert_eq!(snapshot(&a), snapshot(&b));
    let m = &snapshot(&a)[0];
    assert!(m.deleted);
    assert_eq!(m.content, "");
}

#[test]
fn test_reapplying_a_page_changes_nothing() {
    let scope = FeedScope::channel("ch1");
    let page = Page::from_items(vec![msg(&scope, 3), msg(&scope, 2)], true);
    let once = apply_page(Transcript::new(), &page);
    let twice = apply_page(once.clone(), &page);
    assert_eq!(snapshot(&once), snapshot(&twice));
    assert_eq!(once.has_more(), twice.has_more());
}

#[test]
fn test_order_does_not_depend_on_arrival_order() {
    let scope = FeedScope::channel("ch1");
    let newest = Page::from_items(vec![msg(&scope, 8), msg(&scope, 7), msg(&scope, 6)], true);
    let older = Page::from_items(vec![msg(&scope, 5), msg(&scope, 4), msg(&scope, 3)], true);
    let oldest = Page::from_items(vec![msg(&scope, 2), msg(&scope, 1)], false);

    enum Step<'a> {
        Page(&'a Page),
        Event(FeedEvent),
    }

    let mut rng = StdRng::seed_from_u64(7);
    let mut expected: Option<Vec<Message>> = None;
    for _ in 0..50 {
        let mut steps = vec![
            Step::Page(&newest),
            Step::Page(&older),
            Step::Page(&oldest),
            Step::Event(FeedEvent::MessageCreated(msg(&scope, 9))),
            Step::Event(FeedEvent::MessageCreated(msg(&scope, 10))),
            // Duplicates of paged messages pushed live.
            Step::Event(FeedEvent::MessageCreated(msg(&scope, 6))),
            Step::Event(FeedEvent::MessageCreated(msg(&scope, 2))),
        ];
        steps.shuffle(&mut rng);

        let mut t = Transcript::new();
        for step in &steps {
            t = match step {
                Step::Page(page) => apply_page(t, page),
                Step::Event(event) => apply_live_event(t, event),
            };
        }

        let snap = snapshot(&t);
        assert_eq!(snap.len(), 10);
        match &expected {
            Some(first) => assert_eq!(&snap, first),
            None => expected = Some(snap),
        }
    }
}

#[test]
fn test_edit_of_live_only_message_survives_any_arrival_order() {
    let scope = FeedScope::channel("ch1");
    let page = Page::from_items(vec![msg(&scope, 3), msg(&scope, 2)], true);
    let mut edit = msg(&scope, 4);
    edit.content = "edited".into();
    edit.updated_at = at(9);

    enum Step {
        Page,
        Created,
        Updated,
    }

    let orders = [
        [Step::Page, Step::Created, Step::Updated],
        [Step::Page, Step::Updated, Step::Created],
        [Step::Created, Step::Page, Step::Updated],
        [Step::Created, Step::Updated, Step::Page],
        [Step::Updated, Step::Page, Step::Created],
        [Step::Updated, Step::Created, Step::Page],
    ];

    for order in &orders {
        let mut t = Transcript::new();
        for step in order {
            t = match step {
                Step::Page => apply_page(t, &page),
                Step::Created => apply_live_event(t, &FeedEvent::MessageCreated(msg(&scope, 4))),
                Step::Updated => apply_live_event(t, &FeedEvent::MessageUpdated(edit.clone())),
            };
        }
        let snap = snapshot(&t);
        assert_eq!(ids(&snap), ["m2", "m3", "m4"]);
        assert_eq!(snap[2].content, "edited");
        assert_eq!(snap[2].updated_at, at(9));
    }
}

#[test]
fn test_edit_before_create_survives_failed_first_load() {
    let scope = FeedScope::channel("ch1");
    let mut h = Harness::new(&scope, 2, 10);

    let cmd = h.session.open(scope.clone()).unwrap().unwrap();
    h.session.on_page_failed(cmd.ticket, FeedError::TransientFetchFailure("offline".into()));

    let mut edit = msg(&scope, 3);
    edit.content = "edited".into();
    edit.updated_at = at(9);
    h.hub.publish(&FeedEvent::MessageUpdated(edit));
    h.hub.publish(&FeedEvent::MessageCreated(msg(&scope, 3)));
    h.pump();

    let snap = h.session.snapshot();
    assert_eq!(ids(&snap), ["m3"]);
    assert_eq!(snap[0].content, "edited");
}

#[test]
fn test_failed_first_load_recovers_on_retry() {
    let scope = FeedScope::conversation("dm1");
    let mut h = Harness::new(&scope, 2, 10);

    let cmd = h.session.open(scope.clone()).unwrap().unwrap();
    h.session.on_page_failed(cmd.ticket, FeedError::TransientFetchFailure("offline".into()));
    assert!(matches!(h.session.state(), FeedState::Error(e) if e.is_retryable()));

    // Live events keep flowing while in error.
    h.hub.publish(&FeedEvent::MessageCreated(msg(&scope, 3)));
    h.pump();
    assert_eq!(ids(&h.session.snapshot()), ["m3"]);

    let again = h.session.retry().unwrap();
    let page = h.fetch(&again);
    h.session.on_page_arrived(again.ticket, page);
    assert_eq!(ids(&h.session.snapshot()), ["m1", "m2", "m3"]);
}
