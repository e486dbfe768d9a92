//! Per-scope feed session.
//!
//! A [`FeedSession`] never performs I/O itself. Operations that need a page
//! return a [`FetchCommand`]; whoever runs the session executes it and hands
//! the outcome back through [`FeedSession::on_page_arrived`] or
//! [`FeedSession::on_page_failed`]. Each command carries a ticket, and only
//! the outcome for the outstanding ticket is accepted, so results that land
//! after `close()` or a scope switch are dropped.
//!
//! Live events that arrive while a page is in flight are held back and
//! replayed once that page has been applied.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use agora_shared::{FeedError, FeedEvent, FeedScope, Message, Page};

use crate::cursor::{CursorEngine, FeedConfig, PageRequest};
use crate::push::{EventSink, PushChannel, SubscriptionToken};
use crate::reconciler;
use crate::transcript::Transcript;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    First,
    More,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Loading(LoadKind),
    Ready,
    Error(FeedError),
    Closed,
}

impl FeedState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket(u64);

/// A page fetch the session wants performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCommand {
    pub ticket: FetchTicket,
    pub request: PageRequest,
}

/// What a chat surface renders.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedView {
    pub scope: Option<FeedScope>,
    pub state: FeedState,
    /// Oldest to newest.
    pub messages: Vec<Message>,
    pub has_more: bool,
}

impl FeedView {
    pub fn idle() -> Self {
        Self {
            scope: None,
            state: FeedState::Idle,
            messages: Vec::new(),
            has_more: false,
        }
    }
}

pub struct FeedSession {
    cursor: CursorEngine,
    push: Arc<dyn PushChannel>,
    sink: EventSink,
    scope: Option<FeedScope>,
    state: FeedState,
    transcript: Transcript,
    held: Vec<FeedEvent>,
    in_flight: Option<FetchTicket>,
    last_ticket: u64,
    subscription: Option<SubscriptionToken>,
}

impl FeedSession {
    /// `sink` is where the push channel delivers events for the open scope;
    /// the owner feeds them back through [`FeedSession::on_live_event`].
    pub fn new(config: FeedConfig, push: Arc<dyn PushChannel>, sink: EventSink) -> Self {
        Self {
            cursor: CursorEngine::new(config),
            push,
            sink,
            scope: None,
            state: FeedState::Idle,
            transcript: Transcript::new(),
            held: Vec::new(),
            in_flight: None,
            last_ticket: 0,
            subscription: None,
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn scope(&self) -> Option<&FeedScope> {
        self.scope.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn snapshot(&self) -> Vec<Message> {
        reconciler::snapshot(&self.transcript)
    }

    pub fn view(&self) -> FeedView {
        FeedView {
            scope: self.scope.clone(),
            state: self.state.clone(),
            messages: self.snapshot(),
            has_more: self.has_more(),
        }
    }

    /// Whether "load more" makes sense right now.
    pub fn has_more(&self) -> bool {
        self.transcript.pages_applied() > 0 && self.transcript.has_more()
    }

    /// Start following `scope`. Re-opening the scope that is already open
    /// does nothing; opening a different one closes the current scope first.
    pub fn open(&mut self, scope: FeedScope) -> Result<Option<FetchCommand>, FeedError> {
        let fresh = Transcript::new();
        let request = self.cursor.next_page_request(&scope, &fresh)?;

        if self.is_open() && self.scope.as_ref() == Some(&scope) {
            trace!(%scope, "already open");
            return Ok(None);
        }
        if self.is_open() {
            self.close();
        }

        info!(%scope, "opening feed");
        self.subscription = Some(self.push.subscribe(&scope, self.sink.clone()));
        self.scope = Some(scope);
        self.transcript = fresh;
        self.held.clear();
        Ok(Some(self.start_fetch(LoadKind::First, request)))
    }

    /// Ask for the next older page. Only acts when the feed is ready and
    /// older history may exist; a load already in flight absorbs the call.
    pub fn load_more(&mut self) -> Option<FetchCommand> {
        if self.state != FeedState::Ready || !self.transcript.has_more() {
            trace!(state = ?self.state, "load more ignored");
            return None;
        }
        let request = self.next_request()?;
        Some(self.start_fetch(LoadKind::More, request))
    }

    /// Repeat the load that failed.
    pub fn retry(&mut self) -> Option<FetchCommand> {
        if !matches!(self.state, FeedState::Error(_)) {
            return None;
        }
        let kind = if self.transcript.pages_applied() == 0 {
            LoadKind::First
        } else {
            LoadKind::More
        };
        let request = self.next_request()?;
        debug!(?kind, "retrying");
        Some(self.start_fetch(kind, request))
    }

    pub fn on_page_arrived(&mut self, ticket: FetchTicket, page: Page) {
        if !self.accept(ticket) {
            return;
        }
        let transcript = std::mem::take(&mut self.transcript);
        self.transcript = reconciler::apply_page(transcript, &page);
        self.state = FeedState::Ready;
        self.replay_held();
    }

    pub fn on_page_failed(&mut self, ticket: FetchTicket, error: FeedError) {
        if !self.accept(ticket) {
            return;
        }
        warn!(scope = ?self.scope, %error, "page load failed");
        self.state = FeedState::Error(error);
        self.replay_held();
    }

    pub fn on_live_event(&mut self, event: FeedEvent) {
        if !self.is_open() {
            trace!(event = event.name(), "event for closed feed dropped");
            return;
        }
        if self.scope.as_ref() != Some(event.scope()) {
            trace!(scope = %event.scope(), "event for other scope dropped");
            return;
        }
        if self.state.is_loading() {
            self.held.push(event);
            return;
        }
        self.apply_event(&event);
    }

    /// Stop following the current scope. The subscription is gone when this
    /// returns, and the outcome of any fetch in flight will be ignored.
    pub fn close(&mut self) {
        if let Some(token) = self.subscription.take() {
            self.push.unsubscribe(token);
        }
        if let Some(scope) = &self.scope {
            info!(%scope, "closing feed");
        }
        self.state = FeedState::Closed;
        self.transcript = Transcript::new();
        self.held.clear();
        self.in_flight = None;
    }

    fn is_open(&self) -> bool {
        !matches!(self.state, FeedState::Idle | FeedState::Closed)
    }

    fn next_request(&self) -> Option<PageRequest> {
        let scope = self.scope.as_ref()?;
        match self.cursor.next_page_request(scope, &self.transcript) {
            Ok(request) => Some(request),
            Err(error) => {
                warn!(%error, "cannot build page request");
                None
            }
        }
    }

    fn start_fetch(&mut self, kind: LoadKind, request: PageRequest) -> FetchCommand {
        self.last_ticket += 1;
        let ticket = FetchTicket(self.last_ticket);
        self.in_flight = Some(ticket);
        self.state = FeedState::Loading(kind);
        debug!(scope = %request.scope, before = ?request.before, ?kind, "fetching page");
        FetchCommand { ticket, request }
    }

    fn accept(&mut self, ticket: FetchTicket) -> bool {
        if self.in_flight != Some(ticket) {
            debug!(?ticket, "discarding outdated page result");
            return false;
        }
        self.in_flight = None;
        true
    }

    fn replay_held(&mut self) {
        for event in std::mem::take(&mut self.held) {
            self.apply_event(&event);
        }
    }

    fn apply_event(&mut self, event: &FeedEvent) {
        let transcript = std::mem::take(&mut self.transcript);
        self.transcript = reconciler::apply_live_event(transcript, event);
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        if let Some(token) = self.subscription.take() {
            self.push.unsubscribe(token);
        }
    }
}
