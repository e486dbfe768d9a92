//! Runs a [`FeedSession`] on its own tokio task.
//!
//! The task is the only owner of the session. Commands from the UI, page
//! results and live events all reach it as messages, so the transcript is
//! never touched from two places at once. Fetches run on the blocking pool
//! and report back to the task when done.
//!
//! After every step the task publishes a fresh [`FeedView`] on a watch
//! channel.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use agora_shared::{FeedError, FeedEvent, FeedScope, Page};

use crate::cursor::FeedConfig;
use crate::push::PushChannel;
use crate::session::{FeedSession, FeedView, FetchCommand, FetchTicket};
use crate::source::MessageSource;

/// Commands accepted by the feed task.
#[derive(Debug)]
pub enum FeedCommand {
    Open {
        scope: FeedScope,
        reply: oneshot::Sender<Result<(), FeedError>>,
    },
    LoadMore,
    Retry,
    Close,
    Shutdown,
}

struct FetchDone {
    ticket: FetchTicket,
    result: Result<Page, FeedError>,
}

pub struct FeedDriver;

impl FeedDriver {
    /// Spawn the feed task and return a handle to it. Must be called from
    /// within a tokio runtime.
    pub fn spawn<S: MessageSource>(
        source: S,
        push: Arc<dyn PushChannel>,
        config: FeedConfig,
    ) -> FeedHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel::<FeedCommand>(256);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<FeedEvent>();
        let (view_tx, view_rx) = watch::channel(FeedView::idle());

        let session = FeedSession::new(config, push, event_tx);
        tokio::spawn(run(Arc::new(source), session, cmd_rx, event_rx, view_tx));

        FeedHandle { cmd_tx, view_rx }
    }
}

/// Cheap to clone; the task stops when every handle is gone.
#[derive(Clone)]
pub struct FeedHandle {
    cmd_tx: mpsc::Sender<FeedCommand>,
    view_rx: watch::Receiver<FeedView>,
}

impl FeedHandle {
    pub async fn open(&self, scope: FeedScope) -> Result<(), FeedError> {
        let (reply, rx) = oneshot::channel();
        self.send(FeedCommand::Open { scope, reply }).await?;
        rx.await.map_err(|_| driver_gone())?
    }

    pub async fn load_more(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::LoadMore).await
    }

    pub async fn retry(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::Retry).await
    }

    pub async fn close(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::Close).await
    }

    pub async fn shutdown(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::Shutdown).await
    }

    /// The latest published view.
    pub fn view(&self) -> FeedView {
        self.view_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.view_rx.clone()
    }

    /// Wait until a published view satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&FeedView) -> bool,
    ) -> Result<FeedView, FeedError> {
        let mut rx = self.view_rx.clone();
        let view = rx
            .wait_for(|view| predicate(view))
            .await
            .map_err(|_| driver_gone())?;
        Ok(view.clone())
    }

    async fn send(&self, command: FeedCommand) -> Result<(), FeedError> {
        self.cmd_tx.send(command).await.map_err(|_| driver_gone())
    }
}

fn driver_gone() -> FeedError {
    FeedError::TransientFetchFailure("feed task has stopped".into())
}

async fn run<S: MessageSource>(
    source: Arc<S>,
    mut session: FeedSession,
    mut cmd_rx: mpsc::Receiver<FeedCommand>,
    mut event_rx: mpsc::UnboundedReceiver<FeedEvent>,
    view_tx: watch::Sender<FeedView>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<FetchDone>();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(FeedCommand::Open { scope, reply }) => {
                        let result = session.open(scope).map(|fetch| {
                            if let Some(fetch) = fetch {
                                dispatch(&source, &done_tx, fetch);
                            }
                        });
                        let _ = reply.send(result);
                    }
                    Some(FeedCommand::LoadMore) => {
                        if let Some(fetch) = session.load_more() {
                            dispatch(&source, &done_tx, fetch);
                        }
                    }
                    Some(FeedCommand::Retry) => {
                        if let Some(fetch) = session.retry() {
                            dispatch(&source, &done_tx, fetch);
                        }
                    }
                    Some(FeedCommand::Close) => session.close(),
                    Some(FeedCommand::Shutdown) => {
                        info!("feed shutdown requested");
                        session.close();
                        break;
                    }
                    None => {
                        debug!("all feed handles dropped, stopping");
                        session.close();
                        break;
                    }
                }
            }

            Some(event) = event_rx.recv() => session.on_live_event(event),

            Some(done) = done_rx.recv() => match done.result {
                Ok(page) => session.on_page_arrived(done.ticket, page),
                Err(error) => session.on_page_failed(done.ticket, error),
            },
        }

        view_tx.send_replace(session.view());
    }

    view_tx.send_replace(session.view());
}

fn dispatch<S: MessageSource>(
    source: &Arc<S>,
    done_tx: &mpsc::UnboundedSender<FetchDone>,
    fetch: FetchCommand,
) {
    let source = Arc::clone(source);
    let done_tx = done_tx.clone();
    tokio::spawn(async move {
        let FetchCommand { ticket, request } = fetch;
        let result = tokio::task::spawn_blocking(move || source.list_messages(&request))
            .await
            .unwrap_or_else(|e| {
                Err(FeedError::TransientFetchFailure(format!(
                    "fetch task failed: {e}"
                )))
            });
        let _ = done_tx.send(FetchDone { ticket, result });
    });
}
