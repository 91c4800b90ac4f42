use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::decoder::{StreamEvent, decode_events};
use crate::errors::ChatError;
use crate::model::GenerationRequest;
use crate::session::{GenerationSession, SessionUpdate};
use crate::transport::Transport;

/// Handle used to request cancellation of a running generation.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The pump task drops the HTTP connection at its next suspension point,
    /// and the owning [`GenerationRun`] stops applying buffered events.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A streaming generation in flight.
///
/// The HTTP body is read by a spawned pump task that forwards decoded events
/// over a bounded channel. The session itself is only touched by
/// [`next_update`](Self::next_update) and [`cancel`](Self::cancel), which run
/// on the consumer side.
pub struct GenerationRun {
    session: GenerationSession,
    rx: mpsc::Receiver<Result<StreamEvent, ChatError>>,
    abort_handle: AbortHandle,
    abort_rx: watch::Receiver<bool>,
}

impl GenerationRun {
    pub(crate) fn start(
        transport: Arc<dyn Transport>,
        request: GenerationRequest,
        buffer_capacity: usize,
    ) -> Result<Self, ChatError> {
        request.validate()?;
        let mut session = GenerationSession::new(request.clone());
        session.start()?;

        let (tx, rx) = mpsc::channel(buffer_capacity.max(1));
        let (abort_tx, abort_rx) = watch::channel(false);
        tokio::spawn(pump_task(
            transport,
            request,
            tx,
            abort_rx.clone(),
            session.id(),
        ));

        Ok(Self {
            session,
            rx,
            abort_handle: AbortHandle { tx: abort_tx },
            abort_rx,
        })
    }

    /// Read-only view of the session.
    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    /// Returns a handle that can cancel the generation from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Cancels immediately. Returns the `Cancelled` update, or `None` when
    /// the session had already reached a terminal state.
    pub fn cancel(&mut self) -> Option<SessionUpdate> {
        self.abort_handle.abort();
        self.session.cancel()
    }

    /// Waits for the next event and applies it to the session.
    ///
    /// Returns `None` once a terminal update has been returned.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            if self.session.state().is_terminal() {
                return None;
            }
            if self.abort_handle.is_aborted() {
                return self.session.cancel();
            }

            tokio::select! {
                biased;
                changed = self.abort_rx.changed() => {
                    if changed.is_err() {
                        let next = self.rx.recv().await;
                        if let Some(update) = self.apply(next) {
                            return Some(update);
                        }
                    }
                }
                next = self.rx.recv() => {
                    if self.abort_handle.is_aborted() {
                        return self.session.cancel();
                    }
                    if let Some(update) = self.apply(next) {
                        return Some(update);
                    }
                }
            }
        }
    }

    /// Drains remaining updates and returns the terminal session.
    pub async fn finish(mut self) -> GenerationSession {
        while self.next_update().await.is_some() {}
        self.session
    }

    fn apply(&mut self, next: Option<Result<StreamEvent, ChatError>>) -> Option<SessionUpdate> {
        match next {
            Some(Ok(event)) => self.session.apply(event),
            Some(Err(err)) => self.session.fail(&err),
            None => self
                .session
                .fail(&ChatError::protocol("stream ended without completion")),
        }
    }
}

async fn pump_task(
    transport: Arc<dyn Transport>,
    request: GenerationRequest,
    tx: mpsc::Sender<Result<StreamEvent, ChatError>>,
    mut abort_rx: watch::Receiver<bool>,
    session_id: uuid::Uuid,
) {
    let opened = tokio::select! {
        biased;
        _ = wait_for_abort(&mut abort_rx) => {
            debug!(session_id = %session_id, "aborted before response headers");
            return;
        }
        opened = transport.open_stream(&request) => opened,
    };
    let bytes = match opened {
        Ok(bytes) => bytes,
        Err(err) => {
            let _ = tx.send(Err(err)).await;
            return;
        }
    };

    let mut events = std::pin::pin!(decode_events(bytes));
    let mut seq = 0_u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = wait_for_abort(&mut abort_rx) => {
                debug!(session_id = %session_id, seq, "aborted; dropping connection");
                return;
            }
            next = events.next() => next,
        };
        let Some(item) = next else {
            return;
        };
        let terminal = !matches!(item, Ok(StreamEvent::Token { .. }));
        debug!(session_id = %session_id, seq, terminal, "forwarding stream event");
        seq = seq.saturating_add(1);

        tokio::select! {
            biased;
            _ = wait_for_abort(&mut abort_rx) => return,
            sent = tx.send(item) => {
                if sent.is_err() {
                    debug!(session_id = %session_id, "run dropped; closing stream");
                    return;
                }
            }
        }
        if terminal {
            return;
        }
    }
}

/// Resolves once cancellation is requested or every abort handle is gone.
async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
