//! Protocol state machine driving one `listen` invocation.
//!
//! The listener owns a single sequential loop: connect with endpoint
//! fallback, handshake, then receive and classify frames until the
//! connection dies or the caller cancels. Transient failures feed the
//! reconnect path with exponential backoff; only the cancellation token
//! ends the loop. Liveness is judged by the protocol's own keep-alive
//! cadence, not by socket errors: a peer that goes silent past the
//! liveness timeout is treated as dead even though the transport reports
//! nothing wrong.

use std::{fmt, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::ListenerConfig,
    connection::Session,
    dispatch::{DispatchOutcome, Registration},
    error::{FrameError, HandshakeError},
    notice::{FrameKind, Notice, classify, handshake_document, ping_ack_document},
};

/// Lifecycle states of one `listen` invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// Trying the configured endpoints.
    Connecting,
    /// Connected; handshake exchange in progress.
    Handshaking,
    /// Steady state: receiving frames.
    Listening,
    /// Cancellation observed; tearing down.
    Stopping,
    /// Terminal for this invocation.
    Stopped,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Listening => "listening",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why a listening session ended.
enum SessionEnd {
    Cancelled,
    Lost(FrameError),
    Stalled(Duration),
}

/// Long-running client for the notice transport.
///
/// # Examples
///
/// ```no_run
/// use noticewire::{Endpoint, ListenerConfig, NoticeListener, Registration};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ListenerConfig::builder()
///     .endpoint(Endpoint::new("alerts.example.org", 8099))
///     .client_name("ivo://example/client")
///     .build()?;
/// let registration = Registration::builder()
///     .handler_fn(|notice| async move {
///         println!("{:?}", notice.document.identifier);
///         Ok(())
///     })
///     .allow_types([61, 62])
///     .build()?;
///
/// let shutdown = CancellationToken::new();
/// NoticeListener::new(config, registration)
///     .listen(shutdown)
///     .await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct NoticeListener {
    config: ListenerConfig,
    registration: Registration,
}

impl NoticeListener {
    /// Create a listener from validated configuration and registration.
    #[must_use]
    pub const fn new(config: ListenerConfig, registration: Registration) -> Self {
        Self {
            config,
            registration,
        }
    }

    /// Run the state machine on the calling task until cancelled.
    ///
    /// Transient network failures trigger reconnection and are never
    /// surfaced; this returns only after the cancellation token fires and
    /// the current session is torn down.
    pub async fn listen(self, shutdown: CancellationToken) {
        let mut state = ListenerState::Disconnected;
        let minimum = self.config.reconnect_backoff_min();
        let mut backoff = minimum;

        loop {
            transition(&mut state, ListenerState::Connecting);
            let established = tokio::select! {
                () = shutdown.cancelled() => break,
                result = Session::establish(&self.config) => result,
            };
            let mut session = match established {
                Ok(session) => session,
                Err(e) => {
                    warn!("{e}; retrying in {backoff:?}");
                    if !self.pause(&shutdown, &mut backoff).await {
                        break;
                    }
                    continue;
                }
            };

            transition(&mut state, ListenerState::Handshaking);
            let handshake = tokio::select! {
                () = shutdown.cancelled() => break,
                result = self.perform_handshake(&mut session) => result,
            };
            if let Err(e) = handshake {
                warn!(
                    "handshake with {} failed: {e}; retrying in {backoff:?}",
                    session.endpoint()
                );
                drop(session);
                if !self.pause(&shutdown, &mut backoff).await {
                    break;
                }
                continue;
            }

            transition(&mut state, ListenerState::Listening);
            // A completed handshake resets the backoff to its minimum.
            backoff = minimum;
            match self.run_session(&mut session, &shutdown).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Lost(e) => {
                    warn!("session with {} ended: {e}", session.endpoint());
                }
                SessionEnd::Stalled(idle) => {
                    warn!(
                        "no traffic from {} for {idle:?}; presuming dead peer",
                        session.endpoint()
                    );
                }
            }
            drop(session);
            if !self.pause(&shutdown, &mut backoff).await {
                break;
            }
        }

        transition(&mut state, ListenerState::Stopping);
        // Any live session went out of scope with the loop; the socket is
        // already closed by the time the caller observes the return.
        transition(&mut state, ListenerState::Stopped);
        info!("listener stopped");
    }

    /// Run the state machine on a background task.
    #[must_use]
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.listen(shutdown))
    }

    /// Sleep out the current backoff delay, doubling it up to the cap.
    ///
    /// Returns `false` if cancellation fired during the wait.
    async fn pause(&self, shutdown: &CancellationToken, backoff: &mut Duration) -> bool {
        let delay = *backoff;
        *backoff = (*backoff * 2).min(self.config.reconnect_backoff_max());
        tokio::select! {
            () = shutdown.cancelled() => false,
            () = sleep(delay) => true,
        }
    }

    /// Send the client handshake and wait for the server acknowledgment,
    /// bounded by the configured handshake timeout.
    ///
    /// Servers probe on their own keep-alive cadence, so a ping may race
    /// the acknowledgment; it is answered and waiting continues.
    async fn perform_handshake(&self, session: &mut Session) -> Result<(), HandshakeError> {
        let request = handshake_document(
            self.config.vocabulary(),
            self.config.client_name(),
            self.config.protocol_version(),
        );
        let exchange = async {
            session.send_frame(&request).await?;
            loop {
                let payload = session.recv_frame().await?;
                match classify(&payload, self.config.vocabulary()) {
                    Ok(FrameKind::HandshakeAck) => return Ok(()),
                    Ok(FrameKind::Ping { origin }) => {
                        let ack = ping_ack_document(
                            self.config.vocabulary(),
                            self.config.client_name(),
                            self.config.protocol_version(),
                            origin.as_deref(),
                        );
                        session.send_frame(&ack).await?;
                    }
                    Ok(FrameKind::Notice(_)) => {
                        return Err(HandshakeError::Rejected(
                            "notice received before handshake ack".to_owned(),
                        ));
                    }
                    Err(e) => return Err(HandshakeError::Rejected(e.to_string())),
                }
            }
        };
        let limit = self.config.handshake_timeout();
        timeout(limit, exchange)
            .await
            .unwrap_or(Err(HandshakeError::Timeout(limit)))
    }

    /// Steady-state receive loop for one handshaken session.
    async fn run_session(&self, session: &mut Session, shutdown: &CancellationToken) -> SessionEnd {
        let liveness = self.config.liveness_timeout();
        loop {
            let received = tokio::select! {
                () = shutdown.cancelled() => return SessionEnd::Cancelled,
                result = timeout(liveness, session.recv_frame()) => result,
            };
            let payload = match received {
                Err(_) => return SessionEnd::Stalled(session.last_activity().elapsed()),
                Ok(Err(e)) => return SessionEnd::Lost(e),
                Ok(Ok(payload)) => payload,
            };

            match classify(&payload, self.config.vocabulary()) {
                Ok(FrameKind::Ping { origin }) => {
                    debug!("keep-alive from {}; acknowledging", session.endpoint());
                    let ack = ping_ack_document(
                        self.config.vocabulary(),
                        self.config.client_name(),
                        self.config.protocol_version(),
                        origin.as_deref(),
                    );
                    if let Err(e) = session.send_frame(&ack).await {
                        return SessionEnd::Lost(e);
                    }
                }
                Ok(FrameKind::HandshakeAck) => {
                    debug!("duplicate handshake ack ignored");
                }
                Ok(FrameKind::Notice(document)) => {
                    if self.registration.filter.accepts(document.notice_type) {
                        let notice = Notice {
                            payload: payload.clone(),
                            document,
                        };
                        if self.registration.dispatch(notice, shutdown).await
                            == DispatchOutcome::Cancelled
                        {
                            return SessionEnd::Cancelled;
                        }
                    } else {
                        debug!(
                            "notice {:?} dropped by filter (type {:?})",
                            document.identifier, document.notice_type
                        );
                    }
                }
                Err(e) => {
                    warn!("skipping malformed message from {}: {e}", session.endpoint());
                }
            }
        }
    }
}

fn transition(state: &mut ListenerState, next: ListenerState) {
    debug!("listener state {state} -> {next}");
    *state = next;
}
