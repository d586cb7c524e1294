//! Handler registration and notice dispatch.
//!
//! The dispatcher is the only place user code runs inside the protocol
//! loop. Handler errors and panics are contained here: a misbehaving
//! handler costs the notice it was handling, never the listening loop.

use std::{any::Any, collections::HashSet, fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use futures::{FutureExt, future::BoxFuture};
use log::warn;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{error::RegistrationError, filter::FilterSpec, notice::Notice};

/// Error type user handlers may return; logged and discarded.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// User callback invoked for each accepted notice.
///
/// The handler receives the notice (raw payload bytes plus the extracted
/// summary). Its return value is logged on error and otherwise ignored.
#[async_trait]
pub trait NoticeHandler: Send + Sync + 'static {
    /// Process one notice.
    async fn handle(&self, notice: Notice) -> Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> NoticeHandler for FnHandler<F>
where
    F: Fn(Notice) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync + 'static,
{
    async fn handle(&self, notice: Notice) -> Result<(), HandlerError> { (self.0)(notice).await }
}

/// Wrap an async closure as a [`NoticeHandler`].
///
/// # Examples
///
/// ```
/// use noticewire::handler_fn;
///
/// let handler = handler_fn(|notice| async move {
///     println!("notice {:?}", notice.document.identifier);
///     Ok(())
/// });
/// let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn NoticeHandler>
where
    F: Fn(Notice) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(move |notice| f(notice).boxed()))
}

/// Destination for accepted notices.
pub(crate) enum DispatchSink {
    Handler(Arc<dyn NoticeHandler>),
    Unbounded(mpsc::UnboundedSender<Notice>),
    Bounded(mpsc::Sender<Notice>),
}

impl fmt::Debug for DispatchSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Handler(_) => "Handler",
            Self::Unbounded(_) => "Unbounded",
            Self::Bounded(_) => "Bounded",
        };
        f.write_str(kind)
    }
}

/// A handler (or output queue) plus its filter, validated eagerly.
///
/// Immutable once built; one registration is passed to the listener per
/// `listen` invocation.
#[derive(Debug)]
pub struct Registration {
    pub(crate) sink: DispatchSink,
    pub(crate) filter: FilterSpec,
}

impl Registration {
    /// Start building a registration.
    #[must_use]
    pub fn builder() -> RegistrationBuilder { RegistrationBuilder::default() }

    /// The filter attached at registration time.
    #[must_use]
    pub const fn filter(&self) -> &FilterSpec { &self.filter }

    /// Deliver one accepted notice to the registered sink.
    ///
    /// Handler errors and panics are logged here and never propagate. The
    /// handler future runs on its own task so a panic unwinds into the
    /// `JoinError` instead of the listener loop. Dispatch is awaited, so
    /// wire order is preserved. Cancellation aborts an in-flight handler
    /// task (and abandons a blocked bounded-queue send) rather than leaving
    /// it running detached.
    pub(crate) async fn dispatch(
        &self,
        notice: Notice,
        shutdown: &CancellationToken,
    ) -> DispatchOutcome {
        match &self.sink {
            DispatchSink::Handler(handler) => {
                let handler = Arc::clone(handler);
                let identifier = notice.document.identifier.clone();
                let mut task = tokio::spawn(async move { handler.handle(notice).await });
                let joined = tokio::select! {
                    () = shutdown.cancelled() => {
                        task.abort();
                        return DispatchOutcome::Cancelled;
                    }
                    joined = &mut task => joined,
                };
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("notice handler failed for {identifier:?}: {e}"),
                    Err(join) if join.is_panic() => {
                        let payload = join.into_panic();
                        warn!(
                            "notice handler panicked for {identifier:?}: {}",
                            panic_message(payload.as_ref())
                        );
                    }
                    // Runtime shutdown; nothing useful to log.
                    Err(_) => {}
                }
            }
            DispatchSink::Unbounded(tx) => {
                if tx.send(notice).is_err() {
                    warn!("notice queue receiver dropped; notice discarded");
                }
            }
            DispatchSink::Bounded(tx) => {
                tokio::select! {
                    () = shutdown.cancelled() => return DispatchOutcome::Cancelled,
                    sent = tx.send(notice) => {
                        if sent.is_err() {
                            warn!("notice queue receiver dropped; notice discarded");
                        }
                    }
                }
            }
        }
        DispatchOutcome::Delivered
    }
}

/// Whether a dispatch ran to completion or was cut short by cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    Delivered,
    Cancelled,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Builder for [`Registration`].
///
/// # Examples
///
/// ```
/// use noticewire::Registration;
///
/// let (builder, notices) = Registration::builder().queue();
/// let registration = builder.allow_types([61, 62]).build().expect("valid registration");
/// let _ = (registration, notices);
/// ```
#[derive(Default)]
pub struct RegistrationBuilder {
    sink: Option<DispatchSink>,
    allow: Option<HashSet<u32>>,
    deny: Option<HashSet<u32>>,
}

impl RegistrationBuilder {
    /// Register a handler invoked for each accepted notice.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn NoticeHandler>) -> Self {
        self.sink = Some(DispatchSink::Handler(handler));
        self
    }

    /// Register an async closure as the handler.
    #[must_use]
    pub fn handler_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Notice) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handler(handler_fn(f))
    }

    /// Deliver accepted notices to an unbounded queue instead of a handler.
    ///
    /// Returns the receiving half for the consumer to poll or block on.
    #[must_use]
    pub fn queue(mut self) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sink = Some(DispatchSink::Unbounded(tx));
        (self, rx)
    }

    /// Deliver accepted notices to a bounded queue.
    ///
    /// When the queue is full the listener loop waits for capacity, so
    /// backpressure propagates to the TCP stream rather than dropping
    /// notices.
    #[must_use]
    pub fn bounded_queue(mut self, capacity: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (tx, rx) = mpsc::channel(capacity);
        self.sink = Some(DispatchSink::Bounded(tx));
        (self, rx)
    }

    /// Dispatch only notices whose type code is in `types`.
    #[must_use]
    pub fn allow_types(mut self, types: impl IntoIterator<Item = u32>) -> Self {
        self.allow.get_or_insert_default().extend(types);
        self
    }

    /// Drop notices whose type code is in `types`.
    #[must_use]
    pub fn deny_types(mut self, types: impl IntoIterator<Item = u32>) -> Self {
        self.deny.get_or_insert_default().extend(types);
        self
    }

    /// Validate and produce the registration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::ConflictingFilterConfiguration`] if
    /// both an allow-set and a deny-set were configured, and
    /// [`RegistrationError::MissingSink`] if neither a handler nor a queue
    /// was registered.
    pub fn build(self) -> Result<Registration, RegistrationError> {
        if self.allow.is_some() && self.deny.is_some() {
            return Err(RegistrationError::ConflictingFilterConfiguration);
        }
        let sink = self.sink.ok_or(RegistrationError::MissingSink)?;
        let filter = match (self.allow, self.deny) {
            (Some(allow), None) => FilterSpec::Allow(allow),
            (None, Some(deny)) => FilterSpec::Deny(deny),
            _ => FilterSpec::Any,
        };
        Ok(Registration { sink, filter })
    }
}
