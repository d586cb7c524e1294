//! Error types for the notice transport client.
//!
//! The taxonomy mirrors how failures are handled: configuration and
//! registration errors surface synchronously before any network activity,
//! connection and frame errors are consumed by the listener's reconnect
//! logic, and document errors are logged and skipped without touching the
//! connection.

use std::{io, time::Duration};

/// Errors detected while validating listener configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The endpoint list was empty.
    #[error("at least one endpoint must be configured")]
    NoEndpoints,
    /// An endpoint string did not parse as `host:port`.
    #[error("invalid endpoint `{0}`: expected host:port")]
    InvalidEndpoint(String),
}

/// Errors detected while validating a handler registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Both an allow-set and a deny-set were configured.
    #[error("allow and deny filters are mutually exclusive")]
    ConflictingFilterConfiguration,
    /// Neither a handler nor an output queue was registered.
    #[error("a handler or an output queue must be registered")]
    MissingSink,
}

/// Failure to establish a TCP connection.
///
/// These are transient: the listener backs off and retries rather than
/// returning them to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The peer actively refused the connection.
    #[error("connection to {endpoint} refused")]
    Refused {
        /// Endpoint that refused the connection.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The connect attempt did not complete within the configured timeout.
    #[error("connection to {endpoint} timed out after {timeout:?}")]
    Timeout {
        /// Endpoint that timed out.
        endpoint: String,
        /// Configured connect timeout.
        timeout: Duration,
    },
    /// Hostname resolution failed or produced no addresses.
    #[error("failed to resolve {endpoint}")]
    Dns {
        /// Endpoint that failed to resolve.
        endpoint: String,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },
    /// Any other I/O failure while connecting.
    #[error("connection to {endpoint} failed")]
    Io {
        /// Endpoint the attempt targeted.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Every endpoint in the fallback list failed.
    #[error("all {attempts} configured endpoints failed")]
    Exhausted {
        /// Number of endpoints attempted.
        attempts: usize,
    },
}

/// Frame-level read/write failures. Terminal for the current session.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared payload length exceeds the configured maximum.
    #[error("declared frame length {length} exceeds the {max} byte limit")]
    TooLarge {
        /// Length declared by the frame prefix.
        length: usize,
        /// Configured maximum payload size.
        max: usize,
    },
    /// The stream closed part-way through a frame.
    #[error("stream closed mid-frame: {missing} bytes missing")]
    Truncated {
        /// Bytes still owed when the stream ended.
        missing: usize,
    },
    /// The peer closed the stream on a frame boundary.
    #[error("connection closed by peer")]
    Closed,
    /// Transport error.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Message-level failures: the offending payload is logged and skipped, the
/// connection is kept.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The payload was not parsable XML.
    #[error("malformed XML payload")]
    Malformed(#[from] quick_xml::Error),
    /// The payload contained no root element.
    #[error("payload contains no root element")]
    MissingRoot,
    /// A control document carried a role this client does not understand.
    #[error("control document with unrecognized role `{0}`")]
    UnrecognizedControl(String),
}

/// Failure of the post-connect handshake exchange.
///
/// Transient, like [`ConnectError`]: the listener drops the session, backs
/// off, and reconnects.
#[derive(Debug, thiserror::Error)]
pub(crate) enum HandshakeError {
    #[error("handshake did not complete within {0:?}")]
    Timeout(Duration),
    #[error("handshake rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}
