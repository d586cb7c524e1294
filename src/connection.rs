//! Connection management: endpoint fallback, connect classification, and
//! framed send/receive over one TCP session.

use std::{
    io,
    net::SocketAddr,
    time::Duration,
};

use bytes::Bytes;
use log::{debug, info, warn};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, lookup_host},
    time::{Instant, timeout},
};

use crate::{
    codec::{encode_frame, read_frame},
    config::{Endpoint, ListenerConfig},
    error::{ConnectError, FrameError},
};

/// The live state of one connection attempt.
///
/// Owned exclusively by the listener loop; dropping it closes the socket.
#[derive(Debug)]
pub(crate) struct Session {
    stream: TcpStream,
    endpoint: Endpoint,
    max_frame_size: usize,
    last_activity: Instant,
}

impl Session {
    /// Connect to the first reachable endpoint in the configured order.
    ///
    /// Each attempt is independent and bounded by the connect timeout; no
    /// partial state carries over between attempts.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Exhausted`] once every endpoint has failed;
    /// individual failures are logged as they occur.
    pub(crate) async fn establish(config: &ListenerConfig) -> Result<Self, ConnectError> {
        for endpoint in config.endpoints() {
            match Self::connect_one(endpoint, config.connect_timeout(), config.max_frame_size())
                .await
            {
                Ok(session) => {
                    info!("connected to {endpoint}");
                    return Ok(session);
                }
                Err(e) => warn!("connect attempt failed: {e}"),
            }
        }
        Err(ConnectError::Exhausted {
            attempts: config.endpoints().len(),
        })
    }

    async fn connect_one(
        endpoint: &Endpoint,
        connect_timeout: Duration,
        max_frame_size: usize,
    ) -> Result<Self, ConnectError> {
        let attempt = async {
            let addrs = resolve(endpoint).await?;
            let mut last_error = None;
            for addr in addrs {
                debug!("dialing {endpoint} at {addr}");
                match TcpStream::connect(addr).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => last_error = Some(classify_io(endpoint, e)),
                }
            }
            Err(last_error.unwrap_or_else(|| ConnectError::Dns {
                endpoint: endpoint.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"),
            }))
        };
        let stream = timeout(connect_timeout, attempt)
            .await
            .unwrap_or(Err(ConnectError::Timeout {
                endpoint: endpoint.to_string(),
                timeout: connect_timeout,
            }))?;
        // Small latency-sensitive frames; do not batch them.
        stream.set_nodelay(true).map_err(|e| ConnectError::Io {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        Ok(Self {
            stream,
            endpoint: endpoint.clone(),
            max_frame_size,
            last_activity: Instant::now(),
        })
    }

    /// Receive the next complete frame payload, refreshing the activity
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Any [`FrameError`] is terminal for this session.
    pub(crate) async fn recv_frame(&mut self) -> Result<Bytes, FrameError> {
        let payload = read_frame(&mut self.stream, self.max_frame_size).await?;
        self.last_activity = Instant::now();
        Ok(payload)
    }

    /// Encode and send one frame.
    ///
    /// # Errors
    ///
    /// Any [`FrameError`] is terminal for this session.
    pub(crate) async fn send_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let frame = encode_frame(payload)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    /// Endpoint this session is connected to.
    pub(crate) fn endpoint(&self) -> &Endpoint { &self.endpoint }

    /// Instant of the last successfully received frame.
    pub(crate) fn last_activity(&self) -> Instant { self.last_activity }
}

async fn resolve(endpoint: &Endpoint) -> Result<Vec<SocketAddr>, ConnectError> {
    let addrs = lookup_host((endpoint.host(), endpoint.port()))
        .await
        .map_err(|e| ConnectError::Dns {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
    Ok(addrs.collect())
}

fn classify_io(endpoint: &Endpoint, error: io::Error) -> ConnectError {
    let endpoint = endpoint.to_string();
    match error.kind() {
        io::ErrorKind::ConnectionRefused => ConnectError::Refused {
            endpoint,
            source: error,
        },
        _ => ConnectError::Io {
            endpoint,
            source: error,
        },
    }
}
