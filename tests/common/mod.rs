//! Shared fixtures: a loopback server speaking the length-prefixed XML
//! transport, plus sample documents.

#![allow(dead_code, reason = "each test binary uses a subset of the helpers")]

use std::time::Duration;

use noticewire::{Endpoint, ListenerConfig};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::sleep,
};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Write one frame (4-byte big-endian length + payload) to the client.
pub async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> TestResult {
    let length = u32::try_from(payload.len())?;
    stream.write_all(&length.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    Ok(())
}

/// Read one frame from the client.
pub async fn read_frame(stream: &mut TcpStream) -> TestResult<Vec<u8>> {
    let mut prefix = [0_u8; 4];
    stream.read_exact(&mut prefix).await?;
    let mut payload = vec![0_u8; u32::from_be_bytes(prefix) as usize];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

pub fn handshake_ack() -> String {
    r#"<Transport role="authenticate" version="1.0"><Origin>ivo://test/server</Origin></Transport>"#
        .to_owned()
}

pub fn ping() -> String {
    r#"<Transport role="iamalive" version="1.0"><Origin>ivo://test/server</Origin></Transport>"#
        .to_owned()
}

pub fn voevent(packet_type: u32, seq: u32) -> String {
    format!(
        r#"<voe:VOEvent xmlns:voe="http://www.ivoa.net/xml/VOEvent/v2.0" ivorn="ivo://test/alerts#{seq}" role="observation" version="2.0"><What><Param name="Packet_Type" value="{packet_type}"/></What></voe:VOEvent>"#
    )
}

/// Accept one client connection and complete the handshake exchange.
pub async fn accept_handshaken(listener: &TcpListener) -> TestResult<TcpStream> {
    let (mut stream, _) = listener.accept().await?;
    let hello = read_frame(&mut stream).await?;
    let hello = String::from_utf8(hello)?;
    assert!(
        hello.contains("authenticate"),
        "client handshake should carry the handshake role, got: {hello}"
    );
    write_frame(&mut stream, handshake_ack().as_bytes()).await?;
    Ok(stream)
}

/// Configuration with test-friendly timeouts for a single local endpoint.
pub fn test_config(port: u16) -> ListenerConfig {
    ListenerConfig::builder()
        .endpoint(Endpoint::new("127.0.0.1", port))
        .connect_timeout(Duration::from_secs(2))
        .handshake_timeout(Duration::from_secs(2))
        .ping_interval(Duration::from_secs(10))
        .keep_alive_multiplier(3)
        .reconnect_backoff(Duration::from_millis(10), Duration::from_millis(50))
        .client_name("ivo://test/client")
        .build()
        .expect("valid test configuration")
}

/// Poll `condition` until it holds or `deadline` elapses.
pub async fn wait_for(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
