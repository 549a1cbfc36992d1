// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use super::{TransportConnector, TransportError, TransportOps};
use std::future::Future;
use std::io::IoSlice;
use std::pin::Pin;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// TCP transport for MQTT connections.
///
/// Wraps an established [`TcpStream`]. Use [`TcpConnector`] for dialing,
/// including redials by the reconnect supervisor.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Creates a TCP transport from an already established TCP stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl TransportOps for TcpTransport {
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(async move {
            // A packet arrives as a handful of small slices (fixed header,
            // then the body). write_all handles short writes per slice;
            // Nagle is off, so one flush at the end suffices.
            for buffer in buffers {
                self.stream
                    .write_all(buffer)
                    .await
                    .map_err(TransportError::Io)?;
            }
            self.stream.flush().await.map_err(TransportError::Io)?;
            Ok(())
        })
    }

    fn recv<'a>(
        &'a mut self,
        buffer: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, TransportError>> + Send + 'a>> {
        Box::pin(async move { self.stream.read(buffer).await.map_err(TransportError::Io) })
    }

    fn shutdown<'a>(
        &'a mut self,
        timeout_duration: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            // If graceful shutdown fails or times out, the stream is closed
            // when it is dropped.
            let _ = timeout(timeout_duration, self.stream.shutdown()).await;
        })
    }
}

/// Dials a broker address over TCP with Nagle disabled.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// `addr` is a `host:port` string, e.g. `"broker.example.net:1883"`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl TransportConnector for TcpConnector {
    fn connect(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn TransportOps>, TransportError>> + Send + '_>>
    {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.addr)
                .await
                .map_err(|e| TransportError::Connect(format!("{}: {e}", self.addr)))?;
            stream.set_nodelay(true).map_err(TransportError::Io)?;
            Ok(Box::new(TcpTransport::from_stream(stream)) as Box<dyn TransportOps>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn loopback_send_recv_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let connector = TcpConnector::new(addr.to_string());
        let (transport, accepted) = tokio::join!(connector.connect(), listener.accept());
        let mut transport = transport.unwrap();
        let (mut peer, _) = accepted.unwrap();

        transport
            .send(&[IoSlice::new(b"hel"), IoSlice::new(b"lo")])
            .await
            .unwrap();
        let mut wire = [0u8; 5];
        peer.read_exact(&mut wire).await.unwrap();
        assert_eq!(&wire, b"hello");

        peer.write_all(b"ack").await.unwrap();
        let mut buffer = [0u8; 16];
        let n = transport.recv(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..n], b"ack");

        transport.shutdown(Duration::from_secs(1)).await;
        // The peer observes EOF once the write half closes.
        assert_eq!(peer.read(&mut buffer).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn connect_failure_reports_the_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = TcpConnector::new(addr.to_string());
        match connector.connect().await {
            Err(TransportError::Connect(detail)) => {
                assert!(detail.contains(&addr.to_string()));
            }
            Err(other) => panic!("expected a Connect error, got {other:?}"),
            Ok(_) => panic!("connect succeeded with no listener"),
        }
    }
}
