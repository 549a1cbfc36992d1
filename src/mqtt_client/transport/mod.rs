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

//! Transport layer abstraction.
//!
//! The client consumes any ordered, reliable byte stream through
//! [`TransportOps`]; a [`TransportConnector`] opens a fresh stream for every
//! connection attempt so automatic reconnect can redial. TCP is built in;
//! TLS, WebSocket, or other stacks plug in by implementing both traits.

mod tcp;

pub use tcp::{TcpConnector, TcpTransport};

use std::future::Future;
use std::io::IoSlice;
use std::pin::Pin;

use tokio::time::Duration;

/// Error types that can occur during transport operations.
#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    Timeout,
    Connect(String),
    NotConnected,
    /// The peer closed the stream (read returned zero bytes).
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "IO error: {e}"),
            TransportError::Timeout => write!(f, "Operation timed out"),
            TransportError::Connect(msg) => write!(f, "Connection failed: {msg}"),
            TransportError::NotConnected => write!(f, "Transport not connected"),
            TransportError::Closed => write!(f, "Transport closed by peer"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Core trait that defines the byte-stream operations the client requires.
///
/// Implementations must deliver bytes in order in each direction. `recv` may
/// return any positive number of bytes; packet reassembly across fragmented
/// reads is the client's job.
pub trait TransportOps: Send {
    /// Write the given buffers fully, in order.
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

    /// Read at least one byte into `buffer`, returning the count. Zero
    /// signals end of stream.
    fn recv<'a>(
        &'a mut self,
        buffer: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, TransportError>> + Send + 'a>>;

    /// Graceful shutdown with a bound. After the timeout the stream is
    /// dropped regardless.
    fn shutdown<'a>(
        &'a mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Factory that opens a fresh transport for each connection attempt.
///
/// Owned by the client for the lifetime of the session so the reconnect
/// supervisor can redial without application involvement.
pub trait TransportConnector: Send {
    fn connect(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn TransportOps>, TransportError>> + Send + '_>>;
}
