use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::codec::{FrameDecoder, decode_stream};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
}

/// One persistent TCP connection to the hub.
///
/// Never reconnects on its own. Any IO failure, read timeout or mid-frame
/// close drops the socket and returns to [`TransportState::Disconnected`];
/// whoever owns the transport decides whether to connect again.
pub struct Transport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    state: TransportState,
    stream: Option<TcpStream>,
    decoder: FrameDecoder,
    awaiting_reply: bool,
}

impl Transport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: crate::config::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: crate::config::DEFAULT_READ_TIMEOUT,
            state: TransportState::Disconnected,
            stream: None,
            decoder: FrameDecoder::new(),
            awaiting_reply: false,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == TransportState::Connected
    }

    /// A request went out (or started to) and its reply has not been read.
    ///
    /// Stays set if the caller stopped waiting, in which case the next
    /// frame on the socket belongs to the abandoned request.
    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        self.state = TransportState::Connecting;
        debug!(addr = %self.addr(), "connecting to hub");

        let attempt = timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await;

        let stream = match attempt {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                self.state = TransportState::Disconnected;
                return Err(Error::Connection {
                    addr: self.addr(),
                    source,
                });
            }
            Err(_) => {
                self.state = TransportState::Disconnected;
                return Err(Error::ConnectTimeout {
                    addr: self.addr(),
                    timeout: self.connect_timeout,
                });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            trace!("could not set TCP_NODELAY: {e}");
        }

        self.decoder.clear();
        self.stream = Some(stream);
        self.state = TransportState::Connected;
        debug!(addr = %self.addr(), "connected to hub");
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!(addr = %self.addr(), "disconnected from hub");
        }
        self.decoder.clear();
        self.awaiting_reply = false;
        self.state = TransportState::Disconnected;
    }

    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = match (self.state, self.stream.as_mut()) {
            (TransportState::Connected, Some(stream)) => stream,
            _ => return Err(Error::NotConnected),
        };

        trace!(len = bytes.len(), "writing frame");
        self.awaiting_reply = true;
        let written = async {
            stream.write_all(bytes).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = written {
            self.disconnect();
            return Err(e.into());
        }
        Ok(())
    }

    /// Wait for one NUL-terminated reply and decode it.
    pub async fn receive_until_terminator(&mut self) -> Result<Value> {
        let stream = match (self.state, self.stream.as_mut()) {
            (TransportState::Connected, Some(stream)) => stream,
            _ => return Err(Error::NotConnected),
        };

        let result = match timeout(self.read_timeout, decode_stream(stream, &mut self.decoder)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::ReadTimeout(self.read_timeout)),
        };

        match &result {
            // the bad frame has been consumed, the stream itself is still in sync
            Ok(_) | Err(Error::Decode(_)) => self.awaiting_reply = false,
            Err(_) => self.disconnect(),
        }
        result
    }
}
