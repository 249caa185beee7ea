use std::io;
use std::time::Duration;

/// Failures surfaced by the hub client.
///
/// Hub-side rejections of a well-formed command are not errors: they come
/// back as `Ok(false)` from the command methods.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not connect to {addr}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("not connected")]
    NotConnected,

    #[error("no reply terminator within {0:?}")]
    ReadTimeout(Duration),

    #[error("connection closed before end of frame ({buffered} bytes buffered)")]
    Framing { buffered: usize },

    #[error("malformed JSON in reply")]
    Decode(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not open message log")]
    Log(#[source] io::Error),

    #[error("IO error")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
