use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::Result;
use crate::codec::{encode, structurally_equal};
use crate::logger::MessageLogger;
use crate::protocol::Command;
use crate::transport::Transport;

/// Sends one command at a time and matches replies against the command's
/// success template.
///
/// Replies carry no request id, so callers must not interleave commands;
/// `NeoHub` keeps the gateway behind an async mutex for that reason.
pub(crate) struct Gateway {
    transport: Transport,
    logger: Option<MessageLogger>,
}

impl Gateway {
    pub fn new(transport: Transport, logger: Option<MessageLogger>) -> Self {
        Self { transport, logger }
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.transport.connect().await
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Send `command` and return whatever the hub replied.
    ///
    /// Connects first if there is no live connection, including after an
    /// earlier transport failure. A connection left mid-request by a
    /// dropped caller is replaced, so replies never pair with the wrong
    /// request.
    pub async fn query(&mut self, command: &Command) -> Result<Value> {
        if self.transport.is_awaiting_reply() {
            // an earlier caller gave up mid-request; its reply may still arrive
            warn!(addr = %self.transport.addr(), "previous request abandoned, resetting connection");
            self.transport.disconnect();
        }
        if !self.transport.is_connected() {
            self.transport.connect().await?;
        }

        if let Some(ref mut logger) = self.logger {
            logger.log_request(command.name(), command.payload());
        }

        debug!(command = command.name(), "sending to hub");
        trace!(payload = %command.payload(), "request body");
        self.transport.send(&encode(command.payload())).await?;
        let reply = self.transport.receive_until_terminator().await?;
        trace!(reply = %reply, "reply body");

        if let Some(ref mut logger) = self.logger {
            logger.log_reply(command.name(), &reply);
        }
        Ok(reply)
    }

    /// Send `command` and report whether the hub accepted it.
    ///
    /// A reply that does not match the success template, including the
    /// hub's `{"error": ...}` replies, is `Ok(false)`. Commands without a
    /// template are accepted on any reply.
    pub async fn execute(&mut self, command: &Command) -> Result<bool> {
        let reply = self.query(command).await?;
        Ok(reply_matches(command, &reply))
    }
}

fn reply_matches(command: &Command, reply: &Value) -> bool {
    let Some(expected) = command.expected_reply() else {
        return true;
    };
    if structurally_equal(reply, &expected) {
        return true;
    }

    match reply.get("error").and_then(Value::as_str) {
        Some(hub_error) => warn!(
            request = %command.payload(),
            expected = %expected,
            hub_error,
            "hub rejected command"
        ),
        None => warn!(
            request = %command.payload(),
            expected = %expected,
            received = %reply,
            "unexpected reply from hub"
        ),
    }
    false
}
