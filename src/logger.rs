use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::diff::diff_json;

/// How replies are written to the message log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    /// Every reply body in full.
    Full,
    /// The first reply to each command in full, then only what changed.
    Diffed,
}

/// NDJSON record of hub traffic, one line per request or reply.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous_replies: HashMap<String, Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous_replies: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, command: &str, body: &Value) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "command": command,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_reply(&mut self, command: &str, body: &Value) {
        let entry = match (self.mode, self.previous_replies.get(command)) {
            (MessageLogMode::Full, _) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "reply",
                "command": command,
                "body": body,
            }),
            (MessageLogMode::Diffed, None) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "reply",
                "command": command,
                "full": true,
                "body": body,
            }),
            (MessageLogMode::Diffed, Some(prev)) => {
                let mut changes = Vec::new();
                diff_json(prev, body, "", &mut changes);
                let changes: Vec<Value> = changes
                    .into_iter()
                    .map(|c| json!({ "path": c.path, "old": c.old, "new": c.new }))
                    .collect();
                json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "reply",
                    "command": command,
                    "changes": changes,
                })
            }
        };
        self.write_line(&entry);

        if self.mode == MessageLogMode::Diffed {
            self.previous_replies.insert(command.to_string(), body.clone());
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Err(e) = writeln!(self.file, "{entry}") {
            warn!("failed to write message log entry: {e}");
        }
    }
}
