//! Non-fatal export diagnostics, embedded in the manifest as
//! `b4w_export_warnings` / `b4w_export_errors`.

use log::warn;
use serde::{Deserialize, Serialize};

/// Where the viewer should surface a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Primary,
    Secondary,
    #[default]
    All,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMessage {
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
}

impl ExportMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: MessageType::All,
        }
    }
}

/// Ordered warning and error lists of one export.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Messages {
    pub warnings: Vec<ExportMessage>,
    pub errors: Vec<ExportMessage>,
}

impl Messages {
    pub fn warn(&mut self, text: impl Into<String>) {
        let msg = ExportMessage::new(text);
        warn!("{}", msg.text);
        self.warnings.push(msg);
    }

    pub fn err(&mut self, text: impl Into<String>) {
        let msg = ExportMessage::new(text);
        warn!("export error: {}", msg.text);
        self.errors.push(msg);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.warnings.clear();
        self.errors.clear();
    }
}
