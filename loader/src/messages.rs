//! Load-scoped diagnostic messages.

use alloc::string::String;
use alloc::vec::Vec;

/// Human-readable notices produced during one load.
///
/// Every message is also forwarded to the `log` facade at info level.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<String>,
}

impl MessageLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message.
    pub fn append_msg(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::info!("[marrow/loader] {}", msg);
        self.messages.push(msg);
    }

    /// Messages in the order they were recorded.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Take the messages.
    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}
