//! Exchange logging
//!
//! Hex-level visibility into what goes over the polled line. By default
//! entries are forwarded to `tracing`; embedders that collect protocol
//! traces in their own sink install a [`LogCallback`] instead.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Per-byte / per-frame detail.
    Debug,
    /// Commands and replies.
    Info,
    /// Decode failures and exception replies.
    Warn,
}

/// Callback receiving formatted log entries.
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Logger attached to a port to observe its exchanges.
#[derive(Clone, Default)]
pub struct CallbackLogger {
    callback: Option<LogCallback>,
}

impl CallbackLogger {
    /// Logger that forwards to `tracing`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger that forwards to the given callback instead of `tracing`.
    pub fn with_callback(callback: LogCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    /// Log an outgoing command string.
    pub fn log_command(&self, command: &str) {
        self.emit(LogLevel::Info, &format!("TX {}", command));
    }

    /// Log a received message.
    pub fn log_reply(&self, reply: &str) {
        self.emit(LogLevel::Info, &format!("RX {}", reply));
    }

    /// Log a decode failure or device-reported exception.
    pub fn log_fault(&self, detail: &str) {
        self.emit(LogLevel::Warn, detail);
    }

    fn emit(&self, level: LogLevel, message: &str) {
        match &self.callback {
            Some(callback) => {
                let stamped = format!("{} {}", Local::now().format("%H:%M:%S%.3f"), message);
                callback(level, &stamped);
            }
            None => match level {
                LogLevel::Debug => debug!("{}", message),
                LogLevel::Info => info!("{}", message),
                LogLevel::Warn => warn!("{}", message),
            },
        }
    }
}

impl std::fmt::Debug for CallbackLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackLogger")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
