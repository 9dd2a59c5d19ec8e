use std::fmt;
use std::path::Path;

/// Severity levels understood by a log sink, most severe first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Object style note:
// Implementations of these traits are handed to long lived clients and may be
// called from any thread, so they take `&self` and must not panic. A sink
// that fails to record a line swallows the failure; logging is never allowed
// to change the outcome of the operation that produced the line.

/// Receives one formatted line per log event.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Outbound mail delivery.
///
/// Returns `true` once the message has been handed to the mail server.
pub trait MailSender {
    fn send(&self, subject: &str, body: &str, attachment: Option<&Path>, recipients: &[String]) -> bool;
}

impl<T: LogSink + ?Sized> LogSink for std::sync::Arc<T> {
    fn log(&self, level: LogLevel, message: &str) {
        (**self).log(level, message)
    }
}
