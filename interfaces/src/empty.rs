use std::path::Path;

use crate::defs::LogLevel;
use crate::defs::LogSink;
use crate::defs::MailSender;

/// Sink used when the caller does not care about log output.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn log(&self, _level: LogLevel, _message: &str) {
        // Nothing to record.
    }
}

/// Mail sender that never delivers anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMailer;

impl MailSender for NullMailer {
    fn send(&self, _subject: &str, _body: &str, _attachment: Option<&Path>, _recipients: &[String]) -> bool {
        false
    }
}
