pub mod defs;
pub mod empty;

pub use defs::{LogLevel, LogSink, MailSender};
pub use empty::{NoopSink, NullMailer};
