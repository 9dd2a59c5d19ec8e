pub mod config;
pub mod error;
pub mod mailer;

pub use config::MailerConfig;
pub use error::{MailerError, Result};
pub use mailer::SmtpMailer;
