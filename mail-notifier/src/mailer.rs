use crate::config::MailerConfig;
use crate::error::Result;
use interfaces::MailSender;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Sends HTML notices, optionally with one attached file, over SMTP.
pub struct SmtpMailer {
    config: MailerConfig,
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: MailerConfig) -> Result<Self> {
        let builder = if config.implicit_tls {
            SmtpTransport::relay(&config.server)?
        } else {
            SmtpTransport::builder_dangerous(&config.server)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(30)));

        if config.use_tls || config.accept_invalid_certs {
            let parameters = TlsParameters::builder(config.server.clone())
                .dangerous_accept_invalid_certs(config.accept_invalid_certs)
                .build()?;
            builder = builder.tls(if config.implicit_tls {
                Tls::Wrapper(parameters)
            } else {
                Tls::Required(parameters)
            });
        }

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Builds the message `send` would deliver.
    pub fn build_message(
        &self,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
        recipients: &[String],
    ) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.config.from.parse::<Mailbox>()?)
            .subject(subject);
        for recipient in recipients {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }

        let html = SinglePart::html(body.to_string());
        let message = match attachment {
            Some(path) => {
                let content = fs::read(path)?;
                let attached = Attachment::new(self.config.attachment_name.clone())
                    .body(content, ContentType::TEXT_PLAIN);
                builder.multipart(MultiPart::mixed().singlepart(html).singlepart(attached))?
            }
            None => builder.singlepart(html)?,
        };
        Ok(message)
    }
}

impl MailSender for SmtpMailer {
    fn send(&self, subject: &str, body: &str, attachment: Option<&Path>, recipients: &[String]) -> bool {
        let message = match self.build_message(subject, body, attachment, recipients) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to prepare mail '{}': {}", subject, e);
                return false;
            }
        };

        match self.transport.send(&message) {
            Ok(_) => {
                info!("Mail '{}' sent to {} recipients", subject, recipients.len());
                true
            }
            Err(e) => {
                warn!("Failed to send mail '{}' via {}: {}", subject, self.config.server, e);
                false
            }
        }
    }
}
