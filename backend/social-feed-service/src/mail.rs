/// Welcome mail delivery (SMTP or no-op)
///
/// Mail is sent after the user record commits and never affects the outcome of
/// the request that triggered it.
use crate::config::EmailConfig;
use crate::error::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use resilience::{mail_config, with_retry_if, with_timeout_result, ServiceConfig};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeMail {
    pub recipient: String,
    pub first_name: String,
}

#[async_trait]
pub trait MailNotifier: Send + Sync {
    async fn send_welcome(&self, mail: &WelcomeMail) -> Result<()>;
}

#[derive(Clone)]
pub struct SmtpMailNotifier {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
    app_name: String,
    policy: ServiceConfig,
}

impl SmtpMailNotifier {
    /// Build the notifier from configuration
    ///
    /// If the SMTP host is empty, operates in no-op mode (logs only).
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| AppError::Internal(format!("Invalid SMTP_FROM address: {}", e)))?;

        let transport = if config.smtp_host.trim().is_empty() {
            warn!("SMTP host not configured; welcome mail will operate in no-op mode");
            None
        } else {
            let builder = if config.use_starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            }
            .map_err(|e| AppError::Internal(format!("Failed to configure SMTP transport: {}", e)))?
            .port(config.smtp_port);

            let builder = if config.smtp_username.is_empty() {
                builder
            } else {
                builder.credentials(Credentials::new(
                    config.smtp_username.clone(),
                    config.smtp_password.clone(),
                ))
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self {
            transport,
            from,
            app_name: config.app_name.clone(),
            policy: mail_config(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    fn render(&self, mail: &WelcomeMail) -> (String, String) {
        let subject = format!("Welcome to {}", self.app_name);
        let body = format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; padding: 20px; color: #333;">
    <h2>Hello {first_name},</h2>
    <p>Thanks for joining us! Your account is ready.</p>
    <p>Welcome to {app_name}.</p>
</body>
</html>"#,
            first_name = html_escape(&mail.first_name),
            app_name = html_escape(&self.app_name),
        );
        (subject, body)
    }
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl MailNotifier for SmtpMailNotifier {
    async fn send_welcome(&self, mail: &WelcomeMail) -> Result<()> {
        let (subject, body) = self.render(mail);
        let Some(transport) = &self.transport else {
            info!(recipient = %mail.recipient, %subject, "SMTP disabled; skipping welcome mail");
            return Ok(());
        };

        let to = mail
            .recipient
            .parse::<Mailbox>()
            .map_err(|e| AppError::Validation(format!("Invalid recipient address: {}", e)))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| AppError::Internal(format!("Failed to build welcome mail: {}", e)))?;

        with_retry_if(
            &self.policy.retry,
            |_| true,
            || with_timeout_result(self.policy.timeout.duration, transport.send(message.clone())),
        )
        .await
        .map_err(|e| AppError::ExternalService {
            service: "mail",
            message: e.to_string(),
        })?;

        info!(recipient = %mail.recipient, "welcome mail sent");
        Ok(())
    }
}

/// Send the welcome mail on a background task. Failures are logged and counted.
pub fn dispatch_welcome(notifier: Arc<dyn MailNotifier>, mail: WelcomeMail) {
    tokio::spawn(async move {
        if let Err(err) = notifier.send_welcome(&mail).await {
            metrics::record_side_effect_failure("welcome_mail");
            warn!(recipient = %mail.recipient, error = %err, "welcome mail failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> EmailConfig {
        EmailConfig {
            smtp_host: host.to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            use_starttls: true,
            from_address: "noreply@example.com".into(),
            app_name: "Social <Feed>".into(),
        }
    }

    #[tokio::test]
    async fn empty_host_is_a_no_op() {
        let notifier = SmtpMailNotifier::new(&config("")).unwrap();
        assert!(!notifier.is_enabled());
        notifier
            .send_welcome(&WelcomeMail {
                recipient: "a@example.com".into(),
                first_name: "Ada".into(),
            })
            .await
            .unwrap();
    }

    #[test]
    fn invalid_sender_is_rejected() {
        let mut cfg = config("");
        cfg.from_address = "not an address".into();
        assert!(SmtpMailNotifier::new(&cfg).is_err());
    }

    #[test]
    fn template_escapes_user_input() {
        let notifier = SmtpMailNotifier::new(&config("")).unwrap();
        let (subject, body) = notifier.render(&WelcomeMail {
            recipient: "a@example.com".into(),
            first_name: "<b>Ada</b>".into(),
        });
        assert_eq!(subject, "Welcome to Social <Feed>");
        assert!(body.contains("Hello &lt;b&gt;Ada&lt;/b&gt;"));
        assert!(body.contains("Welcome to Social &lt;Feed&gt;."));
    }
}
