//! Outbound email: verification, password reset, welcome, login notices.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
    ) -> Result<(), anyhow::Error>;

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
    ) -> Result<(), anyhow::Error>;

    async fn send_welcome_email(&self, to_email: &str, first_name: &str)
        -> Result<(), anyhow::Error>;

    async fn send_login_notification(
        &self,
        to_email: &str,
        ip: Option<&str>,
    ) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, anyhow::Error> {
        let creds = Credentials::new(config.user.clone(), config.app_password.clone());

        let mailer = SmtpTransport::relay("smtp.gmail.com")
            .map_err(|e| anyhow::anyhow!(e.to_string()))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!("Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.user.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
    ) -> Result<(), anyhow::Error> {
        let email = Message::builder()
            .from(self.from_email.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(plain_body.to_string())?;

        // Send in the blocking thread pool to avoid stalling the runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email)).await?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(anyhow::anyhow!("Failed to send email: {}", e))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
    ) -> Result<(), anyhow::Error> {
        let body = format!(
            "Welcome! Please verify your email address using this token:\n\n{}\n\nThe token expires in 24 hours. If you didn't register, ignore this email.",
            verification_token
        );
        self.send_email(to_email, "Verify Your Email Address", &body)
            .await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
    ) -> Result<(), anyhow::Error> {
        let body = format!(
            "We received a request to reset your password. Use this token to set a new one:\n\n{}\n\nThe token expires in 1 hour. If you didn't request this, ignore this email.",
            reset_token
        );
        self.send_email(to_email, "Reset Your Password", &body).await
    }

    async fn send_welcome_email(
        &self,
        to_email: &str,
        first_name: &str,
    ) -> Result<(), anyhow::Error> {
        let body = format!(
            "Hi {},\n\nYour email is verified and your account is ready to use.",
            first_name
        );
        self.send_email(to_email, "Welcome!", &body).await
    }

    async fn send_login_notification(
        &self,
        to_email: &str,
        ip: Option<&str>,
    ) -> Result<(), anyhow::Error> {
        let body = format!(
            "A new login to your account was detected from {}.\n\nIf this was you, no action is needed.",
            ip.unwrap_or("an unknown address")
        );
        self.send_email(to_email, "New Login to Your Account", &body)
            .await
    }
}

/// Email kinds recorded by the mock, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEmail {
    Verification { to: String, token: String },
    PasswordReset { to: String, token: String },
    Welcome { to: String },
    LoginNotification { to: String },
}

/// Records sends instead of delivering them.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentEmail>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Token from the most recent verification email to `to`, if any.
    pub fn last_verification_token(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|e| match e {
                SentEmail::Verification { to: t, token } if t == to => Some(token.clone()),
                _ => None,
            })
    }

    /// Token from the most recent password reset email to `to`, if any.
    pub fn last_reset_token(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|e| match e {
                SentEmail::PasswordReset { to: t, token } if t == to => Some(token.clone()),
                _ => None,
            })
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
    ) -> Result<(), anyhow::Error> {
        self.sent.lock().unwrap().push(SentEmail::Verification {
            to: to_email.to_string(),
            token: verification_token.to_string(),
        });
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
    ) -> Result<(), anyhow::Error> {
        self.sent.lock().unwrap().push(SentEmail::PasswordReset {
            to: to_email.to_string(),
            token: reset_token.to_string(),
        });
        Ok(())
    }

    async fn send_welcome_email(
        &self,
        to_email: &str,
        _first_name: &str,
    ) -> Result<(), anyhow::Error> {
        self.sent.lock().unwrap().push(SentEmail::Welcome {
            to: to_email.to_string(),
        });
        Ok(())
    }

    async fn send_login_notification(
        &self,
        to_email: &str,
        _ip: Option<&str>,
    ) -> Result<(), anyhow::Error> {
        self.sent.lock().unwrap().push(SentEmail::LoginNotification {
            to: to_email.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_service_creation() {
        let config = SmtpConfig {
            user: "test@gmail.com".to_string(),
            app_password: "test_password".to_string(),
        };

        let service = SmtpEmailService::new(&config);
        assert!(service.is_ok());
    }

    #[tokio::test]
    async fn test_mock_records_sends() {
        let mock = MockEmailService::new();
        mock.send_verification_email("a@example.com", "tok-1")
            .await
            .unwrap();
        mock.send_password_reset_email("a@example.com", "tok-2")
            .await
            .unwrap();

        assert_eq!(mock.sent().len(), 2);
        assert_eq!(
            mock.last_verification_token("a@example.com"),
            Some("tok-1".to_string())
        );
        assert_eq!(
            mock.last_reset_token("a@example.com"),
            Some("tok-2".to_string())
        );
        assert_eq!(mock.last_reset_token("b@example.com"), None);
    }
}
