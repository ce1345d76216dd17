use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::config::MailConfig;

const MAX_ATTEMPTS: u32 = 2;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email sending timed out")]
    Timeout,
    #[error("email transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError>;
}

/// Mailer backed by a JSON mail-delivery API.
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html_body,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MailError::Timeout
                } else {
                    MailError::Transport(e.to_string())
                }
            })?;
        if !resp.status().is_success() {
            return Err(MailError::Transport(format!(
                "mail API returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Retries with a per-attempt timeout; the last error wins.
pub async fn send_with_retry(
    mailer: &dyn Mailer,
    to: &str,
    subject: &str,
    html_body: &str,
) -> Result<(), MailError> {
    let mut last_error = MailError::Transport("no attempts made".into());
    for attempt in 1..=MAX_ATTEMPTS {
        match tokio::time::timeout(ATTEMPT_TIMEOUT, mailer.send(to, subject, html_body)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => {
                warn!(attempt, error = %e, "email sending attempt failed");
                last_error = e;
            }
            Err(_) => {
                warn!(attempt, "email sending attempt timed out");
                last_error = MailError::Timeout;
            }
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    Err(last_error)
}

pub async fn send_verification_email(
    mailer: &dyn Mailer,
    email_to: &str,
    code: &str,
) -> Result<(), MailError> {
    let body = format!(
        r#"
        <html>
            <body>
                <h2>Welcome to IELTS Practice AI!</h2>
                <p>Your verification code is: <strong>{code}</strong></p>
                <p>This code will expire in 15 minutes.</p>
            </body>
        </html>
        "#
    );
    send_with_retry(
        mailer,
        email_to,
        "Verify your IELTS Practice AI account",
        &body,
    )
    .await
}

pub async fn send_password_reset_email(
    mailer: &dyn Mailer,
    email_to: &str,
    code: &str,
) -> Result<(), MailError> {
    let body = format!(
        r#"
        <html>
            <body>
                <h2>Password Reset Request</h2>
                <p>Your password reset code is: <strong>{code}</strong></p>
                <p>This code will expire in 15 minutes.</p>
                <p>If you did not request a password reset, please ignore this email.</p>
            </body>
        </html>
        "#
    );
    send_with_retry(
        mailer,
        email_to,
        "Reset your IELTS Practice AI password",
        &body,
    )
    .await
}
