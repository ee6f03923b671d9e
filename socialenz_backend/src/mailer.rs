use crate::config::MailConfig;
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: Option<String>,
    pub to: String,
    pub subject: String,
    pub text: String,
}

pub fn welcome_mail(from: Option<String>, email: &str, username: &str) -> OutgoingMail {
    OutgoingMail {
        from,
        to: email.to_string(),
        subject: "Welcome to Socialenz".to_string(),
        text: format!(
            "Hi {username},\n\nYour account is ready. Share your first post and find people to follow.\n"
        ),
    }
}

/// Sends the post-registration welcome mail through an HTTP relay. Delivery happens on a
/// spawned task; failures are logged and never reach the caller.
#[derive(Clone)]
pub struct WelcomeMailer {
    client: reqwest::Client,
    config: MailConfig,
}

impl WelcomeMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn send_welcome(&self, email: &str, username: &str) {
        let mail = welcome_mail(self.config.from_address.clone(), email, username);
        let Some(relay_url) = self.config.relay_url.clone() else {
            tracing::info!(to = %mail.to, subject = %mail.subject, "mail relay not configured; skipping welcome mail");
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            match deliver(&client, &relay_url, &mail).await {
                Ok(()) => tracing::info!(to = %mail.to, "welcome mail sent"),
                Err(err) => tracing::warn!(error = ?err, to = %mail.to, "failed to send welcome mail"),
            }
        });
    }
}

async fn deliver(client: &reqwest::Client, relay_url: &str, mail: &OutgoingMail) -> Result<()> {
    client
        .post(relay_url)
        .json(mail)
        .send()
        .await
        .context("mail relay request failed")?
        .error_for_status()
        .context("mail relay rejected message")?;
    Ok(())
}
