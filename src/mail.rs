//! Outbound mail
//! -------------
//! SendGrid when credentials are configured, otherwise a log-only sink so
//! development and tests never hit the network. Mail failures are reported to
//! the caller but are treated as non-fatal everywhere: a reset request must
//! not 500 because the provider hiccuped.

use crate::config::Config;
use crate::error::{AppError, AppResult};
use serde_json::json;
use tracing::{debug, info};

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

pub enum Mailer {
    Sendgrid {
        client: reqwest::Client,
        api_key: String,
        sender: String,
    },
    Log,
}

impl Mailer {
    pub fn from_config(config: &Config) -> Self {
        match (&config.sendgrid_api_key, &config.mail_sender) {
            (Some(api_key), Some(sender)) => Mailer::Sendgrid {
                client: reqwest::Client::new(),
                api_key: api_key.clone(),
                sender: sender.clone(),
            },
            _ => {
                info!("no mail provider configured; outbound mail goes to the log");
                Mailer::Log
            }
        }
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        match self {
            Mailer::Sendgrid { client, api_key, sender } => {
                let payload = json!({
                    "personalizations": [{ "to": [{ "email": to }] }],
                    "from": { "email": sender },
                    "subject": subject,
                    "content": [{ "type": "text/plain", "value": body }],
                });
                let resp = client
                    .post(SENDGRID_SEND_URL)
                    .bearer_auth(api_key)
                    .json(&payload)
                    .send()
                    .await?;
                if !resp.status().is_success() {
                    return Err(AppError::upstream(
                        "mail_provider",
                        format!("sendgrid returned {}", resp.status()),
                    ));
                }
                debug!(to, subject, "mail handed to sendgrid");
                Ok(())
            }
            Mailer::Log => {
                info!(to, subject, body, "outbound mail (log only)");
                Ok(())
            }
        }
    }
}
