use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Credentials, EmailConfig};
use crate::notify::{AlertMessage, NotifyError, Notifier};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct Contact<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest<'a> {
    sender: Contact<'a>,
    to: Vec<Contact<'a>>,
    subject: &'a str,
    html_content: &'a str,
}

/// 通过 Brevo 事务邮件 API 发送告警
pub struct BrevoNotifier {
    client: Client,
    api_url: String,
    sender_name: String,
    sender_email: String,
    credentials: Credentials,
}

impl BrevoNotifier {
    pub fn new(config: &EmailConfig, credentials: Credentials) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            sender_name: config.sender_name.clone(),
            sender_email: config.sender_email.clone(),
            credentials,
        })
    }

    fn request_body<'a>(&'a self, message: &'a AlertMessage) -> SendEmailRequest<'a> {
        SendEmailRequest {
            sender: Contact {
                name: Some(&self.sender_name),
                email: &self.sender_email,
            },
            to: vec![Contact {
                name: None,
                email: &self.credentials.recipient,
            }],
            subject: &message.subject,
            html_content: &message.html_body,
        }
    }
}

#[async_trait]
impl Notifier for BrevoNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        debug!("Posting alert to {}", self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.credentials.api_key)
            .header("accept", "application/json")
            .json(&self.request_body(message))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CREATED {
            info!("Alert email sent to {}", self.credentials.recipient);
            return Ok(());
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read email API response body ({}): {}", status, e);
                String::new()
            }
        };
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
