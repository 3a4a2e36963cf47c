use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("email request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("email API rejected message: {status} - {body}")]
    Rejected { status: u16, body: String },
}

/// 一封告警邮件,只在一次发送中存在
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub html_body: String,
}

impl AlertMessage {
    pub fn new(subject: impl Into<String>, html_body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            html_body: html_body.into(),
        }
    }

    pub fn change_detected(url: &str, diff_file_name: &str) -> Self {
        let url_html = escape_html(url);
        Self::new(
            format!("Change Detected on {}", url),
            format!(
                "<p>A change was detected on <a href=\"{url}\">{url}</a>.<br>\
                 Review <b>{file}</b> for the highlighted difference.</p>",
                url = url_html,
                file = escape_html(diff_file_name),
            ),
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError>;
}
