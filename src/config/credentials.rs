use anyhow::{Context, Result};
use std::env;
use std::fmt;

use crate::config::EmailConfig;

/// 邮件 API 凭据,由调用方一次性读取后交给 Notifier
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub recipient: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            recipient: recipient.into(),
        }
    }

    /// 从 `[email]` 中指定的环境变量读取
    pub fn from_env(config: &EmailConfig) -> Result<Self> {
        Self::from_lookup(config, |name| env::var(name).ok())
    }

    fn from_lookup<F>(config: &EmailConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("Environment variable {} is not set", name))
        };

        Ok(Self::new(
            read(&config.api_key_env)?,
            read(&config.recipient_env)?,
        ))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("recipient", &self.recipient)
            .finish()
    }
}
