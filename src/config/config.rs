use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static TARGET_NAME_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9_-]+$").expect("target name pattern is valid")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub highlight: HighlightConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 被监控的目标页面
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub url: String,
    pub name: String,
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
}

impl fmt::Display for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name={}, url={}, dir={}",
            self.name,
            self.url,
            self.screenshot_dir.display()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub timeout_secs: u64,
    /// 资源请求数量保持不变多久视为网络空闲(毫秒)
    pub network_idle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            timeout_secs: 30,
            network_idle_ms: 500,
        }
    }
}

impl fmt::Display for BrowserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "headless={}, window={}x{}, timeout={}s, idle={}ms",
            self.headless,
            self.window_width,
            self.window_height,
            self.timeout_secs,
            self.network_idle_ms
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enable: bool,
    pub api_url: String,
    pub sender_name: String,
    pub sender_email: String,
    /// 存放 API key 的环境变量名
    pub api_key_env: String,
    /// 存放收件人地址的环境变量名
    pub recipient_env: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enable: true,
            api_url: "https://api.brevo.com/v3/smtp/email".to_string(),
            sender_name: "Website Monitor".to_string(),
            sender_email: "monitor@localhost.localdomain".to_string(),
            api_key_env: "BREVO_API_KEY".to_string(),
            recipient_env: "RECIPIENT_EMAIL".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub stroke_width: u32,
    pub color: [u8; 3],
    pub label: String,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            stroke_width: 5,
            color: [255, 0, 0],
            label: "Change Detected".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

impl Config {
    /// 从指定路径加载配置
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file {}", path.as_ref().display())
        })?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// 获取默认配置文件路径
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Unable to determine config directory")?
            .join("page-watcher");
        Ok(config_dir.join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.target.url)
            .with_context(|| format!("Invalid target url: {}", self.target.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Target url must use http or https: {}", self.target.url);
        }

        if !TARGET_NAME_RE.is_match(&self.target.name) {
            anyhow::bail!(
                "Target name must match [A-Za-z0-9_-]+: {:?}",
                self.target.name
            );
        }

        if self.highlight.stroke_width == 0 || self.highlight.stroke_width > 50 {
            anyhow::bail!("highlight.stroke_width must be between 1 and 50");
        }

        if self.watch.interval_secs == 0 {
            anyhow::bail!("watch.interval_secs must be greater than 0");
        }

        if self.browser.timeout_secs == 0 {
            anyhow::bail!("browser.timeout_secs must be greater than 0");
        }

        if self.email.enable && !self.email.sender_email.contains('@') {
            anyhow::bail!(
                "email.sender_email is not an email address: {}",
                self.email.sender_email
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: TargetConfig {
                url: "https://example.com".to_string(),
                name: "example".to_string(),
                screenshot_dir: default_screenshot_dir(),
            },
            browser: BrowserConfig::default(),
            email: EmailConfig::default(),
            highlight: HighlightConfig::default(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
