use async_trait::async_trait;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use headless_chrome::protocol::cdp::Page::{self, CaptureScreenshotFormatOption, Viewport};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::capture::{CaptureError, PageCapturer};
use crate::config::BrowserConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const READY_STATE_JS: &str = "document.readyState";
const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";
const PAGE_WIDTH_JS: &str = "Math.max(document.documentElement.scrollWidth, \
     document.body ? document.body.scrollWidth : 0)";
const PAGE_HEIGHT_JS: &str = "Math.max(document.documentElement.scrollHeight, \
     document.body ? document.body.scrollHeight : 0)";

/// 基于 headless Chrome 的整页截图
///
/// 每次截图启动一个新的浏览器实例,截图完成后随 `Browser` 一起销毁。
pub struct ChromeCapturer {
    config: BrowserConfig,
}

impl ChromeCapturer {
    pub fn new(config: BrowserConfig) -> Self {
        info!("Initialized chrome capturer: {}", config);
        Self { config }
    }

    fn capture_blocking(config: &BrowserConfig, url: &str) -> Result<Vec<u8>, CaptureError> {
        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .build()
            .map_err(|e| CaptureError::Launch(e.to_string()))?;

        let browser = Browser::new(launch_options).map_err(|e| CaptureError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| CaptureError::Launch(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(config.timeout_secs));

        debug!("Navigating to {}", url);
        tab.navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| CaptureError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Self::wait_for_network_idle(&tab, url, config)?;

        let (width, height) = Self::page_size(&tab, config)?;
        debug!("Full page size for {}: {}x{}", url, width, height);

        let screenshot = tab
            .call_method(full_page_request(width, height))
            .map_err(|e| CaptureError::Screenshot(format!("CDP capture failed: {}", e)))?;
        decode_png(&screenshot.data)
    }

    /// 等待 `readyState == "complete"` 且资源请求数在 `network_idle_ms` 内不再变化
    fn wait_for_network_idle(
        tab: &Tab,
        url: &str,
        config: &BrowserConfig,
    ) -> Result<(), CaptureError> {
        let deadline = Instant::now() + Duration::from_secs(config.timeout_secs);
        let idle = Duration::from_millis(config.network_idle_ms);

        let mut last_count: Option<u64> = None;
        let mut stable_since = Instant::now();

        loop {
            let ready = Self::evaluate(tab, READY_STATE_JS)?.as_str() == Some("complete");
            let count = Self::evaluate(tab, RESOURCE_COUNT_JS)?
                .as_f64()
                .map(|n| n as u64);

            if !ready || count != last_count {
                last_count = count;
                stable_since = Instant::now();
            } else if stable_since.elapsed() >= idle {
                debug!("Network idle for {} ({:?} resources)", url, count);
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(CaptureError::Timeout {
                    url: url.to_string(),
                    secs: config.timeout_secs,
                });
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn page_size(tab: &Tab, config: &BrowserConfig) -> Result<(f64, f64), CaptureError> {
        let width = Self::evaluate(tab, PAGE_WIDTH_JS)?
            .as_f64()
            .filter(|w| *w >= 1.0)
            .unwrap_or(f64::from(config.window_width));
        let height = Self::evaluate(tab, PAGE_HEIGHT_JS)?
            .as_f64()
            .filter(|h| *h >= 1.0)
            .unwrap_or(f64::from(config.window_height));
        Ok((width, height))
    }

    fn evaluate(tab: &Tab, script: &str) -> Result<Value, CaptureError> {
        let result = tab
            .evaluate(script, false)
            .map_err(|e| CaptureError::Evaluate(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }
}

/// 整页截图请求
///
/// `Tab::capture_screenshot` 不设置 `capture_beyond_viewport`,新版 headless 模式下
/// 视口以外的区域不会被绘制,因此直接构造 CDP 请求。
fn full_page_request(width: f64, height: f64) -> Page::CaptureScreenshot {
    Page::CaptureScreenshot {
        format: Some(CaptureScreenshotFormatOption::Png),
        quality: None,
        clip: Some(Viewport {
            x: 0.0,
            y: 0.0,
            width,
            height,
            scale: 1.0,
        }),
        from_surface: Some(true),
        capture_beyond_viewport: Some(true),
        optimize_for_speed: None,
    }
}

fn decode_png(data: &str) -> Result<Vec<u8>, CaptureError> {
    BASE64_STANDARD
        .decode(data)
        .map_err(|e| CaptureError::Screenshot(format!("invalid base64 screenshot data: {}", e)))
}

/// 截图先写入临时文件再改名,失败时不会留下半截的 `dest`
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl PageCapturer for ChromeCapturer {
    async fn capture(&self, url: &str, dest: &Path) -> Result<(), CaptureError> {
        info!("Capturing {} -> {}", url, dest.display());

        let config = self.config.clone();
        let owned_url = url.to_string();
        let png =
            tokio::task::spawn_blocking(move || Self::capture_blocking(&config, &owned_url))
                .await??;

        let partial = partial_path(dest);
        tokio::fs::write(&partial, &png).await?;
        tokio::fs::rename(&partial, dest).await?;

        info!("Captured {} ({} bytes)", dest.display(), png.len());
        Ok(())
    }
}
