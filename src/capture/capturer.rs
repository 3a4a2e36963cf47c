use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("failed to navigate to {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("page {url} did not settle within {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("javascript evaluation failed: {0}")]
    Evaluate(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// 将网页完整渲染为图片文件
///
/// 失败时不得在 `dest` 留下文件。
#[async_trait]
pub trait PageCapturer: Send + Sync {
    async fn capture(&self, url: &str, dest: &Path) -> Result<(), CaptureError>;
}
