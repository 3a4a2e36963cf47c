use chrono::Utc;
use std::fs;
use std::io;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureError, PageCapturer};
use crate::config::TargetConfig;
use crate::diff::{Annotator, DiffError, compute_difference, load_snapshot};
use crate::event::{NotificationStatus, RunOutcome, RunReport};
use crate::monitor::SnapshotPaths;
use crate::notify::{AlertMessage, Notifier};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Image(#[from] DiffError),

    #[error("snapshot io error: {0}")]
    Io(#[from] io::Error),
}

/// 单个目标的一次完整运行: 轮换 → 截图 → 比较 → (有变化时)标注 + 通知
///
/// 两次运行之间不保留内存状态,所需状态只有磁盘上的两张快照。
/// 同一目标同时只能有一个运行,由外部调度保证。
pub struct Orchestrator {
    target: TargetConfig,
    paths: SnapshotPaths,
    capturer: Box<dyn PageCapturer>,
    notifier: Option<Box<dyn Notifier>>,
    annotator: Annotator,
}

impl Orchestrator {
    pub fn new(
        target: TargetConfig,
        capturer: Box<dyn PageCapturer>,
        notifier: Option<Box<dyn Notifier>>,
        annotator: Annotator,
    ) -> Self {
        let paths = SnapshotPaths::new(&target.screenshot_dir, &target.name);
        info!("Initialized orchestrator: {}", target);
        if notifier.is_none() {
            warn!("Email alerts disabled for {}", target.name);
        }

        Self {
            target,
            paths,
            capturer,
            notifier,
            annotator,
        }
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    pub fn paths(&self) -> &SnapshotPaths {
        &self.paths
    }

    pub async fn run_once(&self) -> Result<RunReport, MonitorError> {
        let started_at = Utc::now();
        info!("Run started for {}", self.target.name);

        fs::create_dir_all(&self.target.screenshot_dir)?;
        self.paths.rotate()?;

        self.capturer
            .capture(&self.target.url, &self.paths.current)
            .await?;

        let outcome = self.compare_and_alert().await?;

        Ok(RunReport::new(
            self.target.name.clone(),
            self.target.url.clone(),
            outcome,
            started_at,
            Utc::now(),
        ))
    }

    async fn compare_and_alert(&self) -> Result<RunOutcome, MonitorError> {
        let Some(previous) = load_snapshot(&self.paths.previous)? else {
            info!("No previous snapshot for {}, nothing to compare", self.target.name);
            return Ok(RunOutcome::FirstCapture);
        };
        let Some(current) = load_snapshot(&self.paths.current)? else {
            warn!(
                "Current snapshot {} missing after capture, treating as first run",
                self.paths.current.display()
            );
            return Ok(RunOutcome::FirstCapture);
        };

        let result = compute_difference(&previous, &current);
        debug!(
            "Compared {} with {}: changed={}",
            self.paths.previous.display(),
            self.paths.current.display(),
            result.changed()
        );
        let Some(bounding_box) = result.bounding_box else {
            info!("No change detected for {}", self.target.name);
            return Ok(RunOutcome::Unchanged);
        };

        if result.dimensions_changed {
            warn!(
                "Page dimensions changed for {}, marking whole page",
                self.target.name
            );
        }
        info!(
            "Change detected for {}: {} pixels within {}",
            self.target.name, result.changed_pixels, bounding_box
        );

        self.annotator
            .write(&current, &bounding_box, &self.paths.diff)?;

        Ok(RunOutcome::Changed {
            diff_path: self.paths.diff.clone(),
            bounding_box,
            notification: self.notify().await,
        })
    }

    /// 发送失败只记录,不重试,也不回滚已写入的差异图
    async fn notify(&self) -> NotificationStatus {
        let Some(notifier) = &self.notifier else {
            return NotificationStatus::Disabled;
        };

        let message =
            AlertMessage::change_detected(&self.target.url, &self.paths.diff_file_name());
        match notifier.send(&message).await {
            Ok(()) => NotificationStatus::Sent,
            Err(e) => {
                error!("Failed to send alert for {}: {}", self.target.name, e);
                NotificationStatus::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::BoundingBox;
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const URL: &str = "https://example.com";
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    /// 依次"渲染"预设的图片,`None` 表示本次截图失败
    struct ScriptedCapturer {
        frames: Mutex<VecDeque<Option<RgbaImage>>>,
    }

    impl ScriptedCapturer {
        fn new(frames: Vec<Option<RgbaImage>>) -> Self {
            Self {
                frames: Mutex::new(frames.into()),
            }
        }
    }

    #[async_trait]
    impl PageCapturer for ScriptedCapturer {
        async fn capture(&self, url: &str, dest: &Path) -> Result<(), CaptureError> {
            let frame = self.frames.lock().unwrap().pop_front().flatten();
            match frame {
                Some(img) => {
                    img.save(dest).unwrap();
                    Ok(())
                }
                None => Err(CaptureError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_REFUSED".to_string(),
                }),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<AlertMessage>>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                Err(NotifyError::Rejected {
                    status: 400,
                    body: "invalid sender".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn white() -> RgbaImage {
        RgbaImage::from_pixel(300, 200, WHITE)
    }

    fn red_square() -> RgbaImage {
        let mut img = white();
        for y in 0..50 {
            for x in 0..50 {
                img.put_pixel(x, y, RED);
            }
        }
        img
    }

    fn orchestrator(
        dir: &TempDir,
        frames: Vec<Option<RgbaImage>>,
        notifier: Option<RecordingNotifier>,
    ) -> Orchestrator {
        let target = TargetConfig {
            url: URL.to_string(),
            name: "site".to_string(),
            screenshot_dir: dir.path().join("shots"),
        };
        Orchestrator::new(
            target,
            Box::new(ScriptedCapturer::new(frames)),
            notifier.map(|n| Box::new(n) as Box<dyn Notifier>),
            Annotator::default(),
        )
    }

    #[tokio::test]
    async fn test_first_run_captures_without_compare() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::default();
        let orch = orchestrator(&dir, vec![Some(white())], Some(notifier.clone()));

        let report = orch.run_once().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::FirstCapture);
        assert!(report.to_string().starts_with("First screenshot captured"));
        assert!(orch.paths().current.exists());
        assert!(!orch.paths().previous.exists());
        assert!(!orch.paths().diff.exists());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identical_snapshots_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::default();
        let orch = orchestrator(
            &dir,
            vec![Some(white()), Some(white())],
            Some(notifier.clone()),
        );

        orch.run_once().await.unwrap();
        let report = orch.run_once().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Unchanged);
        assert!(report.to_string().starts_with("No change detected"));
        assert!(orch.paths().previous.exists());
        assert!(!orch.paths().diff.exists());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_red_square_is_highlighted_and_notified() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::default();
        let orch = orchestrator(
            &dir,
            vec![Some(white()), Some(red_square())],
            Some(notifier.clone()),
        );

        orch.run_once().await.unwrap();
        let report = orch.run_once().await.unwrap();

        match &report.outcome {
            RunOutcome::Changed {
                diff_path,
                bounding_box,
                notification,
            } => {
                assert_eq!(*bounding_box, BoundingBox::new(0, 0, 50, 50));
                assert_eq!(*notification, NotificationStatus::Sent);
                assert_eq!(diff_path, &orch.paths().diff);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let diff = image::open(&orch.paths().diff).unwrap().to_rgba8();
        assert_eq!(diff.dimensions(), (300, 200));
        // 标签画在框外的白色区域
        let label_pixels = (0..16)
            .flat_map(|y| (50..300).map(move |x| (x, y)))
            .filter(|&(x, y)| diff.get_pixel(x, y) == &RED)
            .count();
        assert!(label_pixels > 0);
        assert_eq!(diff.get_pixel(150, 150), &WHITE);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, format!("Change Detected on {}", URL));
        assert!(sent[0].html_body.contains("site_diff_highlighted.png"));
    }

    #[tokio::test]
    async fn test_notify_failure_keeps_diff_image() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let orch = orchestrator(
            &dir,
            vec![Some(white()), Some(red_square())],
            Some(notifier.clone()),
        );

        orch.run_once().await.unwrap();
        let report = orch.run_once().await.unwrap();

        match &report.outcome {
            RunOutcome::Changed { notification, .. } => {
                assert!(matches!(notification, NotificationStatus::Failed(reason) if reason.contains("400")));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(orch.paths().diff.exists());
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert!(report.to_string().contains("Failed to send email"));
    }

    #[tokio::test]
    async fn test_capture_failure_leaves_previous_only() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            vec![Some(white()), None, Some(red_square())],
            None,
        );

        orch.run_once().await.unwrap();
        let err = orch.run_once().await.unwrap_err();
        assert!(matches!(err, MonitorError::Capture(_)));
        assert!(orch.paths().previous.exists());
        assert!(!orch.paths().current.exists());

        // 下一次运行与保留下来的 previous 比较
        let report = orch.run_once().await.unwrap();
        match report.outcome {
            RunOutcome::Changed { notification, .. } => {
                assert_eq!(notification, NotificationStatus::Disabled)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dimension_change_marks_whole_page() {
        let dir = tempfile::tempdir().unwrap();
        let taller = RgbaImage::from_pixel(300, 260, WHITE);
        let orch = orchestrator(&dir, vec![Some(white()), Some(taller)], None);

        orch.run_once().await.unwrap();
        let report = orch.run_once().await.unwrap();

        match report.outcome {
            RunOutcome::Changed { bounding_box, .. } => {
                assert_eq!(bounding_box, BoundingBox::new(0, 0, 300, 260));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_corrupt_previous_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir, vec![Some(white())], None);
        fs::create_dir_all(dir.path().join("shots")).unwrap();
        fs::write(&orch.paths().current, b"garbage").unwrap();

        let err = orch.run_once().await.unwrap_err();
        assert!(matches!(err, MonitorError::Image(_)));
    }
}
