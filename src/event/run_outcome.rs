use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

use crate::diff::BoundingBox;

/// 告警邮件的发送结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    Sent,
    Failed(String),
    Disabled,
}

/// 一次运行的终态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// 没有上一张截图,不做比较
    FirstCapture,
    Unchanged,
    Changed {
        diff_path: PathBuf,
        bounding_box: BoundingBox,
        notification: NotificationStatus,
    },
}

impl RunOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, RunOutcome::Changed { .. })
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub target: String,
    pub url: String,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn new(
        target: String,
        url: String,
        outcome: RunOutcome,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            target,
            url,
            outcome,
            started_at,
            finished_at,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            RunOutcome::FirstCapture => write!(f, "First screenshot captured for {}.", self.url),
            RunOutcome::Unchanged => write!(f, "No change detected on {}.", self.url),
            RunOutcome::Changed {
                diff_path,
                bounding_box,
                notification,
            } => {
                writeln!(
                    f,
                    "Change detected on {} at {}: {}",
                    self.url,
                    bounding_box,
                    diff_path.display()
                )?;
                match notification {
                    NotificationStatus::Sent => write!(f, "Email sent."),
                    NotificationStatus::Failed(reason) => {
                        write!(f, "Failed to send email: {}", reason)
                    }
                    NotificationStatus::Disabled => write!(f, "Email alerts disabled."),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: RunOutcome) -> RunReport {
        let now = Utc::now();
        RunReport::new(
            "site".to_string(),
            "https://example.com".to_string(),
            outcome,
            now,
            now,
        )
    }

    #[test]
    fn test_first_capture_line() {
        assert_eq!(
            report(RunOutcome::FirstCapture).to_string(),
            "First screenshot captured for https://example.com."
        );
    }

    #[test]
    fn test_unchanged_line() {
        let r = report(RunOutcome::Unchanged);
        assert_eq!(r.to_string(), "No change detected on https://example.com.");
        assert!(!r.outcome.is_changed());
    }

    #[test]
    fn test_changed_lines() {
        let r = report(RunOutcome::Changed {
            diff_path: PathBuf::from("shots/site_diff_highlighted.png"),
            bounding_box: BoundingBox::new(0, 0, 50, 50),
            notification: NotificationStatus::Failed("email API rejected message: 400 - bad".into()),
        });
        let text = r.to_string();
        assert!(r.outcome.is_changed());
        assert!(text.contains("shots/site_diff_highlighted.png"));
        assert!(text.contains("(0, 0, 50, 50)"));
        assert!(text.ends_with("Failed to send email: email API rejected message: 400 - bad"));
    }

    #[test]
    fn test_report_debug_names_target() {
        let text = format!("{:?}", report(RunOutcome::FirstCapture));
        assert!(text.contains("target: \"site\""));
        assert!(text.contains("FirstCapture"));
    }
}
