use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 单个目标在截图目录中的三个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub previous: PathBuf,
    pub current: PathBuf,
    pub diff: PathBuf,
}

impl SnapshotPaths {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            previous: dir.join(format!("{}_prev.png", name)),
            current: dir.join(format!("{}_curr.png", name)),
            diff: dir.join(format!("{}_diff_highlighted.png", name)),
        }
    }

    /// 把上一次的 current 移为 previous,覆盖更早的 previous
    ///
    /// 必须在截图之前调用,截图失败时留下有效的 previous 且没有 current。
    pub fn rotate(&self) -> io::Result<bool> {
        if !self.current.try_exists()? {
            return Ok(false);
        }
        fs::rename(&self.current, &self.previous)?;
        debug!(
            "Rotated {} -> {}",
            self.current.display(),
            self.previous.display()
        );
        Ok(true)
    }

    pub fn diff_file_name(&self) -> String {
        self.diff
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = SnapshotPaths::new(Path::new("screenshots"), "techponder");
        assert_eq!(paths.previous, PathBuf::from("screenshots/techponder_prev.png"));
        assert_eq!(paths.current, PathBuf::from("screenshots/techponder_curr.png"));
        assert_eq!(
            paths.diff,
            PathBuf::from("screenshots/techponder_diff_highlighted.png")
        );
        assert_eq!(paths.diff_file_name(), "techponder_diff_highlighted.png");
    }

    #[test]
    fn test_rotate_without_current() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path(), "site");
        fs::write(&paths.previous, b"old").unwrap();

        assert!(!paths.rotate().unwrap());
        assert_eq!(fs::read(&paths.previous).unwrap(), b"old");
    }

    #[test]
    fn test_rotate_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path(), "site");
        fs::write(&paths.previous, b"oldest").unwrap();
        fs::write(&paths.current, b"newer").unwrap();

        assert!(paths.rotate().unwrap());
        assert_eq!(fs::read(&paths.previous).unwrap(), b"newer");
        assert!(!paths.current.exists());
    }
}
