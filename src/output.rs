// Result documents on disk. These JSON files are the only thing persisted.

use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;

pub const METRICS_FILE: &str = "metrics.json";
pub const ANOMALIES_FILE: &str = "anomalies.json";
pub const QUALITY_FILE: &str = "quality.json";

pub fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}

/// `base/analysis_YYYYMMDD_HHMMSS`, created on disk.
pub fn create_timestamped_dir(base: &Path) -> Result<PathBuf> {
    let dir = base.join(format!("analysis_{}", Local::now().format("%Y%m%d_%H%M%S")));
    ensure_dir(&dir)
}

/// Per-capture directory inside a batch run: `NN_<stem>`, numbered by the
/// capture's position on the command line so equal stems stay apart.
pub fn capture_dir(run_dir: &Path, index: usize, capture: &Path) -> PathBuf {
    let stem = capture
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string());
    run_dir.join(format!("{:02}_{}", index + 1, stem))
}

pub fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value)?)?;
    info!(path = %path.display(), "saved result");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dto::MetricsSnapshot;

    #[test]
    fn test_timestamped_dir() {
        let base = tempfile::tempdir().unwrap();
        let dir = create_timestamped_dir(base.path()).unwrap();
        assert!(dir.is_dir());
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("analysis_"));
        assert_eq!(name.len(), "analysis_".len() + 15);
    }

    #[test]
    fn test_capture_dirs_with_same_stem_differ() {
        let run = Path::new("/out/analysis_20250101_000000");
        let first = capture_dir(run, 0, Path::new("site-a/trace.pcap"));
        let second = capture_dir(run, 1, Path::new("site-b/trace.pcap"));
        assert_ne!(first, second);
        assert_eq!(first, run.join("01_trace"));
        assert_eq!(second, run.join("02_trace"));
        assert_eq!(capture_dir(run, 9, Path::new("/")), run.join("10_capture"));
    }

    #[test]
    fn test_write_json_creates_parents() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("nested").join("run");
        let path = write_json(&dir, METRICS_FILE, &[MetricsSnapshot::NO_DATA]).unwrap();

        let text = fs::read_to_string(path).unwrap();
        let back: Vec<MetricsSnapshot> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, vec![MetricsSnapshot::NO_DATA]);
    }
}
