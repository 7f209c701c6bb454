use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::paths::get_tesseract_dir;

fn executable_name() -> &'static str {
    if cfg!(windows) { "tesseract.exe" } else { "tesseract" }
}

/// Finds the Tesseract executable: the configured path, then the per-user
/// install directory, then `tesseract` on PATH.
pub fn find_tesseract_executable(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!("Configured Tesseract not found: {}", path.display()));
    }

    let local_exe = get_tesseract_dir().join(executable_name());
    if local_exe.exists() {
        debug!("Using Tesseract at {}", local_exe.display());
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    Err(anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory holding `<language>.traineddata`.
///
/// Returns `None` when nothing explicit is found; Tesseract then uses its
/// compiled-in default.
pub fn find_tessdata_dir(configured: Option<&Path>, language: &str) -> Option<PathBuf> {
    let traineddata = format!("{}.traineddata", language);

    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }

    let local_tessdata = get_tesseract_dir().join("tessdata");
    if local_tessdata.join(&traineddata).exists() {
        return Some(local_tessdata);
    }

    // Check TESSDATA_PREFIX environment variable
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let prefix = PathBuf::from(prefix);
        for candidate in [prefix.clone(), prefix.join("tessdata")] {
            if candidate.join(&traineddata).exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_configured_executable() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("tesseract");
        std::fs::write(&exe, "").unwrap();

        assert_eq!(find_tesseract_executable(Some(&exe)).unwrap(), exe);
        assert!(find_tesseract_executable(Some(&dir.path().join("missing"))).is_err());
    }

    #[test]
    fn test_configured_tessdata_wins() {
        let dir = TempDir::new().unwrap();
        let found = find_tessdata_dir(Some(dir.path()), "eng");
        assert_eq!(found.as_deref(), Some(dir.path()));
    }
}
