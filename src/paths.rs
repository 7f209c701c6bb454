//! Default on-disk locations.

use std::path::PathBuf;

const APP_DIR: &str = "gta-detect";

/// Returns the per-user data directory: `<data_local_dir>/gta-detect/`
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Returns the default config file: `<config_dir>/gta-detect/config.json`
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.json")
}

/// Returns the default template directory: `<data_dir>/templates/`
pub fn get_templates_dir() -> PathBuf {
    get_data_dir().join("templates")
}

/// Returns the bundled Tesseract directory: `<data_dir>/tesseract/`
pub fn get_tesseract_dir() -> PathBuf {
    get_data_dir().join("tesseract")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_namespaced() {
        assert!(get_data_dir().ends_with(APP_DIR));
        assert!(get_config_path().ends_with("gta-detect/config.json"));
        assert!(get_templates_dir().starts_with(get_data_dir()));
        assert!(get_tesseract_dir().ends_with("tesseract"));
    }
}
