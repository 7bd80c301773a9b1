use std::path::PathBuf;
use std::sync::OnceLock;

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Name of the per-user application directory.
const APP_DIR_NAME: &str = "hudsync";

/// Returns the directory containing the executable.
fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the application data directory: `<data_dir>/hudsync/`.
///
/// Falls back to the executable directory when the platform has no data dir.
pub fn get_data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(|| {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(exe_dir)
    })
}

/// Returns the region store file: `<data_dir>/rois.json`
pub fn get_regions_path() -> PathBuf {
    get_data_dir().join("rois.json")
}

/// Returns the region visibility file: `<data_dir>/roi-visibility.json`
pub fn get_visibility_path() -> PathBuf {
    get_data_dir().join("roi-visibility.json")
}

/// Returns the control panel layout file: `<data_dir>/hud-layout.json`
pub fn get_panel_layout_path() -> PathBuf {
    get_data_dir().join("hud-layout.json")
}

/// Returns the configuration file: `<data_dir>/config.json`
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Returns the logs directory: `<data_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_data_dir().join("logs")
}

/// Returns the OCR crop dump directory: `<data_dir>/ocr_debug/`
pub fn get_ocr_debug_dir() -> PathBuf {
    get_data_dir().join("ocr_debug")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_data_dir())?;
    std::fs::create_dir_all(get_logs_dir())?;
    Ok(())
}
