use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdfslice";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Unscaled gap between pages, in pixels
    #[serde(default = "default_page_spacing")]
    pub page_spacing: i32,

    #[serde(default = "default_min_zoom")]
    pub min_zoom: f32,

    #[serde(default = "default_max_zoom")]
    pub max_zoom: f32,

    #[serde(default = "default_render_debounce_ms")]
    pub render_debounce_ms: u64,

    /// External layout reports are ignored this long after a local gesture
    #[serde(default = "default_layout_sync_quiet_ms")]
    pub layout_sync_quiet_ms: u64,

    /// BGRA color written under transparent composite pixels on export
    #[serde(default = "default_background")]
    pub background: u32,

    /// Warn once the buffer pool holds more than this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buffer_mb: Option<u64>,

    #[serde(default = "default_base_page_cache")]
    pub base_page_cache: usize,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_page_spacing() -> i32 {
    8
}

fn default_min_zoom() -> f32 {
    1.0
}

fn default_max_zoom() -> f32 {
    5.0
}

fn default_render_debounce_ms() -> u64 {
    75
}

fn default_layout_sync_quiet_ms() -> u64 {
    200
}

fn default_background() -> u32 {
    0xFFFF_FFFF
}

fn default_base_page_cache() -> usize {
    8
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            page_spacing: default_page_spacing(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            render_debounce_ms: default_render_debounce_ms(),
            layout_sync_quiet_ms: default_layout_sync_quiet_ms(),
            background: default_background(),
            max_buffer_mb: None,
            base_page_cache: default_base_page_cache(),
        }
    }
}

impl Settings {
    /// Zoom limits in ascending order, never below 1.
    #[must_use]
    pub fn zoom_limits(&self) -> (f32, f32) {
        let min = if self.min_zoom.is_finite() {
            self.min_zoom.max(1.0)
        } else {
            default_min_zoom()
        };
        let max = if self.max_zoom.is_finite() {
            self.max_zoom.max(min)
        } else {
            default_max_zoom().max(min)
        };
        (min, max)
    }
}

#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Loads settings from `path`, or from the default location.
///
/// A missing file is created with defaults. Unreadable or invalid files are
/// logged and defaults are used.
#[must_use]
pub fn load_settings(path: Option<&Path>) -> Settings {
    match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => load_settings_from_path(&path),
        None => {
            warn!("Could not determine config directory, using default settings");
            Settings::default()
        }
    }
}

#[must_use]
pub fn load_settings_from_path(path: &Path) -> Settings {
    if !path.exists() {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        if let Err(e) = save_settings_to_path(&settings, path) {
            error!("Failed to save settings to {path:?}: {e}");
        }
        return settings;
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            return Settings::default();
        }
    };

    match serde_yaml::from_str::<Settings>(&content) {
        Ok(mut settings) => {
            debug!("Loaded settings from {path:?}");
            if settings.version < CURRENT_VERSION {
                migrate_settings(&mut settings);
                if let Err(e) = save_settings_to_path(&settings, path) {
                    error!("Failed to save migrated settings to {path:?}: {e}");
                }
            }
            settings
        }
        Err(e) => {
            error!("Failed to parse settings file {path:?}: {e}");
            Settings::default()
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_path(settings: &Settings, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, generate_settings_yaml(settings))?;
    debug!("Saved settings to {path:?}");
    Ok(())
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str("\n# Layout\n");
    content.push_str(&format!("page_spacing: {}\n", settings.page_spacing));
    content.push_str(&format!("min_zoom: {:?}\n", settings.min_zoom));
    content.push_str(&format!("max_zoom: {:?}\n", settings.max_zoom));
    content.push_str("\n# Timing (milliseconds)\n");
    content.push_str(&format!(
        "render_debounce_ms: {}\n",
        settings.render_debounce_ms
    ));
    content.push_str(&format!(
        "layout_sync_quiet_ms: {}\n",
        settings.layout_sync_quiet_ms
    ));
    content.push_str("\n# Memory\n");
    content.push_str(&format!("background: 0x{:08X}\n", settings.background));
    match settings.max_buffer_mb {
        Some(mb) => content.push_str(&format!("max_buffer_mb: {mb}\n")),
        None => content.push_str("# max_buffer_mb: 512\n"),
    }
    content.push_str(&format!("base_page_cache: {}\n", settings.base_page_cache));

    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let settings = load_settings_from_path(&path);
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
        assert_eq!(load_settings_from_path(&path), Settings::default());
    }

    #[test]
    fn round_trips_custom_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let settings = Settings {
            page_spacing: 24,
            max_zoom: 3.5,
            render_debounce_ms: 50,
            background: 0xFF10_2030,
            max_buffer_mb: Some(256),
            ..Settings::default()
        };

        save_settings_to_path(&settings, &path).unwrap();
        assert_eq!(load_settings_from_path(&path), settings);
    }

    #[test]
    fn partial_file_uses_defaults_for_the_rest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 1\npage_spacing: 0\n").unwrap();

        let settings = load_settings_from_path(&path);
        assert_eq!(settings.page_spacing, 0);
        assert_eq!(settings.render_debounce_ms, 75);
        assert_eq!(settings.layout_sync_quiet_ms, 200);
    }

    #[test]
    fn invalid_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "page_spacing: [not a number").unwrap();

        assert_eq!(load_settings_from_path(&path), Settings::default());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "page_spacing: [not a number"
        );
    }

    #[test]
    fn old_version_is_migrated_and_saved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 0\n").unwrap();

        assert_eq!(load_settings_from_path(&path).version, CURRENT_VERSION);
        assert!(fs::read_to_string(&path)
            .unwrap()
            .starts_with(&format!("version: {CURRENT_VERSION}")));
    }

    #[test]
    fn zoom_limits_are_ordered() {
        let settings = Settings {
            min_zoom: 0.5,
            max_zoom: f32::NAN,
            ..Settings::default()
        };
        assert_eq!(settings.zoom_limits(), (1.0, 5.0));

        let settings = Settings {
            min_zoom: 4.0,
            max_zoom: 2.0,
            ..Settings::default()
        };
        assert_eq!(settings.zoom_limits(), (4.0, 4.0));
    }
}
