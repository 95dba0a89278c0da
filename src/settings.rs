use log::{LevelFilter, debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::anchor::HighlightStyle;
use crate::comments::DEFAULT_STORAGE_KEY;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
pub const APP_NAME: &str = "marginalia";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Key under which each origin's comments are stored.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub highlight: HighlightSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightSettings {
    #[serde(default = "default_class_name")]
    pub class_name: String,
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,
    #[serde(default = "default_indicator_class")]
    pub indicator_class: String,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_border")]
    pub border: String,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_class_name() -> String {
    HighlightStyle::default().class_name
}

fn default_id_attribute() -> String {
    HighlightStyle::default().id_attribute
}

fn default_indicator_class() -> String {
    HighlightStyle::default().indicator_class
}

fn default_background() -> String {
    HighlightStyle::default().background
}

fn default_border() -> String {
    HighlightStyle::default().border
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            storage_key: default_storage_key(),
            storage_dir: None,
            log_level: default_log_level(),
            highlight: HighlightSettings::default(),
        }
    }
}

impl Default for HighlightSettings {
    fn default() -> Self {
        let style = HighlightStyle::default();
        Self {
            class_name: style.class_name,
            id_attribute: style.id_attribute,
            indicator_class: style.indicator_class,
            background: style.background,
            border: style.border,
        }
    }
}

impl Settings {
    pub fn highlight_style(&self) -> HighlightStyle {
        let highlight = self.highlight.clone();
        HighlightStyle {
            class_name: highlight.class_name,
            id_attribute: highlight.id_attribute,
            indicator_class: highlight.indicator_class,
            background: highlight.background,
            border: highlight.border,
        }
    }

    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            LevelFilter::Info
        })
    }
}

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Loads settings from `explicit_path`, or from the user config directory.
///
/// Never fails: unreadable or invalid files are logged and defaults are used.
/// A missing default config file is created with default values.
pub fn load_settings(explicit_path: Option<&Path>) -> Settings {
    if let Some(path) = explicit_path {
        return load_settings_from_path(path);
    }

    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return Settings::default();
    };
    if path.exists() {
        load_settings_from_path(&path)
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        save_settings_to_file(&settings, &path);
        settings
    }
}

pub fn load_settings_from_path(path: &Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");
                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }
                settings
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
                Settings::default()
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
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

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let body = match serde_yaml::to_string(settings) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };

    match fs::write(path, format!("{SETTINGS_HEADER}{body}")) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

const SETTINGS_HEADER: &str = r#"# marginalia settings
#
# storage_key      key holding each origin's comment list
# storage_dir      directory for per-origin storage files (optional)
# log_level        off | error | warn | info | debug | trace
# highlight        markup used for highlight wrappers and count badges

"#;
