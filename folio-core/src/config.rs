//! Process-scoped configuration.
//!
//! Two documents live under the platform config directory:
//! - `config.toml`: tunable viewport constants ([`ViewerConfig`]), read once at startup.
//! - `settings.json`: the flat key-value settings document ([`Settings`]), loaded at startup
//!   and written back at shutdown.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::geometry::Size;
use crate::print_fit::A4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Horizontal offset of every page and vertical offset of the first one.
    pub margin: f32,
    /// Vertical gap between consecutive pages; also trails the last page.
    pub spacing: f32,
    /// Top-edge delta above which reconstructed text starts a new line.
    pub newline_threshold: f32,
    pub zoom_step: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Output size used by print preparation, in points.
    pub print_target: Size,
    /// How many decoded page rasters are kept around the current page.
    pub raster_capacity: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            margin: 20.0,
            spacing: 20.0,
            newline_threshold: 5.0,
            zoom_step: 1.2,
            min_scale: 0.2,
            max_scale: 5.0,
            print_target: A4,
            raster_capacity: 12,
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to decode config file {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("invalid config file {:?}", path))?;
        Ok(config)
    }

    /// Rejects values that would break the layout: pages must stack with strictly increasing
    /// tops and the scale range must be non-empty.
    pub fn validate(&self) -> Result<()> {
        let non_negative = |name: &str, value: f32| -> Result<()> {
            if !value.is_finite() || value < 0.0 {
                bail!("{name} must be a non-negative number, got {value}");
            }
            Ok(())
        };
        non_negative("margin", self.margin)?;
        non_negative("spacing", self.spacing)?;
        non_negative("newline_threshold", self.newline_threshold)?;

        if !self.zoom_step.is_finite() || self.zoom_step <= 1.0 {
            bail!("zoom_step must be greater than 1, got {}", self.zoom_step);
        }
        if !(self.min_scale.is_finite() && self.max_scale.is_finite())
            || self.min_scale < 0.0
            || self.min_scale >= self.max_scale
        {
            bail!(
                "scale range ({}, {}) is empty",
                self.min_scale,
                self.max_scale
            );
        }
        let target = self.print_target;
        if !(target.width.is_finite() && target.height.is_finite())
            || target.width <= 0.0
            || target.height <= 0.0
        {
            bail!("print_target must have a positive size");
        }
        if self.raster_capacity == 0 {
            bail!("raster_capacity must be at least 1");
        }
        Ok(())
    }

    /// Exclusive bounds: both limits themselves are rejected.
    pub fn accepts_scale(&self, scale: f32) -> bool {
        scale.is_finite() && scale > self.min_scale && scale < self.max_scale
    }
}

/// Platform locations of the configuration documents and the log directory.
#[derive(Debug, Clone)]
pub struct AppDirs {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppDirs {
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("org", "folio", "folio")
            .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_local_dir().to_path_buf(),
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    #[default]
    Normal,
    Zoomed,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub auto_check: bool,
    pub auto_download: bool,
    pub last_check: Option<String>,
    pub window_geometry: Option<String>,
    pub window_state: WindowState,
    pub theme: Theme,
    /// Unknown keys are carried through untouched so older and newer builds can share a file.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_check: true,
            auto_download: false,
            last_check: None,
            window_geometry: None,
            window_state: WindowState::Normal,
            theme: Theme::Light,
            extra: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn dark_mode(&self) -> bool {
        self.theme == Theme::Dark
    }
}

pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Option<Settings>>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create settings directory at {:?}", root))?;
        Ok(Self {
            path: root.join("settings.json"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Option<Settings>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.path)
            .with_context(|| format!("failed to open settings file {:?}", self.path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let settings = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode settings file {:?}", self.path))?;
        Ok(Some(settings))
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(settings)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp settings file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    inner: Mutex<Option<Settings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Option<Settings>> {
        Ok(self.inner.lock().clone())
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        *self.inner.lock() = Some(settings.clone());
        Ok(())
    }
}
