//! INI configuration file.
//!
//! Settings live in `<config_dir>/globeview/config.ini`:
//!
//! ```ini
//! [provider]
//! url_template = https://{s}.tiles.example.com/{z}/{x}/{y}.png
//! subdomains = a,b,c
//! scheme = mercator
//! min_zoom = 0
//! max_zoom = 19
//! timeout_secs = 30
//! user_agent = globeview/0.3.0
//!
//! [viewport]
//! radius = 6371008.8
//! fov_degrees = 45
//! tile_size = 256
//! viewport_height_px = 800
//!
//! [loader]
//! prefetch_margin = 1
//! probe_children = true
//! resample = true
//! ```
//!
//! A missing file yields defaults. Missing keys keep their default value.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::cache::CacheConfig;
use crate::coord::Projection;
use crate::loader::{LoaderConfig, DEFAULT_PREFETCH_MARGIN};
use crate::provider::TemplateConfig;
use crate::viewport::ViewportGeometry;

const APP_DIR: &str = "globeview";
const CONFIG_FILE: &str = "config.ini";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid value for {section}.{key}: '{value}'")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Path of the config file: `<config_dir>/globeview/config.ini`.
///
/// Falls back to the working directory when the platform has no config dir.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// `[loader]` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    pub prefetch_margin: u32,
    pub probe_children: bool,
    pub resample: bool,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            prefetch_margin: DEFAULT_PREFETCH_MARGIN,
            probe_children: cache.probe_children,
            resample: cache.resample,
        }
    }
}

/// Contents of the config file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub provider: TemplateConfig,
    /// Scheme the provider's tile rows are laid out in
    pub scheme: Projection,
    pub viewport: ViewportGeometry,
    pub loader: LoaderSettings,
}

impl ConfigFile {
    /// Loads from the default path, or returns defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Loads from `path`. Keys that are absent keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(io) => ConfigError::Io(io),
            ini::Error::Parse(parse) => ConfigError::Parse(parse.to_string()),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|props| props.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Saves to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Writes every key to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini.write_to_file(path)?;
        Ok(())
    }

    /// Validated provider settings.
    pub fn template_config(&self) -> Result<TemplateConfig, ConfigError> {
        self.provider
            .validate()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(self.provider.clone())
    }

    /// Validated viewport geometry.
    pub fn viewport_geometry(&self) -> Result<ViewportGeometry, ConfigError> {
        self.viewport
            .validate()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(self.viewport)
    }

    /// Cache settings for tiles served in `scheme`, which may differ from the
    /// configured one when a caller overrides it.
    pub fn cache_config(&self, scheme: Projection) -> CacheConfig {
        CacheConfig {
            // Only Mercator rows need respacing
            resample: self.loader.resample && scheme == Projection::Mercator,
            probe_children: self.loader.probe_children,
            tile_size: self.viewport.tile_size,
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            prefetch_margin: self.loader.prefetch_margin,
            min_zoom: self.provider.min_zoom,
            max_zoom: self.provider.max_zoom,
        }
    }
}

/// A single `section.key` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ProviderUrlTemplate,
    ProviderSubdomains,
    ProviderScheme,
    ProviderMinZoom,
    ProviderMaxZoom,
    ProviderTimeoutSecs,
    ProviderUserAgent,
    ViewportRadius,
    ViewportFovDegrees,
    ViewportTileSize,
    ViewportHeightPx,
    LoaderPrefetchMargin,
    LoaderProbeChildren,
    LoaderResample,
}

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            ProviderUrlTemplate,
            ProviderSubdomains,
            ProviderScheme,
            ProviderMinZoom,
            ProviderMaxZoom,
            ProviderTimeoutSecs,
            ProviderUserAgent,
            ViewportRadius,
            ViewportFovDegrees,
            ViewportTileSize,
            ViewportHeightPx,
            LoaderPrefetchMargin,
            LoaderProbeChildren,
            LoaderResample,
        ]
    }

    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            ProviderUrlTemplate | ProviderSubdomains | ProviderScheme | ProviderMinZoom
            | ProviderMaxZoom | ProviderTimeoutSecs | ProviderUserAgent => "provider",
            ViewportRadius | ViewportFovDegrees | ViewportTileSize | ViewportHeightPx => {
                "viewport"
            }
            LoaderPrefetchMargin | LoaderProbeChildren | LoaderResample => "loader",
        }
    }

    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            ProviderUrlTemplate => "url_template",
            ProviderSubdomains => "subdomains",
            ProviderScheme => "scheme",
            ProviderMinZoom => "min_zoom",
            ProviderMaxZoom => "max_zoom",
            ProviderTimeoutSecs => "timeout_secs",
            ProviderUserAgent => "user_agent",
            ViewportRadius => "radius",
            ViewportFovDegrees => "fov_degrees",
            ViewportTileSize => "tile_size",
            ViewportHeightPx => "viewport_height_px",
            LoaderPrefetchMargin => "prefetch_margin",
            LoaderProbeChildren => "probe_children",
            LoaderResample => "resample",
        }
    }

    /// `section.key` form.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as written to the file.
    pub fn get(&self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        match self {
            ProviderUrlTemplate => config.provider.url_template.clone(),
            ProviderSubdomains => config.provider.subdomains.join(","),
            ProviderScheme => config.scheme.to_string(),
            ProviderMinZoom => config.provider.min_zoom.to_string(),
            ProviderMaxZoom => config.provider.max_zoom.to_string(),
            ProviderTimeoutSecs => config.provider.timeout_secs.to_string(),
            ProviderUserAgent => config.provider.user_agent.clone(),
            ViewportRadius => config.viewport.radius.to_string(),
            ViewportFovDegrees => config.viewport.fov_degrees.to_string(),
            ViewportTileSize => config.viewport.tile_size.to_string(),
            ViewportHeightPx => config.viewport.viewport_height_px.to_string(),
            LoaderPrefetchMargin => config.loader.prefetch_margin.to_string(),
            LoaderProbeChildren => config.loader.probe_children.to_string(),
            LoaderResample => config.loader.resample.to_string(),
        }
    }

    /// Parses `value` and stores it.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        use ConfigKey::*;
        let value = value.trim();
        match self {
            ProviderUrlTemplate => config.provider.url_template = value.to_string(),
            ProviderSubdomains => {
                config.provider.subdomains = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            }
            ProviderScheme => config.scheme = self.parse(value)?,
            ProviderMinZoom => config.provider.min_zoom = self.parse(value)?,
            ProviderMaxZoom => config.provider.max_zoom = self.parse(value)?,
            ProviderTimeoutSecs => config.provider.timeout_secs = self.parse(value)?,
            ProviderUserAgent => config.provider.user_agent = value.to_string(),
            ViewportRadius => config.viewport.radius = self.parse_positive(value)?,
            ViewportFovDegrees => config.viewport.fov_degrees = self.parse_positive(value)?,
            ViewportTileSize => config.viewport.tile_size = self.parse_nonzero(value)?,
            ViewportHeightPx => config.viewport.viewport_height_px = self.parse_nonzero(value)?,
            LoaderPrefetchMargin => config.loader.prefetch_margin = self.parse(value)?,
            LoaderProbeChildren => config.loader.probe_children = self.parse_bool(value)?,
            LoaderResample => config.loader.resample = self.parse_bool(value)?,
        }
        Ok(())
    }

    fn invalid(&self, value: &str) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.section(),
            key: self.key_name(),
            value: value.to_string(),
        }
    }

    fn parse<T: FromStr>(&self, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| self.invalid(value))
    }

    fn parse_positive(&self, value: &str) -> Result<f64, ConfigError> {
        let v: f64 = self.parse(value)?;
        if v.is_finite() && v > 0.0 {
            Ok(v)
        } else {
            Err(self.invalid(value))
        }
    }

    fn parse_nonzero(&self, value: &str) -> Result<u32, ConfigError> {
        match self.parse::<u32>(value)? {
            0 => Err(self.invalid(value)),
            v => Ok(v),
        }
    }

    fn parse_bool(&self, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(self.invalid(value)),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (section, key) = s
            .split_once('.')
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))?;
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.section() == section && k.key_name() == key)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}
