//! Common types and utilities shared across CLI commands.

use clap::{Args, ValueEnum};
use globeview::config::ConfigFile;
use globeview::coord::{Coordinate, Projection};
use globeview::viewport::{ViewportGeometry, ViewportState};

use crate::error::CliError;

/// Tile scheme selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum SchemeArg {
    /// Web Mercator rows (XYZ tile servers)
    Mercator,
    /// Rows linear in latitude (plate carrée tile servers)
    Equirectangular,
}

impl From<SchemeArg> for Projection {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Mercator => Projection::Mercator,
            SchemeArg::Equirectangular => Projection::Equirectangular,
        }
    }
}

/// Camera arguments shared by `viewport` and `fetch`.
#[derive(Debug, Clone, Args)]
pub struct ViewportArgs {
    /// Longitude of the point under the camera
    #[arg(long, allow_hyphen_values = true)]
    pub lng: f64,

    /// Latitude of the point under the camera
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Fractional zoom level
    #[arg(long, conflicts_with = "distance", required_unless_present = "distance")]
    pub zoom: Option<f64>,

    /// Camera distance from the sphere center, in units of the configured radius
    #[arg(long)]
    pub distance: Option<f64>,

    /// Bearing in degrees clockwise from north
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub bearing: f64,

    /// Pitch in degrees from straight down, in [0, 90)
    #[arg(long, default_value_t = 0.0)]
    pub pitch: f64,

    /// Viewport width / height
    #[arg(long, default_value_t = 1.0)]
    pub aspect: f64,

    /// Tile scheme (defaults to the configured scheme)
    #[arg(long, value_enum)]
    pub scheme: Option<SchemeArg>,
}

impl ViewportArgs {
    /// Scheme from the CLI, falling back to config.
    pub fn projection(&self, config: &ConfigFile) -> Projection {
        self.scheme.map(Projection::from).unwrap_or(config.scheme)
    }

    /// Builds the camera state described by these arguments.
    pub fn state(&self, geometry: ViewportGeometry) -> Result<ViewportState, CliError> {
        let center = Coordinate::new(self.lng, self.lat);
        let mut state = match (self.zoom, self.distance) {
            (Some(zoom), _) => ViewportState::new(geometry, center, zoom)?,
            (None, Some(distance)) => {
                ViewportState::with_distance(geometry, center, distance * geometry.radius)?
            }
            (None, None) => {
                return Err(CliError::Config(
                    "either --zoom or --distance is required".to_string(),
                ))
            }
        };
        state.set_bearing(self.bearing)?;
        state.set_pitch(self.pitch)?;
        state.set_aspect(self.aspect)?;
        Ok(state)
    }
}

/// Loads the config file, reporting parse errors instead of silently
/// falling back to defaults.
pub fn load_config() -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load()?)
}
