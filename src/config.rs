//! Configuration for PolyTouch.
//!
//! Two layers live here: the agent [`Config`] (JSON, persisted under the
//! user's config directory) and the positional [`SessionParams`] file that an
//! experimenter prepares before each session.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the tracking agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the positional session parameter file
    pub params_path: PathBuf,

    /// Directory holding the session channels and stats
    pub data_path: PathBuf,

    /// Period of the short-interval feedback tasks
    #[serde(with = "duration_millis")]
    pub feedback_interval: Duration,

    /// Pointer id reserved for the host pointing device (mouse)
    pub host_pointer_id: u32,

    /// Number of distinct entries kept in the behavioral state log
    pub state_log_capacity: usize,

    /// How the smoothing windows behave before they are full
    pub smoothing_warmup: WarmUp,

    /// Translation from driver coordinates to tracking-surface coordinates
    pub surface_offset: SurfaceOffset,

    /// Output level of a fully muted line, in dB
    pub level_floor_db: f32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("polytouch");

        Self {
            params_path: data_dir.join("session_params.txt"),
            data_path: data_dir,
            feedback_interval: Duration::from_millis(1),
            host_pointer_id: 1,
            state_log_capacity: 10,
            smoothing_warmup: WarmUp::ZeroFilled,
            surface_offset: SurfaceOffset::default(),
            level_floor_db: -80.0,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("polytouch")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }
}

/// Warm-up behavior of the rolling smoothing windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmUp {
    /// Unfilled slots count as zero, so the first ticks are pulled toward
    /// the origin.
    #[default]
    ZeroFilled,
    /// The first sample fills every slot.
    SeedWithFirst,
}

/// Constant translation into the tracking surface's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SurfaceOffset {
    pub dx: f64,
    pub dy: f64,
}

impl SurfaceOffset {
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (x + self.dx, y + self.dy)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Field names of the session parameter file, in file order.
pub const PARAM_FIELDS: [&str; 13] = [
    "subject",
    "protocol",
    "session",
    "session_duration",
    "target_x",
    "target_y",
    "target_radius",
    "pixel_to_cm",
    "tone_amplitude",
    "base_frequency",
    "tone_duration",
    "sample_rate",
    "repeat_period",
];

/// Per-session parameters, consumed positionally from a plain text file.
///
/// The order of values is fixed; see [`PARAM_FIELDS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    pub subject: u32,
    pub protocol: u32,
    pub session: u32,
    /// Session duration in seconds
    pub session_duration: f64,
    pub target_x: f64,
    pub target_y: f64,
    /// Target zone radius, in the same physical unit as relative distance
    pub target_radius: f64,
    /// Centimeters per surface pixel
    pub pixel_to_cm: f64,
    pub tone_amplitude: f64,
    /// Base tone frequency in Hz
    pub base_frequency: f64,
    /// Tone duration in seconds
    pub tone_duration: f64,
    /// Audio sample rate in Hz
    pub sample_rate: f64,
    /// Randomized-protocol repeat period in seconds
    pub repeat_period: f64,
}

/// Errors raised while reading session parameters. All of them are fatal.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("could not read session parameters from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing session parameter `{field}` (position {position})")]
    Missing { field: &'static str, position: usize },
    #[error("invalid value {value:?} for session parameter `{field}`")]
    Invalid { field: &'static str, value: String },
    #[error("session parameter `{field}` out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: &'static str,
    },
}

impl SessionParams {
    /// Read the parameter file, one value per line.
    pub fn load(path: &Path) -> Result<Self, ParamsError> {
        let content = std::fs::read_to_string(path).map_err(|source| ParamsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse parameter text. Blank lines are skipped; values beyond the
    /// thirteenth are ignored.
    pub fn parse(content: &str) -> Result<Self, ParamsError> {
        let values: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        Self::from_positional(&values)
    }

    pub fn from_positional(values: &[&str]) -> Result<Self, ParamsError> {
        let raw = |i: usize| -> Result<&str, ParamsError> {
            values.get(i).copied().ok_or(ParamsError::Missing {
                field: PARAM_FIELDS[i],
                position: i + 1,
            })
        };
        let int = |i: usize| -> Result<u32, ParamsError> {
            let v = raw(i)?;
            v.parse().map_err(|_| ParamsError::Invalid {
                field: PARAM_FIELDS[i],
                value: v.to_string(),
            })
        };
        let float = |i: usize| -> Result<f64, ParamsError> {
            let v = raw(i)?;
            match v.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(f),
                _ => Err(ParamsError::Invalid {
                    field: PARAM_FIELDS[i],
                    value: v.to_string(),
                }),
            }
        };

        let params = Self {
            subject: int(0)?,
            protocol: int(1)?,
            session: int(2)?,
            session_duration: float(3)?,
            target_x: float(4)?,
            target_y: float(5)?,
            target_radius: float(6)?,
            pixel_to_cm: float(7)?,
            tone_amplitude: float(8)?,
            base_frequency: float(9)?,
            tone_duration: float(10)?,
            sample_rate: float(11)?,
            repeat_period: float(12)?,
        };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), ParamsError> {
        let checks: [(bool, &'static str, &'static str); 7] = [
            (self.session_duration > 0.0, "session_duration", "must be positive"),
            (
                Duration::try_from_secs_f64(self.session_duration).is_ok(),
                "session_duration",
                "too large",
            ),
            (self.pixel_to_cm > 0.0, "pixel_to_cm", "must be positive"),
            (self.sample_rate > 0.0, "sample_rate", "must be positive"),
            (self.target_radius >= 0.0, "target_radius", "must not be negative"),
            (self.tone_duration >= 0.0, "tone_duration", "must not be negative"),
            (
                (0.0..=1.0).contains(&self.tone_amplitude),
                "tone_amplitude",
                "must be within [0, 1]",
            ),
        ];
        for (ok, field, reason) in checks {
            if !ok {
                return Err(ParamsError::OutOfRange { field, reason });
            }
        }
        Ok(())
    }

    /// Session duration as a [`Duration`].
    pub fn session_length(&self) -> Duration {
        Duration::try_from_secs_f64(self.session_duration).unwrap_or(Duration::MAX)
    }
}

/// Serde support for Duration stored as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
