//! Application configuration: TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::matcher::DeviceFilter;
use crate::melody::{DEFAULT_BPM, DEFAULT_TATUMS_PER_BEAT, Tempo, Tune};
use crate::protocol::{InitVariant, POWER_PRODUCT_ID, POWER_VENDOR_ID, RequestKind, VersionFormat};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// USB vendor ID a board must report. Default: 0x1BDA.
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,

    /// USB product ID a board must report. Default: 0x0011.
    #[serde(default = "default_product_id")]
    pub product_id: u16,

    /// Playback tempo in beats per minute. Default: 80.
    #[serde(default = "default_bpm")]
    pub bpm: u32,

    /// Subdivisions of each beat. Default: 8.
    #[serde(default = "default_tatums_per_beat")]
    pub tatums_per_beat: u32,

    /// Which initialize request to send: "run-led" or "selector-12".
    #[serde(default)]
    pub init_variant: InitVariant,

    /// Firmware version byte order: "reported" or "big-endian".
    #[serde(default)]
    pub version_format: VersionFormat,

    /// bmRequestType type bits: "standard" or "vendor".
    #[serde(default)]
    pub request_kind: RequestKind,

    /// Melody to play: "mario" or "yakkety".
    #[serde(default)]
    pub tune: Tune,
}

fn default_vendor_id() -> u16 {
    POWER_VENDOR_ID
}
fn default_product_id() -> u16 {
    POWER_PRODUCT_ID
}
fn default_bpm() -> u32 {
    DEFAULT_BPM
}
fn default_tatums_per_beat() -> u32 {
    DEFAULT_TATUMS_PER_BEAT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            bpm: default_bpm(),
            tatums_per_beat: default_tatums_per_beat(),
            init_variant: InitVariant::default(),
            version_format: VersionFormat::default(),
            request_kind: RequestKind::default(),
            tune: Tune::default(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `vendor_id` or `product_id` is zero (`field` names which).
    ZeroId { field: &'static str },
    /// `bpm` or `tatums_per_beat` is zero.
    ZeroTempo { field: &'static str },
    /// The tempo is so fast that tones would last 0 ms.
    TempoTooFast { bpm: u32, tatums_per_beat: u32 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroId { field } => write!(f, "{field} cannot be 0"),
            ValidationError::ZeroTempo { field } => write!(f, "{field} must be positive"),
            ValidationError::TempoTooFast {
                bpm,
                tatums_per_beat,
            } => write!(
                f,
                "tempo {bpm} bpm x {tatums_per_beat} tatums leaves no time for a tone"
            ),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("powerman"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Device filter built from the configured IDs.
    pub fn filter(&self) -> DeviceFilter {
        DeviceFilter {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
        }
    }

    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.bpm, self.tatums_per_beat)
    }

    /// Check every field, returning all problems found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.vendor_id == 0 {
            errors.push(ValidationError::ZeroId { field: "vendor_id" });
        }
        if self.product_id == 0 {
            errors.push(ValidationError::ZeroId {
                field: "product_id",
            });
        }

        if self.bpm == 0 {
            errors.push(ValidationError::ZeroTempo { field: "bpm" });
        }
        if self.tatums_per_beat == 0 {
            errors.push(ValidationError::ZeroTempo {
                field: "tatums_per_beat",
            });
        }
        if self.bpm > 0 && self.tatums_per_beat > 0 && self.tempo().tone_duration_ms() == 0 {
            errors.push(ValidationError::TempoTooFast {
                bpm: self.bpm,
                tatums_per_beat: self.tatums_per_beat,
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
