//! Unified error type for the powerman-lib crate.
//!
//! [`PowermanError`] names the stage of a run that failed and wraps the
//! [`DeviceError`] behind it. Each stage maps to its own process exit status
//! through [`PowermanError::exit_code`].

use std::fmt;

use crate::device::DeviceError;

/// Exit status for a failed tone during playback. libusb statuses run from
/// -1 to -12 plus -99, so no sign-flipped enumeration status can equal it.
pub const PLAYBACK_EXIT_CODE: i32 = 20;

/// Unified error type for powerman-lib operations.
#[derive(Debug)]
pub enum PowermanError {
    /// The device list could not be retrieved.
    Enumeration(DeviceError),
    /// No device with matching IDs reported the requested serial.
    BoardNotFound(String),
    /// Reading the firmware version failed.
    FirmwareCheck(DeviceError),
    /// The initialize request failed.
    Initialize(DeviceError),
    /// A set-tone request failed during playback.
    Playback(DeviceError),
    /// Any other device error outside a named stage.
    Device(DeviceError),
    /// Standard I/O error (config file read).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
}

impl PowermanError {
    /// Process exit status for this error.
    ///
    /// Enumeration failures report the transport status with its sign
    /// flipped (falling back to 1). The other stages have fixed codes.
    pub fn exit_code(&self) -> i32 {
        match self {
            PowermanError::Enumeration(e) => {
                let code = -e.status_code();
                if code > 0 { code } else { 1 }
            }
            PowermanError::BoardNotFound(_) => 1,
            PowermanError::FirmwareCheck(_) => 2,
            PowermanError::Initialize(_) => 3,
            PowermanError::Playback(_) => PLAYBACK_EXIT_CODE,
            PowermanError::Device(_) | PowermanError::Io(_) | PowermanError::Config(_) => 1,
        }
    }
}

impl fmt::Display for PowermanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowermanError::Enumeration(e) => write!(f, "{e}"),
            PowermanError::BoardNotFound(serial) => write!(f, "Could not find board: {serial}"),
            PowermanError::FirmwareCheck(e) => write!(
                f,
                "Could not get firmware version (errcode {}): {e}",
                e.status_code()
            ),
            PowermanError::Initialize(e) => write!(
                f,
                "Could not initialize board (errcode {}): {e}",
                e.status_code()
            ),
            PowermanError::Playback(e) => {
                write!(f, "Failed to play tone (errcode {}): {e}", e.status_code())
            }
            PowermanError::Device(e) => write!(f, "{e}"),
            PowermanError::Io(e) => write!(f, "I/O error: {e}"),
            PowermanError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for PowermanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PowermanError::Enumeration(e)
            | PowermanError::FirmwareCheck(e)
            | PowermanError::Initialize(e)
            | PowermanError::Playback(e)
            | PowermanError::Device(e) => Some(e),
            PowermanError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for PowermanError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::Enumeration { .. } => PowermanError::Enumeration(e),
            other => PowermanError::Device(other),
        }
    }
}

impl From<std::io::Error> for PowermanError {
    fn from(e: std::io::Error) -> Self {
        PowermanError::Io(e)
    }
}

/// Crate-level Result alias using [`PowermanError`].
pub type Result<T> = std::result::Result<T, PowermanError>;
