//! Board control protocol: firmware version, initialize, set tone.
//!
//! The free functions issue exactly one control transfer each. [`Board`]
//! wraps an open handle and enforces the session order
//! `Matched → VersionChecked → Initialized`; tone commands are refused until
//! the board is initialized.

use std::fmt;

use serde::Serialize;

use crate::device::{ControlIo, DeviceError, Result};
use crate::protocol::{
    FIRMWARE_VERSION_LEN, FirmwareVersion, GET_FIRMWARE_VERSION, InitVariant, RequestKind,
    SET_TONE, ToneCommand,
};

/// Read the 4-byte firmware version.
pub fn get_firmware_version(handle: &impl ControlIo, kind: RequestKind) -> Result<FirmwareVersion> {
    let mut buf = [0u8; FIRMWARE_VERSION_LEN];
    let n = handle.control_in(&GET_FIRMWARE_VERSION.with_kind(kind), &mut buf)?;
    if n < FIRMWARE_VERSION_LEN {
        return Err(DeviceError::ShortTransfer {
            expected: FIRMWARE_VERSION_LEN,
            actual: n,
        });
    }
    Ok(FirmwareVersion(buf))
}

/// Send the initialize request for `variant`. No payload.
pub fn initialize(handle: &impl ControlIo, variant: InitVariant, kind: RequestKind) -> Result<()> {
    handle.control_out(&variant.request().with_kind(kind), &[])?;
    Ok(())
}

/// Play one tone (or silence, when `frequency_hz` is 0) for `duration_ms`.
pub fn set_tone(
    handle: &impl ControlIo,
    frequency_hz: u16,
    duration_ms: u16,
    kind: RequestKind,
) -> Result<()> {
    let payload = ToneCommand::new(frequency_hz, duration_ms).encode();
    handle.control_out(&SET_TONE.with_kind(kind), &payload)?;
    Ok(())
}

/// Where a board session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Matched,
    VersionChecked,
    Initialized,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Matched => write!(f, "matched"),
            SessionState::VersionChecked => write!(f, "version-checked"),
            SessionState::Initialized => write!(f, "initialized"),
        }
    }
}

/// An open board plus its session state.
///
/// Owns the handle; dropping the `Board` closes it.
pub struct Board<H: ControlIo> {
    handle: H,
    state: SessionState,
    kind: RequestKind,
    firmware: Option<FirmwareVersion>,
}

impl<H: ControlIo> Board<H> {
    /// Wrap a freshly matched handle.
    pub fn new(handle: H) -> Self {
        Board {
            handle,
            state: SessionState::Matched,
            kind: RequestKind::default(),
            firmware: None,
        }
    }

    /// Use different `bmRequestType` type bits for every request.
    pub fn with_request_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Version read by [`Board::check_firmware_version`], if it succeeded.
    pub fn firmware(&self) -> Option<FirmwareVersion> {
        self.firmware
    }

    /// Read the firmware version. Moves a matched board to `VersionChecked`.
    pub fn check_firmware_version(&mut self) -> Result<FirmwareVersion> {
        let version = get_firmware_version(&self.handle, self.kind)?;
        self.firmware = Some(version);
        if self.state == SessionState::Matched {
            self.state = SessionState::VersionChecked;
        }
        Ok(version)
    }

    /// Initialize the board. Requires a successful version check first.
    pub fn initialize(&mut self, variant: InitVariant) -> Result<()> {
        self.require(SessionState::VersionChecked, "initialize")?;
        initialize(&self.handle, variant, self.kind)?;
        self.state = SessionState::Initialized;
        Ok(())
    }

    /// Send one tone command. Requires an initialized board.
    pub fn set_tone(&self, tone: ToneCommand) -> Result<()> {
        self.require(SessionState::Initialized, "set tone")?;
        set_tone(&self.handle, tone.frequency_hz, tone.duration_ms, self.kind)
    }

    fn require(&self, min: SessionState, operation: &'static str) -> Result<()> {
        if self.state < min {
            return Err(DeviceError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }
}
