//! Protocol constants and wire codecs for the power board.
//!
//! Every board operation is a single control transfer sharing `bRequest = 64`.
//! The operation itself is selected by `wIndex`:
//! - 9  = read firmware version (device→host, 4 bytes)
//! - 6  = initialize, "run LED" variant (`wValue = 1`)
//! - 12 = initialize, alternate variant (`wValue = 0`)
//! - 8  = set piezo tone (host→device, 4-byte payload)
//!
//! Multi-byte fields on the wire are little-endian.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── USB identifiers ──

/// Power board vendor ID.
pub const POWER_VENDOR_ID: u16 = 0x1BDA;

/// Power board product ID.
pub const POWER_PRODUCT_ID: u16 = 0x0011;

// ── Control transfer parameters ──

/// `bRequest` shared by every power board operation.
pub const BOARD_REQUEST: u8 = 64;

/// Timeout per control transfer in milliseconds.
pub const TRANSFER_TIMEOUT_MS: u64 = 3000;

/// `wIndex` selector: read firmware version.
pub const SELECT_FIRMWARE_VERSION: u16 = 9;

/// `wIndex` selector: initialize, "run LED" variant.
pub const SELECT_RUN_LED: u16 = 6;

/// `wIndex` selector: initialize, alternate variant.
pub const SELECT_INIT_ALT: u16 = 12;

/// `wIndex` selector: drive the piezo buzzer.
pub const SELECT_PIEZO: u16 = 8;

/// Firmware version response length.
pub const FIRMWARE_VERSION_LEN: usize = 4;

/// Tone command payload length.
pub const TONE_PAYLOAD_LEN: usize = 4;

/// Buffer size for serial string reads (127 characters + NUL).
pub const SERIAL_BUFFER_LEN: usize = 128;

/// Standard device descriptor length.
pub const DEVICE_DESCRIPTOR_LEN: usize = 18;

/// `bDescriptorType` of a device descriptor.
const DESCRIPTOR_TYPE_DEVICE: u8 = 0x01;

// ── Control requests ──

/// Transfer direction, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Host → device.
    Out,
    /// Device → host.
    In,
}

/// Type bits of `bmRequestType`.
///
/// Boards in the field answer requests sent with the standard type bits
/// (`0x00`/`0x80`), which is the default. `Vendor` sets the vendor type bits
/// (`0x40`/`0xC0`) for firmware that checks them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    #[default]
    Standard,
    Vendor,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Standard => write!(f, "standard"),
            RequestKind::Vendor => write!(f, "vendor"),
        }
    }
}

/// One control transfer's fixed setup fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub direction: Direction,
    pub kind: RequestKind,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub timeout: Duration,
}

impl ControlRequest {
    const fn board(direction: Direction, value: u16, index: u16) -> Self {
        ControlRequest {
            direction,
            kind: RequestKind::Standard,
            request: BOARD_REQUEST,
            value,
            index,
            timeout: Duration::from_millis(TRANSFER_TIMEOUT_MS),
        }
    }

    /// Same request with different `bmRequestType` type bits.
    pub const fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    /// Raw `bmRequestType` byte (recipient is always the device).
    pub fn request_type(&self) -> u8 {
        let dir = match self.direction {
            Direction::Out => 0x00,
            Direction::In => 0x80,
        };
        let kind = match self.kind {
            RequestKind::Standard => 0x00,
            RequestKind::Vendor => 0x40,
        };
        dir | kind
    }
}

/// Read the 4-byte firmware version.
pub const GET_FIRMWARE_VERSION: ControlRequest =
    ControlRequest::board(Direction::In, 0, SELECT_FIRMWARE_VERSION);

/// Initialize via the "run LED" selector.
pub const INIT_RUN_LED: ControlRequest = ControlRequest::board(Direction::Out, 1, SELECT_RUN_LED);

/// Initialize via selector 12.
pub const INIT_SELECTOR_12: ControlRequest =
    ControlRequest::board(Direction::Out, 0, SELECT_INIT_ALT);

/// Send one tone command.
pub const SET_TONE: ControlRequest = ControlRequest::board(Direction::Out, 0, SELECT_PIEZO);

/// Which initialize request to send.
///
/// Two initialize sequences exist for these boards and they disagree on the
/// selector, so the choice is explicit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitVariant {
    /// `wIndex = 6`, `wValue = 1`.
    #[default]
    RunLed,
    /// `wIndex = 12`, `wValue = 0`.
    #[serde(rename = "selector-12")]
    Selector12,
}

impl InitVariant {
    pub fn request(self) -> ControlRequest {
        match self {
            InitVariant::RunLed => INIT_RUN_LED,
            InitVariant::Selector12 => INIT_SELECTOR_12,
        }
    }
}

impl fmt::Display for InitVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitVariant::RunLed => write!(f, "run-led"),
            InitVariant::Selector12 => write!(f, "selector-12"),
        }
    }
}

// ── Tone command ──

/// Payload of a set-tone request: `[frequency:u16 LE][duration:u16 LE]`.
///
/// A frequency of 0 silences the buzzer for `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToneCommand {
    pub frequency_hz: u16,
    pub duration_ms: u16,
}

impl ToneCommand {
    pub const fn new(frequency_hz: u16, duration_ms: u16) -> Self {
        ToneCommand {
            frequency_hz,
            duration_ms,
        }
    }

    pub const fn silence(duration_ms: u16) -> Self {
        Self::new(0, duration_ms)
    }

    pub fn is_silence(&self) -> bool {
        self.frequency_hz == 0
    }

    pub fn encode(&self) -> [u8; TONE_PAYLOAD_LEN] {
        let f = self.frequency_hz.to_le_bytes();
        let d = self.duration_ms.to_le_bytes();
        [f[0], f[1], d[0], d[1]]
    }

    /// Decode a payload. Returns `None` unless exactly 4 bytes are given.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; TONE_PAYLOAD_LEN] = bytes.try_into().ok()?;
        Some(ToneCommand {
            frequency_hz: u16::from_le_bytes([bytes[0], bytes[1]]),
            duration_ms: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }
}

// ── Firmware version ──

/// How to print the 4 firmware version bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionFormat {
    /// Bytes 3, 2, 0, 0: the order the legacy control tool prints.
    #[default]
    Reported,
    /// Bytes 3, 2, 1, 0.
    BigEndian,
}

impl fmt::Display for VersionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionFormat::Reported => write!(f, "reported"),
            VersionFormat::BigEndian => write!(f, "big-endian"),
        }
    }
}

/// Raw firmware version response. Opaque to the protocol layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion(pub [u8; FIRMWARE_VERSION_LEN]);

impl FirmwareVersion {
    pub fn bytes(&self) -> [u8; FIRMWARE_VERSION_LEN] {
        self.0
    }

    /// Hex rendering in the requested byte order.
    pub fn format(&self, format: VersionFormat) -> String {
        let b = self.0;
        match format {
            VersionFormat::Reported => {
                format!("{:02x}{:02x}{:02x}{:02x}", b[3], b[2], b[0], b[0])
            }
            VersionFormat::BigEndian => {
                format!("{:02x}{:02x}{:02x}{:02x}", b[3], b[2], b[1], b[0])
            }
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(VersionFormat::default()))
    }
}

// ── Descriptors ──

/// The fields of a standard device descriptor this tool needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    /// `iSerialNumber`; 0 means the device has no serial string.
    pub serial_index: u8,
}

impl DeviceDescriptor {
    /// Parse a standard 18-byte device descriptor.
    ///
    /// Extra trailing bytes (configuration descriptors read alongside it)
    /// are ignored.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < DEVICE_DESCRIPTOR_LEN || bytes[1] != DESCRIPTOR_TYPE_DEVICE {
            return None;
        }
        Some(DeviceDescriptor {
            vendor_id: u16::from_le_bytes([bytes[8], bytes[9]]),
            product_id: u16::from_le_bytes([bytes[10], bytes[11]]),
            serial_index: bytes[16],
        })
    }

    pub fn has_serial(&self) -> bool {
        self.serial_index != 0
    }
}

/// Decode a serial string read into a fixed buffer.
///
/// Stops at the first NUL and never yields more than 127 bytes. Not trimmed
/// or case-folded; non-ASCII bytes are replaced.
pub fn decode_serial(buf: &[u8]) -> String {
    let limit = buf.len().min(SERIAL_BUFFER_LEN - 1);
    let end = buf[..limit].iter().position(|&b| b == 0).unwrap_or(limit);
    buf[..end]
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}
