//! Device communication: transport traits, Linux backend, and test mock.

use std::fmt;

use crate::board::SessionState;
use crate::protocol::{ControlRequest, DeviceDescriptor};

// ── Status codes ──

/// libusb-compatible status codes.
///
/// Every [`DeviceError`] carries one of these so that messages and exit codes
/// report the same numbers whichever backend produced the failure.
pub mod status {
    pub const IO: i32 = -1;
    pub const INVALID_PARAM: i32 = -2;
    pub const ACCESS: i32 = -3;
    pub const NO_DEVICE: i32 = -4;
    pub const NOT_FOUND: i32 = -5;
    pub const BUSY: i32 = -6;
    pub const TIMEOUT: i32 = -7;
    pub const PIPE: i32 = -9;
    pub const NOT_SUPPORTED: i32 = -12;
    pub const OTHER: i32 = -99;
}

// ── Error type ──

/// Device communication errors.
///
/// `detail` strings follow the convention **"context: details"** where
/// *context* names the step (e.g. `"USB open"`, `"descriptor"`) and *details*
/// is the backend's own message.
#[derive(Debug)]
pub enum DeviceError {
    /// The device list could not be retrieved at all.
    Enumeration { code: i32, detail: String },
    /// A device descriptor could not be read or decoded.
    Descriptor { code: i32, detail: String },
    OpenFailed { code: i32, detail: String },
    Transfer { code: i32, detail: String },
    /// The device answered with fewer bytes than the operation needs.
    ShortTransfer { expected: usize, actual: usize },
    /// A board operation was attempted before the session reached the state it requires.
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl DeviceError {
    /// The raw (negative) transport status behind this error.
    pub fn status_code(&self) -> i32 {
        match self {
            DeviceError::Enumeration { code, .. }
            | DeviceError::Descriptor { code, .. }
            | DeviceError::OpenFailed { code, .. }
            | DeviceError::Transfer { code, .. } => *code,
            DeviceError::ShortTransfer { .. } | DeviceError::InvalidState { .. } => status::OTHER,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Enumeration { code, detail } => {
                write!(f, "Could not get device list: {detail} (errcode {code})")
            }
            DeviceError::Descriptor { code, detail } => {
                write!(f, "Could not read device descriptor: {detail} (errcode {code})")
            }
            DeviceError::OpenFailed { code, detail } => {
                write!(f, "Failed to open device: {detail} (errcode {code})")
            }
            DeviceError::Transfer { code, detail } => {
                write!(f, "Control transfer failed: {detail} (errcode {code})")
            }
            DeviceError::ShortTransfer { expected, actual } => {
                write!(f, "Short transfer: expected {expected} bytes, got {actual}")
            }
            DeviceError::InvalidState { operation, state } => {
                write!(f, "Cannot {operation} while board is {state}")
            }
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Traits ──

/// An opened, exclusive channel to one device (a "board handle").
///
/// The handle is closed when it is dropped, so it is released exactly once on
/// every path. Transfers borrow the handle, which rules out closing it while a
/// transfer is in flight.
pub trait ControlIo {
    /// Device→host control transfer. Returns the number of bytes received.
    fn control_in(&self, request: &ControlRequest, buf: &mut [u8]) -> Result<usize>;

    /// Host→device control transfer. Returns the number of bytes sent.
    fn control_out(&self, request: &ControlRequest, data: &[u8]) -> Result<usize>;

    /// Read an ASCII string descriptor into `buf`, NUL-terminated.
    /// Returns the string length (excluding the NUL).
    fn read_string_ascii(&self, index: u8, buf: &mut [u8]) -> Result<usize>;
}

/// An enumerated, unopened device.
pub trait UsbDevice {
    type Handle: ControlIo;

    fn descriptor(&self) -> Result<DeviceDescriptor>;
    fn bus_number(&self) -> u8;
    fn address(&self) -> u8;
    /// Port numbers from the root hub down to this device. Display only.
    fn port_path(&self) -> Vec<u8>;
    fn open(&self) -> Result<Self::Handle>;
}

/// Source of enumerated devices.
pub trait UsbBackend {
    type Device: UsbDevice;

    /// List connected devices in whatever order the system reports them.
    fn devices(&self) -> Result<Vec<Self::Device>>;
}

/// Write `s` as ASCII into `buf` the way libusb does: non-ASCII characters
/// become `?`, the result is truncated to fit, and a NUL is always appended.
pub fn copy_ascii(s: &str, buf: &mut [u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }
    let mut n = 0;
    for c in s.chars() {
        if n + 1 >= buf.len() {
            break;
        }
        buf[n] = if c.is_ascii() { c as u8 } else { b'?' };
        n += 1;
    }
    buf[n] = 0;
    n
}

/// Reject string descriptor index 0, which names the language table.
pub fn string_index(index: u8) -> Result<u8> {
    if index == 0 {
        return Err(DeviceError::Transfer {
            code: status::INVALID_PARAM,
            detail: "string descriptor: index 0 is not a string".into(),
        });
    }
    Ok(index)
}

/// Port numbers encoded in a Linux sysfs device name (`"1-2.3"` → `[2, 3]`).
///
/// Root hubs (`"usb1"`) and unparseable names yield an empty path.
pub fn port_path_from_sysfs_name(name: &str) -> Vec<u8> {
    let Some((_bus, ports)) = name.split_once('-') else {
        return Vec::new();
    };
    let parsed: Option<Vec<u8>> = ports.split('.').map(|p| p.parse().ok()).collect();
    parsed.unwrap_or_default()
}

// ── Linux implementation ──

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::time::Duration;

    use nusb::transfer::{Control, ControlType, Recipient, TransferError};

    use crate::protocol::{Direction, RequestKind};

    /// Language ID for string descriptor reads (US English).
    const LANG_EN_US: u16 = 0x0409;

    /// Interface claimed to gain exclusive access to the board.
    const BOARD_INTERFACE: u8 = 0;

    /// String descriptor reads use the same timeout as board requests.
    const STRING_TIMEOUT: Duration =
        Duration::from_millis(crate::protocol::TRANSFER_TIMEOUT_MS);

    fn io_status(e: &std::io::Error) -> i32 {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => status::ACCESS,
            std::io::ErrorKind::NotFound => status::NOT_FOUND,
            std::io::ErrorKind::TimedOut => status::TIMEOUT,
            std::io::ErrorKind::Unsupported => status::NOT_SUPPORTED,
            _ => status::IO,
        }
    }

    fn transfer_status(e: &TransferError) -> i32 {
        match e {
            TransferError::Stall => status::PIPE,
            TransferError::Disconnected => status::NO_DEVICE,
            TransferError::Cancelled => status::TIMEOUT,
            _ => status::IO,
        }
    }

    fn control_setup(request: &ControlRequest) -> Control {
        Control {
            control_type: match request.kind {
                RequestKind::Standard => ControlType::Standard,
                RequestKind::Vendor => ControlType::Vendor,
            },
            recipient: Recipient::Device,
            request: request.request,
            value: request.value,
            index: request.index,
        }
    }

    /// Enumerates devices through `nusb`.
    #[derive(Debug, Default)]
    pub struct NusbBackend;

    impl UsbBackend for NusbBackend {
        type Device = NusbDevice;

        fn devices(&self) -> Result<Vec<NusbDevice>> {
            let list = nusb::list_devices().map_err(|e| DeviceError::Enumeration {
                code: io_status(&e),
                detail: format!("USB enumeration: {e}"),
            })?;
            Ok(list.map(|info| NusbDevice { info }).collect())
        }
    }

    pub struct NusbDevice {
        info: nusb::DeviceInfo,
    }

    impl UsbDevice for NusbDevice {
        type Handle = NusbHandle;

        fn descriptor(&self) -> Result<DeviceDescriptor> {
            // sysfs exposes the raw device descriptor without opening the device
            let path = self.info.sysfs_path().join("descriptors");
            let raw = std::fs::read(&path).map_err(|e| DeviceError::Descriptor {
                code: io_status(&e),
                detail: format!("{}: {e}", path.display()),
            })?;
            DeviceDescriptor::parse(&raw).ok_or_else(|| DeviceError::Descriptor {
                code: status::IO,
                detail: format!("{}: malformed device descriptor", path.display()),
            })
        }

        fn bus_number(&self) -> u8 {
            self.info.bus_number()
        }

        fn address(&self) -> u8 {
            self.info.device_address()
        }

        fn port_path(&self) -> Vec<u8> {
            self.info
                .sysfs_path()
                .file_name()
                .and_then(|n| n.to_str())
                .map(port_path_from_sysfs_name)
                .unwrap_or_default()
        }

        fn open(&self) -> Result<NusbHandle> {
            let device = self.info.open().map_err(|e| DeviceError::OpenFailed {
                code: io_status(&e),
                detail: format!("USB open: {e}"),
            })?;
            let interface = device.claim_interface(BOARD_INTERFACE).map_err(|e| {
                DeviceError::OpenFailed {
                    code: io_status(&e),
                    detail: format!("claim interface {BOARD_INTERFACE}: {e}"),
                }
            })?;
            Ok(NusbHandle { device, interface })
        }
    }

    /// Open board handle. Dropping it releases the interface and closes the device.
    pub struct NusbHandle {
        device: nusb::Device,
        interface: nusb::Interface,
    }

    impl ControlIo for NusbHandle {
        fn control_in(&self, request: &ControlRequest, buf: &mut [u8]) -> Result<usize> {
            debug_assert_eq!(request.direction, Direction::In);
            self.interface
                .control_in_blocking(control_setup(request), buf, request.timeout)
                .map_err(|e| DeviceError::Transfer {
                    code: transfer_status(&e),
                    detail: format!("control_in(wIndex={}): {e}", request.index),
                })
        }

        fn control_out(&self, request: &ControlRequest, data: &[u8]) -> Result<usize> {
            debug_assert_eq!(request.direction, Direction::Out);
            self.interface
                .control_out_blocking(control_setup(request), data, request.timeout)
                .map_err(|e| DeviceError::Transfer {
                    code: transfer_status(&e),
                    detail: format!("control_out(wIndex={}): {e}", request.index),
                })
        }

        fn read_string_ascii(&self, index: u8, buf: &mut [u8]) -> Result<usize> {
            let index = string_index(index)?;
            let s = self
                .device
                .get_string_descriptor(index, LANG_EN_US, STRING_TIMEOUT)
                .map_err(|e| DeviceError::Transfer {
                    code: status::IO,
                    detail: format!("string descriptor {index}: {e}"),
                })?;
            Ok(copy_ascii(&s, buf))
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux_impl::{NusbBackend, NusbDevice, NusbHandle};

// ── Stub backend for unsupported platforms ──

/// Placeholder backend whose enumeration always fails.
/// Enables compilation and `cargo test` on unsupported hosts.
#[cfg(not(target_os = "linux"))]
#[derive(Debug, Default)]
pub struct StubBackend;

#[cfg(not(target_os = "linux"))]
pub enum StubDevice {}

#[cfg(not(target_os = "linux"))]
pub enum StubHandle {}

#[cfg(not(target_os = "linux"))]
impl UsbBackend for StubBackend {
    type Device = StubDevice;

    fn devices(&self) -> Result<Vec<StubDevice>> {
        Err(DeviceError::Enumeration {
            code: status::NOT_SUPPORTED,
            detail: "USB access is not yet supported on this platform".into(),
        })
    }
}

#[cfg(not(target_os = "linux"))]
impl UsbDevice for StubDevice {
    type Handle = StubHandle;

    fn descriptor(&self) -> Result<DeviceDescriptor> {
        match *self {}
    }
    fn bus_number(&self) -> u8 {
        match *self {}
    }
    fn address(&self) -> u8 {
        match *self {}
    }
    fn port_path(&self) -> Vec<u8> {
        match *self {}
    }
    fn open(&self) -> Result<StubHandle> {
        match *self {}
    }
}

#[cfg(not(target_os = "linux"))]
impl ControlIo for StubHandle {
    fn control_in(&self, _request: &ControlRequest, _buf: &mut [u8]) -> Result<usize> {
        match *self {}
    }
    fn control_out(&self, _request: &ControlRequest, _data: &[u8]) -> Result<usize> {
        match *self {}
    }
    fn read_string_ascii(&self, _index: u8, _buf: &mut [u8]) -> Result<usize> {
        match *self {}
    }
}

/// Concrete backend type for the current platform.
#[cfg(target_os = "linux")]
pub type PlatformBackend = NusbBackend;
#[cfg(not(target_os = "linux"))]
pub type PlatformBackend = StubBackend;

/// The platform-appropriate USB backend.
pub fn platform_backend() -> PlatformBackend {
    PlatformBackend::default()
}

// ── Mock transport for testing ──

/// In-memory bus, devices, and handles for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use crate::protocol::{
        POWER_PRODUCT_ID, POWER_VENDOR_ID, SELECT_FIRMWARE_VERSION, SELECT_PIEZO, ToneCommand,
    };

    /// One control transfer as seen by a mock handle.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedTransfer {
        /// Position of the device in the mock bus.
        pub device: usize,
        pub request_type: u8,
        pub request: u8,
        pub value: u16,
        pub index: u16,
        /// Payload sent (OUT) or returned (IN).
        pub data: Vec<u8>,
    }

    /// Shared record of everything the code under test did to the bus.
    #[derive(Debug, Default)]
    pub struct MockLog {
        /// Device positions, in open order.
        pub opened: RefCell<Vec<usize>>,
        /// Device positions, in close (drop) order.
        pub closed: RefCell<Vec<usize>>,
        pub transfers: RefCell<Vec<RecordedTransfer>>,
        /// wIndex → (successes allowed, status code returned afterwards).
        failures: RefCell<HashMap<u16, (usize, i32)>>,
        successes: RefCell<HashMap<u16, usize>>,
    }

    impl MockLog {
        /// Handles opened but not yet closed.
        pub fn open_handles(&self) -> usize {
            self.opened.borrow().len() - self.closed.borrow().len()
        }

        /// Recorded transfers with the given `wIndex` selector.
        pub fn transfers_with_index(&self, index: u16) -> Vec<RecordedTransfer> {
            self.transfers
                .borrow()
                .iter()
                .filter(|t| t.index == index)
                .cloned()
                .collect()
        }

        /// Decoded payloads of every set-tone request, including failed attempts.
        pub fn tones(&self) -> Vec<ToneCommand> {
            self.transfers_with_index(SELECT_PIEZO)
                .iter()
                .filter_map(|t| ToneCommand::decode(&t.data))
                .collect()
        }

        fn check_failure(&self, index: u16) -> Result<()> {
            let failures = self.failures.borrow();
            let Some(&(allowed, code)) = failures.get(&index) else {
                return Ok(());
            };
            let mut successes = self.successes.borrow_mut();
            let done = successes.entry(index).or_default();
            if *done >= allowed {
                return Err(DeviceError::Transfer {
                    code,
                    detail: format!("mock: failure injected for wIndex={index}"),
                });
            }
            *done += 1;
            Ok(())
        }
    }

    /// Description of one device on the mock bus.
    #[derive(Debug, Clone)]
    pub struct MockDevice {
        pub vendor_id: u16,
        pub product_id: u16,
        pub serial: Option<String>,
        pub bus: u8,
        pub address: u8,
        pub ports: Vec<u8>,
        pub firmware: [u8; 4],
        pub descriptor_error: Option<i32>,
        pub open_error: Option<i32>,
        pub serial_error: Option<i32>,
    }

    impl MockDevice {
        /// A power board with the given serial.
        pub fn board(serial: &str) -> Self {
            MockDevice {
                vendor_id: POWER_VENDOR_ID,
                product_id: POWER_PRODUCT_ID,
                serial: Some(serial.into()),
                bus: 1,
                address: 2,
                ports: vec![1],
                firmware: [0x01, 0x00, 0x04, 0x00],
                descriptor_error: None,
                open_error: None,
                serial_error: None,
            }
        }

        /// Some unrelated device.
        pub fn other(vendor_id: u16, product_id: u16) -> Self {
            MockDevice {
                vendor_id,
                product_id,
                serial: Some("OTHER".into()),
                ..Self::board("")
            }
        }

        pub fn at(mut self, bus: u8, address: u8, ports: &[u8]) -> Self {
            self.bus = bus;
            self.address = address;
            self.ports = ports.to_vec();
            self
        }

        pub fn with_firmware(mut self, firmware: [u8; 4]) -> Self {
            self.firmware = firmware;
            self
        }

        pub fn with_descriptor_error(mut self, code: i32) -> Self {
            self.descriptor_error = Some(code);
            self
        }

        pub fn with_open_error(mut self, code: i32) -> Self {
            self.open_error = Some(code);
            self
        }

        pub fn with_serial_error(mut self, code: i32) -> Self {
            self.serial_error = Some(code);
            self
        }

        pub fn without_serial(mut self) -> Self {
            self.serial = None;
            self
        }
    }

    /// In-memory bus. Devices are reported in insertion order.
    #[derive(Default)]
    pub struct MockBus {
        pub log: Rc<MockLog>,
        entries: Vec<MockDevice>,
        enumeration_error: Option<i32>,
    }

    impl MockBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, def: MockDevice) -> Self {
            self.entries.push(def);
            self
        }

        pub fn with_enumeration_error(mut self, code: i32) -> Self {
            self.enumeration_error = Some(code);
            self
        }

        /// Make transfers with selector `index` fail with `code` once
        /// `successes` of them have gone through.
        pub fn fail_transfer(&self, index: u16, successes: usize, code: i32) {
            self.log
                .failures
                .borrow_mut()
                .insert(index, (successes, code));
        }
    }

    impl UsbBackend for MockBus {
        type Device = MockUsbDevice;

        fn devices(&self) -> Result<Vec<MockUsbDevice>> {
            if let Some(code) = self.enumeration_error {
                return Err(DeviceError::Enumeration {
                    code,
                    detail: "mock: enumeration failure injected".into(),
                });
            }
            Ok(self
                .entries
                .iter()
                .enumerate()
                .map(|(id, def)| MockUsbDevice {
                    id,
                    def: def.clone(),
                    log: Rc::clone(&self.log),
                })
                .collect())
        }
    }

    pub struct MockUsbDevice {
        id: usize,
        def: MockDevice,
        log: Rc<MockLog>,
    }

    impl UsbDevice for MockUsbDevice {
        type Handle = MockHandle;

        fn descriptor(&self) -> Result<DeviceDescriptor> {
            if let Some(code) = self.def.descriptor_error {
                return Err(DeviceError::Descriptor {
                    code,
                    detail: "mock: descriptor failure injected".into(),
                });
            }
            Ok(DeviceDescriptor {
                vendor_id: self.def.vendor_id,
                product_id: self.def.product_id,
                serial_index: if self.def.serial.is_some() { 3 } else { 0 },
            })
        }

        fn bus_number(&self) -> u8 {
            self.def.bus
        }

        fn address(&self) -> u8 {
            self.def.address
        }

        fn port_path(&self) -> Vec<u8> {
            self.def.ports.clone()
        }

        fn open(&self) -> Result<MockHandle> {
            if let Some(code) = self.def.open_error {
                return Err(DeviceError::OpenFailed {
                    code,
                    detail: "mock: open failure injected".into(),
                });
            }
            self.log.opened.borrow_mut().push(self.id);
            Ok(MockHandle {
                id: self.id,
                def: self.def.clone(),
                log: Rc::clone(&self.log),
            })
        }
    }

    /// Open mock handle. Records its close on drop.
    pub struct MockHandle {
        id: usize,
        def: MockDevice,
        log: Rc<MockLog>,
    }

    impl MockHandle {
        /// Position of the opened device in the mock bus.
        pub fn id(&self) -> usize {
            self.id
        }
    }

    impl ControlIo for MockHandle {
        fn control_in(&self, request: &ControlRequest, buf: &mut [u8]) -> Result<usize> {
            let mut data = Vec::new();
            if request.index == SELECT_FIRMWARE_VERSION {
                data.extend_from_slice(&self.def.firmware);
            }
            data.truncate(buf.len());
            self.log.transfers.borrow_mut().push(RecordedTransfer {
                device: self.id,
                request_type: request.request_type(),
                request: request.request,
                value: request.value,
                index: request.index,
                data: data.clone(),
            });
            self.log.check_failure(request.index)?;
            buf[..data.len()].copy_from_slice(&data);
            Ok(data.len())
        }

        fn control_out(&self, request: &ControlRequest, data: &[u8]) -> Result<usize> {
            self.log.transfers.borrow_mut().push(RecordedTransfer {
                device: self.id,
                request_type: request.request_type(),
                request: request.request,
                value: request.value,
                index: request.index,
                data: data.to_vec(),
            });
            self.log.check_failure(request.index)?;
            Ok(data.len())
        }

        fn read_string_ascii(&self, _index: u8, buf: &mut [u8]) -> Result<usize> {
            if let Some(code) = self.def.serial_error {
                return Err(DeviceError::Transfer {
                    code,
                    detail: "mock: string descriptor failure injected".into(),
                });
            }
            let serial = self.def.serial.as_deref().unwrap_or_default();
            Ok(copy_ascii(serial, buf))
        }
    }

    impl Drop for MockHandle {
        fn drop(&mut self) {
            self.log.closed.borrow_mut().push(self.id);
        }
    }
}
