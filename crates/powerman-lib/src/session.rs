//! Session orchestration: enumerate, match, handshake, then play or idle.
//!
//! Ties the matcher, board protocol, and sequencer together the way both CLI
//! modes need them, and maps each stage's failure to its own
//! [`PowermanError`] variant.

use serde::Serialize;

use crate::board::Board;
use crate::config::Config;
use crate::device::{UsbBackend, UsbDevice};
use crate::error::{PowermanError, Result};
use crate::matcher::{self, DeviceFilter};
use crate::melody::{Tempo, Tune};
use crate::protocol::{FirmwareVersion, InitVariant, RequestKind};
use crate::sequencer::{self, CancelToken, PlaybackSummary};

/// Open board handle type produced by backend `B`.
pub type BoardFor<B> = Board<<<B as UsbBackend>::Device as UsbDevice>::Handle>;

/// Everything a session needs besides the backend and the target serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub filter: DeviceFilter,
    pub tempo: Tempo,
    pub init_variant: InitVariant,
    pub request_kind: RequestKind,
    pub tune: Tune,
    /// Stream the tune after initializing. When false the session ends idle.
    pub play: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            filter: DeviceFilter::default(),
            tempo: Tempo::default(),
            init_variant: InitVariant::default(),
            request_kind: RequestKind::default(),
            tune: Tune::default(),
            play: true,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config, play: bool) -> Self {
        SessionOptions {
            filter: config.filter(),
            tempo: config.tempo(),
            init_variant: config.init_variant,
            request_kind: config.request_kind,
            tune: config.tune,
            play,
        }
    }
}

/// How the session ended after a successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum SessionEnd {
    /// Initialized, playback not requested.
    Idle,
    /// Playback ran until cancelled.
    Played(PlaybackSummary),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    pub serial: String,
    pub firmware: FirmwareVersion,
    pub end: SessionEnd,
}

/// Find the board with `serial`, check its firmware version, and initialize it.
pub fn connect<B: UsbBackend>(
    backend: &B,
    serial: &str,
    options: &SessionOptions,
) -> Result<BoardFor<B>> {
    let devices = backend.devices().map_err(PowermanError::Enumeration)?;
    log::debug!("enumerated {} devices", devices.len());

    let handle = matcher::find_board(serial, devices, &options.filter)
        .ok_or_else(|| PowermanError::BoardNotFound(serial.to_string()))?;

    let mut board = Board::new(handle).with_request_kind(options.request_kind);

    let version = board
        .check_firmware_version()
        .map_err(PowermanError::FirmwareCheck)?;
    log::info!("firmware version {version}");

    board
        .initialize(options.init_variant)
        .map_err(PowermanError::Initialize)?;
    log::info!("board initialized ({})", options.init_variant);

    Ok(board)
}

/// Run a full session against the board with `serial`.
///
/// `on_ready` is called once the board is initialized, before playback
/// starts. The board handle is closed on every exit path.
pub fn run_session<B, F>(
    backend: &B,
    serial: &str,
    options: &SessionOptions,
    cancel: &CancelToken,
    on_ready: F,
) -> Result<SessionOutcome>
where
    B: UsbBackend,
    F: FnOnce(&FirmwareVersion),
{
    let board = connect(backend, serial, options)?;
    let firmware = board.firmware().unwrap_or_default();
    on_ready(&firmware);

    let end = if options.play {
        let melody = options.tune.melody();
        let summary = sequencer::play(&board, &melody, options.tempo, cancel)
            .map_err(PowermanError::Playback)?;
        SessionEnd::Played(summary)
    } else {
        SessionEnd::Idle
    };

    Ok(SessionOutcome {
        serial: serial.to_string(),
        firmware,
        end,
    })
}

// ── Device listing ──

/// One device with matching IDs, as shown by the listing mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredBoard {
    pub bus: u8,
    pub address: u8,
    /// `None` when the device could not be opened.
    pub serial: Option<String>,
    pub port_path: Vec<u8>,
}

impl DiscoveredBoard {
    /// Port path as `"1.4.2"`; empty for a root-level device.
    pub fn port_path_display(&self) -> String {
        self.port_path
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// List every device whose IDs pass `filter`.
///
/// Each device is opened only long enough to read its serial. Devices whose
/// descriptor cannot be read are skipped.
pub fn list_boards<B: UsbBackend>(backend: &B, filter: &DeviceFilter) -> Result<Vec<DiscoveredBoard>> {
    let devices = backend.devices().map_err(PowermanError::Enumeration)?;
    let mut found = Vec::new();

    for device in devices {
        let desc = match device.descriptor() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("skipping device: {e}");
                continue;
            }
        };
        if !filter.matches(&desc) {
            continue;
        }

        let serial = match device.open() {
            Ok(handle) => Some(matcher::read_serial(&handle, &desc)),
            Err(e) => {
                log::debug!(
                    "cannot open bus {} device {}: {e}",
                    device.bus_number(),
                    device.address()
                );
                None
            }
        };

        found.push(DiscoveredBoard {
            bus: device.bus_number(),
            address: device.address(),
            serial,
            port_path: device.port_path(),
        });
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockBus, MockDevice};
    use crate::device::status;
    use crate::protocol::{SELECT_FIRMWARE_VERSION, SELECT_PIEZO, SELECT_RUN_LED};

    fn idle() -> SessionOptions {
        SessionOptions {
            play: false,
            ..SessionOptions::default()
        }
    }

    #[test]
    fn idle_session_reports_firmware() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1").with_firmware([1, 2, 3, 4]));
        let mut seen = None;
        let outcome =
            run_session(&bus, "PWR-1", &idle(), &CancelToken::new(), |v| seen = Some(*v)).unwrap();

        assert_eq!(outcome.firmware.bytes(), [1, 2, 3, 4]);
        assert_eq!(outcome.end, SessionEnd::Idle);
        assert_eq!(seen, Some(outcome.firmware));
        assert_eq!(bus.log.transfers_with_index(SELECT_RUN_LED).len(), 1);
        assert!(bus.log.tones().is_empty());
        assert_eq!(bus.log.open_handles(), 0);
    }

    #[test]
    fn enumeration_failure_maps_to_exit_code() {
        let bus = MockBus::new().with_enumeration_error(status::NO_DEVICE);
        let err = run_session(&bus, "PWR-1", &idle(), &CancelToken::new(), |_| {}).unwrap_err();
        assert!(matches!(err, PowermanError::Enumeration(_)));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn missing_board_is_not_found() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1"));
        let err = run_session(&bus, "PWR-2", &idle(), &CancelToken::new(), |_| {}).unwrap_err();
        assert_eq!(err.to_string(), "Could not find board: PWR-2");
        assert_eq!(err.exit_code(), 1);
        assert_eq!(bus.log.open_handles(), 0);
    }

    #[test]
    fn firmware_failure_prevents_init_and_tones() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1"));
        bus.fail_transfer(SELECT_FIRMWARE_VERSION, 0, status::TIMEOUT);
        let mut ready = false;
        let err = run_session(
            &bus,
            "PWR-1",
            &SessionOptions::default(),
            &CancelToken::new(),
            |_| ready = true,
        )
        .unwrap_err();

        assert!(matches!(err, PowermanError::FirmwareCheck(_)));
        assert_eq!(err.exit_code(), 2);
        assert!(!ready);
        assert!(bus.log.transfers_with_index(SELECT_RUN_LED).is_empty());
        assert!(bus.log.transfers_with_index(SELECT_PIEZO).is_empty());
        assert_eq!(bus.log.open_handles(), 0);
    }

    #[test]
    fn init_failure_prevents_tones() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1"));
        bus.fail_transfer(SELECT_RUN_LED, 0, status::PIPE);
        let err = run_session(
            &bus,
            "PWR-1",
            &SessionOptions::default(),
            &CancelToken::new(),
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, PowermanError::Initialize(_)));
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("errcode -9"));
        assert!(bus.log.tones().is_empty());
        assert_eq!(bus.log.open_handles(), 0);
    }

    #[test]
    fn playback_failure_is_reported_and_handle_closed() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1"));
        bus.fail_transfer(SELECT_PIEZO, 3, status::NO_DEVICE);
        let options = SessionOptions {
            tempo: Tempo::new(60_000, 1),
            ..SessionOptions::default()
        };
        let err = run_session(&bus, "PWR-1", &options, &CancelToken::new(), |_| {}).unwrap_err();

        assert!(matches!(err, PowermanError::Playback(_)));
        assert_eq!(err.exit_code(), 20);
        assert_eq!(bus.log.tones().len(), 4);
        assert_eq!(bus.log.open_handles(), 0);
    }

    #[test]
    fn cancelled_playback_returns_summary() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1"));
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome =
            run_session(&bus, "PWR-1", &SessionOptions::default(), &cancel, |_| {}).unwrap();
        assert_eq!(outcome.end, SessionEnd::Played(PlaybackSummary::default()));
    }

    #[test]
    fn ready_runs_after_init_and_before_first_tone() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1"));
        let cancel = CancelToken::new();
        let mut seen = (0, 0);
        let outcome = run_session(&bus, "PWR-1", &SessionOptions::default(), &cancel, |_| {
            seen = (
                bus.log.transfers_with_index(SELECT_RUN_LED).len(),
                bus.log.tones().len(),
            );
            // A stop requested while getting ready plays nothing
            cancel.cancel();
        })
        .unwrap();

        assert_eq!(seen, (1, 0));
        assert_eq!(outcome.end, SessionEnd::Played(PlaybackSummary::default()));
        assert!(bus.log.tones().is_empty());
        assert_eq!(bus.log.open_handles(), 0);
    }

    #[test]
    fn options_follow_config() {
        let config = Config {
            bpm: 100,
            init_variant: InitVariant::Selector12,
            request_kind: RequestKind::Vendor,
            tune: Tune::Yakkety,
            ..Config::default()
        };
        let options = SessionOptions::from_config(&config, false);
        assert_eq!(options.tempo, Tempo::new(100, 8));
        assert_eq!(options.init_variant, InitVariant::Selector12);
        assert_eq!(options.request_kind, RequestKind::Vendor);
        assert_eq!(options.tune, Tune::Yakkety);
        assert!(!options.play);
    }

    #[test]
    fn selector_12_variant_is_sent() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1"));
        let options = SessionOptions {
            init_variant: InitVariant::Selector12,
            ..idle()
        };
        run_session(&bus, "PWR-1", &options, &CancelToken::new(), |_| {}).unwrap();
        assert!(bus.log.transfers_with_index(SELECT_RUN_LED).is_empty());
        assert_eq!(bus.log.transfers_with_index(12).len(), 1);
    }

    // ── list_boards ──

    #[test]
    fn lists_only_matching_devices() {
        let bus = MockBus::new()
            .with(MockDevice::other(0x046D, 0xC52B))
            .with(MockDevice::board("PWR-1").at(1, 5, &[2, 3]))
            .with(MockDevice::board("PWR-2").at(3, 7, &[1]));
        let boards = list_boards(&bus, &DeviceFilter::default()).unwrap();

        assert_eq!(boards.len(), 2);
        assert_eq!(boards[0].serial.as_deref(), Some("PWR-1"));
        assert_eq!((boards[0].bus, boards[0].address), (1, 5));
        assert_eq!(boards[0].port_path_display(), "2.3");
        assert_eq!(boards[1].port_path_display(), "1");
        assert_eq!(bus.log.open_handles(), 0);
    }

    #[test]
    fn unopenable_device_listed_without_serial() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1").with_open_error(status::ACCESS));
        let boards = list_boards(&bus, &DeviceFilter::default()).unwrap();
        assert_eq!(boards.len(), 1);
        assert!(boards[0].serial.is_none());
    }

    #[test]
    fn unreadable_descriptor_not_listed() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1").with_descriptor_error(status::IO));
        assert!(list_boards(&bus, &DeviceFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn listing_enumeration_failure() {
        let bus = MockBus::new().with_enumeration_error(status::ACCESS);
        let err = list_boards(&bus, &DeviceFilter::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn session_end_json_is_tagged() {
        let idle = serde_json::to_value(SessionEnd::Idle).unwrap();
        assert_eq!(idle, serde_json::json!({ "state": "idle" }));

        let played = serde_json::to_value(SessionEnd::Played(PlaybackSummary {
            notes_sent: 10,
            loops: 0,
        }))
        .unwrap();
        assert_eq!(
            played,
            serde_json::json!({ "state": "played", "notes_sent": 10, "loops": 0 })
        );
    }

    #[test]
    fn discovered_board_json_shape() {
        let b = DiscoveredBoard {
            bus: 1,
            address: 4,
            serial: None,
            port_path: vec![2, 1],
        };
        let v = serde_json::to_value(&b).unwrap();
        assert_eq!(v["serial"], serde_json::Value::Null);
        assert_eq!(v["port_path"], serde_json::json!([2, 1]));
    }

    #[test]
    fn empty_port_path_displays_empty() {
        let b = DiscoveredBoard {
            bus: 1,
            address: 1,
            serial: None,
            port_path: vec![],
        };
        assert_eq!(b.port_path_display(), "");
    }
}
