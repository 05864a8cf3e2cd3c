//! Device matching: find the one board with a given serial.

use serde::{Deserialize, Serialize};

use crate::device::{ControlIo, UsbDevice};
use crate::protocol::{
    DeviceDescriptor, POWER_PRODUCT_ID, POWER_VENDOR_ID, SERIAL_BUFFER_LEN, decode_serial,
};

/// Vendor/product pair a device must report to be considered a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        DeviceFilter {
            vendor_id: POWER_VENDOR_ID,
            product_id: POWER_PRODUCT_ID,
        }
    }
}

impl DeviceFilter {
    pub fn matches(&self, desc: &DeviceDescriptor) -> bool {
        desc.vendor_id == self.vendor_id && desc.product_id == self.product_id
    }
}

/// Read a device's serial through an open handle.
///
/// A failed read yields an empty string, which never matches a real target.
pub fn read_serial(handle: &impl ControlIo, desc: &DeviceDescriptor) -> String {
    let mut buf = [0u8; SERIAL_BUFFER_LEN];
    match handle.read_string_ascii(desc.serial_index, &mut buf) {
        Ok(n) => decode_serial(&buf[..n.min(buf.len())]),
        Err(e) => {
            log::debug!("serial read failed: {e}");
            String::new()
        }
    }
}

/// Find the first device whose IDs pass `filter` and whose serial equals
/// `target_serial` exactly (case-sensitive, untrimmed).
///
/// Devices whose descriptor cannot be read, whose IDs differ, or which cannot
/// be opened are skipped. Every handle opened for a non-matching device is
/// closed before the next device is examined; only the returned handle
/// survives.
pub fn find_board<D, I>(target_serial: &str, devices: I, filter: &DeviceFilter) -> Option<D::Handle>
where
    D: UsbDevice,
    I: IntoIterator<Item = D>,
{
    for device in devices {
        let desc = match device.descriptor() {
            Ok(d) => d,
            Err(e) => {
                log::debug!(
                    "skipping bus {} device {}: {e}",
                    device.bus_number(),
                    device.address()
                );
                continue;
            }
        };

        if !filter.matches(&desc) {
            continue;
        }

        let handle = match device.open() {
            Ok(h) => h,
            Err(e) => {
                log::debug!(
                    "skipping bus {} device {}: {e}",
                    device.bus_number(),
                    device.address()
                );
                continue;
            }
        };

        let serial = read_serial(&handle, &desc);
        if serial == target_serial {
            log::info!(
                "matched board {serial} at bus {} device {}",
                device.bus_number(),
                device.address()
            );
            return Some(handle);
        }

        log::debug!("board {serial:?} is not {target_serial:?}");
        drop(handle);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::UsbBackend;
    use crate::device::mock::{MockBus, MockDevice};
    use crate::device::status;

    fn find(bus: &MockBus, serial: &str) -> Option<crate::device::mock::MockHandle> {
        find_board(serial, bus.devices().unwrap(), &DeviceFilter::default())
    }

    #[test]
    fn empty_bus_finds_nothing() {
        let bus = MockBus::new();
        assert!(find(&bus, "A").is_none());
    }

    #[test]
    fn no_matching_ids_opens_nothing() {
        let bus = MockBus::new()
            .with(MockDevice::other(0x046D, 0xC52B))
            .with(MockDevice::other(0x1BDA, 0x0012))
            .with(MockDevice::other(0x1BDB, 0x0011));
        assert!(find(&bus, "OTHER").is_none());
        assert!(bus.log.opened.borrow().is_empty());
        assert_eq!(bus.log.open_handles(), 0);
    }

    #[test]
    fn single_board_matches() {
        let bus = MockBus::new()
            .with(MockDevice::other(0x046D, 0xC52B))
            .with(MockDevice::board("PWR-1"));
        let handle = find(&bus, "PWR-1").expect("board should match");
        assert_eq!(handle.id(), 1);
        assert_eq!(bus.log.open_handles(), 1);
        assert!(bus.log.closed.borrow().is_empty());
    }

    #[test]
    fn two_boards_picks_the_right_one() {
        let bus = MockBus::new()
            .with(MockDevice::board("PWR-1"))
            .with(MockDevice::board("PWR-2"));
        let handle = find(&bus, "PWR-2").unwrap();
        assert_eq!(handle.id(), 1);
        assert_eq!(*bus.log.closed.borrow(), vec![0]);
        assert_eq!(bus.log.open_handles(), 1);
    }

    #[test]
    fn two_boards_neither_matches() {
        let bus = MockBus::new()
            .with(MockDevice::board("PWR-1"))
            .with(MockDevice::board("PWR-2"));
        assert!(find(&bus, "PWR-3").is_none());
        assert_eq!(*bus.log.opened.borrow(), vec![0, 1]);
        assert_eq!(*bus.log.closed.borrow(), vec![0, 1]);
    }

    #[test]
    fn first_match_wins() {
        let bus = MockBus::new()
            .with(MockDevice::board("DUP"))
            .with(MockDevice::board("DUP"));
        let handle = find(&bus, "DUP").unwrap();
        assert_eq!(handle.id(), 0);
        assert_eq!(*bus.log.opened.borrow(), vec![0]);
    }

    #[test]
    fn serial_compare_is_exact() {
        let bus = MockBus::new().with(MockDevice::board("Pwr-1"));
        assert!(find(&bus, "PWR-1").is_none());
        assert!(find(&bus, "Pwr-1 ").is_none());
        assert!(find(&bus, "Pwr").is_none());
        assert!(find(&bus, "Pwr-1").is_some());
    }

    #[test]
    fn unreadable_descriptor_is_skipped() {
        let bus = MockBus::new()
            .with(MockDevice::board("PWR-1").with_descriptor_error(status::IO))
            .with(MockDevice::board("PWR-1"));
        let handle = find(&bus, "PWR-1").unwrap();
        assert_eq!(handle.id(), 1);
        assert_eq!(*bus.log.opened.borrow(), vec![1]);
    }

    #[test]
    fn open_failure_is_skipped() {
        let bus = MockBus::new()
            .with(MockDevice::board("PWR-1").with_open_error(status::ACCESS))
            .with(MockDevice::board("PWR-1"));
        let handle = find(&bus, "PWR-1").unwrap();
        assert_eq!(handle.id(), 1);
    }

    #[test]
    fn failed_serial_read_never_matches_and_is_closed() {
        let bus = MockBus::new().with(MockDevice::board("PWR-1").with_serial_error(status::PIPE));
        assert!(find(&bus, "PWR-1").is_none());
        assert_eq!(bus.log.open_handles(), 0);
    }

    #[test]
    fn custom_filter_is_honoured() {
        let bus = MockBus::new()
            .with(MockDevice::board("PWR-1"))
            .with(MockDevice::other(0x1234, 0x5678));
        let filter = DeviceFilter {
            vendor_id: 0x1234,
            product_id: 0x5678,
        };
        let handle = find_board("OTHER", bus.devices().unwrap(), &filter).unwrap();
        assert_eq!(handle.id(), 1);
        assert!(!bus.log.opened.borrow().contains(&0));
    }

    #[test]
    fn device_without_serial_matches_empty_target_only() {
        let bus = MockBus::new().with(MockDevice::board("x").without_serial());
        assert!(find(&bus, "x").is_none());
        assert!(find(&bus, "").is_some());
    }
}
