//! Device Directory: stateless enumeration of attachable devices.
//!
//! One function per family. A missing or broken driver layer is never an
//! error here: the family simply enumerates as empty, with a warning in the
//! diagnostic log.

use hidapi::HidApi;
use rusb::{Device, GlobalContext, UsbContext};
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use thiserror::Error;
use tracing::warn;

/// Identifies one HID device. `path` is preferred for opening because it
/// disambiguates multiple interfaces sharing a vid:pid.
#[derive(Debug, Clone)]
pub struct HidDescriptor {
    pub path: Option<CString>,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
}

impl HidDescriptor {
    pub fn label(&self) -> String {
        match &self.product {
            Some(product) if !product.is_empty() => product.clone(),
            _ => format!("HID {:04x}:{:04x}", self.vendor_id, self.product_id),
        }
    }
}

/// Identifies one serial (COM) port by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialDescriptor {
    pub port_name: String,
}

impl SerialDescriptor {
    pub fn label(&self) -> String {
        self.port_name.clone()
    }
}

/// Identifies one raw USB device. Carries the rusb device so the worker can
/// open exactly the enumerated device, not a vid:pid lookalike.
#[derive(Debug, Clone)]
pub struct UsbDescriptor {
    pub device: Device<GlobalContext>,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbDescriptor {
    pub fn label(&self) -> String {
        format!("USB {:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// List HID devices, or nothing when hidapi cannot initialize.
pub fn hid_devices() -> Vec<HidDescriptor> {
    match HidApi::new() {
        Ok(api) => api
            .device_list()
            .map(|info| HidDescriptor {
                path: Some(info.path().to_owned()).filter(|p| !p.as_bytes().is_empty()),
                vendor_id: info.vendor_id(),
                product_id: info.product_id(),
                product: info.product_string().map(str::to_string),
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "hidapi unavailable, no HID devices listed");
            Vec::new()
        }
    }
}

/// List serial ports, or nothing when the platform query fails.
pub fn serial_ports() -> Vec<SerialDescriptor> {
    match serialport::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|port| SerialDescriptor {
                port_name: port.port_name,
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "serial enumeration unavailable, no ports listed");
            Vec::new()
        }
    }
}

/// List raw USB devices, or nothing when libusb is unavailable. Devices
/// whose descriptor cannot be queried are skipped.
pub fn usb_devices() -> Vec<UsbDescriptor> {
    match GlobalContext::default().devices() {
        Ok(list) => list
            .iter()
            .filter_map(|device| {
                let desc = device.device_descriptor().ok()?;
                Some(UsbDescriptor {
                    vendor_id: desc.vendor_id(),
                    product_id: desc.product_id(),
                    device,
                })
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "libusb unavailable, no USB devices listed");
            Vec::new()
        }
    }
}

/// One row of the unified device listing. HID and USB rows carry their
/// position in the family's enumeration so a listing can print the selector
/// that resolves back to the same device.
#[derive(Debug, Clone)]
pub enum DeviceEntry {
    Hid {
        index: usize,
        descriptor: HidDescriptor,
    },
    Usb {
        index: usize,
        descriptor: UsbDescriptor,
    },
    Serial { descriptor: SerialDescriptor },
}

impl DeviceEntry {
    /// Short family tag for listings ("HID"/"USB"/"COM").
    pub fn family_tag(&self) -> &'static str {
        match self {
            DeviceEntry::Hid { .. } => "HID",
            DeviceEntry::Usb { .. } => "USB",
            DeviceEntry::Serial { .. } => "COM",
        }
    }

    pub fn label(&self) -> String {
        match self {
            DeviceEntry::Hid { descriptor, .. } => descriptor.label(),
            DeviceEntry::Usb { descriptor, .. } => descriptor.label(),
            DeviceEntry::Serial { descriptor } => descriptor.label(),
        }
    }

    /// Selector string accepted by [`DeviceSelector::parse`].
    pub fn selector(&self) -> String {
        match self {
            DeviceEntry::Hid { index, .. } => format!("hid:{index}"),
            DeviceEntry::Usb { index, .. } => format!("usb:{index}"),
            DeviceEntry::Serial { descriptor } => format!("com:{}", descriptor.port_name),
        }
    }

    fn matches(&self, filter: &str) -> bool {
        self.label().to_lowercase().contains(filter)
    }
}

/// Enumerate every family, optionally filtered by a case-insensitive
/// substring of the label. Indices are assigned before the filter runs, so
/// a filtered listing still shows selectors that resolve against the full
/// per-family enumeration.
pub fn all_devices(filter: Option<&str>) -> Vec<DeviceEntry> {
    let entries = hid_devices()
        .into_iter()
        .enumerate()
        .map(|(index, descriptor)| DeviceEntry::Hid { index, descriptor })
        .chain(
            usb_devices()
                .into_iter()
                .enumerate()
                .map(|(index, descriptor)| DeviceEntry::Usb { index, descriptor }),
        )
        .chain(
            serial_ports()
                .into_iter()
                .map(|descriptor| DeviceEntry::Serial { descriptor }),
        )
        .collect();
    match filter {
        Some(filter) => filter_entries(entries, filter),
        None => entries,
    }
}

/// Case-insensitive substring filter over entry labels.
pub fn filter_entries(entries: Vec<DeviceEntry>, filter: &str) -> Vec<DeviceEntry> {
    let needle = filter.trim().to_lowercase();
    if needle.is_empty() {
        return entries;
    }
    entries
        .into_iter()
        .filter(|entry| entry.matches(&needle))
        .collect()
}

/// Parse failure for a device selector string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector must look like FAMILY:WHICH (e.g. hid:0, usb:1, com:COM3)")]
    Malformed,
    #[error("unknown device family: {0}")]
    UnknownFamily(String),
    #[error("device index is not a number: {0}")]
    BadIndex(String),
}

/// A user's device selection: family plus a family-local index, or a port
/// name for serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Hid(usize),
    Usb(usize),
    Serial(String),
}

impl DeviceSelector {
    pub fn parse(s: &str) -> Result<Self, SelectorError> {
        let (family, which) = s.split_once(':').ok_or(SelectorError::Malformed)?;
        let which = which.trim();
        if which.is_empty() {
            return Err(SelectorError::Malformed);
        }
        match family.trim().to_lowercase().as_str() {
            "hid" => Ok(DeviceSelector::Hid(parse_index(which)?)),
            "usb" => Ok(DeviceSelector::Usb(parse_index(which)?)),
            "com" | "serial" => Ok(DeviceSelector::Serial(which.to_string())),
            other => Err(SelectorError::UnknownFamily(other.to_string())),
        }
    }
}

fn parse_index(s: &str) -> Result<usize, SelectorError> {
    s.parse().map_err(|_| SelectorError::BadIndex(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hid_entry(index: usize, product: &str) -> DeviceEntry {
        DeviceEntry::Hid {
            index,
            descriptor: HidDescriptor {
                path: None,
                vendor_id: 0x046d,
                product_id: 0xc52b,
                product: Some(product.to_string()),
            },
        }
    }

    #[test]
    fn test_enumeration_tolerates_missing_drivers() {
        // Whatever the host looks like, enumeration returns a list, never
        // an error or a panic.
        let _ = hid_devices();
        let _ = serial_ports();
        let _ = usb_devices();
    }

    #[test]
    fn test_filter_is_case_insensitive_substring() {
        let entries = vec![
            hid_entry(0, "Logitech Receiver"),
            hid_entry(1, "Apple Keyboard"),
            DeviceEntry::Serial {
                descriptor: SerialDescriptor {
                    port_name: "/dev/ttyUSB0".into(),
                },
            },
        ];

        let filtered = filter_entries(entries.clone(), "keyboard");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].label(), "Apple Keyboard");

        let all = filter_entries(entries, "  ");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_entry_selectors_survive_filtering() {
        let entries = vec![
            hid_entry(0, "Logitech Receiver"),
            hid_entry(1, "Apple Keyboard"),
            DeviceEntry::Serial {
                descriptor: SerialDescriptor {
                    port_name: "/dev/ttyUSB0".into(),
                },
            },
        ];

        // A filtered row keeps the selector of its unfiltered position, and
        // the selector string parses back to the matching selection.
        let filtered = filter_entries(entries, "keyboard");
        assert_eq!(filtered[0].selector(), "hid:1");
        assert_eq!(
            DeviceSelector::parse(&filtered[0].selector()),
            Ok(DeviceSelector::Hid(1))
        );

        let serial = DeviceEntry::Serial {
            descriptor: SerialDescriptor {
                port_name: "/dev/ttyUSB0".into(),
            },
        };
        assert_eq!(
            DeviceSelector::parse(&serial.selector()),
            Ok(DeviceSelector::Serial("/dev/ttyUSB0".into()))
        );
    }

    #[test]
    fn test_hid_label_falls_back_to_ids() {
        let anon = HidDescriptor {
            path: None,
            vendor_id: 0x1234,
            product_id: 0xabcd,
            product: None,
        };
        assert_eq!(anon.label(), "HID 1234:abcd");
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!(DeviceSelector::parse("hid:2"), Ok(DeviceSelector::Hid(2)));
        assert_eq!(DeviceSelector::parse("USB:0"), Ok(DeviceSelector::Usb(0)));
        assert_eq!(
            DeviceSelector::parse("com:COM3"),
            Ok(DeviceSelector::Serial("COM3".into()))
        );
        assert_eq!(
            DeviceSelector::parse("serial:/dev/ttyUSB0"),
            Ok(DeviceSelector::Serial("/dev/ttyUSB0".into()))
        );

        assert_eq!(DeviceSelector::parse("hid"), Err(SelectorError::Malformed));
        assert_eq!(
            DeviceSelector::parse("gpu:0"),
            Err(SelectorError::UnknownFamily("gpu".into()))
        );
        assert_eq!(
            DeviceSelector::parse("hid:first"),
            Err(SelectorError::BadIndex("first".into()))
        );
    }
}
