//! Raw USB worker driver backed by rusb.
//!
//! Unlike the single-stream families, failures here are tolerated per
//! endpoint: a stalled or timed-out endpoint must not kill the whole reader.
//! Only losing the device itself (the active configuration can no longer be
//! queried) terminates the worker.

use crate::directory::UsbDescriptor;
use crate::event::{EventPayload, EventRecord, Family};
use crate::funnel::EventSink;
use crate::worker::{DeviceDriver, PollOutcome, WorkerError};
use rusb::{DeviceHandle, Direction, GlobalContext, TransferType};
use std::time::Duration;

/// Per-endpoint read timeout; short so one quiet endpoint does not starve
/// the others within a cycle.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Polls every IN endpoint of a device's active configuration.
pub struct UsbDriver {
    descriptor: UsbDescriptor,
    claimed: Vec<u8>,
}

impl UsbDriver {
    pub fn new(descriptor: UsbDescriptor) -> Self {
        Self {
            descriptor,
            claimed: Vec::new(),
        }
    }
}

impl DeviceDriver for UsbDriver {
    type Handle = DeviceHandle<GlobalContext>;

    fn family(&self) -> Family {
        Family::Usb
    }

    fn describe(&self) -> String {
        self.descriptor.label()
    }

    fn open(&mut self) -> Result<DeviceHandle<GlobalContext>, WorkerError> {
        let handle = self.descriptor.device.open()?;
        // Not supported on every platform; reads may still work without it.
        let _ = handle.set_auto_detach_kernel_driver(true);

        // Claim what we can. Interfaces held by a kernel driver stay with
        // it; those endpoints will simply report errors we swallow per-poll.
        if let Ok(config) = self.descriptor.device.active_config_descriptor() {
            for interface in config.interfaces() {
                let number = interface.number();
                if handle.claim_interface(number).is_ok() {
                    self.claimed.push(number);
                }
            }
        }
        Ok(handle)
    }

    fn poll(
        &mut self,
        handle: &mut DeviceHandle<GlobalContext>,
        sink: &EventSink,
    ) -> Result<PollOutcome, WorkerError> {
        // Losing the configuration means the device is gone: fatal.
        let config = self.descriptor.device.active_config_descriptor()?;

        let mut pushed = false;
        for interface in config.interfaces() {
            for desc in interface.descriptors() {
                for endpoint in desc.endpoint_descriptors() {
                    if endpoint.direction() != Direction::In {
                        continue;
                    }
                    let mut buf = vec![0u8; endpoint.max_packet_size() as usize];
                    let read = match endpoint.transfer_type() {
                        TransferType::Interrupt => {
                            handle.read_interrupt(endpoint.address(), &mut buf, READ_TIMEOUT)
                        }
                        TransferType::Bulk => {
                            handle.read_bulk(endpoint.address(), &mut buf, READ_TIMEOUT)
                        }
                        // Control and isochronous endpoints are not polled.
                        _ => continue,
                    };
                    // Endpoint-level failures (timeouts included) are
                    // swallowed; the next cycle tries again.
                    if let Ok(n) = read {
                        if n > 0 {
                            buf.truncate(n);
                            sink.push(EventRecord::new(EventPayload::Usb {
                                endpoint: endpoint.address(),
                                data: buf,
                            }));
                            pushed = true;
                        }
                    }
                }
            }
        }

        Ok(if pushed {
            PollOutcome::Events
        } else {
            PollOutcome::Idle
        })
    }

    fn close(&mut self, handle: DeviceHandle<GlobalContext>, _sink: &EventSink) {
        for number in self.claimed.drain(..) {
            let _ = handle.release_interface(number);
        }
    }
}
