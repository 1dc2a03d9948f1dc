//! HID worker driver backed by hidapi.

use crate::directory::HidDescriptor;
use crate::event::{EventPayload, EventRecord, Family};
use crate::funnel::EventSink;
use crate::worker::{DeviceDriver, PollOutcome, WorkerError};
use hidapi::{HidApi, HidDevice};

/// Bounded size of one HID input report read.
const REPORT_BUF: usize = 64;

/// Opens one HID device and converts its input reports into events.
pub struct HidDriver {
    descriptor: HidDescriptor,
}

impl HidDriver {
    pub fn new(descriptor: HidDescriptor) -> Self {
        Self { descriptor }
    }
}

impl DeviceDriver for HidDriver {
    type Handle = HidDevice;

    fn family(&self) -> Family {
        Family::Hid
    }

    fn describe(&self) -> String {
        self.descriptor.label()
    }

    fn open(&mut self) -> Result<HidDevice, WorkerError> {
        let api = HidApi::new()?;
        // Open by path when the descriptor carries one; paths disambiguate
        // multiple interfaces of the same vid:pid.
        let device = match &self.descriptor.path {
            Some(path) => api.open_path(path)?,
            None => api.open(self.descriptor.vendor_id, self.descriptor.product_id)?,
        };
        device.set_blocking_mode(false)?;
        Ok(device)
    }

    fn poll(
        &mut self,
        device: &mut HidDevice,
        sink: &EventSink,
    ) -> Result<PollOutcome, WorkerError> {
        let mut buf = [0u8; REPORT_BUF];
        let n = device.read(&mut buf)?;
        if n == 0 {
            return Ok(PollOutcome::Idle);
        }
        sink.push(EventRecord::new(EventPayload::hid_report(
            buf[..n].to_vec(),
        )));
        Ok(PollOutcome::Events)
    }
}
