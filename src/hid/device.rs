use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use uhid_virt::{Bus, CreateParams, InputEvent, OutputEvent, StreamError, UHID_EVENT_SIZE};

use super::HidError;
use super::report::{HID_REPORT_SIZE, REPORT_DESCRIPTOR};
use crate::config::{DEVICE_NAME, USB_PRODUCT_ID, USB_VENDOR_ID};

const UHID_PATH: &str = "/dev/uhid";

/// The kernel events the transport acts on; everything else (open/close,
/// feature-report chatter) is logged and swallowed by [`UhidDevice::next_event`].
pub enum DeviceEvent {
    /// One 64-byte output report from the host, report-ID byte stripped.
    Frame([u8; HID_REPORT_SIZE]),
    /// The kernel tore the device down.
    Stopped,
}

/// A registered virtual HID device. Reading is `&mut self`; a cloned
/// [`UhidWriter`] feeds input reports from another thread.
pub struct UhidDevice {
    file: File,
}

pub struct UhidWriter {
    file: File,
}

impl UhidDevice {
    /// Open /dev/uhid in blocking mode and announce the U2F token to the
    /// kernel under the identity from `config`.
    pub fn register() -> Result<Self, HidError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(UHID_PATH)
            .map_err(HidError::Register)?;

        let create = CreateParams {
            name: DEVICE_NAME.to_string(),
            phys: String::new(),
            uniq: String::new(),
            bus: Bus::USB,
            vendor: USB_VENDOR_ID,
            product: USB_PRODUCT_ID,
            version: 0,
            country: 0,
            rd_data: REPORT_DESCRIPTOR.to_vec(),
        };
        let event: [u8; UHID_EVENT_SIZE] = InputEvent::Create(create).into();
        file.write_all(&event).map_err(HidError::Register)?;

        Ok(Self { file })
    }

    pub fn writer(&self) -> Result<UhidWriter, HidError> {
        let file = self.file.try_clone().map_err(HidError::Register)?;
        Ok(UhidWriter { file })
    }

    /// Block until the host delivers a frame or the kernel stops the device.
    pub fn next_event(&mut self) -> Result<DeviceEvent, HidError> {
        let mut buf = [0u8; UHID_EVENT_SIZE];
        loop {
            self.file.read_exact(&mut buf).map_err(HidError::Read)?;
            match OutputEvent::try_from(buf) {
                Ok(OutputEvent::Output { data }) => {
                    tracing::trace!(raw_len = data.len(), "uhid output report");
                    return Ok(DeviceEvent::Frame(normalize_report(&data)));
                }
                Ok(OutputEvent::Stop) => return Ok(DeviceEvent::Stopped),
                Ok(other) => log_lifecycle(&other),
                Err(StreamError::UnknownEventType(t)) => {
                    tracing::debug!("uhid event type {t} not understood, skipping");
                }
                Err(StreamError::Io(e)) => return Err(HidError::Read(e)),
            }
        }
    }
}

impl UhidWriter {
    /// Queue one 64-byte input report to the kernel.
    pub fn input(&mut self, frame: &[u8; HID_REPORT_SIZE]) -> Result<(), HidError> {
        let event: [u8; UHID_EVENT_SIZE] = InputEvent::Input { data: frame }.into();
        self.file.write_all(&event).map_err(HidError::Write)
    }
}

/// hidraw prepends a zero report-ID byte when the descriptor declares no
/// report IDs; drop it so the codec sees the frame starting at the cid.
/// Short reports are zero-padded to a full frame.
fn normalize_report(data: &[u8]) -> [u8; HID_REPORT_SIZE] {
    let body = match data {
        [0, rest @ ..] if rest.len() == HID_REPORT_SIZE => rest,
        _ => data,
    };
    let mut frame = [0u8; HID_REPORT_SIZE];
    let len = body.len().min(HID_REPORT_SIZE);
    frame[..len].copy_from_slice(&body[..len]);
    frame
}

fn log_lifecycle(event: &OutputEvent) {
    match event {
        OutputEvent::Open => tracing::info!("Host opened the device"),
        OutputEvent::Close => tracing::info!("Host closed the device"),
        OutputEvent::Start { .. } => tracing::debug!("Device started"),
        OutputEvent::GetReport { .. } | OutputEvent::SetReport { .. } => {
            tracing::debug!("Feature report request ignored");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_report_id() {
        let mut raw = vec![0u8];
        raw.extend_from_slice(&[0xAB; HID_REPORT_SIZE]);
        let frame = normalize_report(&raw);
        assert_eq!(frame, [0xAB; HID_REPORT_SIZE]);
    }

    #[test]
    fn test_normalize_keeps_bare_frame() {
        // A 64-byte report starting with 0x00 is a frame whose cid begins
        // with zero, not a report-ID prefix; it must pass through untouched.
        let mut raw = [0x11u8; HID_REPORT_SIZE];
        raw[0] = 0x00;
        let frame = normalize_report(&raw);
        assert_eq!(frame, raw);
    }

    #[test]
    fn test_normalize_pads_short_report() {
        let frame = normalize_report(&[0xCD; 10]);
        assert_eq!(&frame[..10], &[0xCD; 10]);
        assert!(frame[10..].iter().all(|&b| b == 0));
    }
}
