use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::HidError;
use super::device::{DeviceEvent, UhidDevice};
use super::report::HID_REPORT_SIZE;

pub type Frame = [u8; HID_REPORT_SIZE];

/// The device boundary handed to the dispatcher: a stream of inbound
/// frames and a sink for outbound ones. `task` resolves when the device
/// goes away.
pub struct HidTransport {
    pub incoming_rx: mpsc::Receiver<Frame>,
    pub outgoing_tx: mpsc::Sender<Frame>,
    pub task: JoinHandle<Result<(), HidError>>,
}

/// Register the device and start the two blocking pumps bridging its fd to
/// the dispatcher's frame channels. The pumps run on separate threads: a
/// host that blocks for our response would deadlock a single thread that
/// both reads and writes.
pub fn start_hid_transport() -> Result<HidTransport, HidError> {
    let mut device = UhidDevice::register()?;
    let mut writer = device.writer()?;
    tracing::info!("UHID device registered");

    let (incoming_tx, incoming_rx) = mpsc::channel::<Frame>(64);
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Frame>(64);

    // Outbound pump. Frames of one response are queued contiguously by the
    // dispatcher, so they reach the fd in order.
    tokio::task::spawn_blocking(move || {
        while let Some(frame) = outgoing_rx.blocking_recv() {
            if let Err(e) = writer.input(&frame) {
                tracing::error!("Dropping outbound frames: {e}");
                break;
            }
        }
        tracing::debug!("Outbound pump exiting");
    });

    // Inbound pump.
    let task = tokio::task::spawn_blocking(move || {
        loop {
            match device.next_event()? {
                DeviceEvent::Frame(frame) => {
                    if incoming_tx.blocking_send(frame).is_err() {
                        return Ok(());
                    }
                }
                DeviceEvent::Stopped => {
                    tracing::info!("Device stopped by the kernel");
                    return Ok(());
                }
            }
        }
    });

    Ok(HidTransport {
        incoming_rx,
        outgoing_tx,
        task,
    })
}
