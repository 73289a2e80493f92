use std::io;

pub mod device;
pub mod report;
pub mod transport;

pub use transport::{Frame, HidTransport, start_hid_transport};

#[derive(Debug, thiserror::Error)]
pub enum HidError {
    #[error("uhid registration failed: {0}")]
    Register(io::Error),
    #[error("uhid event stream failed: {0}")]
    Read(io::Error),
    #[error("uhid input report failed: {0}")]
    Write(io::Error),
}
