#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HID: {0}")]
    Hid(#[from] crate::hid::HidError),
    #[error("U2FHID: {0}")]
    U2fHid(#[from] crate::u2fhid::U2fHidError),
    #[error("Crypto: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),
    #[error("Counter: {0}")]
    Counter(#[from] crate::counter::CounterError),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Startup(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
