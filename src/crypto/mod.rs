pub mod attestation;
pub mod keys;
pub mod wrap;

pub use attestation::Attestation;
pub use wrap::KeyWrap;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid P-256 scalar")]
    InvalidScalar,
    #[error("key handle wrap failed")]
    Wrap,
    #[error("key handle unwrap failed")]
    Unwrap,
    #[error("attestation identity: {0}")]
    Attestation(String),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}
