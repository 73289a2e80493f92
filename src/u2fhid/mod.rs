pub mod channel;
pub mod dispatch;
pub mod message;
pub mod packet;
pub mod types;

pub use dispatch::run_u2fhid_loop;
pub use message::Message;

#[derive(Debug, thiserror::Error)]
pub enum U2fHidError {
    #[error("frame is {0} bytes, expected 64")]
    InvalidFrame(usize),
    #[error("channel table full")]
    TableFull,
    #[error("unknown channel {0:#010x}")]
    UnknownChannel(u32),
    #[error("continuation without a transaction")]
    UnexpectedCont,
    #[error("bad sequence number {got}, expected {want}")]
    BadSeq { got: u8, want: u8 },
    #[error("declared length {0} exceeds the message maximum")]
    InvalidLen(u16),
}

impl U2fHidError {
    /// One-byte code carried in a CMD_ERROR reply.
    pub fn code(&self) -> u8 {
        match self {
            Self::InvalidFrame(_) | Self::InvalidLen(_) => types::ERR_INVALID_LEN,
            Self::TableFull => types::ERR_CHANNEL_BUSY,
            Self::UnknownChannel(_) => types::ERR_INVALID_CID,
            Self::UnexpectedCont | Self::BadSeq { .. } => types::ERR_INVALID_SEQ,
        }
    }
}
