pub mod apdu;
mod authenticate;
mod register;
mod version;

use crate::counter::{Counter, CounterError};
use crate::crypto::{Attestation, KeyWrap};
use crate::up::UserPresence;
use apdu::*;

/// The U2F raw-message state machine with its capability set injected:
/// wrapping key, attestation identity, signature counter and the
/// user-presence test. Everything data-dependent answers with a status
/// word; only counter persistence failure escapes as an error.
pub struct Authenticator {
    pub(crate) wrap: KeyWrap,
    pub(crate) attestation: Attestation,
    pub(crate) counter: Counter,
    pub(crate) presence: Box<dyn UserPresence>,
}

impl Authenticator {
    pub fn new(
        wrap: KeyWrap,
        attestation: Attestation,
        counter: Counter,
        presence: Box<dyn UserPresence>,
    ) -> Self {
        Self {
            wrap,
            attestation,
            counter,
            presence,
        }
    }

    /// Handle one CMD_MSG payload; the return value is the full response
    /// payload, status word included.
    pub fn handle_msg(&mut self, payload: &[u8]) -> Result<Vec<u8>, CounterError> {
        let Some(request) = Apdu::parse(payload) else {
            tracing::warn!("Malformed APDU ({} bytes)", payload.len());
            return Ok(Response::status(SW_WRONG_DATA).encode());
        };

        if request.cla != 0 {
            tracing::warn!(cla = format!("{:#04x}", request.cla), "Unsupported CLA");
            return Ok(Response::status(SW_CLA_NOT_SUPPORTED).encode());
        }

        let response = match request.ins {
            U2F_REGISTER => {
                tracing::info!("REGISTER");
                register::handle(self, &request)
            }
            U2F_AUTHENTICATE => {
                tracing::info!(p1 = format!("{:#04x}", request.p1), "AUTHENTICATE");
                authenticate::handle(self, &request)?
            }
            U2F_VERSION => {
                tracing::debug!("VERSION");
                version::handle(&request)
            }
            ins => {
                tracing::warn!(ins = format!("{ins:#04x}"), "Unsupported INS");
                Response::status(SW_INS_NOT_SUPPORTED)
            }
        };

        Ok(response.encode())
    }
}
