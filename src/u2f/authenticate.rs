use zeroize::Zeroizing;

use super::Authenticator;
use super::apdu::*;
use crate::counter::CounterError;
use crate::crypto::keys;

struct AuthRequest<'a> {
    challenge_param: &'a [u8],
    application_param: &'a [u8],
    key_handle: &'a [u8],
}

impl<'a> AuthRequest<'a> {
    /// Data layout: challenge(32) || application(32) || handle_len(1) ||
    /// handle. The declared handle length is the only length used; a
    /// mismatch with the actual data is wrong data.
    fn parse(data: &'a [u8]) -> Option<Self> {
        let fixed = CHALLENGE_PARAM_SIZE + APPLICATION_PARAM_SIZE + 1;
        if data.len() < fixed {
            return None;
        }
        let handle_len = data[fixed - 1] as usize;
        if data.len() != fixed + handle_len {
            return None;
        }
        Some(Self {
            challenge_param: &data[..CHALLENGE_PARAM_SIZE],
            application_param: &data[CHALLENGE_PARAM_SIZE..CHALLENGE_PARAM_SIZE + APPLICATION_PARAM_SIZE],
            key_handle: &data[fixed..],
        })
    }
}

/// Unwrap the key handle and branch on the p1 control byte. Every
/// data-dependent failure collapses to SW_WRONG_DATA so a caller learns
/// nothing about why a handle was rejected.
pub(crate) fn handle(
    authenticator: &mut Authenticator,
    request: &Apdu,
) -> Result<Response, CounterError> {
    let Some(auth) = AuthRequest::parse(&request.data) else {
        return Ok(Response::status(SW_WRONG_DATA));
    };

    let handle_plain = match authenticator.wrap.unwrap(auth.key_handle) {
        Ok(plain) => plain,
        Err(_) => {
            tracing::warn!("Key handle rejected");
            return Ok(Response::status(SW_WRONG_DATA));
        }
    };
    if handle_plain.len() != keys::SCALAR_SIZE + APPLICATION_PARAM_SIZE {
        return Ok(Response::status(SW_WRONG_DATA));
    }
    let (scalar, wrapped_application) = handle_plain.split_at(keys::SCALAR_SIZE);
    if wrapped_application != auth.application_param {
        tracing::warn!("Application parameter mismatch");
        return Ok(Response::status(SW_WRONG_DATA));
    }

    match request.p1 {
        // The handle is ours and bound to this application; an actual
        // assertion would additionally need user presence.
        U2F_AUTH_CHECK => Ok(Response::status(SW_CONDITIONS_NOT_SATISFIED)),
        U2F_AUTH_ENFORCE => {
            if !authenticator.presence.user_present() {
                tracing::info!("User presence denied");
                return Ok(Response::status(SW_CONDITIONS_NOT_SATISFIED));
            }
            sign_assertion(authenticator, scalar, &auth, 0x01)
        }
        U2F_AUTH_NO_ENFORCE => sign_assertion(authenticator, scalar, &auth, 0x00),
        p1 => {
            tracing::warn!(p1 = format!("{p1:#04x}"), "Unknown authenticate control byte");
            Ok(Response::status(SW_WRONG_DATA))
        }
    }
}

/// Body: presence(1) || counter(4, BE) || DER signature over
/// `application || presence || counter || challenge`.
fn sign_assertion(
    authenticator: &mut Authenticator,
    scalar: &[u8],
    auth: &AuthRequest<'_>,
    presence: u8,
) -> Result<Response, CounterError> {
    let key = match keys::import(scalar) {
        Ok(key) => key,
        Err(_) => return Ok(Response::status(SW_WRONG_DATA)),
    };

    let counter = authenticator.counter.next()?;
    tracing::info!(counter, "Counter incremented");

    let mut sign_base = Zeroizing::new(Vec::with_capacity(
        APPLICATION_PARAM_SIZE + 1 + 4 + CHALLENGE_PARAM_SIZE,
    ));
    sign_base.extend_from_slice(auth.application_param);
    sign_base.push(presence);
    sign_base.extend_from_slice(&counter.to_be_bytes());
    sign_base.extend_from_slice(auth.challenge_param);
    let signature = keys::sign(&key, &sign_base);

    let mut body = Vec::with_capacity(1 + 4 + signature.len());
    body.push(presence);
    body.extend_from_slice(&counter.to_be_bytes());
    body.extend_from_slice(&signature);

    Ok(Response::new(body, SW_NO_ERROR))
}
