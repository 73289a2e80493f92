use zeroize::Zeroizing;

use super::Authenticator;
use super::apdu::*;
use crate::crypto::keys;

/// Reserved first byte of the registration response body.
const REGISTER_ID: u8 = 0x05;
/// Reserved first byte of the registration signature base.
const REGISTER_SIGN_PREFIX: u8 = 0x00;

/// Mint a credential: fresh P-256 keypair, key handle wrapping the private
/// scalar bound to the application parameter, and an attestation signature
/// over `00 || app || challenge || handle || pubkey`.
pub(crate) fn handle(authenticator: &mut Authenticator, request: &Apdu) -> Response {
    if request.data.len() != CHALLENGE_PARAM_SIZE + APPLICATION_PARAM_SIZE {
        return Response::status(SW_WRONG_DATA);
    }
    let (challenge_param, application_param) = request.data.split_at(CHALLENGE_PARAM_SIZE);

    let (scalar, pubkey) = keys::generate();

    let mut handle_plain = Zeroizing::new(Vec::with_capacity(
        keys::SCALAR_SIZE + APPLICATION_PARAM_SIZE,
    ));
    handle_plain.extend_from_slice(scalar.as_slice());
    handle_plain.extend_from_slice(application_param);

    let key_handle = match authenticator.wrap.wrap(&handle_plain) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!("Key handle wrap failed: {e}");
            return Response::status(SW_WRONG_DATA);
        }
    };
    debug_assert!(key_handle.len() <= u8::MAX as usize);

    let mut sign_base =
        Vec::with_capacity(1 + APPLICATION_PARAM_SIZE + CHALLENGE_PARAM_SIZE + key_handle.len() + pubkey.len());
    sign_base.push(REGISTER_SIGN_PREFIX);
    sign_base.extend_from_slice(application_param);
    sign_base.extend_from_slice(challenge_param);
    sign_base.extend_from_slice(&key_handle);
    sign_base.extend_from_slice(&pubkey);
    let signature = authenticator.attestation.sign(&sign_base);

    let cert = authenticator.attestation.cert_der();
    let mut body = Vec::with_capacity(
        1 + pubkey.len() + 1 + key_handle.len() + cert.len() + signature.len(),
    );
    body.push(REGISTER_ID);
    body.extend_from_slice(&pubkey);
    body.push(key_handle.len() as u8);
    body.extend_from_slice(&key_handle);
    body.extend_from_slice(cert);
    body.extend_from_slice(&signature);

    Response::new(body, SW_NO_ERROR)
}
