use p256::ecdsa::SigningKey;
use rand::RngCore;
use rand::rngs::OsRng;
use std::fs;
use std::path::Path;
use zeroize::Zeroizing;

use super::{CryptoError, keys};

pub const KEY_FILE: &str = "attestation.key";
pub const CERT_FILE: &str = "attestation.der";

/// The attestation identity: a P-256 key and a minimal self-signed X.509
/// certificate, generated once into the data dir and constant afterwards.
/// Relying parties verify the registration signature against this
/// certificate; U2F does not require a CA chain.
pub struct Attestation {
    key: SigningKey,
    cert_der: Vec<u8>,
}

impl Attestation {
    pub fn load_or_create(dir: &Path) -> Result<Self, CryptoError> {
        let key_path = dir.join(KEY_FILE);
        let cert_path = dir.join(CERT_FILE);

        match (key_path.exists(), cert_path.exists()) {
            (true, true) => {
                let scalar = Zeroizing::new(fs::read(&key_path)?);
                let key = keys::import(&scalar).map_err(|_| {
                    CryptoError::Attestation(format!(
                        "{} is not a valid P-256 scalar",
                        key_path.display()
                    ))
                })?;
                let cert_der = fs::read(&cert_path)?;
                Ok(Self { key, cert_der })
            }
            (false, false) => {
                let key = SigningKey::random(&mut OsRng);
                let cert_der = build_self_signed_cert(&key);
                let scalar: Zeroizing<[u8; 32]> = Zeroizing::new(key.to_bytes().into());
                fs::write(&key_path, scalar.as_slice())?;
                fs::write(&cert_path, &cert_der)?;
                tracing::info!(path = %cert_path.display(), "Generated attestation identity");
                Ok(Self { key, cert_der })
            }
            _ => Err(CryptoError::Attestation(
                "partial attestation identity on disk; wipe and restart".into(),
            )),
        }
    }

    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        keys::sign(&self.key, msg)
    }

    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    pub fn public_key(&self) -> [u8; keys::PUBKEY_SIZE] {
        self.key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .try_into()
            .expect("uncompressed P-256 point is 65 bytes")
    }
}

// Minimal DER writer, enough for one certificate.

const OID_EC_PUBLIC_KEY: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];
const OID_PRIME256V1: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
const OID_ECDSA_WITH_SHA256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02];
const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    match content.len() {
        len if len < 0x80 => out.push(len as u8),
        len if len <= 0xFF => {
            out.push(0x81);
            out.push(len as u8);
        }
        len => {
            out.push(0x82);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
    }
    out.extend_from_slice(content);
    out
}

fn der_sequence(parts: &[&[u8]]) -> Vec<u8> {
    tlv(0x30, &parts.concat())
}

fn der_integer(n: &[u8]) -> Vec<u8> {
    let n: Vec<u8> = n.iter().skip_while(|&&b| b == 0).copied().collect();
    let n = if n.is_empty() { vec![0u8] } else { n };
    if n[0] & 0x80 != 0 {
        let mut padded = vec![0u8];
        padded.extend_from_slice(&n);
        tlv(0x02, &padded)
    } else {
        tlv(0x02, &n)
    }
}

fn der_oid(oid: &[u8]) -> Vec<u8> {
    tlv(0x06, oid)
}

fn der_bit_string(bytes: &[u8]) -> Vec<u8> {
    let mut content = vec![0u8]; // no unused bits
    content.extend_from_slice(bytes);
    tlv(0x03, &content)
}

fn der_utc_time(stamp: &str) -> Vec<u8> {
    tlv(0x17, stamp.as_bytes())
}

/// Name ::= SEQUENCE OF (SET OF AttributeTypeAndValue), one CN attribute.
fn der_name_cn(cn: &str) -> Vec<u8> {
    let attr = der_sequence(&[&der_oid(OID_COMMON_NAME), &tlv(0x0C, cn.as_bytes())]);
    der_sequence(&[&tlv(0x31, &attr)])
}

fn tbs_certificate(pubkey: &[u8], serial: &[u8]) -> Vec<u8> {
    let version = tlv(0xA0, &der_integer(&[0x02]));
    let algorithm = der_sequence(&[&der_oid(OID_ECDSA_WITH_SHA256)]);
    let name = der_name_cn("keyfob U2F attestation");
    let validity = der_sequence(&[
        &der_utc_time("200101000000Z"),
        &der_utc_time("490101000000Z"),
    ]);
    let spki = der_sequence(&[
        &der_sequence(&[&der_oid(OID_EC_PUBLIC_KEY), &der_oid(OID_PRIME256V1)]),
        &der_bit_string(pubkey),
    ]);
    der_sequence(&[
        &version,
        &der_integer(serial),
        &algorithm,
        &name,
        &validity,
        &name,
        &spki,
    ])
}

fn build_self_signed_cert(key: &SigningKey) -> Vec<u8> {
    let pubkey = key.verifying_key().to_encoded_point(false);

    let mut serial = [0u8; 8];
    OsRng.fill_bytes(&mut serial);
    serial[0] = (serial[0] & 0x7F) | 0x01; // positive, nonzero INTEGER

    let tbs = tbs_certificate(pubkey.as_bytes(), &serial);
    let algorithm = der_sequence(&[&der_oid(OID_ECDSA_WITH_SHA256)]);
    let signature = keys::sign(key, &tbs);
    der_sequence(&[&tbs, &algorithm, &der_bit_string(&signature)])
}
