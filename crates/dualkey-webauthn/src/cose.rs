//! COSE_Key decoding into canonical credential keys.
//!
//! Only the two key types platform authenticators produce are accepted:
//! EC2/P-256/ES256 and OKP/Ed25519/EdDSA. Key type, algorithm and curve
//! must all be present and consistent; nothing is guessed.

use crate::{errors::*, types::CredentialPublicKey};
use ciborium::Value;

const LABEL_KTY: i128 = 1;
const LABEL_ALG: i128 = 3;
const LABEL_CRV: i128 = -1;
const LABEL_X: i128 = -2;
const LABEL_Y: i128 = -3;

pub const COSE_KTY_OKP: i64 = 1;
pub const COSE_KTY_EC2: i64 = 2;
pub const COSE_ALG_ES256: i64 = -7;
pub const COSE_ALG_EDDSA: i64 = -8;
pub const COSE_CRV_P256: i64 = 1;
pub const COSE_CRV_ED25519: i64 = 6;

/// Parse a COSE_Key into a [`CredentialPublicKey`]
pub fn parse_cose_key(bytes: &[u8]) -> Result<CredentialPublicKey> {
    let value: Value = ciborium::from_reader(bytes)
        .map_err(|e| WebAuthnError::KeyFormatError(format!("invalid CBOR: {}", e)))?;

    let map = value
        .as_map()
        .ok_or_else(|| WebAuthnError::KeyFormatError("COSE key is not a map".to_string()))?;

    let kty = int_label(map, LABEL_KTY)?
        .ok_or_else(|| WebAuthnError::KeyFormatError("missing kty".to_string()))?;
    let alg = int_label(map, LABEL_ALG)?
        .ok_or_else(|| WebAuthnError::KeyFormatError("missing alg".to_string()))?;
    let crv = int_label(map, LABEL_CRV)?
        .ok_or_else(|| WebAuthnError::KeyFormatError("missing crv".to_string()))?;

    match (kty, alg, crv) {
        (COSE_KTY_EC2, COSE_ALG_ES256, COSE_CRV_P256) => {
            let x = coordinate(map, LABEL_X, "x")?;
            let y = coordinate(map, LABEL_Y, "y")?;

            let mut sec1 = Vec::with_capacity(65);
            sec1.push(0x04);
            sec1.extend_from_slice(&x);
            sec1.extend_from_slice(&y);

            p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| {
                WebAuthnError::KeyFormatError("EC2 point is not on P-256".to_string())
            })?;

            Ok(CredentialPublicKey::Es256 { sec1 })
        }
        (COSE_KTY_OKP, COSE_ALG_EDDSA, COSE_CRV_ED25519) => {
            let public_key = coordinate(map, LABEL_X, "x")?;

            ed25519_dalek::VerifyingKey::from_bytes(&public_key).map_err(|_| {
                WebAuthnError::KeyFormatError("invalid Ed25519 public key".to_string())
            })?;

            Ok(CredentialPublicKey::EdDsa { public_key })
        }
        (kty, alg, crv) => Err(WebAuthnError::KeyFormatError(format!(
            "unsupported or inconsistent key: kty={} alg={} crv={}",
            kty, alg, crv
        ))),
    }
}

/// Encode a credential key back to COSE_Key bytes
pub fn encode_cose_key(key: &CredentialPublicKey) -> Result<Vec<u8>> {
    let int = |v: i64| Value::Integer(v.into());

    let entries = match key {
        CredentialPublicKey::Es256 { sec1 } => vec![
            (int(LABEL_KTY as i64), int(COSE_KTY_EC2)),
            (int(LABEL_ALG as i64), int(COSE_ALG_ES256)),
            (int(LABEL_CRV as i64), int(COSE_CRV_P256)),
            (
                int(LABEL_X as i64),
                Value::Bytes(sec1.get(1..33).unwrap_or_default().to_vec()),
            ),
            (
                int(LABEL_Y as i64),
                Value::Bytes(sec1.get(33..65).unwrap_or_default().to_vec()),
            ),
        ],
        CredentialPublicKey::EdDsa { public_key } => vec![
            (int(LABEL_KTY as i64), int(COSE_KTY_OKP)),
            (int(LABEL_ALG as i64), int(COSE_ALG_EDDSA)),
            (int(LABEL_CRV as i64), int(COSE_CRV_ED25519)),
            (int(LABEL_X as i64), Value::Bytes(public_key.to_vec())),
        ],
    };

    let mut out = Vec::new();
    ciborium::into_writer(&Value::Map(entries), &mut out)
        .map_err(|e| WebAuthnError::KeyFormatError(format!("COSE encoding failed: {}", e)))?;
    Ok(out)
}

fn lookup(map: &[(Value, Value)], label: i128) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| k.as_integer().map(i128::from) == Some(label))
        .map(|(_, v)| v)
}

fn int_label(map: &[(Value, Value)], label: i128) -> Result<Option<i64>> {
    match lookup(map, label) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .and_then(|i| i64::try_from(i).ok())
            .map(Some)
            .ok_or_else(|| {
                WebAuthnError::KeyFormatError(format!("label {} is not an integer", label))
            }),
    }
}

fn coordinate(map: &[(Value, Value)], label: i128, name: &str) -> Result<[u8; 32]> {
    let bytes = lookup(map, label)
        .and_then(Value::as_bytes)
        .ok_or_else(|| WebAuthnError::KeyFormatError(format!("missing {}", name)))?;

    bytes.as_slice().try_into().map_err(|_| {
        WebAuthnError::KeyFormatError(format!("{} must be 32 bytes, got {}", name, bytes.len()))
    })
}
