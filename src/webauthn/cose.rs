//! COSE_Key decoding and signature verification.
//!
//! Labels used (RFC 9053): `1` kty, `3` alg, `-1` crv (EC2/OKP) or n (RSA),
//! `-2` x or e, `-3` y.

use ciborium::Value;
use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

use crate::error::{AppError, AppResult};
use crate::webauthn::types::{COSE_ALG_EDDSA, COSE_ALG_ES256, COSE_ALG_RS256};

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;
const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;
const RSA_MIN_MODULUS_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Es256 { x: Vec<u8>, y: Vec<u8> },
    EdDsa { x: Vec<u8> },
    Rs256 { n: Vec<u8>, e: Vec<u8> },
}

fn label<'a>(map: &'a [(Value, Value)], key: i64) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_integer() == Some(key.into()))
        .map(|(_, v)| v)
}

fn int_label(map: &[(Value, Value)], key: i64) -> Option<i64> {
    label(map, key)
        .and_then(|v| v.as_integer())
        .and_then(|i| i64::try_from(i).ok())
}

fn bytes_label(map: &[(Value, Value)], key: i64, what: &str) -> AppResult<Vec<u8>> {
    label(map, key)
        .and_then(|v| v.as_bytes())
        .cloned()
        .ok_or_else(|| AppError::verification(format!("COSE key missing {}", what)))
}

impl CoseKey {
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| AppError::verification(format!("invalid COSE key: {}", e)))?;
        let map = value
            .as_map()
            .ok_or_else(|| AppError::verification("COSE key is not a map"))?;

        let kty = int_label(map, 1).ok_or_else(|| AppError::verification("COSE key missing kty"))?;
        let alg = int_label(map, 3).ok_or_else(|| AppError::verification("COSE key missing alg"))?;

        match (alg, kty) {
            (a, KTY_EC2) if a == i64::from(COSE_ALG_ES256) => {
                if int_label(map, -1) != Some(CRV_P256) {
                    return Err(AppError::verification("ES256 key is not on P-256"));
                }
                let x = bytes_label(map, -2, "x coordinate")?;
                let y = bytes_label(map, -3, "y coordinate")?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(AppError::verification("invalid P-256 coordinate length"));
                }
                Ok(CoseKey::Es256 { x, y })
            }
            (a, KTY_OKP) if a == i64::from(COSE_ALG_EDDSA) => {
                if int_label(map, -1) != Some(CRV_ED25519) {
                    return Err(AppError::verification("EdDSA key is not Ed25519"));
                }
                let x = bytes_label(map, -2, "x coordinate")?;
                if x.len() != 32 {
                    return Err(AppError::verification("invalid Ed25519 key length"));
                }
                Ok(CoseKey::EdDsa { x })
            }
            (a, KTY_RSA) if a == i64::from(COSE_ALG_RS256) => {
                let n = bytes_label(map, -1, "modulus")?;
                let e = bytes_label(map, -2, "exponent")?;
                // ring only verifies with 2048-bit moduli and up
                if n.len() < RSA_MIN_MODULUS_LEN {
                    return Err(AppError::verification("RSA modulus shorter than 2048 bits"));
                }
                Ok(CoseKey::Rs256 { n, e })
            }
            (alg, kty) => Err(AppError::verification(format!(
                "unsupported COSE key (alg {}, kty {})",
                alg, kty
            ))),
        }
    }

    pub fn algorithm(&self) -> i32 {
        match self {
            CoseKey::Es256 { .. } => COSE_ALG_ES256,
            CoseKey::EdDsa { .. } => COSE_ALG_EDDSA,
            CoseKey::Rs256 { .. } => COSE_ALG_RS256,
        }
    }

    /// Verify `signature` over `signed_data`. ES256 signatures are ASN.1/DER
    /// as produced by authenticators; SHA-256 hashing happens inside ring.
    pub fn verify(&self, signed_data: &[u8], signature: &[u8]) -> AppResult<()> {
        let result = match self {
            CoseKey::Es256 { x, y } => {
                let mut point = Vec::with_capacity(65);
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, &point)
                    .verify(signed_data, signature)
            }
            CoseKey::EdDsa { x } => {
                UnparsedPublicKey::new(&signature::ED25519, x).verify(signed_data, signature)
            }
            CoseKey::Rs256 { n, e } => RsaPublicKeyComponents { n, e }.verify(
                &signature::RSA_PKCS1_2048_8192_SHA256,
                signed_data,
                signature,
            ),
        };

        result.map_err(|_| AppError::verification("signature verification failed"))
    }
}
