//! Attestation object decoding and registration response verification.
//!
//! The attestation object is a CBOR map `{ "fmt": text, "attStmt": map,
//! "authData": bytes }`. Statements are checked as far as they can be without
//! a trust store: `none` must be empty and `packed` self-attestation is
//! verified with the credential's own key. Certificate chains (`x5c`) and the
//! other formats are accepted without chain validation.

use std::collections::BTreeSet;

use ciborium::Value;
use ring::digest::{digest, SHA256};

use crate::config::WebauthnConfig;
use crate::error::{AppError, AppResult};
use crate::webauthn::authenticator_data::AuthenticatorData;
use crate::webauthn::client_data::{ClientData, ClientDataType};
use crate::webauthn::cose::CoseKey;
use crate::webauthn::types::RegistrationResponse;
use crate::webauthn::{b64_decode, b64_encode};

#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    /// Raw bytes, needed again for the `packed` signature
    pub auth_data_raw: Vec<u8>,
    pub auth_data: AuthenticatorData,
}

fn text_entry<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

impl AttestationObject {
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| AppError::verification(format!("invalid attestation object: {}", e)))?;
        let map = value
            .as_map()
            .ok_or_else(|| AppError::verification("attestation object is not a map"))?;

        let fmt = text_entry(map, "fmt")
            .and_then(|v| v.as_text())
            .ok_or_else(|| AppError::verification("attestation object missing fmt"))?
            .to_string();
        let att_stmt = text_entry(map, "attStmt")
            .and_then(|v| v.as_map())
            .cloned()
            .ok_or_else(|| AppError::verification("attestation object missing attStmt"))?;
        let auth_data_raw = text_entry(map, "authData")
            .and_then(|v| v.as_bytes())
            .cloned()
            .ok_or_else(|| AppError::verification("attestation object missing authData"))?;
        let auth_data = AuthenticatorData::parse(&auth_data_raw)?;

        Ok(Self {
            fmt,
            att_stmt,
            auth_data_raw,
            auth_data,
        })
    }

    /// Check the attestation statement for `key` against `client_data_hash`.
    pub fn verify_statement(&self, key: &CoseKey, client_data_hash: &[u8]) -> AppResult<()> {
        match self.fmt.as_str() {
            "none" => {
                if !self.att_stmt.is_empty() {
                    return Err(AppError::verification("'none' attestation with a statement"));
                }
                Ok(())
            }
            "packed" => self.verify_packed(key, client_data_hash),
            other => {
                tracing::debug!(fmt = other, "accepting attestation without trust-chain validation");
                Ok(())
            }
        }
    }

    fn verify_packed(&self, key: &CoseKey, client_data_hash: &[u8]) -> AppResult<()> {
        let alg = text_entry(&self.att_stmt, "alg")
            .and_then(|v| v.as_integer())
            .and_then(|i| i64::try_from(i).ok())
            .ok_or_else(|| AppError::verification("packed attestation missing alg"))?;
        let sig = text_entry(&self.att_stmt, "sig")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| AppError::verification("packed attestation missing sig"))?;

        if text_entry(&self.att_stmt, "x5c").is_some() {
            tracing::debug!("accepting packed attestation certificate chain without validation");
            return Ok(());
        }

        // Self attestation: signed by the credential key itself
        if alg != i64::from(key.algorithm()) {
            return Err(AppError::verification(
                "packed self-attestation algorithm does not match credential key",
            ));
        }
        let mut signed = self.auth_data_raw.clone();
        signed.extend_from_slice(client_data_hash);
        key.verify(&signed, sig)
    }
}

/// A credential that passed registration verification, ready to persist.
#[derive(Debug, Clone)]
pub struct VerifiedCredential {
    /// base64url, unpadded
    pub credential_id: String,
    pub public_key: Vec<u8>,
    pub algorithm: i32,
    pub counter: u32,
    pub transports: Vec<String>,
}

/// Run every registration check against the stored challenge.
pub fn verify_registration_response(
    config: &WebauthnConfig,
    expected_challenge: &str,
    response: &RegistrationResponse,
) -> AppResult<VerifiedCredential> {
    if response.type_ != "public-key" {
        return Err(AppError::verification(format!(
            "unexpected credential type '{}'",
            response.type_
        )));
    }

    let client_data_raw = b64_decode("clientDataJSON", &response.response.client_data_json)?;
    ClientData::from_bytes(&client_data_raw)?.verify(
        ClientDataType::Create,
        expected_challenge,
        &config.rp_origin,
    )?;

    let attestation = AttestationObject::from_bytes(&b64_decode(
        "attestationObject",
        &response.response.attestation_object,
    )?)?;
    attestation
        .auth_data
        .verify(&config.rp_id, config.require_user_verification)?;

    let attested = attestation
        .auth_data
        .attested
        .as_ref()
        .ok_or_else(|| AppError::verification("attested credential data flag not set"))?;

    let raw_id = b64_decode("rawId", &response.raw_id)?;
    if raw_id != attested.credential_id {
        return Err(AppError::verification("rawId does not match attested credential id"));
    }

    let key = CoseKey::from_bytes(&attested.public_key)?;
    let client_data_hash = digest(&SHA256, &client_data_raw);
    attestation.verify_statement(&key, client_data_hash.as_ref())?;

    let transports: BTreeSet<String> = response.response.transports.iter().cloned().collect();

    Ok(VerifiedCredential {
        credential_id: b64_encode(&attested.credential_id),
        public_key: attested.public_key.clone(),
        algorithm: key.algorithm(),
        counter: attestation.auth_data.counter,
        transports: transports.into_iter().collect(),
    })
}
