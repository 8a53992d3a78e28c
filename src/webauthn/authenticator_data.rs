//! Authenticator data (WebAuthn §6.1).
//!
//! ```text
//! rpIdHash (32) | flags (1) | signCount (4, big endian) | [attested credential data] | [extensions]
//! attested credential data = aaguid (16) | credIdLen (2) | credId | COSE_Key (CBOR)
//! ```

use crate::error::{AppError, AppResult};
use ring::digest::{digest, SHA256};

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;
pub const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
pub const FLAG_EXTENSION_DATA: u8 = 0x80;

const HEADER_LEN: usize = 37;
const ATTESTED_HEADER_LEN: usize = HEADER_LEN + 16 + 2;

#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// The COSE_Key exactly as encoded by the authenticator
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub counter: u32,
    pub attested: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> AppResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(AppError::verification("authenticator data too short"));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let counter = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested = if flags & FLAG_ATTESTED_CREDENTIAL_DATA != 0 {
            Some(Self::parse_attested(bytes)?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            counter,
            attested,
        })
    }

    fn parse_attested(bytes: &[u8]) -> AppResult<AttestedCredentialData> {
        if bytes.len() < ATTESTED_HEADER_LEN {
            return Err(AppError::verification("attested credential data too short"));
        }

        let mut aaguid = [0u8; 16];
        aaguid.copy_from_slice(&bytes[37..53]);
        let id_len = u16::from_be_bytes([bytes[53], bytes[54]]) as usize;
        let key_offset = ATTESTED_HEADER_LEN + id_len;
        if bytes.len() <= key_offset {
            return Err(AppError::verification("authenticator data too short for credential"));
        }
        let credential_id = bytes[ATTESTED_HEADER_LEN..key_offset].to_vec();

        // Decode one CBOR item to find where the key ends; extensions may follow
        let mut rest = &bytes[key_offset..];
        let available = rest.len();
        let _: ciborium::Value = ciborium::from_reader(&mut rest)
            .map_err(|e| AppError::verification(format!("invalid COSE key: {}", e)))?;
        let consumed = available - rest.len();
        let public_key = bytes[key_offset..key_offset + consumed].to_vec();

        Ok(AttestedCredentialData {
            aaguid,
            credential_id,
            public_key,
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    /// Checks shared by registration and login: the RP id hash, UP, and UV
    /// when the relying party requires it.
    pub fn verify(&self, rp_id: &str, require_user_verification: bool) -> AppResult<()> {
        let expected = digest(&SHA256, rp_id.as_bytes());
        if self.rp_id_hash.as_slice() != expected.as_ref() {
            return Err(AppError::verification("RP id hash mismatch"));
        }
        if !self.user_present() {
            return Err(AppError::verification("user presence flag not set"));
        }
        if require_user_verification && !self.user_verified() {
            return Err(AppError::verification("user verification flag not set"));
        }
        Ok(())
    }
}
