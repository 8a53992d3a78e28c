//! # WebAuthn Module
//!
//! The relying-party side of the passkey ceremonies, verified in-house.
//!
//! ## Submodules
//! - `types`: request bodies, option payloads and browser response JSON
//! - `client_data`: `clientDataJSON` checks
//! - `authenticator_data`: authenticator data parsing and flag checks
//! - `cose`: COSE public keys and signature verification
//! - `attestation`: attestation object decoding and statement checks
//! - `coordinator`: the `CeremonyCoordinator` tying stores, clock and sessions together
//! - `registration`: creating a passkey account
//! - `authentication`: logging in with an existing passkey
//!
//! ## WebAuthn Flow Overview
//!
//! ### Registration (Creating a Passkey)
//! 1. Client asks for options → `CeremonyCoordinator::begin_registration()`
//! 2. Server stores a pending record under `register:{userId}` and returns the challenge
//! 3. Browser runs `navigator.credentials.create()`
//! 4. Client posts the attestation → `CeremonyCoordinator::finish_registration()`
//! 5. Server verifies it, writes user + credential, deletes the pending record
//!
//! ### Authentication (Logging In)
//! 1. Client asks for options by email → `CeremonyCoordinator::begin_login()`
//! 2. Server stores a challenge under `login:{userId}` and lists the allowed credentials
//! 3. Browser runs `navigator.credentials.get()`
//! 4. Client posts the assertion → `CeremonyCoordinator::finish_login()`
//! 5. Server consumes the challenge, checks the signature with the stored key,
//!    advances the counter and issues a session token

pub mod attestation;
pub mod authentication;
pub mod authenticator_data;
pub mod client_data;
pub mod coordinator;
pub mod cose;
pub mod registration;
pub mod types;

pub use coordinator::CeremonyCoordinator;

use crate::error::{AppError, AppResult};
use base64::{
    alphabet,
    engine::{general_purpose::URL_SAFE_NO_PAD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

// Browsers disagree on whether base64url carries padding, so accept both.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// base64url without padding, the encoding used for every binary field on the wire.
pub fn b64_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a base64url field of a browser response. A malformed field is a
/// failed verification, not a bad request: the client sent a broken credential.
pub fn b64_decode(field: &str, value: &str) -> AppResult<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(value)
        .map_err(|e| AppError::verification(format!("{} is not valid base64url: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_with_or_without_padding() {
        let raw = [0xfbu8, 0xff, 0x01];
        let bare = b64_encode(&raw);
        assert!(!bare.contains('='));
        assert_eq!(b64_decode("x", &bare).unwrap(), raw);

        assert_eq!(b64_decode("x", "AQ==").unwrap(), vec![1]);
        assert_eq!(b64_decode("x", "AQ").unwrap(), vec![1]);
    }

    #[test]
    fn rejects_standard_alphabet_symbols() {
        let err = b64_decode("signature", "ab+/").unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(ref m) if m.contains("signature")));
    }
}
