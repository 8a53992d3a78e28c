//! # Passkey Authentication
//!
//! Login is a two-step process: begin and finish.
//!
//! ## Authentication Flow
//! 1. **Begin**: look the user up by email, store a challenge under
//!    `login:{userId}`, list every credential the user owns
//! 2. **Finish**: consume the challenge, verify the assertion against the
//!    stored public key, advance the signature counter, issue a session
//!
//! The challenge is taken atomically before anything is verified, so a failed
//! finish cannot be retried: the client asks for new options.

use ring::digest::{digest, SHA256};

use crate::db::models::{CeremonyKey, PendingCeremony};
use crate::error::{AppError, AppResult};
use crate::webauthn::authenticator_data::AuthenticatorData;
use crate::webauthn::client_data::{ClientData, ClientDataType};
use crate::webauthn::coordinator::{normalize_email, parse_user_id, CeremonyCoordinator, CeremonyOutcome};
use crate::webauthn::cose::CoseKey;
use crate::webauthn::types::*;
use crate::webauthn::{b64_decode, b64_encode};

impl CeremonyCoordinator {
    /// Start a login for the account registered under `email` (any case).
    ///
    /// ## Errors
    /// - `UserNotFound`: no account with that email
    /// - `CredentialNotFound`: the account has no passkey
    pub async fn begin_login(&self, email: &str) -> AppResult<CeremonyStart<RequestOptions>> {
        let user = self
            .users
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::UserNotFound)?;

        let credentials = self.credentials.find_by_user_id(&user.id).await?;
        if credentials.is_empty() {
            return Err(AppError::CredentialNotFound);
        }

        let challenge = self.generate_challenge()?;
        self.challenges
            .put(
                &CeremonyKey::login(&user.id),
                &PendingCeremony::Login {
                    challenge: challenge.clone(),
                },
                self.config.challenge_ttl,
            )
            .await?;

        tracing::debug!(user_id = %user.id, credentials = credentials.len(), "login ceremony started");

        let allow_credentials = credentials
            .iter()
            .map(|c| CredentialDescriptor {
                id: c.id.clone(),
                type_: "public-key".to_string(),
                transports: c.transports(),
            })
            .collect();

        Ok(CeremonyStart {
            user_id: user.id,
            options: RequestOptions {
                challenge,
                rp_id: self.config.rp_id.clone(),
                allow_credentials,
                timeout: self.config.timeout_ms,
                user_verification: UserVerificationRequirement::Preferred,
            },
        })
    }

    /// Verify an assertion and sign the user in.
    ///
    /// ## Errors
    /// - `LoginChallengeNotFound`: no live challenge (never issued, expired or
    ///   already consumed)
    /// - `CredentialNotFound`: the assertion names a credential the user does not own
    /// - `VerificationFailed`: client data, authenticator data, user handle,
    ///   signature or counter check failed
    pub async fn finish_login(
        &self,
        user_id: &str,
        response: &AuthenticationResponse,
    ) -> AppResult<CeremonyOutcome> {
        let user_uuid = parse_user_id(user_id)?;
        let user_id = user_uuid.to_string();

        let stored = self
            .challenges
            .take(&CeremonyKey::login(&user_id))
            .await?
            .ok_or(AppError::LoginChallengeNotFound)?;

        let user = self
            .users
            .find_by_id(&user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        if response.type_ != "public-key" {
            return Err(AppError::verification(format!(
                "unexpected credential type '{}'",
                response.type_
            )));
        }

        let credential_id = b64_encode(&b64_decode("rawId", &response.raw_id)?);
        let credential = self
            .credentials
            .find_by_user_id(&user_id)
            .await?
            .into_iter()
            .find(|c| c.id == credential_id)
            .ok_or(AppError::CredentialNotFound)?;

        let client_data_raw = b64_decode("clientDataJSON", &response.response.client_data_json)?;
        ClientData::from_bytes(&client_data_raw)?.verify(
            ClientDataType::Get,
            stored.pending.challenge(),
            &self.config.rp_origin,
        )?;

        let auth_data_raw = b64_decode("authenticatorData", &response.response.authenticator_data)?;
        let auth_data = AuthenticatorData::parse(&auth_data_raw)?;
        auth_data.verify(&self.config.rp_id, self.config.require_user_verification)?;

        if let Some(handle) = &response.response.user_handle {
            if b64_decode("userHandle", handle)? != user_uuid.as_bytes() {
                return Err(AppError::verification("user handle does not match user"));
            }
        }

        let key = CoseKey::from_bytes(&credential.public_key)?;
        let mut signed = auth_data_raw;
        signed.extend_from_slice(digest(&SHA256, &client_data_raw).as_ref());
        let signature = b64_decode("signature", &response.response.signature)?;
        key.verify(&signed, &signature)?;

        let policy = self.config.counter_policy;
        let stored_counter = credential.counter();
        if !policy.accepts(stored_counter, auth_data.counter) {
            return Err(AppError::verification(format!(
                "counter did not advance (stored {}, reported {})",
                stored_counter, auth_data.counter
            )));
        }
        if !self
            .credentials
            .advance_counter(&credential.id, auth_data.counter, policy.allows_zero_counter())
            .await?
        {
            return Err(AppError::verification("counter advanced concurrently"));
        }

        let session = self.sessions.issue(&user.id)?;

        tracing::info!(
            user_id = %user.id,
            credential_id = %credential.id,
            counter = auth_data.counter,
            "passkey login"
        );

        Ok(CeremonyOutcome { user, session })
    }
}
