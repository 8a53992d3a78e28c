//! # Passkey Registration
//!
//! Registration is a two-step process: begin and finish.
//!
//! ## Registration Flow
//! 1. **Begin**: generate a user id and a challenge, remember the profile
//!    under `register:{userId}`, send creation options to the client
//! 2. **Finish**: verify the attestation, write user and credential in one
//!    transaction, delete the pending record, issue a session
//!
//! No account exists until finish commits. A finish that fails verification
//! deletes the pending record: the challenge was answered once and the client
//! starts over with new options. A storage failure or an email conflict at
//! commit leaves it in place.

use uuid::Uuid;

use crate::db::models::{
    CeremonyKey, LoginType, PasskeyCredential, PendingCeremony, PendingProfile, User,
};
use crate::error::{AppError, AppResult};
use crate::webauthn::attestation::verify_registration_response;
use crate::webauthn::coordinator::{
    normalize_email, parse_user_id, user_handle, CeremonyCoordinator, CeremonyOutcome,
};
use crate::webauthn::types::*;

impl CeremonyCoordinator {
    /// Start registration for a new account.
    ///
    /// ## Errors
    /// - `BadRequest`: empty name or an email without `@`
    /// - `Storage`: the pending record could not be written
    pub async fn begin_registration(
        &self,
        name: &str,
        email: &str,
    ) -> AppResult<CeremonyStart<CreationOptions>> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() {
            return Err(AppError::BadRequest("Name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(AppError::BadRequest("Invalid email format".to_string()));
        }

        let user_id = Uuid::new_v4();
        let challenge = self.generate_challenge()?;

        let pending = PendingCeremony::Registration {
            profile: PendingProfile {
                name: name.to_string(),
                email: email.clone(),
                login_type: LoginType::Passkey,
            },
            challenge: challenge.clone(),
        };
        self.challenges
            .put(&pending.key_for(&user_id.to_string()), &pending, self.config.challenge_ttl)
            .await?;

        tracing::debug!(user_id = %user_id, "registration ceremony started");

        let options = CreationOptions {
            rp: RelyingParty {
                name: self.config.rp_name.clone(),
                id: self.config.rp_id.clone(),
            },
            user: UserEntity {
                id: user_handle(&user_id),
                name: email,
                display_name: name.to_string(),
            },
            challenge,
            pub_key_cred_params: [COSE_ALG_ES256, COSE_ALG_EDDSA, COSE_ALG_RS256]
                .into_iter()
                .map(PubKeyCredParam::public_key)
                .collect(),
            timeout: self.config.timeout_ms,
            authenticator_selection: AuthenticatorSelection {
                authenticator_attachment: self.config.authenticator_attachment,
                resident_key: ResidentKeyRequirement::Preferred,
                require_resident_key: false,
                user_verification: UserVerificationRequirement::Preferred,
            },
            attestation: AttestationConveyancePreference::None,
            exclude_credentials: Vec::new(),
        };

        Ok(CeremonyStart {
            user_id: user_id.to_string(),
            options,
        })
    }

    /// Verify the attestation for a pending registration and create the account.
    ///
    /// ## Errors
    /// - `RegistrationNotFound`: no live pending record (never started, expired
    ///   or already finished)
    /// - `VerificationFailed`: any client data, authenticator data or
    ///   attestation check failed
    /// - `Conflict`: the email or credential id is already registered
    pub async fn finish_registration(
        &self,
        user_id: &str,
        response: &RegistrationResponse,
    ) -> AppResult<CeremonyOutcome> {
        let user_id = parse_user_id(user_id)?.to_string();
        let key = CeremonyKey::registration(&user_id);

        let stored = self
            .challenges
            .get(&key)
            .await?
            .ok_or(AppError::RegistrationNotFound)?;
        let (profile, challenge) = match stored.pending {
            PendingCeremony::Registration { profile, challenge } => (profile, challenge),
            PendingCeremony::Login { .. } => {
                return Err(AppError::Internal(format!("login record under '{}'", key)))
            }
        };

        let verified = match verify_registration_response(&self.config, &challenge, response) {
            Ok(verified) => verified,
            Err(e) => {
                // A rejected response burns its challenge
                self.challenges.delete(&key).await?;
                return Err(e);
            }
        };

        let now = self.clock.now();
        let mut user = User::new_passkey(user_id.clone(), profile.name, profile.email, now);
        user.login_type = profile.login_type.as_str().to_string();

        let credential = PasskeyCredential {
            id: verified.credential_id,
            user_id: user_id.clone(),
            public_key: verified.public_key,
            algorithm: i64::from(verified.algorithm),
            counter: i64::from(verified.counter),
            transports: if verified.transports.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&verified.transports)?)
            },
            created_at: now.to_rfc3339(),
            last_used_at: None,
        };

        self.users.create_passkey_account(&user, &credential).await?;

        // Committed; the pending record is spent
        self.challenges.delete(&key).await?;

        let session = self.sessions.issue(&user.id)?;

        tracing::info!(
            user_id = %user.id,
            credential_id = %credential.id,
            algorithm = credential.algorithm,
            "passkey registered"
        );

        Ok(CeremonyOutcome { user, session })
    }
}
