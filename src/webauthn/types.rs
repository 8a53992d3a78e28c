//! # WebAuthn API Types
//!
//! Request bodies for the four ceremony endpoints, the option payloads sent
//! to `navigator.credentials.create()` / `.get()`, and the credential JSON the
//! browser posts back (the `PublicKeyCredential.toJSON()` shape, with every
//! binary field base64url-encoded).

use serde::{Deserialize, Serialize};

/// COSE algorithm identifiers offered at registration, in preference order.
pub const COSE_ALG_ES256: i32 = -7;
pub const COSE_ALG_EDDSA: i32 = -8;
pub const COSE_ALG_RS256: i32 = -257;

/// Request to start passkey registration
///
/// ## Example JSON
/// ```json
/// { "name": "Ada", "email": "ada@example.com" }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationOptionsRequest {
    pub name: String,
    pub email: String,
}

/// Request to complete passkey registration
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationVerifyRequest {
    /// The `userId` returned with the options (UUID or base64url user handle)
    pub user_id: String,
    pub attestation_response: RegistrationResponse,
}

/// Request to start passkey login
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginOptionsRequest {
    pub email: String,
}

/// Request to complete passkey login
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginVerifyRequest {
    pub user_id: String,
    pub assertion_response: AuthenticationResponse,
}

/// What an options endpoint returns: the subject the client must echo back
/// on verify, and the options for the browser.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CeremonyStart<T> {
    pub user_id: String,
    pub options: T,
}

/// Attestation conveyance preference.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyancePreference {
    None,
    Indirect,
    Direct,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Discouraged,
    Preferred,
    Required,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

impl std::str::FromStr for AuthenticatorAttachment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "platform" => Ok(AuthenticatorAttachment::Platform),
            "cross-platform" => Ok(AuthenticatorAttachment::CrossPlatform),
            other => Err(format!("unknown authenticator attachment '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RelyingParty {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserEntity {
    /// base64url of the 16 UUID bytes
    pub id: String,
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct PubKeyCredParam {
    pub alg: i32,
    #[serde(rename = "type")]
    pub type_: String,
}

impl PubKeyCredParam {
    pub fn public_key(alg: i32) -> Self {
        Self {
            alg,
            type_: "public-key".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    /// Browsers treat this as a filter, so it is only sent when configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    pub resident_key: ResidentKeyRequirement,
    pub require_resident_key: bool,
    pub user_verification: UserVerificationRequirement,
}

/// A credential named in `excludeCredentials` / `allowCredentials`.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialDescriptor {
    /// base64url credential id
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

/// Options for `navigator.credentials.create({ publicKey })`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub challenge: String,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub timeout: u64,
    pub authenticator_selection: AuthenticatorSelection,
    pub attestation: AttestationConveyancePreference,
    pub exclude_credentials: Vec<CredentialDescriptor>,
}

/// Options for `navigator.credentials.get({ publicKey })`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: String,
    pub rp_id: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub timeout: u64,
    pub user_verification: UserVerificationRequirement,
}

/// Credential posted back after `navigator.credentials.create()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AttestationPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationPayload {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Credential posted back after `navigator.credentials.get()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AssertionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionPayload {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default)]
    pub user_handle: Option<String>,
}
