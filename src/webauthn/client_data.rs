//! Parsing and checking of `clientDataJSON`.

use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::webauthn::b64_decode;

/// The ceremony the browser says it performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientDataType {
    /// "webauthn.create"
    Create,
    /// "webauthn.get"
    Get,
}

impl ClientDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientDataType::Create => "webauthn.create",
            ClientDataType::Get => "webauthn.get",
        }
    }
}

impl FromStr for ClientDataType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webauthn.create" => Ok(ClientDataType::Create),
            "webauthn.get" => Ok(ClientDataType::Get),
            _ => Err(AppError::verification(format!("invalid client data type '{}'", s))),
        }
    }
}

impl fmt::Display for ClientDataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fields of `clientDataJSON` the server checks.
#[derive(Debug)]
pub struct ClientData {
    pub type_: ClientDataType,
    /// base64url, as echoed by the browser
    pub challenge: String,
    pub origin: String,
    pub cross_origin: bool,
}

impl ClientData {
    pub fn from_bytes(bytes: &[u8]) -> AppResult<ClientData> {
        let json: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| AppError::verification(format!("invalid client data JSON: {}", e)))?;

        let type_ = json["type"]
            .as_str()
            .ok_or_else(|| AppError::verification("missing type in client data"))?
            .parse::<ClientDataType>()?;

        let challenge = json["challenge"]
            .as_str()
            .ok_or_else(|| AppError::verification("missing challenge in client data"))?
            .to_string();

        let origin = json["origin"]
            .as_str()
            .ok_or_else(|| AppError::verification("missing origin in client data"))?
            .to_string();

        let cross_origin = json["crossOrigin"].as_bool().unwrap_or(false);

        Ok(ClientData {
            type_,
            challenge,
            origin,
            cross_origin,
        })
    }

    /// Check type, challenge and origin against what the server expects.
    ///
    /// Challenges are compared as decoded bytes so padding differences in the
    /// browser's encoding do not matter.
    pub fn verify(
        &self,
        expected_type: ClientDataType,
        expected_challenge: &str,
        expected_origin: &str,
    ) -> AppResult<()> {
        if self.type_ != expected_type {
            return Err(AppError::verification(format!(
                "client data type: expected {}, got {}",
                expected_type, self.type_
            )));
        }

        let presented = b64_decode("clientData.challenge", &self.challenge)?;
        let expected = b64_decode("stored challenge", expected_challenge)?;
        if presented != expected {
            return Err(AppError::verification("challenge mismatch"));
        }

        if self.origin.trim_end_matches('/') != expected_origin {
            return Err(AppError::verification(format!(
                "origin: expected {}, got {}",
                expected_origin, self.origin
            )));
        }

        if self.cross_origin {
            return Err(AppError::verification("cross-origin ceremony"));
        }

        Ok(())
    }
}
