use chrono::Duration;

use super::authenticator::AttestationFormat;
use super::{test_config, Harness, RP_ID};
use crate::db::models::{CeremonyKey, LoginType};
use crate::error::AppError;
use crate::webauthn::b64_encode;
use crate::webauthn::coordinator::user_handle;
use crate::webauthn::types::AuthenticatorAttachment;

#[tokio::test]
async fn options_describe_the_relying_party_and_user() {
    let h = Harness::new().await;
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let json = serde_json::to_value(&start).unwrap();
    let options = &json["options"];
    assert_eq!(json["userId"], start.user_id);
    assert_eq!(options["rp"]["id"], RP_ID);
    assert_eq!(options["rp"]["name"], "Storefront");
    assert_eq!(options["user"]["name"], "ada@example.com");
    assert_eq!(options["user"]["displayName"], "Ada Lovelace");
    assert_eq!(
        options["user"]["id"],
        user_handle(&uuid::Uuid::parse_str(&start.user_id).unwrap())
    );
    assert_eq!(options["attestation"], "none");
    assert_eq!(options["timeout"], 60000);
    // Roaming keys stay allowed unless an attachment is configured
    assert!(options["authenticatorSelection"]
        .get("authenticatorAttachment")
        .is_none());
    assert_eq!(options["authenticatorSelection"]["residentKey"], "preferred");
    assert_eq!(options["authenticatorSelection"]["userVerification"], "preferred");
    assert_eq!(options["excludeCredentials"], serde_json::json!([]));

    let algs: Vec<i64> = options["pubKeyCredParams"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["alg"].as_i64().unwrap())
        .collect();
    assert_eq!(algs, vec![-7, -8, -257]);

    // 32 random bytes, unpadded
    assert_eq!(start.options.challenge.len(), 43);
}

#[tokio::test]
async fn configured_attachment_is_sent() {
    let mut config = test_config();
    config.webauthn.authenticator_attachment = Some(AuthenticatorAttachment::Platform);
    let h = Harness::with_config(config).await;
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let json = serde_json::to_value(&start).unwrap();
    assert_eq!(
        json["options"]["authenticatorSelection"]["authenticatorAttachment"],
        "platform"
    );
}

#[tokio::test]
async fn begin_does_not_create_an_account() {
    let h = Harness::new().await;
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    assert!(h.state.users.find_by_id(&start.user_id).await.unwrap().is_none());
    assert!(h
        .state
        .challenges
        .get(&CeremonyKey::registration(&start.user_id))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn begin_rejects_malformed_profile() {
    let h = Harness::new().await;
    let err = h.coordinator().begin_registration("  ", "ada@example.com").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = h.coordinator().begin_registration("Ada", "not-an-email").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn happy_path_creates_user_credential_and_session() {
    let h = Harness::new().await;
    let authenticator = h.authenticator();
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let response = authenticator.register(&start.options);
    let outcome = h
        .coordinator()
        .finish_registration(&start.user_id, &response)
        .await
        .unwrap();

    assert_eq!(outcome.user.id, start.user_id);
    assert_eq!(outcome.user.email, "ada@example.com");
    assert_eq!(outcome.user.login_type(), Some(LoginType::Passkey));
    assert!(!outcome.user.email_verified);

    let stored = h.state.users.find_by_email("ada@example.com").await.unwrap().unwrap();
    assert_eq!(stored.id, start.user_id);

    let credentials = h
        .coordinator()
        .credentials
        .find_by_user_id(&start.user_id)
        .await
        .unwrap();
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].id, authenticator.credential_id_b64());
    assert_eq!(credentials[0].public_key, authenticator.cose_key());
    assert_eq!(credentials[0].algorithm, -7);
    assert_eq!(credentials[0].counter(), 0);
    assert_eq!(credentials[0].transports(), vec!["hybrid", "internal"]);

    let claims = h.state.sessions.verify(&outcome.session.token).unwrap();
    assert_eq!(claims.sub, start.user_id);

    // Pending record is gone
    assert!(h
        .state
        .challenges
        .get(&CeremonyKey::registration(&start.user_id))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn second_finish_for_same_user_is_not_found() {
    let h = Harness::new().await;
    let authenticator = h.authenticator();
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();
    let response = authenticator.register(&start.options);

    h.coordinator()
        .finish_registration(&start.user_id, &response)
        .await
        .unwrap();
    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &response)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RegistrationNotFound));
}

#[tokio::test]
async fn user_id_may_be_sent_as_user_handle() {
    let h = Harness::new().await;
    let authenticator = h.authenticator();
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let outcome = h
        .coordinator()
        .finish_registration(&start.options.user.id, &authenticator.register(&start.options))
        .await
        .unwrap();
    assert_eq!(outcome.user.id, start.user_id);
}

#[tokio::test]
async fn unknown_user_id_is_not_found() {
    let h = Harness::new().await;
    let authenticator = h.authenticator();
    let response = authenticator.register_with_challenge(&b64_encode(&[1u8; 32]));

    let err = h
        .coordinator()
        .finish_registration(&uuid::Uuid::new_v4().to_string(), &response)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RegistrationNotFound));
}

#[tokio::test]
async fn expired_registration_is_not_found() {
    let h = Harness::new().await;
    let authenticator = h.authenticator();
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    h.clock.advance(Duration::seconds(301));
    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &authenticator.register(&start.options))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RegistrationNotFound));
    assert!(h.state.users.find_by_id(&start.user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_verification_burns_the_challenge() {
    let h = Harness::new().await;
    let authenticator = h.authenticator();
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let wrong = authenticator.register_with_challenge(&b64_encode(&[9u8; 32]));
    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &wrong)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VerificationFailed(_)));
    assert!(h.state.users.find_by_id(&start.user_id).await.unwrap().is_none());

    // A correct answer to the same options is too late
    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &authenticator.register(&start.options))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RegistrationNotFound));
    assert!(h.state.users.find_by_id(&start.user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn tampered_raw_id_cannot_be_followed_by_a_genuine_finish() {
    let h = Harness::new().await;
    let authenticator = h.authenticator();
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let genuine = authenticator.register(&start.options);
    let mut tampered = genuine.clone();
    tampered.raw_id = b64_encode(b"tampered");
    assert!(h
        .coordinator()
        .finish_registration(&start.user_id, &tampered)
        .await
        .is_err());

    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &genuine)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RegistrationNotFound));
    assert!(h
        .state
        .challenges
        .get(&CeremonyKey::registration(&start.user_id))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn foreign_origin_fails_verification() {
    let h = Harness::new().await;
    let mut authenticator = h.authenticator();
    authenticator.origin = "https://shop.example.com.evil.test".to_string();
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &authenticator.register(&start.options))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VerificationFailed(_)));
}

#[tokio::test]
async fn foreign_rp_id_fails_verification() {
    let h = Harness::new().await;
    let mut authenticator = h.authenticator();
    authenticator.rp_id = "evil.test".to_string();
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &authenticator.register(&start.options))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VerificationFailed(ref m) if m.contains("RP id")));
}

#[tokio::test]
async fn missing_user_verification_fails_when_required() {
    let h = Harness::new().await;
    let mut authenticator = h.authenticator();
    authenticator.flags = crate::webauthn::authenticator_data::FLAG_USER_PRESENT;
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &authenticator.register(&start.options))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VerificationFailed(_)));
}

#[tokio::test]
async fn missing_user_verification_passes_when_not_required() {
    let mut config = test_config();
    config.webauthn.require_user_verification = false;
    let h = Harness::with_config(config).await;
    let mut authenticator = h.authenticator();
    authenticator.flags = crate::webauthn::authenticator_data::FLAG_USER_PRESENT;

    let outcome = h.register(&authenticator, "ada@example.com").await;
    assert_eq!(outcome.user.email, "ada@example.com");
}

#[tokio::test]
async fn raw_id_must_match_attested_credential() {
    let h = Harness::new().await;
    let authenticator = h.authenticator();
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let mut response = authenticator.register(&start.options);
    response.raw_id = b64_encode(b"some other credential");
    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &response)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VerificationFailed(_)));
}

#[tokio::test]
async fn packed_self_attestation_is_verified() {
    let h = Harness::new().await;
    let mut authenticator = h.authenticator();
    authenticator.format = AttestationFormat::PackedSelf;

    let outcome = h.register(&authenticator, "ada@example.com").await;
    assert_eq!(outcome.user.email, "ada@example.com");
}

#[tokio::test]
async fn packed_self_attestation_signed_by_another_key_fails() {
    let h = Harness::new().await;
    let mut authenticator = h.authenticator();
    authenticator.format = AttestationFormat::PackedSelf;
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();
    let good = authenticator.register(&start.options);

    // Same statement layout, but the attestation signature comes from a different key
    let mut impostor = h.authenticator();
    impostor.format = AttestationFormat::PackedSelf;
    impostor.credential_id = authenticator.credential_id.clone();
    let forged = impostor.register(&start.options);

    let mut response = good.clone();
    response.response.attestation_object = {
        use ciborium::Value;
        let good_obj: Value = ciborium::from_reader(
            crate::webauthn::b64_decode("x", &good.response.attestation_object)
                .unwrap()
                .as_slice(),
        )
        .unwrap();
        let forged_obj: Value = ciborium::from_reader(
            crate::webauthn::b64_decode("x", &forged.response.attestation_object)
                .unwrap()
                .as_slice(),
        )
        .unwrap();
        let good_map = good_obj.as_map().unwrap();
        let forged_map = forged_obj.as_map().unwrap();
        let pick = |map: &Vec<(Value, Value)>, key: &str| {
            map.iter()
                .find(|(k, _)| k.as_text() == Some(key))
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        let spliced = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("packed".into())),
            (Value::Text("attStmt".into()), pick(forged_map, "attStmt")),
            (Value::Text("authData".into()), pick(good_map, "authData")),
        ]);
        let mut out = Vec::new();
        ciborium::into_writer(&spliced, &mut out).unwrap();
        b64_encode(&out)
    };

    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &response)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VerificationFailed(_)));
}

#[tokio::test]
async fn email_registered_twice_is_a_conflict() {
    let h = Harness::new().await;
    h.register(&h.authenticator(), "ada@example.com").await;

    let authenticator = h.authenticator();
    let start = h
        .coordinator()
        .begin_registration("Another Ada", "ada@example.com")
        .await
        .unwrap();
    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &authenticator.register(&start.options))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(h.state.users.find_by_id(&start.user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn email_differing_only_in_case_is_a_conflict() {
    let h = Harness::new().await;
    let first = h.register(&h.authenticator(), "Ada@Example.com").await;
    assert_eq!(first.user.email, "ada@example.com");

    let authenticator = h.authenticator();
    let start = h
        .coordinator()
        .begin_registration("Ada Again", "ADA@example.COM")
        .await
        .unwrap();
    assert_eq!(start.options.user.name, "ada@example.com");
    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &authenticator.register(&start.options))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn wrong_ceremony_type_fails_verification() {
    let h = Harness::new().await;
    let authenticator = h.authenticator();
    let start = h
        .coordinator()
        .begin_registration("Ada Lovelace", "ada@example.com")
        .await
        .unwrap();

    let mut response = authenticator.register(&start.options);
    response.response.client_data_json =
        b64_encode(&authenticator.client_data("webauthn.get", &start.options.challenge));
    let err = h
        .coordinator()
        .finish_registration(&start.user_id, &response)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VerificationFailed(ref m) if m.contains("type")));
}
