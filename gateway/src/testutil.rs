//! Shared test fixtures: an RSA keypair for signing tokens and the matching
//! JWKS document the mock auth service serves.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const KEY_ID: &str = "test-key";

pub fn jwks_json() -> serde_json::Value {
    serde_json::from_str(include_str!("../testdata/jwks.json")).expect("jwks fixture parses")
}

pub fn service_account_table() -> HashMap<String, String> {
    HashMap::from([("rh-che".to_string(), "che".to_string())])
}

pub fn sign_token(claims: serde_json::Value) -> String {
    sign_token_with_kid(claims, Some(KEY_ID))
}

pub fn sign_token_with_kid(claims: serde_json::Value, kid: Option<&str>) -> String {
    let key = EncodingKey::from_rsa_pem(include_bytes!("../testdata/sample_key.pem"))
        .expect("sample key parses");
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    jsonwebtoken::encode(&header, &claims, &key).expect("token signs")
}

pub async fn mount_jwks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/token/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json()))
        .mount(server)
        .await;
}
