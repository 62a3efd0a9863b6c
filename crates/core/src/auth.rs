//! RTSP challenge/response authentication (RFC 2326 §14, RFC 2617).
//!
//! Two schemes share the [`Authenticator`] trait:
//!
//! - [`BasicAuth`]: `Authorization: Basic base64(user:pass)`.
//! - [`DigestAuth`]: `Authorization: Digest username=..., response=md5(...)`
//!   against a nonce chosen once when the authenticator is built.
//!
//! Validation never fails loudly. A missing header, undecodable payload
//! and wrong password all come back as `false`, so callers cannot tell
//! the cases apart.

use std::fmt;

use base64::prelude::{BASE64_STANDARD, Engine as _};
use md5::{Digest, Md5};

use crate::protocol::RtspRequest;

/// Username, password and realm used by both schemes.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    password: String,
    pub realm: String,
}

impl Credential {
    pub fn new(username: &str, password: &str, realm: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            realm: realm.to_string(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("realm", &self.realm)
            .finish()
    }
}

/// Server-side challenge issuing and request validation.
///
/// Implementations are immutable once built and shared across connection
/// threads behind an `Arc`.
pub trait Authenticator: Send + Sync {
    /// Scheme name as it appears in headers (`Basic`, `Digest`).
    fn scheme(&self) -> &'static str;

    /// Value for the `WWW-Authenticate` header of a 401 response.
    fn challenge(&self) -> String;

    /// Whether the request's `Authorization` header matches the credential.
    fn validate(&self, request: &RtspRequest) -> bool;

    /// The `Authorization` value a client holding this credential would send.
    fn authorization(&self, method: &str, uri: &str) -> String;
}

/// HTTP Basic authentication (RFC 2617 §2).
#[derive(Debug, Clone)]
pub struct BasicAuth {
    credential: Credential,
}

impl BasicAuth {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    fn decode(value: &str) -> Option<(String, String)> {
        let encoded = strip_scheme(value, "Basic")?;
        let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        if text.matches(':').count() != 1 {
            return None;
        }
        let (user, pass) = text.split_once(':')?;
        Some((user.to_string(), pass.to_string()))
    }
}

impl Authenticator for BasicAuth {
    fn scheme(&self) -> &'static str {
        "Basic"
    }

    fn challenge(&self) -> String {
        format!("Basic realm=\"{}\"", self.credential.realm)
    }

    fn validate(&self, request: &RtspRequest) -> bool {
        let Some((user, pass)) = request.get_header("Authorization").and_then(Self::decode) else {
            return false;
        };
        user.eq_ignore_ascii_case(&self.credential.username) && pass == self.credential.password
    }

    fn authorization(&self, _method: &str, _uri: &str) -> String {
        let raw = format!("{}:{}", self.credential.username, self.credential.password);
        format!("Basic {}", BASE64_STANDARD.encode(raw))
    }
}

/// HTTP Digest authentication (RFC 2617 §3) with the MD5 algorithm.
///
/// The nonce is fixed for the authenticator's lifetime; replayed nonces
/// are accepted.
#[derive(Debug, Clone)]
pub struct DigestAuth {
    credential: Credential,
    nonce: String,
    algorithm: Option<String>,
}

impl DigestAuth {
    /// Build with a random nonce.
    pub fn new(credential: Credential) -> Self {
        let nonce = format!("{:032x}", rand::random::<u128>());
        Self::with_nonce(credential, &nonce, None)
    }

    pub fn with_nonce(credential: Credential, nonce: &str, algorithm: Option<&str>) -> Self {
        Self {
            credential,
            nonce: nonce.to_string(),
            algorithm: algorithm.map(str::to_string),
        }
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// `MD5(MD5(user:realm:pass):nonce:MD5(method:uri))`
    fn response_hash(&self, username: &str, method: &str, uri: &str) -> String {
        let ha1 = md5_hex(&format!(
            "{}:{}:{}",
            username, self.credential.realm, self.credential.password
        ));
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        md5_hex(&format!("{ha1}:{}:{ha2}", self.nonce))
    }
}

impl Authenticator for DigestAuth {
    fn scheme(&self) -> &'static str {
        "Digest"
    }

    fn challenge(&self) -> String {
        let mut challenge = format!(
            "Digest realm=\"{}\", nonce=\"{}\"",
            self.credential.realm, self.nonce
        );
        if let Some(algorithm) = &self.algorithm {
            challenge.push_str(&format!(", algorithm=\"{algorithm}\""));
        }
        challenge.push_str(", stale=\"FALSE\"");
        challenge
    }

    fn validate(&self, request: &RtspRequest) -> bool {
        let Some(params) = request
            .get_header("Authorization")
            .and_then(|value| strip_scheme(value, "Digest"))
            .map(parse_params)
        else {
            return false;
        };
        let field = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        };

        let (Some(username), Some(_realm), Some(_nonce), Some(uri), Some(response)) = (
            field("username"),
            field("realm"),
            field("nonce"),
            field("uri"),
            field("response"),
        ) else {
            return false;
        };

        if !username.eq_ignore_ascii_case(&self.credential.username) {
            return false;
        }
        let expected = self.response_hash(username, request.method_token(), uri);
        expected.eq_ignore_ascii_case(response)
    }

    fn authorization(&self, method: &str, uri: &str) -> String {
        let response = self.response_hash(&self.credential.username, method, uri);
        let mut value = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            self.credential.username, self.credential.realm, self.nonce, uri, response
        );
        if let Some(algorithm) = &self.algorithm {
            value.push_str(&format!(", algorithm=\"{algorithm}\""));
        }
        value
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Strip a case-insensitive `<scheme> ` prefix.
fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let value = value.trim_start();
    let (head, rest) = value.split_at_checked(scheme.len())?;
    if !head.eq_ignore_ascii_case(scheme) || !rest.starts_with(' ') {
        return None;
    }
    Some(rest.trim_start())
}

/// Split `key="value", key=value` pairs, honouring commas inside quotes.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    let mut flush = |item: &str| {
        if let Some((key, value)) = item.split_once('=') {
            params.push((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ));
        }
    };

    for c in input.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => {
                flush(&current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    flush(&current);
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Method;

    const ENCODED: &str = "Basic dXNlcm5hbWVAZXhhbXBsZS5jb206UGFzc3dvcmRAIVhZWg==";

    fn with_auth(value: &str) -> RtspRequest {
        RtspRequest::new(Method::Describe, "rtsp://test/uri").with_header("Authorization", value)
    }

    fn basic(user: &str, pass: &str) -> BasicAuth {
        BasicAuth::new(Credential::new(user, pass, "Test Realm"))
    }

    #[test]
    fn basic_authorization_header() {
        let auth = basic("username@example.com", "Password@!XYZ");
        assert_eq!(auth.authorization("GET_PARAMETER", "rtsp://test/uri"), ENCODED);
    }

    #[test]
    fn basic_challenge() {
        assert_eq!(basic("u", "p").challenge(), "Basic realm=\"Test Realm\"");
    }

    #[test]
    fn basic_valid() {
        assert!(basic("username@example.com", "Password@!XYZ").validate(&with_auth(ENCODED)));
    }

    #[test]
    fn basic_username_case_insensitive() {
        assert!(basic("USERNAME@example.com", "Password@!XYZ").validate(&with_auth(ENCODED)));
    }

    #[test]
    fn basic_password_case_sensitive() {
        assert!(!basic("username@example.com", "password@!XYZ").validate(&with_auth(ENCODED)));
    }

    #[test]
    fn basic_missing_password() {
        let auth = basic("username@example.com", "password@!XYZ");
        assert!(!auth.validate(&with_auth("Basic dXNlcm5hbWVAZXhhbXBsZS5jb20=")));
    }

    #[test]
    fn basic_invalid_base64() {
        assert!(!basic("u", "p").validate(&with_auth("Basic invalid$$$$")));
    }

    #[test]
    fn basic_missing_header() {
        let request = RtspRequest::new(Method::Describe, "rtsp://test/uri");
        assert!(!basic("u", "p").validate(&request));
    }

    #[test]
    fn basic_wrong_scheme() {
        let auth = basic("username@example.com", "Password@!XYZ");
        let value = ENCODED.replacen("Basic", "Bearer", 1);
        assert!(!auth.validate(&with_auth(&value)));
    }

    #[test]
    fn basic_any_flipped_password_char_is_rejected() {
        let auth = basic("admin", "s3cret!");
        for i in 0.."s3cret!".len() {
            let mut bytes = b"s3cret!".to_vec();
            bytes[i] ^= 0x01;
            let wrong = String::from_utf8(bytes).unwrap();
            let value = basic("admin", &wrong).authorization("DESCRIBE", "rtsp://x");
            assert!(!auth.validate(&with_auth(&value)), "accepted {wrong}");
        }
        let value = auth.authorization("DESCRIBE", "rtsp://x");
        assert!(auth.validate(&with_auth(&value)));
    }

    fn digest(pass: &str) -> DigestAuth {
        DigestAuth::with_nonce(Credential::new("admin", pass, "cam"), "abc123", None)
    }

    #[test]
    fn digest_challenge_carries_realm_and_nonce() {
        let challenge = digest("pw").challenge();
        assert!(challenge.starts_with("Digest realm=\"cam\", nonce=\"abc123\""));
        assert!(challenge.contains("stale="));
    }

    #[test]
    fn digest_round_trip_is_valid() {
        let auth = digest("pw");
        let request = RtspRequest::new(Method::Describe, "rtsp://cam/live")
            .with_header("Authorization", &auth.authorization("DESCRIBE", "rtsp://cam/live"));
        assert!(auth.validate(&request));
    }

    #[test]
    fn digest_known_vector() {
        // HA1 = md5("admin:cam:pw"), HA2 = md5("DESCRIBE:rtsp://cam/live")
        let ha1 = md5_hex("admin:cam:pw");
        let ha2 = md5_hex("DESCRIBE:rtsp://cam/live");
        let expected = md5_hex(&format!("{ha1}:abc123:{ha2}"));
        let header = digest("pw").authorization("DESCRIBE", "rtsp://cam/live");
        assert!(header.contains(&format!("response=\"{expected}\"")));
    }

    #[test]
    fn digest_wrong_password_rejected() {
        let server = digest("pw");
        let client = digest("PW");
        let request = RtspRequest::new(Method::Play, "rtsp://cam/live")
            .with_header("Authorization", &client.authorization("PLAY", "rtsp://cam/live"));
        assert!(!server.validate(&request));
    }

    #[test]
    fn digest_wrong_method_rejected() {
        let auth = digest("pw");
        let request = RtspRequest::new(Method::Play, "rtsp://cam/live")
            .with_header("Authorization", &auth.authorization("DESCRIBE", "rtsp://cam/live"));
        assert!(!auth.validate(&request));
    }

    #[test]
    fn digest_missing_field_rejected() {
        let auth = digest("pw");
        let request = RtspRequest::new(Method::Describe, "rtsp://cam/live").with_header(
            "Authorization",
            "Digest username=\"admin\", realm=\"cam\", nonce=\"abc123\", uri=\"rtsp://cam/live\"",
        );
        assert!(!auth.validate(&request));
    }

    #[test]
    fn digest_garbage_rejected() {
        let auth = digest("pw");
        assert!(!auth.validate(&with_auth("Digest ,,,=,\"")));
        assert!(!auth.validate(&with_auth("Digest")));
    }

    #[test]
    fn digest_random_nonces_differ() {
        let a = DigestAuth::new(Credential::new("a", "b", "r"));
        let b = DigestAuth::new(Credential::new("a", "b", "r"));
        assert_ne!(a.nonce(), b.nonce());
    }

    #[test]
    fn params_keep_quoted_commas() {
        let params = parse_params("a=\"x,y\", b=2");
        assert_eq!(params[0], ("a".to_string(), "x,y".to_string()));
        assert_eq!(params[1], ("b".to_string(), "2".to_string()));
    }

    #[test]
    fn credential_debug_hides_password() {
        let dbg = format!("{:?}", Credential::new("u", "hunter2", "r"));
        assert!(!dbg.contains("hunter2"));
    }
}
