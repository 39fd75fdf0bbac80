//! Atlassian Connect JWTs.
//!
//! Connect signs every request between a Confluence site and an app with an
//! HS256 JWT keyed by the installation's shared secret. Inbound verification
//! is two-phase:
//!
//! 1. [`decode_unverified`] peeks at the payload to read `iss`, the client
//!    key naming the installation.
//! 2. [`verify`] checks the signature and expiry against that
//!    installation's secret.
//!
//! Reading `iss` before verifying is how the Connect protocol works: the
//! issuer selects which secret to verify with, and nothing from the peek is
//! trusted until step 2 passes.
//!
//! Outbound calls use [`outbound_token`], which also sets the `qsh` claim
//! binding the token to one method, path, and query.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AuthError, TransportError};
use crate::installation::InstallationRecord;

type HmacSha256 = Hmac<Sha256>;

/// The only algorithm Connect uses for shared-secret tokens.
pub const ALGORITHM: &str = "HS256";

/// Lifetime of outbound tokens, in seconds.
pub const OUTBOUND_TTL_SECS: i64 = 180;

/// Claims carried by a Connect JWT.
///
/// Claims not modelled here are kept in [`extra`](Self::extra), so a decoded
/// token round-trips without losing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectClaims {
    /// Issuer: the client key inbound, the app key outbound.
    pub iss: String,
    /// Subject: the Atlassian account id inbound, the app key outbound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audience. Inbound tokens may send a string or an array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
    pub iat: i64,
    pub exp: i64,
    /// Query string hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qsh: Option<String>,
    /// Product context (user, license, etc.) when the site provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// The three dot-separated segments of a compact JWT.
struct Segments<'a> {
    header: &'a str,
    payload: &'a str,
    signature: &'a str,
}

fn split(token: &str) -> Result<Segments<'_>, AuthError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok(Segments {
            header,
            payload,
            signature,
        }),
        _ => Err(AuthError::Malformed {
            reason: "expected three dot-separated segments".to_owned(),
        }),
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::Malformed {
            reason: format!("{what} is not base64url: {e}"),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::Malformed {
        reason: format!("invalid {what}: {e}"),
    })
}

fn mac(secret: &str) -> Result<HmacSha256, hmac::digest::InvalidLength> {
    HmacSha256::new_from_slice(secret.as_bytes())
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, TransportError> {
    let json = serde_json::to_vec(value).map_err(|e| TransportError::Token {
        reason: e.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Read the claims without checking the signature.
///
/// Only use the result to pick the installation whose secret will then be
/// passed to [`verify`].
///
/// # Errors
///
/// Returns [`AuthError::Malformed`] if the token cannot be parsed.
pub fn decode_unverified(token: &str) -> Result<ConnectClaims, AuthError> {
    let segments = split(token)?;
    decode_segment(segments.payload, "payload")
}

/// Verify signature and expiry, returning the claims on success.
///
/// `now` is the current Unix time in seconds. A token is expired once
/// `exp <= now`.
///
/// # Errors
///
/// - [`AuthError::Malformed`] if the token cannot be parsed
/// - [`AuthError::UnsupportedAlgorithm`] unless the header says `HS256`
/// - [`AuthError::InvalidSignature`] if the HMAC does not match
/// - [`AuthError::Expired`] if `exp` has passed
pub fn verify(token: &str, secret: &str, now: i64) -> Result<ConnectClaims, AuthError> {
    let segments = split(token)?;
    let header: Header = decode_segment(segments.header, "header")?;
    if header.alg != ALGORITHM {
        return Err(AuthError::UnsupportedAlgorithm { alg: header.alg });
    }

    let signature = URL_SAFE_NO_PAD
        .decode(segments.signature)
        .map_err(|_| AuthError::InvalidSignature)?;
    let mut mac = mac(secret).map_err(|_| AuthError::InvalidSignature)?;
    mac.update(segments.header.as_bytes());
    mac.update(b".");
    mac.update(segments.payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| AuthError::InvalidSignature)?;

    let claims: ConnectClaims = decode_segment(segments.payload, "payload")?;
    if claims.exp <= now {
        return Err(AuthError::Expired {
            exp: claims.exp,
            now,
        });
    }
    Ok(claims)
}

/// Sign claims as a compact HS256 JWT.
///
/// # Errors
///
/// Returns [`TransportError::Token`] if the claims cannot be serialized.
pub fn encode(claims: &ConnectClaims, secret: &str) -> Result<String, TransportError> {
    let header = Header {
        alg: ALGORITHM.to_owned(),
        typ: Some("JWT".to_owned()),
    };
    let header = encode_segment(&header)?;
    let payload = encode_segment(claims)?;

    let mut mac = mac(secret).map_err(|e| TransportError::Token {
        reason: e.to_string(),
    })?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{header}.{payload}.{signature}"))
}

/// Build the Connect canonical request string `METHOD&path&query`.
///
/// `path` is relative to the installation's base URL. `query` holds decoded
/// key/value pairs; the `jwt` parameter is excluded, keys are sorted,
/// repeated keys have their sorted values joined with `,`, and everything is
/// percent-encoded per RFC 3986.
#[must_use]
pub fn canonical_request(method: &str, path: &str, query: &[(&str, &str)]) -> String {
    let mut path = path.trim_end_matches('/').replace('&', "%26");
    if path.is_empty() {
        path.push('/');
    }

    let mut grouped: std::collections::BTreeMap<String, Vec<String>> =
        std::collections::BTreeMap::new();
    for (key, value) in query.iter().filter(|(k, _)| *k != "jwt") {
        grouped
            .entry(urlencoding::encode(key).into_owned())
            .or_default()
            .push(urlencoding::encode(value).into_owned());
    }
    let query = grouped
        .into_iter()
        .map(|(key, mut values)| {
            values.sort();
            format!("{key}={}", values.join(","))
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{}&{path}&{query}", method.to_ascii_uppercase())
}

/// Hex SHA-256 of [`canonical_request`], the value of the `qsh` claim.
#[must_use]
pub fn query_string_hash(method: &str, path: &str, query: &[(&str, &str)]) -> String {
    hex::encode(Sha256::digest(canonical_request(method, path, query).as_bytes()))
}

/// Mint a short-lived token for one app-to-Confluence request.
///
/// `iss` and `sub` are the app key, `aud` is the client key, and the token
/// expires [`OUTBOUND_TTL_SECS`] after `now`.
///
/// # Errors
///
/// Returns [`TransportError::Token`] if signing fails.
pub fn outbound_token(
    installation: &InstallationRecord,
    method: &str,
    path: &str,
    query: &[(&str, &str)],
    now: i64,
) -> Result<String, TransportError> {
    let claims = ConnectClaims {
        iss: installation.key.clone(),
        sub: Some(installation.key.clone()),
        aud: Some(serde_json::Value::String(installation.client_key.clone())),
        iat: now,
        exp: now + OUTBOUND_TTL_SECS,
        qsh: Some(query_string_hash(method, path, query)),
        context: None,
        extra: serde_json::Map::new(),
    };
    encode(&claims, &installation.shared_secret)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use base64::Engine as _;

    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn claims(iss: &str, exp: i64) -> ConnectClaims {
        let mut extra = serde_json::Map::new();
        extra.insert("custom".to_owned(), serde_json::json!({"nested": [1, 2]}));
        ConnectClaims {
            iss: iss.to_owned(),
            sub: Some("557058:abcd".to_owned()),
            aud: None,
            iat: NOW - 10,
            exp,
            qsh: Some("context-qsh".to_owned()),
            context: Some(serde_json::json!({"user": {"accountId": "557058:abcd"}})),
            extra,
        }
    }

    #[test]
    fn verify_accepts_and_passes_claims_through() {
        let original = claims("T1", NOW + 60);
        let token = encode(&original, "secret").unwrap();
        let verified = verify(&token, "secret", NOW).unwrap();
        assert_eq!(verified, original);
    }

    #[test]
    fn unverified_peek_reads_issuer() {
        let token = encode(&claims("T1", NOW + 60), "secret").unwrap();
        assert_eq!(decode_unverified(&token).unwrap().iss, "T1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = encode(&claims("T1", NOW + 60), "secret").unwrap();
        let err = verify(&token, "other", NOW).unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = encode(&claims("T1", NOW), "secret").unwrap();
        let err = verify(&token, "secret", NOW).unwrap_err();
        assert!(matches!(err, AuthError::Expired { .. }));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = encode(&claims("T1", NOW + 60), "secret").unwrap();
        let forged_payload = URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&claims("T2", NOW + 60)).unwrap());
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{forged_payload}.{}", parts[0], parts[2]);
        assert!(matches!(
            verify(&forged, "secret", NOW),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn alg_none_is_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&claims("T1", NOW + 60)).unwrap());
        let token = format!("{header}.{payload}.");
        assert!(matches!(
            verify(&token, "secret", NOW),
            Err(AuthError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode_unverified("not-a-jwt"),
            Err(AuthError::Malformed { .. })
        ));
        assert!(matches!(
            decode_unverified("a.!!!.c"),
            Err(AuthError::Malformed { .. })
        ));
    }

    #[test]
    fn canonical_request_sorts_and_encodes() {
        let canonical = canonical_request(
            "get",
            "/wiki/rest/api/content",
            &[
                ("title", "My Saved Content"),
                ("spaceKey", "~abc"),
                ("expand", "version"),
                ("expand", "body.storage"),
                ("jwt", "ignored"),
            ],
        );
        assert_eq!(
            canonical,
            "GET&/wiki/rest/api/content&expand=body.storage,version&spaceKey=~abc&title=My%20Saved%20Content"
        );
    }

    #[test]
    fn canonical_request_normalizes_path() {
        assert_eq!(canonical_request("POST", "", &[]), "POST&/&");
        assert_eq!(canonical_request("PUT", "/a&b/", &[]), "PUT&/a%26b&");
    }

    #[test]
    fn qsh_is_sha256_of_canonical_request() {
        let expected = hex::encode(Sha256::digest(b"GET&/wiki/rest/api/space&limit=1&type=personal"));
        assert_eq!(
            query_string_hash(
                "GET",
                "/wiki/rest/api/space",
                &[("type", "personal"), ("limit", "1")]
            ),
            expected
        );
    }

    #[test]
    fn outbound_token_claims() {
        let installation = InstallationRecord {
            client_key: "T1".to_owned(),
            key: "com.example.homeclip".to_owned(),
            base_url: "https://x.atlassian.net".to_owned(),
            shared_secret: "secret".to_owned(),
            display_url: None,
            product_type: None,
            description: None,
        };
        let token = outbound_token(&installation, "GET", "/wiki/rest/api/space", &[], NOW).unwrap();
        let claims = verify(&token, "secret", NOW).unwrap();

        assert_eq!(claims.iss, "com.example.homeclip");
        assert_eq!(claims.sub.as_deref(), Some("com.example.homeclip"));
        assert_eq!(claims.aud, Some(serde_json::json!("T1")));
        assert_eq!(claims.exp - claims.iat, OUTBOUND_TTL_SECS);
        assert_eq!(
            claims.qsh,
            Some(query_string_hash("GET", "/wiki/rest/api/space", &[]))
        );
    }
}
