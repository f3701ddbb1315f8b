use crate::clock::Clock;
use crate::error::{AuthFailure, Result, ServiceError};
use crate::secrets::SecretString;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::errors::ErrorKind;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::Identity;

/// Token claims.
///
/// Parsed strictly: a claim of the wrong type fails the whole token as
/// malformed. `exp` is optional at parse time so that a token without it is
/// reported as expired rather than malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

/// Stateless bearer token verifier
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    /// Create a verifier for HMAC tokens signed with `secret`
    pub fn new(secret: &SecretString, algorithm: Algorithm, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(algorithm);
        // Expiry is checked against the injected clock with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
            clock,
        }
    }

    /// Verify the bearer token carried in `headers`
    pub fn verify_headers(&self, headers: &HeaderMap) -> std::result::Result<Identity, AuthFailure> {
        let token = extract_bearer(headers)?;
        self.verify(token)
    }

    /// Verify a raw token and return its subject.
    ///
    /// The signature is checked (in constant time, by `jsonwebtoken`) before
    /// the claims are trusted, and expiry is checked last.
    pub fn verify(&self, token: &str) -> std::result::Result<Identity, AuthFailure> {
        check_structure(token)?;

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| classify(e.kind()))?;
        let claims = data.claims;

        let exp = claims.exp.ok_or(AuthFailure::Expired)?;
        let now = self.clock.now().timestamp().max(0) as u64;
        if now >= exp {
            return Err(AuthFailure::Expired);
        }

        if claims.sub.is_empty() {
            return Err(AuthFailure::Malformed);
        }

        Ok(Identity::new(claims.sub))
    }
}

/// Issues tokens for sign-up and login with a fixed lifetime
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    algorithm: Algorithm,
    ttl: ChronoDuration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(
        secret: &SecretString,
        algorithm: Algorithm,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|e| ServiceError::Config(format!("Token TTL out of range: {}", e)))?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            algorithm,
            ttl,
            clock,
        })
    }

    /// Sign a token for `identity` expiring `ttl` from now
    pub fn issue(&self, identity: &Identity) -> Result<String> {
        let now = self.clock.now();
        let claims = Claims {
            sub: identity.as_str().to_string(),
            exp: Some(unix_secs(now + self.ttl)),
            iat: Some(unix_secs(now)),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(format!("Failed to sign token: {}", e)))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn extract_bearer(headers: &HeaderMap) -> std::result::Result<&str, AuthFailure> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthFailure::Missing)?
        .to_str()
        .map_err(|_| AuthFailure::Missing)?;

    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(AuthFailure::Missing)
}

/// Parse algorithm string, accepting only HMAC variants
pub fn parse_algorithm(algo: &str) -> Result<Algorithm> {
    match algo.to_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(ServiceError::Config(format!(
            "Unsupported algorithm: {} (expected HS256, HS384 or HS512)",
            algo
        ))),
    }
}

/// Reject tokens that are not three segments with a readable header and
/// claims, before any signature work
fn check_structure(token: &str) -> std::result::Result<(), AuthFailure> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, claims, signature] = segments.as_slice() else {
        return Err(AuthFailure::Malformed);
    };
    if signature.is_empty() {
        return Err(AuthFailure::Malformed);
    }

    decode_header(token).map_err(|_| AuthFailure::Malformed)?;

    let payload = URL_SAFE_NO_PAD
        .decode(claims)
        .map_err(|_| AuthFailure::Malformed)?;
    serde_json::from_slice::<Claims>(&payload).map_err(|_| AuthFailure::Malformed)?;

    Ok(())
}

fn classify(kind: &ErrorKind) -> AuthFailure {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthFailure::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthFailure::Expired,
        _ => AuthFailure::Malformed,
    }
}

fn unix_secs(instant: DateTime<Utc>) -> u64 {
    instant.timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use secrecy::Secret;

    const SECRET: &str = "test-secret-key";

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn secret(value: &str) -> SecretString {
        Secret::new(value.to_string())
    }

    fn setup() -> (TokenIssuer, TokenVerifier, ManualClock) {
        let clock = ManualClock::new(t0());
        let issuer = TokenIssuer::new(
            &secret(SECRET),
            Algorithm::HS256,
            Duration::from_secs(3600),
            Arc::new(clock.clone()),
        )
        .unwrap();
        let verifier = TokenVerifier::new(&secret(SECRET), Algorithm::HS256, Arc::new(clock.clone()));
        (issuer, verifier, clock)
    }

    fn sign(claims: &serde_json::Value, key: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(key.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_then_verify() {
        let (issuer, verifier, _clock) = setup();
        let token = issuer.issue(&Identity::new("user123")).unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert_eq!(verifier.verify(&token).unwrap(), Identity::new("user123"));
    }

    #[test]
    fn test_issued_claims() {
        let (issuer, _verifier, _clock) = setup();
        let token = issuer.issue(&Identity::new("user123")).unwrap();

        let payload = token.split('.').nth(1).unwrap();
        let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.exp, Some(1_700_003_600));
        assert_eq!(claims.iat, Some(1_700_000_000));
    }

    #[test]
    fn test_expiry_boundary() {
        let (issuer, verifier, clock) = setup();
        let token = issuer.issue(&Identity::new("user123")).unwrap();

        clock.advance(ChronoDuration::seconds(3599));
        assert!(verifier.verify(&token).is_ok());

        clock.advance(ChronoDuration::seconds(1));
        assert_eq!(verifier.verify(&token), Err(AuthFailure::Expired));
    }

    #[test]
    fn test_past_exp_with_valid_signature_is_expired() {
        let (_issuer, verifier, _clock) = setup();
        let token = sign(
            &serde_json::json!({ "sub": "user123", "exp": 1_600_000_000u64 }),
            SECRET,
        );

        assert_eq!(verifier.verify(&token), Err(AuthFailure::Expired));
    }

    #[test]
    fn test_missing_exp_is_expired() {
        let (_issuer, verifier, _clock) = setup();
        let token = sign(&serde_json::json!({ "sub": "user123" }), SECRET);

        assert_eq!(verifier.verify(&token), Err(AuthFailure::Expired));
    }

    #[test]
    fn test_wrong_secret_is_invalid_signature() {
        let (_issuer, verifier, _clock) = setup();
        let token = sign(
            &serde_json::json!({ "sub": "user123", "exp": 1_800_000_000u64 }),
            "some-other-secret",
        );

        assert_eq!(verifier.verify(&token), Err(AuthFailure::InvalidSignature));
    }

    #[test]
    fn test_tampered_claims_are_invalid_signature() {
        let (issuer, verifier, _clock) = setup();
        let token = issuer.issue(&Identity::new("user123")).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"admin","exp":1800000000}"#);
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);

        assert_eq!(verifier.verify(&tampered), Err(AuthFailure::InvalidSignature));
    }

    #[test]
    fn test_expired_token_with_bad_signature_reports_signature() {
        let (_issuer, verifier, _clock) = setup();
        let token = sign(
            &serde_json::json!({ "sub": "user123", "exp": 1_600_000_000u64 }),
            "some-other-secret",
        );

        assert_eq!(verifier.verify(&token), Err(AuthFailure::InvalidSignature));
    }

    #[test]
    fn test_malformed_tokens() {
        let (_issuer, verifier, _clock) = setup();

        for token in ["", "abc", "a.b", "a.b.c", "a.b.c.d", "!!!.???.***"] {
            assert_eq!(
                verifier.verify(token),
                Err(AuthFailure::Malformed),
                "token {:?}",
                token
            );
        }
    }

    #[test]
    fn test_undecodable_claims_are_malformed_before_signature() {
        let (issuer, verifier, _clock) = setup();
        let token = issuer.issue(&Identity::new("user123")).unwrap();
        let header = token.split('.').next().unwrap();

        let not_json = URL_SAFE_NO_PAD.encode(b"not json");

        for claims in ["!!!not-base64!!!", "", not_json.as_str()] {
            let forged = format!("{}.{}.garbage-signature", header, claims);
            assert_eq!(
                verifier.verify(&forged),
                Err(AuthFailure::Malformed),
                "claims segment {:?}",
                claims
            );
        }

        let unsigned = format!("{}.{}.", header, token.split('.').nth(1).unwrap());
        assert_eq!(verifier.verify(&unsigned), Err(AuthFailure::Malformed));
    }

    #[test]
    fn test_wrongly_typed_claims_are_malformed() {
        let (_issuer, verifier, _clock) = setup();

        let token = sign(
            &serde_json::json!({ "sub": 42, "exp": 1_800_000_000u64 }),
            SECRET,
        );
        assert_eq!(verifier.verify(&token), Err(AuthFailure::Malformed));

        let token = sign(
            &serde_json::json!({ "sub": "user123", "exp": "tomorrow" }),
            SECRET,
        );
        assert_eq!(verifier.verify(&token), Err(AuthFailure::Malformed));

        let token = sign(
            &serde_json::json!({ "sub": "", "exp": 1_800_000_000u64 }),
            SECRET,
        );
        assert_eq!(verifier.verify(&token), Err(AuthFailure::Malformed));
    }

    #[test]
    fn test_algorithm_mismatch_is_rejected() {
        let (_issuer, verifier, _clock) = setup();
        let token = encode(
            &Header::new(Algorithm::HS512),
            &serde_json::json!({ "sub": "user123", "exp": 1_800_000_000u64 }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(verifier.verify(&token), Err(AuthFailure::InvalidSignature));
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), Err(AuthFailure::Missing));

        headers.insert(AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Err(AuthFailure::Missing));

        headers.insert(AUTHORIZATION, "InvalidToken".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Err(AuthFailure::Missing));

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Ok("abc.def.ghi"));

        headers.insert(AUTHORIZATION, "bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Ok("abc.def.ghi"));
    }

    #[test]
    fn test_verify_headers() {
        let (issuer, verifier, _clock) = setup();
        let token = issuer.issue(&Identity::new("user123")).unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(verifier.verify_headers(&headers), Err(AuthFailure::Missing));

        headers.insert(AUTHORIZATION, format!("Bearer {}", token).parse().unwrap());
        assert_eq!(verifier.verify_headers(&headers).unwrap().as_str(), "user123");
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("hs256").unwrap(), Algorithm::HS256);
        assert_eq!(parse_algorithm("HS512").unwrap(), Algorithm::HS512);
        assert!(parse_algorithm("RS256").is_err());
        assert!(parse_algorithm("none").is_err());
    }
}
