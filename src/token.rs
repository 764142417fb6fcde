//! Signed handoff tokens for the desktop-to-mobile QR flow.
//!
//! A token is a compact signed claim set embedded in a URL that is rendered
//! as a QR code on the desktop. The mobile browser presents it back to prove
//! it was issued a specific learning or verification session. Expired,
//! tampered, malformed and wrong-key tokens are all reported as the same
//! [`TokenError::Invalid`]; callers get no oracle for why a token failed.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// What a handoff token entitles its bearer to do. Checked by the caller
/// before any privileged action; the codec itself treats all types alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    Learn,
    Verify,
    MobileLearn,
    AttendanceVerify,
}

impl TokenType {
    /// Grants read access to the course playback payload.
    pub fn grants_playback(self) -> bool {
        matches!(self, TokenType::Learn | TokenType::MobileLearn)
    }

    /// Grants submission of an attendee verification record.
    pub fn grants_submission(self) -> bool {
        matches!(self, TokenType::Verify | TokenType::AttendanceVerify)
    }
}

/// Claims carried by a handoff token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffClaims {
    /// Unique per token.
    pub jti: String,
    /// Handoff session this token belongs to.
    pub session_id: String,
    pub course_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiration (unix seconds).
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    /// Expired, tampered, malformed or signed with another key.
    #[error("invalid token")]
    Invalid,
    #[error("token encoding failed")]
    Encode,
}

/// A freshly issued token plus its expiry instant.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }
}

/// Issues and verifies handoff tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::default();
        // No leeway: a token issued with ttl=T must fail right after T.
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a token of the given type, valid for `ttl_minutes`.
    pub fn issue(
        &self,
        token_type: TokenType,
        session_id: &str,
        course_id: Uuid,
        history_id: Option<Uuid>,
        language: Option<&str>,
        ttl_minutes: i64,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + Duration::minutes(ttl_minutes);
        let claims = HandoffClaims {
            jti: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            course_id,
            history_id,
            language: language.map(str::to_string),
            token_type,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| TokenError::Encode)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Verify a token and return its claims, or [`TokenError::Invalid`].
    pub fn verify(&self, token: &str) -> Result<HandoffClaims, TokenError> {
        jsonwebtoken::decode::<HandoffClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }
}

/// Short log-safe fingerprint of a token. Raw tokens never hit the logs.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_codec() -> TokenCodec {
        TokenCodec::new(b"test-secret-key-for-testing")
    }

    fn course_id() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let codec = test_codec();
        let history = Uuid::new_v4();
        let issued = codec
            .issue(
                TokenType::AttendanceVerify,
                "s1",
                course_id(),
                Some(history),
                Some("ko"),
                30,
            )
            .unwrap();

        let claims = codec.verify(&issued.token).unwrap();
        assert_eq!(claims.session_id, "s1");
        assert_eq!(claims.history_id, Some(history));
        assert_eq!(claims.language.as_deref(), Some("ko"));
        assert_eq!(claims.token_type, TokenType::AttendanceVerify);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn learn_token_omits_history() {
        let codec = test_codec();
        let issued = codec
            .issue(TokenType::MobileLearn, "s1", course_id(), None, None, 240)
            .unwrap();
        let claims = codec.verify(&issued.token).unwrap();
        assert_eq!(claims.history_id, None);
        assert!(claims.token_type.grants_playback());
        assert!(!claims.token_type.grants_submission());
    }

    #[test]
    fn type_tag_wire_format() {
        assert_eq!(
            serde_json::to_string(&TokenType::AttendanceVerify).unwrap(),
            "\"ATTENDANCE_VERIFY\""
        );
        assert_eq!(
            serde_json::from_str::<TokenType>("\"MOBILE_LEARN\"").unwrap(),
            TokenType::MobileLearn
        );
        assert!(serde_json::from_str::<TokenType>("\"ADMIN\"").is_err());
    }

    #[test]
    fn garbage_is_invalid() {
        let codec = test_codec();
        assert!(matches!(
            codec.verify("not-a-valid-token"),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(codec.verify(""), Err(TokenError::Invalid)));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let codec = test_codec();
        let issued = codec
            .issue(TokenType::Learn, "s1", course_id(), None, None, 30)
            .unwrap();

        // Swap the signature for another valid token's signature.
        let other = codec
            .issue(TokenType::Verify, "s2", course_id(), None, None, 30)
            .unwrap();
        let mut parts: Vec<&str> = issued.token.split('.').collect();
        let other_sig = other.token.rsplit('.').next().unwrap();
        parts[2] = other_sig;
        let tampered = parts.join(".");

        assert!(matches!(codec.verify(&tampered), Err(TokenError::Invalid)));
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let codec = test_codec();
        let issued = codec
            .issue(TokenType::Verify, "s1", course_id(), None, None, 30)
            .unwrap();

        let other = TokenCodec::new(b"a-different-secret");
        assert!(matches!(
            other.verify(&issued.token),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn expired_token_is_invalid() {
        let codec = test_codec();
        let now = Utc::now().timestamp();
        let claims = HandoffClaims {
            jti: "j1".into(),
            session_id: "s1".into(),
            course_id: course_id(),
            history_id: None,
            language: None,
            token_type: TokenType::Verify,
            iat: now - 3600,
            exp: now - 60,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret-key-for-testing"),
        )
        .unwrap();

        assert!(matches!(codec.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn fresh_token_still_verifies_near_expiry_boundary() {
        // ttl of one minute: well inside T, must verify.
        let codec = test_codec();
        let issued = codec
            .issue(TokenType::Verify, "s1", course_id(), None, None, 1)
            .unwrap();
        assert!(codec.verify(&issued.token).is_ok());
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = fingerprint("token-a");
        assert_eq!(a, fingerprint("token-a"));
        assert_ne!(a, fingerprint("token-b"));
        assert_eq!(a.len(), 12);
    }
}
